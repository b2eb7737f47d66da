use ratatui::layout::Rect;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use counsel_core::{
    BackendClient, Clipboard, Completion, DispatchFailure, Mode, Reply, Session, Settings,
    Template, Ticket, Turn,
};
use crate::clipboard::SystemClipboard;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    Unknown,
    Healthy,
    Unreachable,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub session: Session,

    // Input cursors (char index into the session buffers)
    pub chat_cursor: usize,
    pub facts_cursor: usize,

    // Transcript view
    pub selected_turn: Option<usize>, // None follows the latest turn
    pub transcript_scroll: u16,
    pub follow_latest: bool,
    pub transcript_area: Option<Rect>,
    log_changes: watch::Receiver<u64>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // One-line message in the footer (clipboard errors, export notice)
    pub status: Option<String>,
    pub backend_health: BackendHealth,

    // Collaborators
    pub backend: BackendClient,
    clipboard: Box<dyn Clipboard>,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(settings: &Settings, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self::with_parts(
            Session::new(settings.stale_replies),
            BackendClient::new(&settings.base_url),
            Box::new(SystemClipboard::new()),
            events,
        )
    }

    pub fn with_parts(
        session: Session,
        backend: BackendClient,
        clipboard: Box<dyn Clipboard>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let log_changes = session.log().subscribe();
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            session,

            chat_cursor: 0,
            facts_cursor: 0,

            selected_turn: None,
            transcript_scroll: 0,
            follow_latest: true,
            transcript_area: None,
            log_changes,

            animation_frame: 0,

            status: None,
            backend_health: BackendHealth::Unknown,

            backend,
            clipboard,
            events,
        }
    }

    /// Kick off the startup health probe
    pub fn probe_health(&self) {
        let backend = self.backend.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let healthy = match backend.health().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, url = backend.base_url(), "Backend health check failed");
                    false
                }
            };
            let _ = events.send(AppEvent::Health(healthy));
        });
    }

    /// Submit the active buffer. The HTTP call runs on its own task and reports
    /// back through the event channel.
    pub fn submit(&mut self) {
        let Some(dispatch) = self.session.submit() else {
            return;
        };

        if dispatch.ticket.mode() == Mode::Chat {
            self.chat_cursor = 0;
        }
        self.status = None;
        self.follow_latest = true;

        let backend = self.backend.clone();
        let events = self.events.clone();
        let endpoint = dispatch.endpoint;
        let payload = dispatch.payload;
        let ticket = dispatch.ticket;

        let request = tokio::spawn(async move { backend.send(endpoint, &payload).await });
        tokio::spawn(async move {
            let outcome = join_outcome(request).await;
            let _ = events.send(AppEvent::Reply { ticket, outcome });
        });
    }

    pub fn on_reply(&mut self, ticket: Ticket, outcome: Result<Reply, DispatchFailure>) {
        match self.session.complete(ticket, outcome) {
            Completion::Answered(_) | Completion::Failed(_) => {
                self.selected_turn = None;
            }
            Completion::Discarded => {
                self.status = Some("Discarded a reply that arrived after switching modes".to_string());
            }
        }
        // The facts buffer may have been edited while the request was out
        self.facts_cursor = self.facts_cursor.min(self.session.draft_facts().chars().count());
    }

    pub fn switch_mode(&mut self, mode: Mode) {
        self.session.switch_mode(mode);
        self.status = None;
    }

    pub fn toggle_mode(&mut self) {
        self.switch_mode(self.session.mode().toggled());
    }

    pub fn next_template(&mut self) {
        let next = self.session.template().next();
        self.session.select_template(next);
    }

    pub fn prev_template(&mut self) {
        let prev = self.session.template().prev();
        self.session.select_template(prev);
    }

    pub fn select_template(&mut self, template: Template) {
        self.session.select_template(template);
    }

    /// Index of the turn that copy/export act on
    pub fn selected_index(&self) -> usize {
        let last = self.session.turns().len().saturating_sub(1);
        self.selected_turn.map(|i| i.min(last)).unwrap_or(last)
    }

    pub fn selected(&self) -> Option<&Turn> {
        self.session.turns().get(self.selected_index())
    }

    pub fn select_prev_turn(&mut self) {
        let current = self.selected_index();
        self.selected_turn = Some(current.saturating_sub(1));
        self.follow_latest = false;
    }

    pub fn select_next_turn(&mut self) {
        let last = self.session.turns().len().saturating_sub(1);
        let next = self.selected_index() + 1;
        if next >= last {
            self.selected_turn = None;
            self.follow_latest = true;
        } else {
            self.selected_turn = Some(next);
        }
    }

    pub fn copy_selected(&mut self) {
        let Some(id) = self.selected().map(|t| t.id()) else {
            return;
        };
        let events = self.events.clone();
        let result = self.session.copy_turn(id, self.clipboard.as_mut(), move |feedback| {
            let _ = events.send(AppEvent::CopyExpired(feedback));
        });
        self.status = match result {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Copy failed");
                Some(e.to_string())
            }
        };
    }

    /// Export is only offered on drafts and not wired to anything yet
    pub fn export_selected(&mut self) {
        if self.selected().is_some_and(|t| t.is_exportable()) {
            self.status = Some("PDF export is not available in this version".to_string());
        }
    }

    pub fn is_copied(&self, turn: &Turn) -> bool {
        self.session.is_copied(turn.id(), Instant::now())
    }

    /// Pick up "log changed" notifications; returns true when the view should jump
    pub fn sync_with_log(&mut self) -> bool {
        if self.log_changes.has_changed().unwrap_or(false) {
            self.log_changes.borrow_and_update();
            self.follow_latest = true;
        }
        self.follow_latest
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.transcript_scroll = self.transcript_scroll.saturating_sub(lines);
        self.follow_latest = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.transcript_scroll = self.transcript_scroll.saturating_add(lines);
        self.follow_latest = false;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

/// Wait for a request task; a panicked or cancelled one still has to release the session
async fn join_outcome(
    request: JoinHandle<Result<Reply, DispatchFailure>>,
) -> Result<Reply, DispatchFailure> {
    match request.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, "Request task did not finish");
            Err(DispatchFailure::Interrupted(e.to_string()))
        }
    }
}
