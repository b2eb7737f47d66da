//! Conversation orchestration
//!
//! [`Session`] owns the turn log, the mode controller and the transient UI
//! state, and runs the request dispatcher as a sans-IO state machine:
//!
//! ```text
//! submit() -> Some(Dispatch) --caller performs the HTTP call--> complete(ticket, outcome)
//!          -> None (rejected: blank input or already pending)
//! ```
//!
//! At most one dispatch is outstanding at a time. `complete` consumes the
//! ticket and clears `pending` on every path.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{Endpoint, Payload, Reply};
use crate::clipboard::Clipboard;
use crate::config::StaleReplyPolicy;
use crate::error::{ClipboardError, DispatchFailure};
use crate::mode::{Mode, ModeController, Template};
use crate::state::{NewTurn, Turn, TurnId, TurnLog};

/// Body of the turn appended when a dispatch fails
pub const DISPATCH_ERROR_TEXT: &str = "## Connectivity Error\n\nI'm having trouble reaching the Legal Intelligence Server. Please ensure the backend is running and the API key is valid.";

/// How long the "Copied" indicator stays up
pub const COPY_FEEDBACK_TTL: Duration = Duration::from_millis(2000);

/// Proof that a request is in flight. Must be handed back to
/// [`Session::complete`]; it cannot be cloned or forged.
#[derive(Debug)]
#[must_use = "a dispatch ticket must be completed or the session stays pending"]
pub struct Ticket {
    mode: Mode,
    generation: u64,
}

impl Ticket {
    /// Mode that was active when the request was sent
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

/// One outbound request, ready to be executed by the caller
#[derive(Debug)]
pub struct Dispatch {
    pub ticket: Ticket,
    pub endpoint: Endpoint,
    pub payload: Payload,
}

/// What `complete` did with an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Answered(TurnId),
    Failed(TurnId),
    /// Mode changed while in flight and the policy says to drop it
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFeedback {
    pub turn_id: TurnId,
    pub expires_at: Instant,
}

/// Short-lived state that never reaches the transcript
#[derive(Debug, Default)]
struct Transient {
    pending: bool,
    chat_input: String,
    draft_facts: String,
    copy_feedback: Option<CopyFeedback>,
    copy_timer: Option<JoinHandle<()>>,
}

impl Drop for Transient {
    fn drop(&mut self) {
        if let Some(timer) = self.copy_timer.take() {
            timer.abort();
        }
    }
}

pub struct Session {
    log: TurnLog,
    modes: ModeController,
    ui: Transient,
    stale_replies: StaleReplyPolicy,
}

impl Session {
    pub fn new(stale_replies: StaleReplyPolicy) -> Self {
        Self {
            log: TurnLog::with_welcome(),
            modes: ModeController::new(),
            ui: Transient::default(),
            stale_replies,
        }
    }

    pub fn log(&self) -> &TurnLog {
        &self.log
    }

    pub fn turns(&self) -> &[Turn] {
        self.log.all()
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn template(&self) -> Template {
        self.modes.template()
    }

    pub fn is_pending(&self) -> bool {
        self.ui.pending
    }

    pub fn switch_mode(&mut self, mode: Mode) {
        if mode != self.modes.mode() {
            tracing::debug!(from = self.modes.mode().as_str(), to = mode.as_str(), "Switching mode");
        }
        self.modes.switch_to(mode);
    }

    pub fn select_template(&mut self, template: Template) {
        self.modes.select_template(template);
    }

    pub fn chat_input(&self) -> &str {
        &self.ui.chat_input
    }

    pub fn chat_input_mut(&mut self) -> &mut String {
        &mut self.ui.chat_input
    }

    pub fn draft_facts(&self) -> &str {
        &self.ui.draft_facts
    }

    pub fn draft_facts_mut(&mut self) -> &mut String {
        &mut self.ui.draft_facts
    }

    /// Buffer belonging to the active mode
    pub fn active_input(&self) -> &str {
        match self.modes.mode() {
            Mode::Chat => &self.ui.chat_input,
            Mode::Draft => &self.ui.draft_facts,
        }
    }

    /// Whether a submit right now would go out
    pub fn can_submit(&self) -> bool {
        !self.ui.pending && !self.active_input().trim().is_empty()
    }

    /// Start a request for the active mode.
    ///
    /// Returns `None` without touching anything when a request is already in
    /// flight or the active buffer is blank. In Chat mode the user turn is
    /// appended and the input cleared before the request leaves.
    pub fn submit(&mut self) -> Option<Dispatch> {
        if !self.can_submit() {
            return None;
        }

        let mode = self.modes.mode();
        let (endpoint, text) = match mode {
            Mode::Chat => {
                let text = std::mem::take(&mut self.ui.chat_input);
                self.log.append(NewTurn::user(text.clone()));
                (Endpoint::Query, text)
            }
            Mode::Draft => (Endpoint::Draft, self.ui.draft_facts.clone()),
        };

        let payload = Payload {
            text,
            template: self.modes.dispatch_template(),
        };

        self.ui.pending = true;
        tracing::debug!(
            endpoint = endpoint.path(),
            template = payload.template.map(|t| t.as_str()),
            "Dispatching request"
        );

        Some(Dispatch {
            ticket: Ticket {
                mode,
                generation: self.modes.generation(),
            },
            endpoint,
            payload,
        })
    }

    /// Fold the outcome of a dispatch back into the session.
    pub fn complete(&mut self, ticket: Ticket, outcome: Result<Reply, DispatchFailure>) -> Completion {
        self.ui.pending = false;

        let stale = ticket.generation != self.modes.generation();
        if stale {
            tracing::info!(
                sent_in = ticket.mode.as_str(),
                now_in = self.modes.mode().as_str(),
                policy = self.stale_replies.as_str(),
                "Reply arrived after a mode switch"
            );
            if self.stale_replies == StaleReplyPolicy::Discard {
                return Completion::Discarded;
            }
        }

        match outcome {
            Ok(reply) => {
                let is_draft = ticket.mode == Mode::Draft;
                let id = self.log.append(NewTurn {
                    text: reply.answer,
                    citations: reply.citations.unwrap_or_default(),
                    is_draft,
                    ..NewTurn::bot(String::new())
                });
                if is_draft {
                    self.modes.finish_draft();
                }
                tracing::debug!(turn = id.get(), is_draft, "Reply appended");
                Completion::Answered(id)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Dispatch failed");
                let id = self.log.append(NewTurn {
                    is_error: true,
                    ..NewTurn::bot(DISPATCH_ERROR_TEXT)
                });
                Completion::Failed(id)
            }
        }
    }

    /// Copy a turn's text and light up its "Copied" indicator.
    ///
    /// `on_expire` runs from a timer task after [`COPY_FEEDBACK_TTL`] with the
    /// feedback it was armed for; the caller routes it back into
    /// [`Session::expire_copy_feedback`]. A newer copy aborts the previous
    /// timer. Must be called inside a tokio runtime.
    pub fn copy_turn<F>(
        &mut self,
        id: TurnId,
        clipboard: &mut dyn Clipboard,
        on_expire: F,
    ) -> Result<(), ClipboardError>
    where
        F: FnOnce(CopyFeedback) + Send + 'static,
    {
        let Some(turn) = self.log.get(id) else {
            return Ok(());
        };
        clipboard.set_text(turn.text())?;

        let feedback = CopyFeedback {
            turn_id: id,
            expires_at: Instant::now() + COPY_FEEDBACK_TTL,
        };
        self.ui.copy_feedback = Some(feedback);

        if let Some(previous) = self.ui.copy_timer.take() {
            previous.abort();
        }
        self.ui.copy_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(feedback.expires_at).await;
            on_expire(feedback);
        }));
        Ok(())
    }

    /// Clear the copy indicator if it is still the one `expired` was armed for.
    ///
    /// A re-copy of the same turn gets a later `expires_at`, so an expiry that
    /// was already queued for the earlier copy leaves it alone.
    pub fn expire_copy_feedback(&mut self, expired: CopyFeedback) {
        if self.ui.copy_feedback == Some(expired) {
            self.ui.copy_feedback = None;
            self.ui.copy_timer = None;
        }
    }

    pub fn copy_feedback(&self) -> Option<CopyFeedback> {
        self.ui.copy_feedback
    }

    /// True while the "Copied" indicator should show for `id`
    pub fn is_copied(&self, id: TurnId, now: Instant) -> bool {
        self.ui
            .copy_feedback
            .is_some_and(|f| f.turn_id == id && now < f.expires_at)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(StaleReplyPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::state::{Citation, Sender};
    use std::sync::{Arc, Mutex};

    fn reply(answer: &str, sources: &[&str]) -> Reply {
        Reply {
            answer: answer.to_string(),
            citations: Some(
                sources
                    .iter()
                    .map(|s| Citation { source: s.to_string() })
                    .collect(),
            ),
        }
    }

    fn failure() -> DispatchFailure {
        DispatchFailure::Status(502)
    }

    #[test]
    fn test_chat_scenario_from_question_to_answer() {
        let mut session = Session::default();
        assert_eq!(session.turns().len(), 1);

        session.chat_input_mut().push_str("What is promissory estoppel?");
        let dispatch = session.submit().expect("should dispatch");

        assert_eq!(dispatch.endpoint, Endpoint::Query);
        assert_eq!(dispatch.payload.text, "What is promissory estoppel?");
        assert_eq!(dispatch.payload.template, None);
        assert!(session.is_pending());
        assert_eq!(session.chat_input(), "");
        assert_eq!(session.turns().len(), 2);
        let user = &session.turns()[1];
        assert_eq!(user.sender(), Sender::User);
        assert_eq!(user.text(), "What is promissory estoppel?");

        let done = session.complete(dispatch.ticket, Ok(reply("# Answer\n...", &["Case X"])));

        assert!(matches!(done, Completion::Answered(_)));
        assert!(!session.is_pending());
        assert_eq!(session.turns().len(), 3);
        let bot = session.log().last().unwrap();
        assert_eq!(bot.sender(), Sender::Bot);
        assert_eq!(bot.citations().len(), 1);
        assert_eq!(bot.citations()[0].source, "Case X");
        assert!(!bot.is_draft());
        assert!(!bot.is_error());
    }

    #[test]
    fn test_draft_failure_keeps_draft_mode() {
        let mut session = Session::default();
        session.switch_mode(Mode::Draft);
        session.select_template(Template::Petition);
        session.draft_facts_mut().push_str("Tenant seeks eviction notice review");

        let dispatch = session.submit().expect("should dispatch");
        assert_eq!(dispatch.endpoint, Endpoint::Draft);
        assert_eq!(dispatch.payload.template, Some(Template::Petition));
        assert_eq!(session.turns().len(), 1);

        let done = session.complete(dispatch.ticket, Err(failure()));

        assert!(matches!(done, Completion::Failed(_)));
        assert_eq!(session.turns().len(), 2);
        let last = session.log().last().unwrap();
        assert!(last.is_error());
        assert_eq!(last.sender(), Sender::Bot);
        assert_eq!(last.text(), DISPATCH_ERROR_TEXT);
        assert_eq!(session.mode(), Mode::Draft);
        assert!(!session.is_pending());
        // facts are kept so the user can retry
        assert_eq!(session.draft_facts(), "Tenant seeks eviction notice review");
    }

    #[test]
    fn test_draft_success_returns_to_chat() {
        let mut session = Session::default();
        session.switch_mode(Mode::Draft);
        session.draft_facts_mut().push_str("Breach of lease");

        let dispatch = session.submit().unwrap();
        session.complete(dispatch.ticket, Ok(reply("DRAFT", &[])));

        assert_eq!(session.turns().len(), 2);
        let last = session.log().last().unwrap();
        assert!(last.is_draft());
        assert!(last.is_exportable());
        assert_eq!(last.sender(), Sender::Bot);
        assert_eq!(session.mode(), Mode::Chat);
    }

    #[test]
    fn test_chat_failure_adds_user_and_error_turns() {
        let mut session = Session::default();
        session.chat_input_mut().push_str("hello");
        let dispatch = session.submit().unwrap();
        session.complete(dispatch.ticket, Err(failure()));

        assert_eq!(session.turns().len(), 3);
        assert!(session.log().last().unwrap().is_error());
        assert_eq!(session.mode(), Mode::Chat);
        assert!(!session.is_pending());
    }

    #[test]
    fn test_blank_input_is_ignored_in_both_modes() {
        let mut session = Session::default();
        session.chat_input_mut().push_str("   \t\n");
        assert!(session.submit().is_none());
        assert_eq!(session.turns().len(), 1);
        assert!(!session.is_pending());
        assert_eq!(session.chat_input(), "   \t\n");

        session.switch_mode(Mode::Draft);
        session.draft_facts_mut().push_str("  ");
        assert!(session.submit().is_none());
        assert_eq!(session.turns().len(), 1);
        assert!(!session.is_pending());
    }

    #[test]
    fn test_second_submit_while_pending_is_ignored() {
        let mut session = Session::default();
        session.chat_input_mut().push_str("first");
        let first = session.submit().unwrap();

        session.chat_input_mut().push_str("second");
        assert!(session.submit().is_none());
        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.chat_input(), "second");

        session.complete(first.ticket, Ok(reply("ok", &[])));
        assert!(session.submit().is_some());
    }

    #[test]
    fn test_missing_citations_become_empty() {
        let mut session = Session::default();
        session.chat_input_mut().push_str("q");
        let dispatch = session.submit().unwrap();
        session.complete(
            dispatch.ticket,
            Ok(Reply {
                answer: "a".to_string(),
                citations: None,
            }),
        );
        assert!(session.log().last().unwrap().citations().is_empty());
    }

    #[test]
    fn test_mode_switch_keeps_buffers() {
        let mut session = Session::default();
        session.chat_input_mut().push_str("question");
        session.switch_mode(Mode::Draft);
        session.draft_facts_mut().push_str("facts");
        session.switch_mode(Mode::Chat);

        assert_eq!(session.chat_input(), "question");
        assert_eq!(session.draft_facts(), "facts");
        assert_eq!(session.active_input(), "question");
    }

    #[test]
    fn test_template_selected_in_chat_not_sent() {
        let mut session = Session::default();
        session.select_template(Template::Notice);
        session.chat_input_mut().push_str("q");
        let dispatch = session.submit().unwrap();
        assert_eq!(dispatch.payload.template, None);
    }

    #[test]
    fn test_stale_draft_reply_applied_by_default() {
        let mut session = Session::default();
        session.switch_mode(Mode::Draft);
        session.draft_facts_mut().push_str("facts");
        let dispatch = session.submit().unwrap();

        // user wanders off to chat and back to draft while waiting
        session.switch_mode(Mode::Chat);
        session.switch_mode(Mode::Draft);

        let done = session.complete(dispatch.ticket, Ok(reply("DRAFT", &[])));
        assert!(matches!(done, Completion::Answered(_)));
        assert!(session.log().last().unwrap().is_draft());
        assert_eq!(session.mode(), Mode::Chat);
    }

    #[test]
    fn test_stale_reply_discarded_when_configured() {
        let mut session = Session::new(StaleReplyPolicy::Discard);
        session.switch_mode(Mode::Draft);
        session.draft_facts_mut().push_str("facts");
        let dispatch = session.submit().unwrap();

        session.switch_mode(Mode::Chat);

        let done = session.complete(dispatch.ticket, Err(failure()));
        assert_eq!(done, Completion::Discarded);
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.mode(), Mode::Chat);
        assert!(!session.is_pending());
    }

    #[test]
    fn test_fresh_reply_not_discarded_under_discard_policy() {
        let mut session = Session::new(StaleReplyPolicy::Discard);
        session.chat_input_mut().push_str("q");
        let dispatch = session.submit().unwrap();
        let done = session.complete(dispatch.ticket, Ok(reply("a", &[])));
        assert!(matches!(done, Completion::Answered(_)));
    }

    #[test]
    fn test_log_notification_after_each_append() {
        let mut session = Session::default();
        let mut rx = session.log().subscribe();

        session.chat_input_mut().push_str("q");
        let dispatch = session.submit().unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        session.complete(dispatch.ticket, Ok(reply("a", &[])));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_sets_clipboard_and_feedback_decays() {
        let mut session = Session::default();
        let mut clipboard = MemoryClipboard::new();
        let id = session.turns()[0].id();
        let expired = Arc::new(Mutex::new(Vec::new()));

        let sink = expired.clone();
        session
            .copy_turn(id, &mut clipboard, move |f| sink.lock().unwrap().push(f))
            .unwrap();

        assert_eq!(clipboard.contents(), Some(session.turns()[0].text()));
        assert!(session.is_copied(id, Instant::now()));

        tokio::time::sleep(COPY_FEEDBACK_TTL + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        assert!(!session.is_copied(id, Instant::now()));
        let fired = expired.lock().unwrap().clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].turn_id, id);
        session.expire_copy_feedback(fired[0]);
        assert!(session.copy_feedback().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_expiry_does_not_clear_recopy_of_same_turn() {
        let mut session = Session::default();
        let mut clipboard = MemoryClipboard::new();
        let id = session.turns()[0].id();
        let expired = Arc::new(Mutex::new(Vec::new()));

        let sink = expired.clone();
        session
            .copy_turn(id, &mut clipboard, move |f| sink.lock().unwrap().push(f))
            .unwrap();

        tokio::time::sleep(COPY_FEEDBACK_TTL + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        let queued = expired.lock().unwrap().pop().expect("timer fired");

        // copied again before the loop got round to the queued expiry
        let sink = expired.clone();
        session
            .copy_turn(id, &mut clipboard, move |f| sink.lock().unwrap().push(f))
            .unwrap();
        session.expire_copy_feedback(queued);

        assert!(session.is_copied(id, Instant::now()));
        let current = session.copy_feedback().unwrap();
        assert!(current.expires_at > queued.expires_at);

        tokio::time::sleep(COPY_FEEDBACK_TTL + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        let fired = expired.lock().unwrap().pop().expect("second timer fired");
        assert_eq!(fired, current);
        session.expire_copy_feedback(fired);
        assert!(session.copy_feedback().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_copy_wins_and_cancels_old_timer() {
        let mut session = Session::default();
        session.chat_input_mut().push_str("question");
        let dispatch = session.submit().unwrap();
        session.complete(dispatch.ticket, Ok(reply("answer", &[])));

        let first = session.turns()[1].id();
        let second = session.turns()[2].id();
        let mut clipboard = MemoryClipboard::new();
        let expired = Arc::new(Mutex::new(Vec::new()));

        let sink = expired.clone();
        session
            .copy_turn(first, &mut clipboard, move |f| sink.lock().unwrap().push(f))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let sink = expired.clone();
        session
            .copy_turn(second, &mut clipboard, move |f| sink.lock().unwrap().push(f))
            .unwrap();

        assert_eq!(clipboard.contents(), Some("answer"));
        assert!(!session.is_copied(first, Instant::now()));
        assert!(session.is_copied(second, Instant::now()));

        // the first timer would have fired here had it not been aborted
        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(expired.lock().unwrap().is_empty());

        // a stale expiry for the first turn must not clear the second
        session.expire_copy_feedback(CopyFeedback {
            turn_id: first,
            expires_at: Instant::now(),
        });
        assert!(session.is_copied(second, Instant::now()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        let fired: Vec<TurnId> = expired.lock().unwrap().iter().map(|f| f.turn_id).collect();
        assert_eq!(fired, vec![second]);
        assert!(!session.is_copied(second, Instant::now()));
    }
}
