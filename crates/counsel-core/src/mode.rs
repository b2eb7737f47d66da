use serde::{Deserialize, Serialize};

/// Which surface the user is working in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Free-form legal Q&A
    #[default]
    Chat,
    /// Templated document generation from case facts
    Draft,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Draft => "draft",
        }
    }

    /// Breadcrumb shown in the header
    pub fn workspace_title(&self) -> &'static str {
        match self {
            Mode::Chat => "General Research",
            Mode::Draft => "Document Synthesis",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mode::Chat => Mode::Draft,
            Mode::Draft => Mode::Chat,
        }
    }
}

/// Document template requested from the drafting endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    #[default]
    Summary,
    Petition,
    Notice,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Template::Summary => "summary",
            Template::Petition => "petition",
            Template::Notice => "notice",
        }
    }

    pub fn all() -> Vec<Template> {
        vec![Template::Summary, Template::Petition, Template::Notice]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Template::Summary => "Summary",
            Template::Petition => "Petition",
            Template::Notice => "Notice",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Template::Summary => "Case Breakdown",
            Template::Petition => "Court Filing",
            Template::Notice => "Legal Notice",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Template::Summary => Template::Petition,
            Template::Petition => Template::Notice,
            Template::Notice => Template::Summary,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Template::Summary => Template::Notice,
            Template::Petition => Template::Summary,
            Template::Notice => Template::Petition,
        }
    }
}

/// Chat/Draft selector plus the template attached to Draft mode.
///
/// `generation` counts explicit switches so an in-flight request can tell
/// whether the user moved on while it was outstanding.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    mode: Mode,
    template: Template,
    generation: u64,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn template(&self) -> Template {
        self.template
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// User-triggered switch. Buffers are untouched.
    pub fn switch_to(&mut self, mode: Mode) {
        if self.mode != mode {
            self.mode = mode;
            self.generation += 1;
        }
    }

    /// Stored regardless of mode; only read when dispatching in Draft
    pub fn select_template(&mut self, template: Template) {
        self.template = template;
    }

    /// Implicit Draft -> Chat after a draft reply lands
    pub(crate) fn finish_draft(&mut self) {
        self.mode = Mode::Chat;
    }

    /// Template to send with a request made in the current mode
    pub fn dispatch_template(&self) -> Option<Template> {
        match self.mode {
            Mode::Chat => None,
            Mode::Draft => Some(self.template),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let ctl = ModeController::new();
        assert_eq!(ctl.mode(), Mode::Chat);
        assert_eq!(ctl.template(), Template::Summary);
        assert_eq!(ctl.dispatch_template(), None);
    }

    #[test]
    fn test_template_ignored_in_chat() {
        let mut ctl = ModeController::new();
        ctl.select_template(Template::Notice);
        assert_eq!(ctl.dispatch_template(), None);

        ctl.switch_to(Mode::Draft);
        assert_eq!(ctl.dispatch_template(), Some(Template::Notice));
    }

    #[test]
    fn test_generation_counts_real_switches_only() {
        let mut ctl = ModeController::new();
        ctl.switch_to(Mode::Chat);
        assert_eq!(ctl.generation(), 0);
        ctl.switch_to(Mode::Draft);
        ctl.switch_to(Mode::Chat);
        assert_eq!(ctl.generation(), 2);
    }

    #[test]
    fn test_template_names_match_wire_format() {
        for t in Template::all() {
            let parsed: Template = serde_json::from_str(&format!("\"{}\"", t.as_str())).unwrap();
            assert_eq!(parsed, t);
        }
        assert!(serde_json::from_str::<Template>("\"memo\"").is_err());
    }

    #[test]
    fn test_template_cycle() {
        assert_eq!(Template::Notice.next(), Template::Summary);
        assert_eq!(Template::Summary.prev(), Template::Notice);
        assert_eq!(Template::Petition.next().prev(), Template::Petition);
    }

    #[test]
    fn test_template_serializes_lowercase() {
        let json = serde_json::to_string(&Template::Petition).unwrap();
        assert_eq!(json, "\"petition\"");
    }
}
