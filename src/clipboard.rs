use counsel_core::{Clipboard, ClipboardError};

/// The desktop clipboard, opened once at startup
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        let inner = match arboard::Clipboard::new() {
            Ok(cb) => Some(cb),
            Err(e) => {
                tracing::warn!(error = %e, "System clipboard unavailable");
                None
            }
        };
        Self { inner }
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let cb = self
            .inner
            .as_mut()
            .ok_or_else(|| ClipboardError::Unavailable("no system clipboard".to_string()))?;
        cb.set_text(text.to_string())
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }
}
