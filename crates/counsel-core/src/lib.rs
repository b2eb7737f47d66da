pub mod backend;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod mode;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendClient, Endpoint, Payload, Reply, DEFAULT_BASE_URL};
pub use clipboard::{Clipboard, MemoryClipboard};
pub use config::{Config, Settings, StaleReplyPolicy, BASE_URL_ENV};
pub use error::{ClipboardError, DispatchFailure};
pub use mode::{Mode, ModeController, Template};
pub use session::{Completion, CopyFeedback, Dispatch, Session, Ticket, COPY_FEEDBACK_TTL, DISPATCH_ERROR_TEXT};
pub use state::{Citation, NewTurn, Sender, Turn, TurnId, TurnLog, WELCOME_TEXT};
