//! Editor state: selection markers and the session that owns the clip

pub mod markers;
pub mod session;

pub use markers::{Marker, MarkerState};
pub use session::EditorSession;
