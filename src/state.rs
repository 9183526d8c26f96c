pub mod session;
pub mod tool_timeline;

pub use session::{reduce, Resolution, ResolutionStart, SessionState};
pub use tool_timeline::{timeline, ToolCallGroup};
