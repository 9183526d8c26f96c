mod activities;
mod messages;
mod reducer;
mod run;
mod state;
mod tool_calls;

#[cfg(test)]
mod tests;

pub use messages::DEFAULT_FIELD_PATH;
pub use reducer::reduce;
pub use run::{Resolution, ResolutionStart};
pub use state::SessionState;
