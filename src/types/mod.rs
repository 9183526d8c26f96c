mod events;
mod model;

pub use events::{AuiEvent, ToolCallFields, UiPayload, KNOWN_EVENT_TYPES};
pub use model::{
    Activity, ActivityStatus, ClientFrame, ComponentSpec, Interrupt, InterruptOption,
    InterruptPayload, Message, PendingInterrupt, ResolutionRequest, RunState, ToolCallEvent,
    ToolCallPhase,
};
