mod events;
mod notifier;

pub use events::{GateEventType, PipelineEvent};
pub use notifier::Notifier;
