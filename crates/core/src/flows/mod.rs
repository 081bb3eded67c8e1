pub mod engine;
pub mod states;

pub use engine::{FlowTransitionError, TurnFlow, TurnTracker};
pub use states::{TransitionOutcome, TurnAction, TurnEvent, TurnState};
