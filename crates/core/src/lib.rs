pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use domain::conversation::{Conversation, ConversationId, ConversationTurn, SenderId};
pub use domain::message::{
    ChatMessage, ChatRole, InboundMessage, MessageDirection, MessageId, MessageKind, StoredMessage,
};
pub use domain::schema::{ArgValue, ArgumentError, ParameterSchema, SchemaViolation, ToolArgs};
pub use domain::tool::{
    ExecutionOutcome, ToolDescriptor, ToolExecutionId, ToolExecutionRecord, ToolFailure,
    ToolFailureKind, ToolInvocationRequest,
};
pub use errors::TurnError;
pub use flows::{FlowTransitionError, TurnFlow, TurnTracker};
