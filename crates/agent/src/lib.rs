//! Agent Runtime - conversation turns and tool dispatch
//!
//! This crate turns one inbound chat message into replies:
//! - Builds the prompt from recent history (`context`)
//! - Asks the completion service what to do (`llm`, `openai`)
//! - Runs requested tools with isolated failures and an audit trail (`dispatch`)
//! - Maps tool outcomes to text, images or apologies (`reply`)
//!
//! # Architecture
//!
//! 1. **Queue** (`queue`) - one worker per sender, turns never overlap for a sender
//! 2. **Orchestrator** (`runtime`) - drives the turn through the `TurnFlow` states
//! 3. **Registry** (`tools`) - built once at startup, shared read-only
//!
//! The orchestrator only talks to traits (`CompletionClient`,
//! `MessagingGateway`, the repository traits) so every collaborator can be
//! swapped for an in-memory fake.

pub mod context;
pub mod dispatch;
pub mod gateway;
pub mod llm;
pub mod openai;
pub mod queue;
pub mod reply;
pub mod runtime;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use context::ContextBuilder;
pub use dispatch::ToolDispatcher;
pub use gateway::{DeliveryReceipt, GatewayError, MessagingGateway};
pub use llm::{Completion, CompletionChoice, CompletionClient, CompletionError, ToolCallRequest};
pub use openai::OpenAiCompletionClient;
pub use queue::{TurnHandler, TurnQueue};
pub use reply::OutboundReply;
pub use runtime::{TurnDependencies, TurnOrchestrator, TurnReport, TurnSettings};
pub use tools::{Tool, ToolRegistry};
