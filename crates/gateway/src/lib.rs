//! Messaging Gateway - Fonnte WhatsApp integration
//!
//! - **Webhook** (`webhook`) - payload Fonnte posts for incoming messages
//! - **Client** (`fonnte`) - `MessagingGateway` over the Fonnte `send` API
//! - **Retry** (`retry`) - exponential backoff for transient send failures
//!
//! # Architecture
//!
//! ```text
//! Fonnte webhook → WebhookMessage → TurnQueue → TurnOrchestrator
//!                                                     ↓
//!                          FonnteClient.send_text / send_image
//! ```

pub mod fonnte;
pub mod retry;
pub mod webhook;

pub use fonnte::FonnteClient;
pub use retry::RetryPolicy;
pub use webhook::{WebhookError, WebhookMessage};
