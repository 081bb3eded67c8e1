pub mod conversation;
pub mod message;
pub mod schema;
pub mod tool;
