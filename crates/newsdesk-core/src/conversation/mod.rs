//! Per-user article authoring conversations.

pub mod engine;
pub mod session;

pub use engine::{ConversationEngine, EngineConfig, EngineDeps};
pub use session::{ImageChange, Session, Step};
