//! 下行任务载荷：入队、处理、持久化与确认

pub mod payload_handler;

pub use payload_handler::{AgentIdentity, PayloadHandler, DEFAULT_MESSAGE_BUFFER_SIZE};
