//! 控制面协议：消息定义与入站解码表

pub mod decoder;
pub mod message;

pub use decoder::{decode, decode_line, recognized_types, Envelope};
pub use message::{
    AckRequest, AcsContainer, AcsTask, CloseMessage, ErrorMessage, HeartbeatMessage,
    InboundMessage, OutboundMessage, PayloadMessage,
};
