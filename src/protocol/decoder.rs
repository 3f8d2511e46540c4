//! 入站消息解码表
//!
//! 消息类型标签到解码函数的映射在编译期固定；新增消息类型只需在 `DECODERS` 中追加一行。

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::DecodeError;
use crate::protocol::{CloseMessage, ErrorMessage, HeartbeatMessage, InboundMessage, PayloadMessage};

type DecodeFn = fn(Value) -> Result<InboundMessage, DecodeError>;

/// 标签 -> 解码函数
const DECODERS: &[(&str, DecodeFn)] = &[
    ("PayloadMessage", decode_payload),
    ("HeartbeatMessage", decode_heartbeat),
    ("CloseMessage", decode_close),
    ("ServerException", decode_server_exception),
    ("BadRequestException", decode_bad_request),
    ("InvalidClusterException", decode_invalid_cluster),
];

/// 入站信封：`{"type": "PayloadMessage", "message": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub message: Value,
}

fn parse<T: DeserializeOwned>(kind: &'static str, body: Value) -> Result<T, DecodeError> {
    serde_json::from_value(body).map_err(|source| DecodeError::Malformed { kind, source })
}

fn decode_payload(body: Value) -> Result<InboundMessage, DecodeError> {
    parse::<PayloadMessage>("PayloadMessage", body).map(InboundMessage::Payload)
}

fn decode_heartbeat(body: Value) -> Result<InboundMessage, DecodeError> {
    parse::<HeartbeatMessage>("HeartbeatMessage", body).map(InboundMessage::Heartbeat)
}

fn decode_close(body: Value) -> Result<InboundMessage, DecodeError> {
    parse::<CloseMessage>("CloseMessage", body).map(InboundMessage::Close)
}

fn decode_server_exception(body: Value) -> Result<InboundMessage, DecodeError> {
    parse::<ErrorMessage>("ServerException", body).map(InboundMessage::ServerException)
}

fn decode_bad_request(body: Value) -> Result<InboundMessage, DecodeError> {
    parse::<ErrorMessage>("BadRequestException", body).map(InboundMessage::BadRequest)
}

fn decode_invalid_cluster(body: Value) -> Result<InboundMessage, DecodeError> {
    parse::<ErrorMessage>("InvalidClusterException", body).map(InboundMessage::InvalidCluster)
}

/// 按类型标签解码消息体
pub fn decode(message_type: &str, body: Value) -> Result<InboundMessage, DecodeError> {
    let (_, decoder) = DECODERS
        .iter()
        .find(|(tag, _)| *tag == message_type)
        .ok_or_else(|| DecodeError::UnrecognizedType(message_type.to_string()))?;
    decoder(body)
}

/// 解码一行 JSON 信封
pub fn decode_line(line: &str) -> Result<InboundMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(line).map_err(|source| DecodeError::Malformed {
        kind: "envelope",
        source,
    })?;
    decode(&envelope.message_type, envelope.message)
}

/// 可识别的消息类型标签
pub fn recognized_types() -> impl Iterator<Item = &'static str> {
    DECODERS.iter().map(|(tag, _)| *tag)
}
