// Message vocabulary for the counter channel
//
// The wire protocol is a small set of named tags exchanged over one named
// bidirectional channel per engine instance. Tags are decoded into a closed
// enum at the channel boundary; anything outside the vocabulary is answered
// with an explicit not-implemented reply rather than an error.

use serde_json::Value;

/// Wire tags for the counter channel.
pub mod tags {
    /// host -> embedded: push the current counter value (integer payload)
    pub const SET_COUNT: &str = "setCount";

    /// embedded -> host: increment the shared counter by one (no payload)
    pub const INCREMENT_COUNT: &str = "incrementCount";

    /// embedded -> host: hand control to the delegate (no payload)
    pub const NEXT: &str = "next";

    /// embedded -> host: diagnostic probe, log-and-acknowledge (no payload)
    pub const TEST: &str = "test";
}

/// Default name for the counter channel opened over each engine instance.
pub const DEFAULT_CHANNEL: &str = "shared-counter";

/// Raw inbound call as delivered by the host channel primitive.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MethodCall {
    pub tag: String,
    pub payload: Option<Value>,
}

impl MethodCall {
    pub fn new(tag: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }
}

/// Recognized inbound messages (embedded -> host)
///
/// Decoded from the raw tag at the channel boundary. The payload is unused
/// for every recognized inbound message, so decoding is tag-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMessage {
    /// Increment the shared counter by one
    IncrementCount,
    /// Invoke the delegate's callback
    Next,
    /// Diagnostic probe with no side effects beyond a log line
    Test,
}

impl InboundMessage {
    /// Decode a wire tag into a recognized inbound message
    ///
    /// Returns `None` for any tag outside the closed vocabulary; callers
    /// answer that case with [`MessageReply::NotImplemented`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            tags::INCREMENT_COUNT => Some(InboundMessage::IncrementCount),
            tags::NEXT => Some(InboundMessage::Next),
            tags::TEST => Some(InboundMessage::Test),
            _ => None,
        }
    }
}

/// Outbound messages (host -> embedded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Push the current counter value to the engine
    SetCount(i64),
}

impl OutboundMessage {
    /// Wire tag for this message
    pub fn tag(&self) -> &'static str {
        match self {
            OutboundMessage::SetCount(_) => tags::SET_COUNT,
        }
    }

    /// JSON payload for this message
    pub fn payload(&self) -> Option<Value> {
        match self {
            OutboundMessage::SetCount(value) => Some(Value::from(*value)),
        }
    }
}

/// Reply to an inbound call
///
/// Mirrors the host channel's result shapes: a success acknowledgement
/// (optionally with a payload), an explicit not-implemented signal for
/// unrecognized tags, and an error result carrying a structured code.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageReply {
    Success(Option<Value>),
    NotImplemented,
    Error { code: i32, message: String },
}
