//! Parameter and result shapes of the named operations.

use serde::{Deserialize, Serialize};

/// `postmessage` input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageParams {
    /// Client id the message is addressed to.
    pub recipient: String,
    /// Message text.
    pub message: String,
}

/// `extended` input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtendedParams {
    /// Free-form location name.
    pub location: String,
    /// Report the time in UTC rather than shifted local time.
    pub utc: bool,
}

/// Availability reported by `extended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Ready for work.
    Idle,
    /// Not accepting work.
    Inactive,
}

/// `extended` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedResponse {
    /// Microseconds since the Unix epoch.
    pub time: u64,
    /// Availability for the requested location.
    pub state: Availability,
}

/// `register` / `unregister` input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionParams {
    /// Event name.
    pub event: String,
    /// Caller-chosen client id.
    pub id: String,
}

/// `start_notifications` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NotificationParams {
    /// Seconds between notifications; zero stops them.
    pub interval: u8,
}

/// `send` input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendParams {
    /// Encoded buffer.
    pub data: String,
    /// Bytes of `data` to transfer; defaults to the whole buffer.
    #[serde(default)]
    pub length: Option<u16>,
}

/// `send` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendResponse {
    /// Microseconds spent transferring.
    pub duration: u32,
}

/// `receive` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReceiveParams {
    /// Maximum bytes to produce.
    pub length: u16,
}

/// `exchange` input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExchangeParams {
    /// Encoded outbound buffer.
    pub data: String,
    /// Maximum reply length in bytes.
    pub length: u16,
}

/// `receive` and `exchange` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferResponse {
    /// Encoded reply buffer.
    pub data: String,
    /// Bytes carried by `data`.
    pub length: u16,
    /// Microseconds spent on the transfer.
    pub duration: u32,
}
