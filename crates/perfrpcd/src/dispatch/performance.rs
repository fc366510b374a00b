//! Binary exchange operations on the request/response channel.
//!
//! The handlers decode the text buffer, run the timed unit of work on the
//! channel, then encode the reply. Only the channel call is timed.

use std::sync::Arc;

use tracing::debug;

use crate::exchange::codec::ExchangeBuffer;
use crate::exchange::{EXCHANGE_TARGET, Performance, Timed, saturating_micros};

use super::errors::DispatchError;
use super::params::{BufferResponse, ExchangeParams, ReceiveParams, SendParams, SendResponse};
use super::registry::MethodRegistry;

/// Registers `send`, `receive` and `exchange` against `channel`.
pub fn register(registry: &mut MethodRegistry, channel: &Arc<dyn Performance>) {
    let target = Arc::clone(channel);
    registry.register("send", move |_, params: SendParams| send(target.as_ref(), params));
    let target = Arc::clone(channel);
    registry.register("receive", move |_, params: ReceiveParams| {
        receive(target.as_ref(), params)
    });
    let target = Arc::clone(channel);
    registry.register("exchange", move |_, params: ExchangeParams| {
        exchange(target.as_ref(), params)
    });
}

/// Decodes `data` and pushes it through the channel.
///
/// # Errors
///
/// Returns `DispatchError::MalformedParameters` when `data` does not decode.
pub fn send(channel: &dyn Performance, params: SendParams) -> Result<SendResponse, DispatchError> {
    let buffer = decode("send", params.data)?;
    let raw = buffer.raw();
    let length = params
        .length
        .map_or(raw.len(), |declared| usize::from(declared).min(raw.len()));
    let elapsed = channel.send(&raw[..length]);
    debug!(target: EXCHANGE_TARGET, length, "send served");
    Ok(SendResponse {
        duration: saturating_micros(elapsed),
    })
}

/// Pulls up to `length` bytes from the channel.
///
/// # Errors
///
/// Returns `DispatchError::Internal` when the reply cannot be encoded.
pub fn receive(
    channel: &dyn Performance,
    params: ReceiveParams,
) -> Result<BufferResponse, DispatchError> {
    let reply = channel.receive(params.length);
    encode_reply(reply)
}

/// Sends `data` and returns the channel's reply, at most `length` bytes.
///
/// # Errors
///
/// Returns `DispatchError::MalformedParameters` when `data` does not decode.
pub fn exchange(
    channel: &dyn Performance,
    params: ExchangeParams,
) -> Result<BufferResponse, DispatchError> {
    let buffer = decode("exchange", params.data)?;
    let reply = channel.exchange(buffer.raw(), params.length);
    encode_reply(reply)
}

fn decode(operation: &str, data: String) -> Result<ExchangeBuffer, DispatchError> {
    ExchangeBuffer::from_text(data)
        .map_err(|error| DispatchError::malformed_parameters(operation, error))
}

fn encode_reply(reply: Timed<Vec<u8>>) -> Result<BufferResponse, DispatchError> {
    let duration = reply.micros();
    let buffer =
        ExchangeBuffer::from_raw(reply.value).map_err(|error| DispatchError::internal(error.to_string()))?;
    Ok(BufferResponse {
        length: buffer.declared_length(),
        data: buffer.into_text(),
        duration,
    })
}
