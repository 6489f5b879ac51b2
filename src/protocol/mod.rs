// src/protocol/mod.rs

//! Line-delimited JSON protocol shared by the supervisor and the action.
//!
//! Every message is exactly one JSON value followed by `\n`:
//!
//! - startup (action → supervisor, side channel): the [`Capabilities`] record
//! - request (supervisor → action, stdin): an [`Envelope`]
//! - response (action → supervisor, side channel): the action result, or
//!   `{"error":"<message>"}`
//! - signal acknowledgement (action → supervisor, side channel): one line
//!
//! - [`envelope`] holds the request model and environment injection rules.
//! - [`codec`] turns lines into envelopes and results into lines.
//! - [`signals`] maps lifecycle signals to OS signals and defines the
//!   capability handshake.

pub mod codec;
pub mod envelope;
pub mod signals;

use thiserror::Error;

pub use codec::{
    decode_envelope, encode_result, error_line, is_json_object, strip_newlines,
};
pub use envelope::{env_var_name, Envelope, Payload};
pub use signals::{Capabilities, LifecycleSignal};

/// Prefix of every environment variable injected from an envelope.
pub const ENV_PREFIX: &str = "__OW_";

/// Envelope key carrying the action payload.
pub const VALUE_KEY: &str = "value";

/// Descriptor the action writes protocol lines to.
///
/// Distinct from stdout/stderr so the action can log freely.
pub const SIDE_CHANNEL_FD: i32 = 3;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("cannot decode request: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("request is not a JSON object")]
    NotAnObject,

    #[error("cannot encode result: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid handshake: {0}")]
    Handshake(String),
}
