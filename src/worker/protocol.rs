//! JSON Lines framing shared by the workers and their clients.
//!
//! Every request and every reply is a single JSON object on its own line.

use std::fmt::Display;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorBody;

/// Control commands understood by every worker, carried in the `cmd` field.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Shutdown,
}

#[derive(Deserialize)]
struct Control {
    #[serde(default)]
    cmd: Option<Command>,
}

/// A decoded input line.
#[derive(Debug, PartialEq)]
pub enum Incoming<R> {
    Shutdown,
    Request(R),
}

/// Decodes one input line into either the control signal or a worker request.
///
/// The `cmd` field is inspected before the payload so that a shutdown is honored
/// even when the rest of the object would not decode as a request.
pub fn decode_line<R: DeserializeOwned>(line: &str) -> serde_json::Result<Incoming<R>> {
    let value: Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(serde_json::Error::custom(format!(
            "expected a JSON object, found {}",
            kind_of(&value)
        )));
    }

    match Control::deserialize(&value)?.cmd {
        Some(Command::Shutdown) => Ok(Incoming::Shutdown),
        None => serde_json::from_value(value).map(Incoming::Request),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The `{"ok": true}` acknowledgment.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Ack { ok: true }
    }
}

/// One reply line. Exactly one is written for every non-blank input line.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Reply<T> {
    Ack(Ack),
    Failure(ErrorBody),
    Success(T),
}

impl<T> Reply<T> {
    pub fn ack() -> Self {
        Reply::Ack(Ack::ok())
    }

    pub fn error(err: impl Display) -> Self {
        Reply::Failure(ErrorBody::from(format!("{err:#}")))
    }
}
