//! Inbound requests and outbound replies.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Module name stamped on every reply.
pub const MODULE_NAME: &str = "markov";

/// A command request received from the broker.
///
/// `command` and `args` are absent for plain channel messages, which
/// are only answered through the fallback model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub nick: String,
    pub dest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

impl Request {
    /// Create a request without a command.
    pub fn new(nick: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            command: None,
            nick: nick.into(),
            dest: dest.into(),
            args: None,
        }
    }

    /// Set the command.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Decode a raw payload.
    ///
    /// Invalid UTF-8, invalid JSON and JSON of the wrong shape all fail
    /// with [`MarkovError::Parse`](crate::MarkovError::Parse).
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// A reply published to the broker.
///
/// `msg` is always serialized, as `null` when no sentence could be made.
/// `command` and `args` are echoed only when the request carried them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub module: String,
    pub msg: Option<String>,
    pub nick: String,
    pub dest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

impl Response {
    /// Reply to `request`, echoing its command and arguments.
    pub fn reply(request: &Request, msg: Option<String>) -> Self {
        Self {
            module: MODULE_NAME.to_owned(),
            msg,
            nick: request.nick.clone(),
            dest: request.dest.clone(),
            command: request.command.clone(),
            args: request.args.clone(),
        }
    }

    /// Reply to `request` without echoing command or arguments.
    pub fn unprompted(request: &Request, msg: Option<String>) -> Self {
        Self {
            command: None,
            args: None,
            ..Self::reply(request, msg)
        }
    }

    /// Encode for publishing.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
