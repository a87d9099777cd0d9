//! # Delivery Channels
//!
//! A channel is a named destination with exactly one active listener,
//! analogous to a topic or queue name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Request intake: a fresh retrieval request entering the workflow.
    Initial,
    /// Requests waiting for (or carrying) a confirmed contract agreement.
    ContractConfirmation,
    /// Requests waiting for (or carrying) an endpoint data reference.
    DataReference,
    /// Completed or terminally failed workflow outcomes.
    Result,
    /// Envelopes whose retry budget was exhausted.
    DeadLetter,
}

impl Channel {
    /// Stable string form used for queue rows and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Initial => "initial",
            Channel::ContractConfirmation => "contract_confirmation",
            Channel::DataReference => "data_reference",
            Channel::Result => "result",
            Channel::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Channel::Initial),
            "contract_confirmation" => Ok(Channel::ContractConfirmation),
            "data_reference" => Ok(Channel::DataReference),
            "result" => Ok(Channel::Result),
            "dead_letter" => Ok(Channel::DeadLetter),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}
