//! # Workflow Payload Types
//!
//! The process state carried through the relay channels, plus the two event
//! payloads it gets joined with: the contract negotiation outcome and the
//! endpoint data reference.

use serde::{Deserialize, Serialize};

/// State of one asset request as it moves through the adapter's channels.
///
/// This is the relay payload for every channel: each listener reads the
/// fields it needs, fills in what it learned, and forwards the data to the
/// next channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessData {
    pub asset_id: String,
    /// Control-plane URL of the providing connector.
    pub provider_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_negotiation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_agreement_id: Option<String>,
    #[serde(default)]
    pub contract_confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_reference: Option<DataReference>,
    /// Human-readable failure description for error results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProcessData {
    pub fn new(asset_id: impl Into<String>, provider_url: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            provider_url: provider_url.into(),
            contract_negotiation_id: None,
            contract_agreement_id: None,
            contract_confirmed: false,
            data_reference: None,
            error_message: None,
        }
    }

    pub fn with_negotiation_id(mut self, negotiation_id: impl Into<String>) -> Self {
        self.contract_negotiation_id = Some(negotiation_id.into());
        self
    }
}

/// Endpoint data reference pushed by the provider once a transfer is ready:
/// where to fetch the data and the credentials to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReference {
    pub endpoint: String,
    pub auth_key: String,
    pub auth_code: String,
}

/// Terminal state of a contract negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractState {
    Confirmed,
    Declined,
    Error,
}

/// Negotiation outcome event, joined with the waiting request envelope by
/// negotiation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub state: ContractState,
    /// Present only when the negotiation was confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_id: Option<String>,
}

impl ContractInfo {
    pub fn confirmed(agreement_id: impl Into<String>) -> Self {
        Self {
            state: ContractState::Confirmed,
            agreement_id: Some(agreement_id.into()),
        }
    }

    pub fn declined() -> Self {
        Self {
            state: ContractState::Declined,
            agreement_id: None,
        }
    }

    pub fn error() -> Self {
        Self {
            state: ContractState::Error,
            agreement_id: None,
        }
    }
}
