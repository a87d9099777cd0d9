//! # Transfer Initiation
//!
//! The seam between the confirmed-contract join and the connector's transfer
//! process API. The handler builds a [`TransferRequest`] and hands it to a
//! [`TransferInitiator`]; the HTTP client behind that trait lives with the
//! embedding application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::ProcessData;
use crate::messaging::ListenerError;

/// Transfer process request for a proxied pull: the provider exposes the data
/// behind an HTTP endpoint and pushes the endpoint reference back to us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub asset_id: String,
    pub connector_address: String,
    pub contract_id: String,
    pub destination_type: String,
    pub content_type: String,
    pub is_finite: bool,
}

impl TransferRequest {
    fn proxied(asset_id: &str, connector_address: &str, contract_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            connector_address: connector_address.to_string(),
            contract_id: contract_id.to_string(),
            destination_type: "HttpProxy".to_string(),
            content_type: "application/octet-stream".to_string(),
            is_finite: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("transfer request rejected: {message}")]
    Rejected { message: String },

    #[error("transfer request failed: {message}")]
    Request { message: String },
}

impl TransferError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }
}

/// Client for the connector's transfer process API.
#[async_trait]
pub trait TransferInitiator: Send + Sync {
    async fn initiate(&self, request: TransferRequest) -> Result<(), TransferError>;
}

/// Builds transfer requests from confirmed process state and reports failures
/// as listener errors, so a failed initiation is retried by the relay.
pub struct DataTransferInitializer {
    initiator: Arc<dyn TransferInitiator>,
}

impl DataTransferInitializer {
    pub fn new(initiator: Arc<dyn TransferInitiator>) -> Self {
        Self { initiator }
    }

    pub async fn initiate(&self, trace_id: &str, data: &ProcessData) -> Result<(), ListenerError> {
        let agreement_id = data.contract_agreement_id.as_deref().ok_or_else(|| {
            ListenerError::other("cannot initiate transfer without a contract agreement id")
        })?;
        let request = TransferRequest::proxied(&data.asset_id, &data.provider_url, agreement_id);

        debug!(
            trace_id,
            asset_id = %data.asset_id,
            agreement_id,
            "initiating data transfer"
        );
        self.initiator.initiate(request).await.map_err(|err| {
            warn!(trace_id, asset_id = %data.asset_id, %err, "transfer initiation failed");
            ListenerError::DataReferenceAccess {
                asset_id: data.asset_id.clone(),
            }
        })
    }
}
