//! # Data Reference Join
//!
//! Joins the in-flight request with the endpoint data reference the provider
//! pushes once the transfer process is ready, keyed by contract agreement id.
//! The completed request (reference attached) is forwarded to the result
//! channel.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{DataReference, ProcessData};
use crate::correlation::CorrelationStore;
use crate::messaging::{Channel, Envelope, Listener, ListenerError, MessageBus};

/// Rendezvous between the waiting request envelope and the pushed endpoint
/// reference, keyed by agreement id.
pub type DataReferenceSyncStore = CorrelationStore<Envelope<ProcessData>, DataReference>;

pub struct DataReferenceHandler {
    bus: Arc<dyn MessageBus<ProcessData>>,
    sync: Arc<DataReferenceSyncStore>,
}

impl DataReferenceHandler {
    pub fn new(bus: Arc<dyn MessageBus<ProcessData>>, sync: Arc<DataReferenceSyncStore>) -> Self {
        Self { bus, sync }
    }

    /// Endpoint reference received from the provider.
    pub async fn on_data_reference_received(
        &self,
        agreement_id: &str,
        reference: DataReference,
    ) -> crate::Result<()> {
        match self.sync.exchange_right(agreement_id, reference).await {
            None => {
                debug!(agreement_id, "data reference stored, request not yet seen");
                Ok(())
            }
            Some((envelope, reference)) => {
                if let Err(err) = self
                    .forward_result(agreement_id, envelope.clone(), reference.clone())
                    .await
                {
                    // put the envelope back so a redelivered reference rejoins
                    self.sync.exchange_left(agreement_id, envelope).await;
                    return Err(err.into());
                }
                self.sync.remove(agreement_id).await;
                Ok(())
            }
        }
    }

    async fn forward_result(
        &self,
        agreement_id: &str,
        mut envelope: Envelope<ProcessData>,
        reference: DataReference,
    ) -> crate::messaging::MessagingResult<()> {
        info!(
            agreement_id,
            trace_id = %envelope.trace_id,
            asset_id = %envelope.payload.asset_id,
            "data reference received, request complete"
        );
        envelope.payload.data_reference = Some(reference);
        let forwarded =
            Envelope::with_trace_id(envelope.trace_id, envelope.payload, envelope.retry_limit);
        self.bus.send(Channel::Result, forwarded).await
    }
}

#[async_trait]
impl Listener<ProcessData> for DataReferenceHandler {
    async fn process(&self, envelope: Envelope<ProcessData>) -> Result<(), ListenerError> {
        // A redelivered envelope may already carry the reference.
        if let Some(reference) = envelope.payload.data_reference.clone() {
            let agreement_id = envelope
                .payload
                .contract_agreement_id
                .clone()
                .unwrap_or_default();
            return self
                .forward_result(&agreement_id, envelope, reference)
                .await
                .map_err(|err| ListenerError::other(err.to_string()));
        }

        let agreement_id = envelope
            .payload
            .contract_agreement_id
            .clone()
            .ok_or_else(|| {
                ListenerError::invalid_message(
                    Channel::DataReference,
                    "missing contract agreement id",
                )
            })?;

        match self.sync.exchange_left(&agreement_id, envelope).await {
            None => {
                debug!(agreement_id, "request stored, awaiting data reference");
                Ok(())
            }
            Some((envelope, reference)) => {
                if let Err(err) = self
                    .forward_result(&agreement_id, envelope, reference.clone())
                    .await
                {
                    // put the reference back so the relay's retry can rejoin
                    self.sync.exchange_right(&agreement_id, reference).await;
                    return Err(ListenerError::other(err.to_string()));
                }
                self.sync.remove(&agreement_id).await;
                Ok(())
            }
        }
    }
}
