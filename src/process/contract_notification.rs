//! # Contract Confirmation Join
//!
//! Joins the asset request travelling through the relay with the asynchronous
//! contract negotiation outcome pushed by the connector. Whichever side
//! arrives second drives completion: a confirmed contract initiates the data
//! transfer and forwards the request to the data-reference channel, a declined
//! or failed negotiation forwards an error result.
//!
//! Completion work happens inside the relay wherever possible: the event-side
//! match re-enters the bus with the confirmation recorded instead of calling
//! downstream directly, so a failed transfer initiation is retried with the
//! relay's backoff rather than lost with the event.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transfer::DataTransferInitializer;
use super::types::{ContractInfo, ContractState, ProcessData};
use crate::correlation::CorrelationStore;
use crate::messaging::{Channel, Envelope, Listener, ListenerError, MessageBus};

pub const CONTRACT_DECLINED_MESSAGE: &str = "contract negotiation was declined by the provider";
pub const CONTRACT_ERROR_MESSAGE: &str = "contract negotiation failed";

/// Rendezvous between the waiting request envelope and the negotiation
/// outcome, keyed by negotiation id.
pub type ContractSyncStore = CorrelationStore<Envelope<ProcessData>, ContractInfo>;

pub struct ContractNotificationHandler {
    bus: Arc<dyn MessageBus<ProcessData>>,
    sync: Arc<ContractSyncStore>,
    transfer: DataTransferInitializer,
}

impl ContractNotificationHandler {
    pub fn new(
        bus: Arc<dyn MessageBus<ProcessData>>,
        sync: Arc<ContractSyncStore>,
        transfer: DataTransferInitializer,
    ) -> Self {
        Self {
            bus,
            sync,
            transfer,
        }
    }

    /// Negotiation confirmed. Matches the waiting envelope, records the
    /// agreement, and re-enters the bus so the transfer initiation runs with
    /// relay retry semantics.
    pub async fn on_confirmed(
        &self,
        negotiation_id: &str,
        agreement_id: &str,
    ) -> crate::Result<()> {
        self.on_outcome(negotiation_id, ContractInfo::confirmed(agreement_id))
            .await
    }

    /// Negotiation declined by the provider.
    pub async fn on_declined(&self, negotiation_id: &str) -> crate::Result<()> {
        self.on_outcome(negotiation_id, ContractInfo::declined()).await
    }

    /// Negotiation failed on the connector side.
    pub async fn on_failed(&self, negotiation_id: &str) -> crate::Result<()> {
        self.on_outcome(negotiation_id, ContractInfo::error()).await
    }

    async fn on_outcome(&self, negotiation_id: &str, info: ContractInfo) -> crate::Result<()> {
        match self.sync.exchange_right(negotiation_id, info).await {
            None => {
                debug!(negotiation_id, "negotiation outcome stored, request not yet seen");
                Ok(())
            }
            Some((envelope, info)) => {
                if let Err(err) = self.complete_via_bus(negotiation_id, envelope.clone(), &info).await
                {
                    // put the envelope back so a later event retriggers the join
                    self.sync.exchange_left(negotiation_id, envelope).await;
                    return Err(err.into());
                }
                self.sync.remove(negotiation_id).await;
                Ok(())
            }
        }
    }

    /// Re-enter the bus with the outcome applied to the payload. Confirmed
    /// contracts go back through the confirmation channel (where the listener
    /// path initiates the transfer); declined and failed ones go straight to
    /// the result channel as error results.
    async fn complete_via_bus(
        &self,
        negotiation_id: &str,
        mut envelope: Envelope<ProcessData>,
        info: &ContractInfo,
    ) -> crate::messaging::MessagingResult<()> {
        match info.state {
            ContractState::Confirmed => {
                info!(
                    negotiation_id,
                    trace_id = %envelope.trace_id,
                    agreement_id = ?info.agreement_id,
                    "contract confirmed"
                );
                envelope.payload.contract_agreement_id = info.agreement_id.clone();
                envelope.payload.contract_confirmed = true;
                let forwarded = Envelope::with_trace_id(
                    envelope.trace_id,
                    envelope.payload,
                    envelope.retry_limit,
                );
                self.bus.send(Channel::ContractConfirmation, forwarded).await
            }
            ContractState::Declined => {
                self.forward_error_result(envelope, CONTRACT_DECLINED_MESSAGE)
                    .await
            }
            ContractState::Error => {
                self.forward_error_result(envelope, CONTRACT_ERROR_MESSAGE)
                    .await
            }
        }
    }

    async fn forward_error_result(
        &self,
        mut envelope: Envelope<ProcessData>,
        message: &str,
    ) -> crate::messaging::MessagingResult<()> {
        warn!(
            trace_id = %envelope.trace_id,
            asset_id = %envelope.payload.asset_id,
            message,
            "forwarding error result"
        );
        envelope.payload.error_message = Some(message.to_string());
        let forwarded =
            Envelope::with_trace_id(envelope.trace_id, envelope.payload, envelope.retry_limit);
        self.bus.send(Channel::Result, forwarded).await
    }

    /// Initiate the transfer for a confirmed request and forward it to the
    /// data-reference channel. Any failure surfaces as a listener error so the
    /// relay retries the whole step.
    async fn initiate_and_forward(
        &self,
        envelope: Envelope<ProcessData>,
    ) -> Result<(), ListenerError> {
        self.transfer
            .initiate(&envelope.trace_id, &envelope.payload)
            .await?;
        let forwarded =
            Envelope::with_trace_id(envelope.trace_id, envelope.payload, envelope.retry_limit);
        self.bus
            .send(Channel::DataReference, forwarded)
            .await
            .map_err(|err| ListenerError::other(err.to_string()))
    }
}

#[async_trait]
impl Listener<ProcessData> for ContractNotificationHandler {
    async fn process(&self, envelope: Envelope<ProcessData>) -> Result<(), ListenerError> {
        // A redelivered envelope may already carry the confirmation; skip the
        // join and resume at the transfer step.
        if envelope.payload.contract_confirmed {
            return self.initiate_and_forward(envelope).await;
        }

        let negotiation_id = envelope
            .payload
            .contract_negotiation_id
            .clone()
            .ok_or_else(|| {
                ListenerError::invalid_message(
                    Channel::ContractConfirmation,
                    "missing contract negotiation id",
                )
            })?;

        match self.sync.exchange_left(&negotiation_id, envelope).await {
            None => {
                debug!(negotiation_id, "request stored, awaiting negotiation outcome");
                Ok(())
            }
            Some((envelope, info)) => {
                if let Err(err) = self
                    .complete_via_bus(&negotiation_id, envelope, &info)
                    .await
                {
                    // put the outcome back so the relay's retry can rejoin
                    self.sync.exchange_right(&negotiation_id, info).await;
                    return Err(ListenerError::other(err.to_string()));
                }
                self.sync.remove(&negotiation_id).await;
                Ok(())
            }
        }
    }
}
