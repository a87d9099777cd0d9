//! # Correlated Workflow Handlers
//!
//! The two joins that carry an asset request through the control plane: the
//! contract-confirmation join (request envelope meets negotiation outcome)
//! and the data-reference join (request envelope meets the endpoint reference
//! pushed by the provider).

pub mod contract_notification;
pub mod data_reference;
pub mod transfer;
pub mod types;

pub use contract_notification::{ContractNotificationHandler, ContractSyncStore};
pub use data_reference::{DataReferenceHandler, DataReferenceSyncStore};
pub use transfer::{DataTransferInitializer, TransferError, TransferInitiator, TransferRequest};
pub use types::{ContractInfo, ContractState, DataReference, ProcessData};
