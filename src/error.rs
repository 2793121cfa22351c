//! Pipeline errors

use thiserror::Error;

use crate::units::ParseMutezError;

/// Pipeline result type
pub type WalletResult<T> = Result<T, WalletError>;

/// Errors raised by the origination pipeline
#[derive(Error, Debug)]
pub enum WalletError {
    /// Malformed external request or script; fatal to the request
    #[error("Invalid origination parameters: {0}")]
    Parameters(String),

    /// User-entered fee/gas/storage failed validation; recoverable
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Simulation oracle failure; recoverable
    #[error("Estimation failed: {0}")]
    Estimation(String),

    /// Wrong password, failed external auth, or failed device signature
    #[error("Credential failure: {0}")]
    Credential(String),

    /// Network or oracle rejection after signing; terminal for this attempt
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    /// Amount parsing error
    #[error("Invalid amount: {0}")]
    Amount(#[from] ParseMutezError),

    /// A sign/broadcast sequence is already running
    #[error("A submission is already in flight")]
    SubmissionInFlight,

    /// No external request has been taken in
    #[error("No active origination request")]
    NoActiveRequest,

    /// Device path requested without a configured device signer
    #[error("No device signer configured")]
    NoDeviceSigner,

    /// Broadcast requested before a signed operation exists
    #[error("No signed operation to broadcast")]
    NothingToBroadcast,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
