//! basalt-wallet: transaction preparation and signing for smart-contract
//! origination.
//!
//! An external request carrying a contract script arrives through
//! [`OriginationController::handle_request`], is validated and estimated, and
//! is then signed either with a password-unlocked local key or through a
//! detached hardware signer. The controller reports exactly one terminal
//! [`Outcome`] per request lifecycle.
//!
//! All money amounts are integer micro-units ([`Mutez`]); no floating point
//! is used anywhere in the pipeline.

pub mod error;
pub mod estimate;
pub mod lifecycle;
pub mod micheline;
pub mod request;
pub mod session;
pub mod signing;
pub mod units;
pub mod validate;

pub use error::{WalletError, WalletResult};
pub use estimate::{EstimationOracle, FeeEstimator, OriginationDraft, StaticEstimator};
pub use lifecycle::{
    BoostMetadata, IndexingCollaborator, MessagingCollaborator, NoOpIndexer, NoOpMessaging,
    OriginationController, Outcome, RecordingIndexer, RecordingMessenger, ScriptTab,
};
pub use micheline::{MichelineExpr, MichelsonError, MichelsonOracle, PermissiveMichelson};
pub use request::{
    ContractScript, ExternalRequest, OperationDetail, OperationRequest, Recommendations,
    SelectedAccount, KIND_ORIGINATION,
};
pub use session::{
    FormSessionState, NetworkConstants, OriginationPayload, TransactionParams,
    DEVICE_CONFIRM_PENDING, MSG_INVALID_FEE, MSG_INVALID_GAS, MSG_INVALID_STORAGE,
};
pub use signing::{
    AccountKind, DeviceSigner, InMemoryDevice, InMemoryOperations, InMemoryWallet, KeyMaterial,
    OperationEnvelope, OperationOracle, OperationResult, SigningPhase, WalletService,
    OPERATION_WATERMARK,
};
pub use units::{Mutez, ParseMutezError, MUTEZ_PER_TEZ, TEZ_DECIMALS};
