//! Signing collaborators and envelope
//!
//! Key material, the wallet/device/operation seams, and the envelope a
//! detached signer progresses from unsigned bytes to a broadcastable blob.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zeroize::Zeroize;

use crate::error::{WalletError, WalletResult};
use crate::session::OriginationPayload;
use crate::units::Mutez;
use crate::validate;

/// Watermark prefix for generic operation signing
pub const OPERATION_WATERMARK: &str = "03";

/// How the loaded wallet authenticates signing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    /// Password-encrypted local key
    Software,
    /// Detached hardware signer
    Hardware,
    /// Externally-authenticated key custodian
    ExternalAuth,
}

/// Ephemeral signing keys; secrets are wiped on drop and never persisted
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct KeyMaterial {
    pub secret_key: Option<String>,
    pub public_key: Option<String>,
    pub public_key_hash: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key)
            .field("public_key_hash", &self.public_key_hash)
            .finish()
    }
}

/// Signing/broadcast state machine phases
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningPhase {
    #[default]
    Idle,
    Validating,
    ParametersInvalid,
    AwaitingCredentials,
    Signing,
    SignFailed,
    Signed,
    Broadcasting,
    BroadcastFailed,
    Completed,
}

impl SigningPhase {
    /// True while a sign or broadcast call is actually in flight;
    /// re-entrant submissions are rejected in these phases
    pub fn is_busy(&self) -> bool {
        matches!(self, SigningPhase::Signing | SigningPhase::Broadcasting)
    }
}

/// An operation progressing from unsigned bytes to a broadcastable blob
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    /// Forged operation bytes as hex
    pub unsigned: String,
    /// Detached signature as hex, once obtained
    pub signature: Option<String>,
    pub op_hash: Option<String>,
    pub new_contract: Option<String>,
}

impl OperationEnvelope {
    /// Envelope around freshly forged unsigned bytes
    pub fn unsigned(unsigned: String) -> Self {
        OperationEnvelope {
            unsigned,
            ..Default::default()
        }
    }

    /// The payload a device signs: watermark byte prepended to the bytes
    pub fn watermarked(&self) -> String {
        format!("{}{}", OPERATION_WATERMARK, self.unsigned)
    }

    /// Attach a device signature; rejects anything that is not lowercase hex
    pub fn attach_signature(&mut self, signature: String) -> WalletResult<()> {
        if !validate::hex_string(&signature) {
            return Err(WalletError::Credential(
                "Device returned a malformed signature".to_string(),
            ));
        }
        self.signature = Some(signature);
        Ok(())
    }

    /// The broadcastable blob: unsigned bytes with the signature appended
    pub fn signed_bytes(&self) -> Option<String> {
        self.signature
            .as_ref()
            .map(|sig| format!("{}{}", self.unsigned, sig))
    }
}

/// Read-only view of the loaded wallet and its key store
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Whether a wallet is currently loaded
    fn has_wallet(&self) -> bool;

    /// How the loaded wallet authenticates
    fn account_kind(&self) -> AccountKind;

    /// Whether signing happens on a detached hardware device
    fn is_hardware(&self) -> bool {
        self.account_kind() == AccountKind::Hardware
    }

    /// Unlock key material for an account. For hardware accounts the password
    /// is empty and only public material is returned.
    async fn get_keys(&self, password: &str, account: &str) -> Result<KeyMaterial, String>;
}

/// Detached hardware signer
#[async_trait]
pub trait DeviceSigner: Send + Sync {
    /// Sign a watermarked hex payload with the key at the derivation path
    async fn sign(&self, hex_payload: &str, derivation_path: &str) -> Result<String, String>;
}

/// Result payload of an originate or broadcast call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub op_hash: Option<String>,
    /// Address of the newly originated contract
    pub new_contract: Option<String>,
    /// Forged unsigned bytes, returned when a detached signer must sign first
    pub unsigned_operation: Option<String>,
}

/// Node-facing operation oracle
#[async_trait]
pub trait OperationOracle: Send + Sync {
    /// Submit an origination. For local-key accounts this signs and injects in
    /// one step; for detached signers it returns the unsigned operation bytes.
    async fn originate(
        &self,
        payload: &OriginationPayload,
        fee: Mutez,
        keys: &KeyMaterial,
    ) -> Result<OperationResult, String>;

    /// Inject an externally signed operation
    async fn broadcast(&self, signed_hex: &str) -> Result<OperationResult, String>;
}

/// In-memory wallet for tests
pub struct InMemoryWallet {
    present: bool,
    kind: AccountKind,
    /// Accepted password; `None` means unlocking always fails
    password: Option<String>,
    pkh: String,
    delay: Option<Duration>,
}

impl InMemoryWallet {
    /// Password-protected software wallet
    pub fn software(password: &str, pkh: &str) -> Self {
        InMemoryWallet {
            present: true,
            kind: AccountKind::Software,
            password: Some(password.to_string()),
            pkh: pkh.to_string(),
            delay: None,
        }
    }

    /// Hardware wallet; `get_keys` returns public material only
    pub fn hardware(pkh: &str) -> Self {
        InMemoryWallet {
            present: true,
            kind: AccountKind::Hardware,
            password: None,
            pkh: pkh.to_string(),
            delay: None,
        }
    }

    /// Externally-authenticated wallet that always fails to unlock
    pub fn external_auth_failing(pkh: &str) -> Self {
        InMemoryWallet {
            present: true,
            kind: AccountKind::ExternalAuth,
            password: None,
            pkh: pkh.to_string(),
            delay: None,
        }
    }

    /// No wallet loaded
    pub fn absent() -> Self {
        InMemoryWallet {
            present: false,
            kind: AccountKind::Software,
            password: None,
            pkh: String::new(),
            delay: None,
        }
    }

    /// Delay key derivation, to widen the in-flight window in tests
    pub fn with_unlock_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl WalletService for InMemoryWallet {
    fn has_wallet(&self) -> bool {
        self.present
    }

    fn account_kind(&self) -> AccountKind {
        self.kind
    }

    async fn get_keys(&self, password: &str, _account: &str) -> Result<KeyMaterial, String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.kind {
            AccountKind::Hardware => Ok(KeyMaterial {
                secret_key: None,
                public_key: Some(format!("edpk-{}", self.pkh)),
                public_key_hash: self.pkh.clone(),
            }),
            AccountKind::Software | AccountKind::ExternalAuth => {
                if self.password.as_deref() == Some(password) {
                    Ok(KeyMaterial {
                        secret_key: Some(format!("edsk-{}", self.pkh)),
                        public_key: Some(format!("edpk-{}", self.pkh)),
                        public_key_hash: self.pkh.clone(),
                    })
                } else {
                    Err("unlock failed".to_string())
                }
            }
        }
    }
}

/// In-memory device signer for tests; records every request
pub struct InMemoryDevice {
    response: Mutex<Result<String, String>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl InMemoryDevice {
    /// Device that returns the given signature
    pub fn signing(signature: &str) -> Self {
        InMemoryDevice {
            response: Mutex::new(Ok(signature.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Device that fails every signature request
    pub fn failing(message: &str) -> Self {
        InMemoryDevice {
            response: Mutex::new(Err(message.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Recorded `(payload, derivation_path)` requests
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DeviceSigner for InMemoryDevice {
    async fn sign(&self, hex_payload: &str, derivation_path: &str) -> Result<String, String> {
        self.requests
            .lock()
            .push((hex_payload.to_string(), derivation_path.to_string()));
        self.response.lock().clone()
    }
}

/// In-memory operation oracle for tests; records every call
pub struct InMemoryOperations {
    originate_result: Mutex<Result<OperationResult, String>>,
    broadcast_result: Mutex<Result<OperationResult, String>>,
    originations: Mutex<Vec<(OriginationPayload, Mutez)>>,
    broadcasts: Mutex<Vec<String>>,
    originate_delay: Option<Duration>,
}

impl InMemoryOperations {
    /// Oracle that signs and injects in one step, as for a local-key account
    pub fn applying(op_hash: &str, new_contract: &str) -> Self {
        Self::with_originate_result(Ok(OperationResult {
            op_hash: Some(op_hash.to_string()),
            new_contract: Some(new_contract.to_string()),
            unsigned_operation: None,
        }))
    }

    /// Oracle that returns unsigned bytes, as for a detached signer
    pub fn deferring(unsigned_hex: &str) -> Self {
        Self::with_originate_result(Ok(OperationResult {
            op_hash: None,
            new_contract: None,
            unsigned_operation: Some(unsigned_hex.to_string()),
        }))
    }

    /// Oracle whose originate call fails
    pub fn failing(message: &str) -> Self {
        Self::with_originate_result(Err(message.to_string()))
    }

    fn with_originate_result(result: Result<OperationResult, String>) -> Self {
        InMemoryOperations {
            originate_result: Mutex::new(result),
            broadcast_result: Mutex::new(Ok(OperationResult::default())),
            originations: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            originate_delay: None,
        }
    }

    /// Delay originate completions, to widen the settling window in tests
    pub fn with_originate_delay(mut self, delay: Duration) -> Self {
        self.originate_delay = Some(delay);
        self
    }

    /// Configure the broadcast completion
    pub fn set_broadcast_result(&self, result: Result<OperationResult, String>) {
        *self.broadcast_result.lock() = result;
    }

    /// Recorded originate calls
    pub fn originations(&self) -> Vec<(OriginationPayload, Mutez)> {
        self.originations.lock().clone()
    }

    /// Recorded broadcast payloads
    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().clone()
    }
}

#[async_trait]
impl OperationOracle for InMemoryOperations {
    async fn originate(
        &self,
        payload: &OriginationPayload,
        fee: Mutez,
        _keys: &KeyMaterial,
    ) -> Result<OperationResult, String> {
        self.originations.lock().push((payload.clone(), fee));
        if let Some(delay) = self.originate_delay {
            tokio::time::sleep(delay).await;
        }
        self.originate_result.lock().clone()
    }

    async fn broadcast(&self, signed_hex: &str) -> Result<OperationResult, String> {
        self.broadcasts.lock().push(signed_hex.to_string());
        self.broadcast_result.lock().clone()
    }
}
