//! Origination lifecycle
//!
//! Orchestrates the full request flow:
//! 1. Intake - validate the external request and open the modal
//! 2. Estimate - populate default transaction parameters
//! 3. Submit - gate on the form invariant, then sign locally or on a device
//! 4. Broadcast - inject the operation and hand the new contract to indexing
//! 5. Report - emit exactly one terminal outcome per request lifecycle

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{WalletError, WalletResult};
use crate::estimate::{EstimationOracle, FeeEstimator, OriginationDraft};
use crate::micheline::MichelsonOracle;
use crate::request::{self, ExternalRequest, OperationDetail, SelectedAccount};
use crate::session::{FormSessionState, NetworkConstants, OriginationPayload};
use crate::signing::{
    AccountKind, DeviceSigner, KeyMaterial, OperationEnvelope, OperationOracle, SigningPhase,
    WalletService,
};
use crate::units::Mutez;
use crate::validate;

/// Spinner label while deriving keys
pub const MSG_SIGNING: &str = "Signing operation...";
/// Spinner label while submitting a locally signed operation
pub const MSG_SENDING: &str = "Sending operation...";
/// Spinner label while a device signature is pending
pub const MSG_WAIT_DEVICE: &str = "Waiting for device signature";
/// Spinner label while injecting a device-signed operation
pub const MSG_BROADCASTING: &str = "Broadcasting operation";

/// Credential message for a failed password unlock
pub const MSG_WRONG_PASSWORD: &str = "Wrong password!";
/// Credential message for a failed external authentication
pub const MSG_AUTH_FAILED: &str = "Authorization failed";
/// Device message for a failed signature request
pub const MSG_DEVICE_SIGN_FAILED: &str = "Failed to sign operation";
/// Device message for a failed operation build
pub const MSG_CREATE_FAILED: &str = "Failed to create operation";

/// Terminal outcome of one request lifecycle, emitted exactly once
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The operation was broadcast; carries the operation hash
    Applied(String),
    /// The request or its script was malformed
    ParametersError,
    /// The operation was rejected after signing
    BroadcastError,
    /// A companion signer completed the flow out-of-band
    Silent,
    /// The user cancelled the modal
    Cancelled,
}

/// Progress and error reporting surface
#[async_trait]
pub trait MessagingCollaborator: Send + Sync {
    async fn start_progress(&self, label: &str);
    async fn stop_progress(&self);
    async fn report_error(&self, message: &str, severity: u8);
}

/// Messaging sink that ignores everything
pub struct NoOpMessaging;

#[async_trait]
impl MessagingCollaborator for NoOpMessaging {
    async fn start_progress(&self, _label: &str) {}
    async fn stop_progress(&self) {}
    async fn report_error(&self, _message: &str, _severity: u8) {}
}

/// In-memory messenger for tests; records reported errors
#[derive(Default)]
pub struct RecordingMessenger {
    errors: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl MessagingCollaborator for RecordingMessenger {
    async fn start_progress(&self, _label: &str) {}
    async fn stop_progress(&self) {}
    async fn report_error(&self, message: &str, _severity: u8) {
        self.errors.lock().push(message.to_string());
    }
}

/// Metadata handed to the indexing collaborator after a successful origination
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostMetadata {
    /// Address of the newly originated contract
    pub kt1: Option<String>,
    pub op_hash: String,
    pub origination: OperationDetail,
}

/// Activity-indexing hand-off; fire-and-forget
#[async_trait]
pub trait IndexingCollaborator: Send + Sync {
    async fn boost(&self, address: &str, metadata: BoostMetadata);
}

/// Indexer that drops every hand-off
pub struct NoOpIndexer;

#[async_trait]
impl IndexingCollaborator for NoOpIndexer {
    async fn boost(&self, _address: &str, _metadata: BoostMetadata) {}
}

/// In-memory indexer for tests; records every boost
#[derive(Default)]
pub struct RecordingIndexer {
    boosts: Mutex<Vec<(String, BoostMetadata)>>,
}

impl RecordingIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boosts(&self) -> Vec<(String, BoostMetadata)> {
        self.boosts.lock().clone()
    }
}

#[async_trait]
impl IndexingCollaborator for RecordingIndexer {
    async fn boost(&self, address: &str, metadata: BoostMetadata) {
        self.boosts.lock().push((address.to_string(), metadata));
    }
}

/// Which half of the script to render
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptTab {
    Code,
    Storage,
}

/// Coordinates one origination modal: intake, estimation, signing, broadcast,
/// and outcome reporting
pub struct OriginationController {
    wallet: Arc<dyn WalletService>,
    operations: Arc<dyn OperationOracle>,
    michelson: Arc<dyn MichelsonOracle>,
    device: Option<Arc<dyn DeviceSigner>>,
    indexing: Arc<dyn IndexingCollaborator>,
    messaging: Arc<dyn MessagingCollaborator>,
    estimator: FeeEstimator,
    session: Arc<RwLock<FormSessionState>>,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
    silent_source: Mutex<Option<broadcast::Receiver<()>>>,
    silent_task: Mutex<Option<JoinHandle<()>>>,
}

impl OriginationController {
    /// Build a controller over the given collaborators. Returns the receiving
    /// end of the outcome channel alongside it.
    pub fn new(
        wallet: Arc<dyn WalletService>,
        operations: Arc<dyn OperationOracle>,
        estimation: Arc<dyn EstimationOracle>,
        michelson: Arc<dyn MichelsonOracle>,
        constants: NetworkConstants,
    ) -> (Self, mpsc::UnboundedReceiver<Outcome>) {
        let session = Arc::new(RwLock::new(FormSessionState::new(constants)));
        let estimator = FeeEstimator::new(estimation, Arc::clone(&session));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let controller = OriginationController {
            wallet,
            operations,
            michelson,
            device: None,
            indexing: Arc::new(NoOpIndexer),
            messaging: Arc::new(NoOpMessaging),
            estimator,
            session,
            outcome_tx,
            silent_source: Mutex::new(None),
            silent_task: Mutex::new(None),
        };
        (controller, outcome_rx)
    }

    /// Attach a detached hardware signer
    pub fn with_device(mut self, device: Arc<dyn DeviceSigner>) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach the activity-indexing collaborator
    pub fn with_indexing(mut self, indexing: Arc<dyn IndexingCollaborator>) -> Self {
        self.indexing = indexing;
        self
    }

    /// Attach the progress/error messaging collaborator
    pub fn with_messaging(mut self, messaging: Arc<dyn MessagingCollaborator>) -> Self {
        self.messaging = messaging;
        self
    }

    /// Provide the silent-acknowledgement signal. Every accepted request gets
    /// its own subscription off this source, torn down again on close.
    pub fn with_silent_signal(self, rx: broadcast::Receiver<()>) -> Self {
        *self.silent_source.lock() = Some(rx);
        self
    }

    /// Shared session state, for UI bindings and tests
    pub fn session(&self) -> Arc<RwLock<FormSessionState>> {
        Arc::clone(&self.session)
    }

    // --- intake ---

    /// Take in an external origination request. Requests that do not match
    /// the expected shape are ignored; requests with invalid parameters or
    /// scripts report `ParametersError` and open nothing.
    pub async fn handle_request(&self, request: ExternalRequest) {
        let Some(detail) = request.origination().cloned() else {
            debug!("request is not a single origination; ignoring");
            return;
        };
        let (generation, latch) = {
            let mut session = self.session.write().await;
            session.intake(request.clone());
            (session.generation(), session.outcome_latch())
        };

        if !request::is_valid_origination(&detail, self.michelson.as_ref()) {
            warn!("invalid origination request");
            emit_outcome(&latch, &self.outcome_tx, Outcome::ParametersError);
            self.session.write().await.reset();
            return;
        }
        let balance = match Mutez::from_base_str(&detail.balance) {
            Ok(balance) => balance,
            Err(error) => {
                warn!(error = %error, "origination balance out of range");
                emit_outcome(&latch, &self.outcome_tx, Outcome::ParametersError);
                self.session.write().await.reset();
                return;
            }
        };

        {
            let mut session = self.session.write().await;
            if self.wallet.has_wallet() {
                session.mark_open();
                if self.wallet.is_hardware() {
                    session.arm_device_notice();
                }
            }
            session.seed(balance.to_tez_string(), detail.script.clone());
        }
        info!(balance = %balance.to_tez_string(), "origination request accepted");

        let draft = {
            let session = self.session.read().await;
            match session.build_origination() {
                Ok(payload) => OriginationDraft::new(payload, detail.recommendations()),
                Err(error) => {
                    warn!(error = %error, "could not assemble estimation draft");
                    return;
                }
            }
        };
        let _estimation = self
            .estimator
            .estimate(draft, request.selected_account.clone())
            .await;

        let subscription = self.silent_source.lock().as_ref().map(|rx| rx.resubscribe());
        if let Some(rx) = subscription {
            self.spawn_silent_listener(rx, generation, latch);
        }
    }

    // --- submission ---

    /// Local-key submission path. For hardware wallets this instead injects
    /// the operation signed by the device in a previous `device_sign` call.
    /// The password is wiped as soon as it has been read.
    pub async fn inject(&self, password: String) -> WalletResult<()> {
        let password = Zeroizing::new(password);
        // check-and-mark in one critical section so two interleaved submits
        // cannot both pass the guard before either turns busy
        let (account, payload, fee, detail, generation, latch) = {
            let mut session = self.session.write().await;
            if session.phase().is_busy() {
                return Err(WalletError::SubmissionInFlight);
            }
            if !session.validate_for_submission() {
                session.set_phase(SigningPhase::ParametersInvalid);
                return Ok(());
            }
            let account = session.account().ok_or(WalletError::NoActiveRequest)?;
            let payload = session.build_origination()?;
            let fee = session.total_fee();
            let detail = session
                .origination_detail()
                .ok_or(WalletError::NoActiveRequest)?;
            session.set_phase(SigningPhase::AwaitingCredentials);
            session.set_phase(SigningPhase::Signing);
            (
                account,
                payload,
                fee,
                detail,
                session.generation(),
                session.outcome_latch(),
            )
        };

        if self.wallet.is_hardware() {
            drop(password);
            return self.broadcast_signed(&account, &latch).await;
        }

        self.messaging.start_progress(MSG_SIGNING).await;
        let keys = self.wallet.get_keys(&password, &account.pkh).await;
        drop(password);

        match keys {
            Ok(keys) => {
                self.session.write().await.clear_credential_errors();
                self.messaging.start_progress(MSG_SENDING).await;
                self.send_origination_in_background(keys, account, payload, fee, detail, generation, latch);
                // optimistic close: broadcast settles in the background and
                // still reports through the outcome channel
                self.close_modal().await;
            }
            Err(error) => {
                warn!(error = %error, "key derivation failed");
                self.messaging.stop_progress().await;
                let message = match self.wallet.account_kind() {
                    AccountKind::ExternalAuth => MSG_AUTH_FAILED,
                    _ => MSG_WRONG_PASSWORD,
                };
                self.session
                    .write()
                    .await
                    .fail_credentials(message.to_string());
            }
        }
        Ok(())
    }

    /// Device submission path, phase one: build the unsigned operation and
    /// obtain the detached signature. Broadcast happens on the next `inject`.
    pub async fn device_sign(&self) -> WalletResult<()> {
        let device = self
            .device
            .as_ref()
            .cloned()
            .ok_or(WalletError::NoDeviceSigner)?;
        // same atomic check-and-mark as the local path
        let (account, payload, fee) = {
            let mut session = self.session.write().await;
            if session.phase().is_busy() {
                return Err(WalletError::SubmissionInFlight);
            }
            if !session.validate_for_submission() {
                session.set_phase(SigningPhase::ParametersInvalid);
                return Ok(());
            }
            let account = session.account().ok_or(WalletError::NoActiveRequest)?;
            let payload = session.build_origination()?;
            let fee = session.total_fee();
            session.set_phase(SigningPhase::Signing);
            (account, payload, fee)
        };

        let keys = match self.wallet.get_keys("", &account.pkh).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(error = %error, "device account unlock failed");
                self.session
                    .write()
                    .await
                    .fail_device(MSG_DEVICE_SIGN_FAILED.to_string());
                return Ok(());
            }
        };

        match self.operations.originate(&payload, fee, &keys).await {
            Ok(result) => {
                if let Some(unsigned) = result.unsigned_operation {
                    let envelope = OperationEnvelope::unsigned(unsigned);
                    self.session.write().await.store_envelope(envelope.clone());
                    self.request_device_signature(&device, &envelope, &account)
                        .await;
                } else if let Some(op_hash) = result.op_hash {
                    // the oracle signed and injected in one step
                    let latch = self.session.read().await.outcome_latch();
                    self.finish_success(op_hash, result.new_contract, &account, &latch)
                        .await;
                    self.close_modal().await;
                } else {
                    warn!("originate returned neither bytes nor a hash");
                    self.session
                        .write()
                        .await
                        .fail_device(MSG_CREATE_FAILED.to_string());
                }
            }
            Err(error) => {
                warn!(error = %error, "failed to build unsigned operation");
                self.session
                    .write()
                    .await
                    .fail_device(MSG_CREATE_FAILED.to_string());
            }
        }
        Ok(())
    }

    /// User cancel: reports `Cancelled` and closes
    pub async fn cancel(&self) {
        self.emit(Outcome::Cancelled).await;
        self.close_modal().await;
    }

    /// Close the modal: tear down the silent subscription, reset all form
    /// and estimation state, and stop any progress indicator. Idempotent.
    pub async fn close_modal(&self) {
        if let Some(task) = self.silent_task.lock().take() {
            task.abort();
        }
        self.session.write().await.reset();
        self.messaging.stop_progress().await;
    }

    /// Render the requested half of the script for display
    pub async fn script_view(&self, tab: ScriptTab) -> Option<String> {
        let session = self.session.read().await;
        session.script().map(|script| match tab {
            ScriptTab::Code => self.michelson.render(&script.code),
            ScriptTab::Storage => self.michelson.render(&script.storage),
        })
    }

    // --- internals ---

    /// Submit a locally signed origination without blocking the caller. The
    /// payload, lifecycle generation, and outcome latch were captured before
    /// the optimistic close; the completion reports through the outcome
    /// channel and leaves any newer lifecycle untouched.
    fn send_origination_in_background(
        &self,
        keys: KeyMaterial,
        account: SelectedAccount,
        payload: OriginationPayload,
        fee: Mutez,
        detail: OperationDetail,
        generation: u64,
        latch: Arc<AtomicBool>,
    ) {
        let operations = Arc::clone(&self.operations);
        let indexing = Arc::clone(&self.indexing);
        let messaging = Arc::clone(&self.messaging);
        let session = Arc::clone(&self.session);
        let outcome_tx = self.outcome_tx.clone();

        tokio::spawn(async move {
            match operations.originate(&payload, fee, &keys).await {
                Ok(result) => match result.op_hash {
                    Some(op_hash) => {
                        info!(op_hash = %op_hash, "origination applied");
                        indexing
                            .boost(
                                &account.address,
                                BoostMetadata {
                                    kt1: result.new_contract,
                                    op_hash: op_hash.clone(),
                                    origination: detail,
                                },
                            )
                            .await;
                        session
                            .write()
                            .await
                            .finish_submission(generation, SigningPhase::Completed);
                        emit_outcome(&latch, &outcome_tx, Outcome::Applied(op_hash));
                    }
                    None => {
                        warn!("originate completed without an operation hash");
                        messaging.stop_progress().await;
                        emit_outcome(&latch, &outcome_tx, Outcome::BroadcastError);
                    }
                },
                Err(error) => {
                    warn!(error = %error, "origination rejected");
                    messaging.stop_progress().await;
                    messaging.report_error(&error, 0).await;
                    session
                        .write()
                        .await
                        .finish_submission(generation, SigningPhase::BroadcastFailed);
                    emit_outcome(&latch, &outcome_tx, Outcome::BroadcastError);
                }
            }
        });
    }

    /// Request the detached signature over the watermarked bytes
    async fn request_device_signature(
        &self,
        device: &Arc<dyn DeviceSigner>,
        envelope: &OperationEnvelope,
        account: &SelectedAccount,
    ) {
        let path = match account.derivation_path.as_deref() {
            Some(path) if validate::derivation_path(path) => path.to_string(),
            _ => {
                warn!("account has no usable derivation path");
                self.session
                    .write()
                    .await
                    .fail_device(MSG_DEVICE_SIGN_FAILED.to_string());
                return;
            }
        };
        self.messaging.start_progress(MSG_WAIT_DEVICE).await;
        let signature = device.sign(&envelope.watermarked(), &path).await;
        self.messaging.stop_progress().await;

        match signature {
            Ok(signature) => {
                let attached = self.session.write().await.attach_signature(signature);
                if let Err(error) = attached {
                    warn!(error = %error, "device signature rejected");
                    self.session
                        .write()
                        .await
                        .fail_device(MSG_DEVICE_SIGN_FAILED.to_string());
                } else {
                    info!("device signature attached");
                }
            }
            Err(error) => {
                warn!(error = %error, "device signature failed");
                self.session
                    .write()
                    .await
                    .fail_device(MSG_DEVICE_SIGN_FAILED.to_string());
            }
        }
    }

    /// Device submission path, phase two: inject the signed operation. The
    /// modal stays open until the broadcast settles.
    async fn broadcast_signed(
        &self,
        account: &SelectedAccount,
        latch: &Arc<AtomicBool>,
    ) -> WalletResult<()> {
        let signed = {
            let mut session = self.session.write().await;
            match session.signed_bytes() {
                Some(signed) => {
                    session.set_phase(SigningPhase::Broadcasting);
                    signed
                }
                None => {
                    session.set_phase(SigningPhase::SignFailed);
                    return Err(WalletError::NothingToBroadcast);
                }
            }
        };
        self.messaging.start_progress(MSG_BROADCASTING).await;
        let result = self.operations.broadcast(&signed).await;
        self.messaging.stop_progress().await;

        match result {
            Ok(result) => match result.op_hash {
                Some(op_hash) => {
                    self.finish_success(op_hash, result.new_contract, account, latch)
                        .await;
                }
                None => {
                    warn!("broadcast completed without an operation hash");
                    self.session
                        .write()
                        .await
                        .set_phase(SigningPhase::BroadcastFailed);
                    emit_outcome(latch, &self.outcome_tx, Outcome::BroadcastError);
                }
            },
            Err(error) => {
                warn!(error = %error, "broadcast rejected");
                self.messaging.report_error(&error, 0).await;
                self.session
                    .write()
                    .await
                    .set_phase(SigningPhase::BroadcastFailed);
                emit_outcome(latch, &self.outcome_tx, Outcome::BroadcastError);
            }
        }
        self.close_modal().await;
        Ok(())
    }

    /// Common success completion: boost hand-off, then the outcome emission
    async fn finish_success(
        &self,
        op_hash: String,
        new_contract: Option<String>,
        account: &SelectedAccount,
        latch: &Arc<AtomicBool>,
    ) {
        info!(op_hash = %op_hash, "origination applied");
        if let Some(detail) = self.session.read().await.origination_detail() {
            self.indexing
                .boost(
                    &account.address,
                    BoostMetadata {
                        kt1: new_contract,
                        op_hash: op_hash.clone(),
                        origination: detail,
                    },
                )
                .await;
        }
        self.session.write().await.set_phase(SigningPhase::Completed);
        emit_outcome(latch, &self.outcome_tx, Outcome::Applied(op_hash));
    }

    /// One listener per accepted request; it settles against the lifecycle it
    /// was armed for and leaves any later one alone
    fn spawn_silent_listener(
        &self,
        mut rx: broadcast::Receiver<()>,
        generation: u64,
        latch: Arc<AtomicBool>,
    ) {
        let session = Arc::clone(&self.session);
        let messaging = Arc::clone(&self.messaging);
        let outcome_tx = self.outcome_tx.clone();
        let handle = tokio::spawn(async move {
            if rx.recv().await.is_ok() {
                info!("silent acknowledgement received; force-closing");
                emit_outcome(&latch, &outcome_tx, Outcome::Silent);
                {
                    let mut session = session.write().await;
                    if session.generation() == generation {
                        session.reset();
                    }
                }
                messaging.stop_progress().await;
            }
        });
        if let Some(old) = self.silent_task.lock().replace(handle) {
            old.abort();
        }
    }

    async fn emit(&self, outcome: Outcome) {
        let latch = self.session.read().await.outcome_latch();
        emit_outcome(&latch, &self.outcome_tx, outcome);
    }
}

/// Send an outcome through a lifecycle's single-emission latch
fn emit_outcome(latch: &AtomicBool, outcome_tx: &mpsc::UnboundedSender<Outcome>, outcome: Outcome) {
    if !latch.swap(true, Ordering::SeqCst) {
        debug!(?outcome, "reporting outcome");
        let _ = outcome_tx.send(outcome);
    } else {
        debug!(?outcome, "outcome dropped; lifecycle already reported");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::StaticEstimator;
    use crate::micheline::{MichelineExpr, PermissiveMichelson};
    use crate::request::{ContractScript, OperationRequest, KIND_ORIGINATION};
    use crate::session::TransactionParams;
    use crate::signing::{InMemoryOperations, InMemoryWallet};

    fn controller() -> (OriginationController, mpsc::UnboundedReceiver<Outcome>) {
        OriginationController::new(
            Arc::new(InMemoryWallet::software("hunter2", "tz1abc")),
            Arc::new(InMemoryOperations::applying("op-hash", "KT1new")),
            Arc::new(StaticEstimator::returning(TransactionParams::zero())),
            Arc::new(PermissiveMichelson::new()),
            NetworkConstants::default(),
        )
    }

    fn request() -> ExternalRequest {
        ExternalRequest {
            operation_request: OperationRequest {
                operation_details: vec![OperationDetail {
                    kind: KIND_ORIGINATION.to_string(),
                    balance: "1000000".to_string(),
                    script: ContractScript {
                        code: MichelineExpr::Seq(vec![MichelineExpr::prim("parameter")]),
                        storage: MichelineExpr::int(7),
                    },
                    gas_limit: None,
                    storage_limit: None,
                }],
            },
            selected_account: SelectedAccount {
                address: "tz1abc".to_string(),
                pkh: "tz1abc".to_string(),
                pk: "edpk-abc".to_string(),
                derivation_path: None,
            },
        }
    }

    #[tokio::test]
    async fn test_script_view_renders_both_tabs() {
        let (controller, _rx) = controller();
        assert_eq!(controller.script_view(ScriptTab::Code).await, None);

        controller.handle_request(request()).await;
        let code = controller.script_view(ScriptTab::Code).await.unwrap();
        assert!(code.contains("parameter"));
        let storage = controller.script_view(ScriptTab::Storage).await.unwrap();
        assert!(storage.contains("7"));
    }

    #[tokio::test]
    async fn test_device_sign_without_device_errors() {
        let (controller, _rx) = controller();
        controller.handle_request(request()).await;
        while controller.session().read().await.sim_in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        let result = controller.device_sign().await;
        assert!(matches!(result, Err(WalletError::NoDeviceSigner)));
    }

    #[tokio::test]
    async fn test_submission_without_request_errors() {
        let (controller, _rx) = controller();
        let result = controller.inject("hunter2".to_string()).await;
        assert!(matches!(result, Err(WalletError::NoActiveRequest)));
    }
}
