//! Form session state
//!
//! A single mutable value owns everything the modal edits: the estimated
//! transaction parameters, user overrides, the simulation counter, and the
//! inline error slots. All transitions go through named operations so the
//! submission-gating invariant stays auditable in one place.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{WalletError, WalletResult};
use crate::request::{ContractScript, ExternalRequest, OperationDetail, SelectedAccount};
use crate::signing::{OperationEnvelope, SigningPhase};
use crate::units::Mutez;
use crate::validate;

/// Inline message shown for an invalid gas override
pub const MSG_INVALID_GAS: &str = "Invalid gas limit";
/// Inline message shown for an invalid storage override
pub const MSG_INVALID_STORAGE: &str = "Invalid storage limit";
/// Inline message shown for an invalid fee override
pub const MSG_INVALID_FEE: &str = "Invalid fee";
/// Sentinel armed for hardware wallets when the modal opens
pub const DEVICE_CONFIRM_PENDING: &str = "?";

/// Network-wide constants consumed by the cost calculator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkConstants {
    /// Burn cost per storage byte, in micro-units
    pub cost_per_byte: Mutez,
}

impl Default for NetworkConstants {
    fn default() -> Self {
        NetworkConstants {
            cost_per_byte: Mutez::new(250),
        }
    }
}

/// The zero default or the last successful simulation result
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionParams {
    pub gas: u64,
    pub storage: u64,
    pub fee: Mutez,
    pub burn: Mutez,
}

impl TransactionParams {
    /// The all-zero default used before any estimation succeeds
    pub fn zero() -> Self {
        Self::default()
    }
}

/// The assembled origination operation: an owned snapshot sharing nothing
/// with live form state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginationPayload {
    /// Initial balance as a decimal tez string
    pub balance: String,
    pub script: ContractScript,
    pub gas_limit: u64,
    pub storage_limit: u64,
}

/// Mutable state of one origination modal session
#[derive(Debug, Default)]
pub struct FormSessionState {
    constants: NetworkConstants,

    request: Option<ExternalRequest>,
    balance: String,
    script: Option<ContractScript>,

    params: TransactionParams,
    custom_fee: String,
    custom_gas: String,
    custom_storage: String,

    form_invalid: String,
    sim_error: String,
    pwd_invalid: String,
    device_error: String,

    sim_semaphore: u32,
    phase: SigningPhase,
    open: bool,
    envelope: Option<OperationEnvelope>,
    generation: u64,
    outcome_latch: Arc<AtomicBool>,
}

impl FormSessionState {
    /// Fresh session for the given network constants
    pub fn new(constants: NetworkConstants) -> Self {
        FormSessionState {
            constants,
            ..Default::default()
        }
    }

    /// Begin a new request lifecycle: full reset, then store the request.
    /// Bumps the lifecycle generation and arms a fresh outcome latch; the
    /// previous lifecycle keeps its own latch for late completions.
    pub fn intake(&mut self, request: ExternalRequest) {
        self.reset();
        self.generation = self.generation.wrapping_add(1);
        self.outcome_latch = Arc::new(AtomicBool::new(false));
        self.request = Some(request);
    }

    /// Reset every mutable field to its zero value. Idempotent. The outcome
    /// latch and generation survive so a late completion cannot double-report
    /// a lifecycle.
    pub fn reset(&mut self) {
        self.request = None;
        self.balance.clear();
        self.script = None;
        self.params = TransactionParams::zero();
        self.custom_fee.clear();
        self.custom_gas.clear();
        self.custom_storage.clear();
        self.form_invalid.clear();
        self.sim_error.clear();
        self.pwd_invalid.clear();
        self.device_error.clear();
        self.sim_semaphore = 0;
        self.phase = SigningPhase::Idle;
        self.open = false;
        self.envelope = None;
    }

    /// Seed the display balance and script from a validated request
    pub fn seed(&mut self, balance: String, script: ContractScript) {
        self.balance = balance;
        self.script = Some(script);
    }

    /// Mark the modal open
    pub fn mark_open(&mut self) {
        self.open = true;
    }

    /// Arm the device-confirmation sentinel for hardware wallets
    pub fn arm_device_notice(&mut self) {
        self.device_error = DEVICE_CONFIRM_PENDING.to_string();
    }

    // --- estimation counter ---

    /// Count an estimation going out. Must happen before the oracle call is
    /// issued; submission is blocked until the matching completion lands.
    pub fn begin_estimation(&mut self) {
        self.sim_semaphore += 1;
    }

    /// Apply an estimation completion. Success replaces the parameters
    /// wholesale; failure stores the error as the outstanding form error.
    /// The counter comes down on every path; completions that arrive after a
    /// reset are absorbed without effect.
    pub fn finish_estimation(&mut self, result: Result<TransactionParams, String>) {
        if self.request.is_some() {
            match result {
                Ok(params) => self.params = params,
                Err(error) => {
                    self.sim_error = error.clone();
                    self.form_invalid = error;
                }
            }
        } else {
            debug!("estimation completed after session reset; ignoring");
        }
        self.sim_semaphore = self.sim_semaphore.saturating_sub(1);
    }

    /// Outstanding estimation calls
    pub fn sim_in_flight(&self) -> u32 {
        self.sim_semaphore
    }

    // --- overrides ---

    pub fn set_custom_fee(&mut self, value: &str) {
        self.custom_fee = value.to_string();
    }

    pub fn set_custom_gas(&mut self, value: &str) {
        self.custom_gas = value.to_string();
    }

    pub fn set_custom_storage(&mut self, value: &str) {
        self.custom_storage = value.to_string();
    }

    // --- submission gate ---

    /// Check the submission invariant: no estimation in flight, no outstanding
    /// form error, and every override individually valid. Sets the inline
    /// form error for the first failing override.
    pub fn validate_for_submission(&mut self) -> bool {
        self.phase = SigningPhase::Validating;
        self.form_invalid = self.sim_error.clone();
        if self.sim_semaphore > 0 {
            return false;
        }
        if !self.form_invalid.is_empty() {
            return false;
        }
        if !validate::gas(&self.custom_gas) {
            self.form_invalid = MSG_INVALID_GAS.to_string();
            return false;
        }
        if !validate::storage(&self.custom_storage) {
            self.form_invalid = MSG_INVALID_STORAGE.to_string();
            return false;
        }
        if !validate::fee(&self.custom_fee) {
            self.form_invalid = MSG_INVALID_FEE.to_string();
            return false;
        }
        true
    }

    // --- cost calculator ---

    /// Effective fee: a valid nonzero custom fee wins over the estimate
    pub fn total_fee(&self) -> Mutez {
        if !self.custom_fee.is_empty() {
            if let Ok(fee) = Mutez::from_tez_str(&self.custom_fee) {
                if !fee.is_zero() {
                    return fee;
                }
            }
        }
        self.params.fee
    }

    /// Effective burn: a valid nonzero custom storage limit is charged at the
    /// network's per-byte rate, otherwise the estimated burn stands
    pub fn total_burn(&self) -> Mutez {
        if !self.custom_storage.is_empty() {
            if let Ok(bytes) = self.custom_storage.parse::<u64>() {
                if bytes > 0 {
                    return self.constants.cost_per_byte.saturating_mul(bytes);
                }
            }
        }
        self.params.burn
    }

    /// Total cost of the operation in micro-units
    pub fn total_cost(&self) -> Mutez {
        self.total_fee().saturating_add(self.total_burn())
    }

    /// Total cost for display: micro-units, with an exact zero rendered as
    /// a placeholder dash
    pub fn total_cost_display(&self) -> String {
        let total = self.total_cost();
        if total.is_zero() {
            "-".to_string()
        } else {
            total.to_string()
        }
    }

    /// Burn amount for display: empty when the burn is exactly zero
    pub fn burn_display(&self) -> String {
        let burn = self.total_burn();
        if burn.is_zero() {
            String::new()
        } else {
            format!("{} tez", burn.to_tez_string())
        }
    }

    // --- builder ---

    /// Assemble the origination payload from current form state. Custom
    /// limits win over estimated ones; the script is deep-copied so the
    /// payload shares nothing with the live session.
    pub fn build_origination(&self) -> WalletResult<OriginationPayload> {
        let script = self
            .script
            .as_ref()
            .cloned()
            .ok_or(WalletError::NoActiveRequest)?;
        let gas_limit = self
            .custom_gas
            .parse::<u64>()
            .unwrap_or(self.params.gas);
        let storage_limit = self
            .custom_storage
            .parse::<u64>()
            .unwrap_or(self.params.storage);
        Ok(OriginationPayload {
            balance: self.balance.clone(),
            script,
            gas_limit,
            storage_limit,
        })
    }

    // --- signing bookkeeping ---

    pub fn phase(&self) -> SigningPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SigningPhase) {
        self.phase = phase;
    }

    /// Record a local-key credential failure with a path-specific message
    pub fn fail_credentials(&mut self, message: String) {
        self.pwd_invalid = message;
        self.phase = SigningPhase::SignFailed;
    }

    /// Record a device failure with a device-specific message
    pub fn fail_device(&mut self, message: String) {
        self.device_error = message;
        self.phase = SigningPhase::SignFailed;
    }

    /// Clear the credential error after a successful unlock
    pub fn clear_credential_errors(&mut self) {
        self.pwd_invalid.clear();
    }

    /// Apply a submission completion's terminal phase. Completions that land
    /// after a reset or against a later lifecycle are absorbed without effect.
    pub fn finish_submission(&mut self, generation: u64, phase: SigningPhase) {
        if self.generation == generation && self.request.is_some() {
            self.phase = phase;
        } else {
            debug!("submission completed after session reset; ignoring");
        }
    }

    /// Store the envelope returned for a detached signer
    pub fn store_envelope(&mut self, envelope: OperationEnvelope) {
        if self.request.is_some() {
            self.envelope = Some(envelope);
        } else {
            debug!("operation envelope arrived after session reset; ignoring");
        }
    }

    /// Attach a device signature to the stored envelope
    pub fn attach_signature(&mut self, signature: String) -> WalletResult<()> {
        let envelope = self
            .envelope
            .as_mut()
            .ok_or(WalletError::NothingToBroadcast)?;
        envelope.attach_signature(signature)?;
        self.device_error.clear();
        self.phase = SigningPhase::Signed;
        Ok(())
    }

    /// The broadcastable blob, once a signature is attached
    pub fn signed_bytes(&self) -> Option<String> {
        self.envelope.as_ref().and_then(|e| e.signed_bytes())
    }

    // --- outcome latch ---

    /// Identity of the current request lifecycle; bumped on every intake
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The current lifecycle's single-emission latch. Spawned completions
    /// capture it up front so a late emission settles against its own
    /// lifecycle rather than whichever one is current.
    pub fn outcome_latch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.outcome_latch)
    }

    /// Claim the single outcome emission for the current lifecycle. Returns
    /// false if an outcome was already reported.
    pub fn try_mark_outcome_sent(&self) -> bool {
        !self.outcome_latch.swap(true, Ordering::SeqCst)
    }

    // --- accessors ---

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn balance(&self) -> &str {
        &self.balance
    }

    pub fn script(&self) -> Option<&ContractScript> {
        self.script.as_ref()
    }

    pub fn params(&self) -> TransactionParams {
        self.params
    }

    pub fn custom_fee(&self) -> &str {
        &self.custom_fee
    }

    pub fn custom_gas(&self) -> &str {
        &self.custom_gas
    }

    pub fn custom_storage(&self) -> &str {
        &self.custom_storage
    }

    pub fn form_invalid(&self) -> &str {
        &self.form_invalid
    }

    pub fn sim_error(&self) -> &str {
        &self.sim_error
    }

    pub fn pwd_invalid(&self) -> &str {
        &self.pwd_invalid
    }

    pub fn device_error(&self) -> &str {
        &self.device_error
    }

    pub fn envelope(&self) -> Option<&OperationEnvelope> {
        self.envelope.as_ref()
    }

    pub fn account(&self) -> Option<SelectedAccount> {
        self.request.as_ref().map(|r| r.selected_account.clone())
    }

    pub fn origination_detail(&self) -> Option<OperationDetail> {
        self.request.as_ref().and_then(|r| r.origination().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micheline::MichelineExpr;
    use crate::request::{OperationRequest, KIND_ORIGINATION};

    fn script() -> ContractScript {
        ContractScript {
            code: MichelineExpr::Seq(Vec::new()),
            storage: MichelineExpr::prim("Unit"),
        }
    }

    fn request() -> ExternalRequest {
        ExternalRequest {
            operation_request: OperationRequest {
                operation_details: vec![OperationDetail {
                    kind: KIND_ORIGINATION.to_string(),
                    balance: "1000000".to_string(),
                    script: script(),
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

    fn seeded() -> FormSessionState {
        let mut s = FormSessionState::new(NetworkConstants::default());
        s.intake(request());
        s.seed("1".to_string(), script());
        s.mark_open();
        s
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut s = seeded();
        s.set_custom_fee("0.5");
        s.begin_estimation();
        s.reset();
        let once = format!("{:?}", s);
        s.reset();
        assert_eq!(once, format!("{:?}", s));
        assert_eq!(s.sim_in_flight(), 0);
        assert!(!s.is_open());
    }

    #[test]
    fn test_estimation_replaces_params_wholesale() {
        let mut s = seeded();
        s.begin_estimation();
        s.finish_estimation(Ok(TransactionParams {
            gas: 1000,
            storage: 500,
            fee: Mutez::new(1420),
            burn: Mutez::ZERO,
        }));
        assert_eq!(s.sim_in_flight(), 0);
        assert_eq!(s.params().gas, 1000);
        assert_eq!(s.total_fee(), Mutez::new(1420));
    }

    #[test]
    fn test_estimation_failure_blocks_submission() {
        let mut s = seeded();
        s.begin_estimation();
        s.finish_estimation(Err("simulation failed".to_string()));
        assert_eq!(s.sim_in_flight(), 0);
        assert!(!s.validate_for_submission());
        assert_eq!(s.form_invalid(), "simulation failed");
    }

    #[test]
    fn test_stale_estimation_after_reset_is_ignored() {
        let mut s = seeded();
        s.begin_estimation();
        s.reset();
        s.finish_estimation(Ok(TransactionParams {
            gas: 9,
            storage: 9,
            fee: Mutez::new(9),
            burn: Mutez::new(9),
        }));
        assert_eq!(s.params(), TransactionParams::zero());
        assert_eq!(s.sim_in_flight(), 0);
    }

    #[test]
    fn test_submission_gate_on_overrides() {
        let mut s = seeded();
        s.set_custom_gas("3.5");
        assert!(!s.validate_for_submission());
        assert_eq!(s.form_invalid(), MSG_INVALID_GAS);

        s.set_custom_gas("3000");
        s.set_custom_storage("-1");
        assert!(!s.validate_for_submission());
        assert_eq!(s.form_invalid(), MSG_INVALID_STORAGE);

        s.set_custom_storage("");
        s.set_custom_fee("0.0000001");
        assert!(!s.validate_for_submission());
        assert_eq!(s.form_invalid(), MSG_INVALID_FEE);

        s.set_custom_fee("0.01");
        assert!(s.validate_for_submission());
    }

    #[test]
    fn test_submission_blocked_while_estimating() {
        let mut s = seeded();
        s.begin_estimation();
        assert!(!s.validate_for_submission());
        s.finish_estimation(Ok(TransactionParams::zero()));
        assert!(s.validate_for_submission());
    }

    #[test]
    fn test_cost_calculator_prefers_valid_overrides() {
        let mut s = seeded();
        s.finish_estimation(Ok(TransactionParams {
            gas: 1000,
            storage: 500,
            fee: Mutez::new(1420),
            burn: Mutez::new(125_000),
        }));

        // no overrides: estimates win
        assert_eq!(s.total_fee(), Mutez::new(1420));
        assert_eq!(s.total_burn(), Mutez::new(125_000));

        // custom fee in tez
        s.set_custom_fee("0.002");
        assert_eq!(s.total_fee(), Mutez::new(2000));

        // zero or invalid custom fee falls back to the estimate
        s.set_custom_fee("0");
        assert_eq!(s.total_fee(), Mutez::new(1420));
        s.set_custom_fee("abc");
        assert_eq!(s.total_fee(), Mutez::new(1420));

        // custom storage is charged per byte
        s.set_custom_storage("100");
        assert_eq!(s.total_burn(), Mutez::new(25_000));
    }

    #[test]
    fn test_display_forms() {
        let mut s = seeded();
        assert_eq!(s.total_cost_display(), "-");
        assert_eq!(s.burn_display(), "");

        s.finish_estimation(Ok(TransactionParams {
            gas: 1000,
            storage: 500,
            fee: Mutez::new(1420),
            burn: Mutez::ZERO,
        }));
        assert_eq!(s.total_cost_display(), "1420");
        assert_eq!(s.burn_display(), "");

        s.set_custom_storage("100");
        assert_eq!(s.burn_display(), "0.025 tez");
    }

    #[test]
    fn test_builder_snapshot_does_not_alias_form_state() {
        let mut s = seeded();
        s.finish_estimation(Ok(TransactionParams {
            gas: 1000,
            storage: 500,
            fee: Mutez::new(1420),
            burn: Mutez::ZERO,
        }));
        let payload = s.build_origination().unwrap();
        assert_eq!(payload.balance, "1");
        assert_eq!(payload.gas_limit, 1000);
        assert_eq!(payload.storage_limit, 500);

        // later mutation must not affect the snapshot
        s.set_custom_gas("7777");
        s.reset();
        assert_eq!(payload.gas_limit, 1000);
        assert_eq!(payload.script, script());
    }

    #[test]
    fn test_builder_prefers_custom_limits() {
        let mut s = seeded();
        s.finish_estimation(Ok(TransactionParams {
            gas: 1000,
            storage: 500,
            fee: Mutez::new(1420),
            burn: Mutez::ZERO,
        }));
        s.set_custom_gas("2500");
        s.set_custom_storage("900");
        let payload = s.build_origination().unwrap();
        assert_eq!(payload.gas_limit, 2500);
        assert_eq!(payload.storage_limit, 900);
    }

    #[test]
    fn test_outcome_latch_single_emission() {
        let mut s = seeded();
        assert!(s.try_mark_outcome_sent());
        assert!(!s.try_mark_outcome_sent());
        // a new lifecycle re-arms the latch
        s.intake(request());
        assert!(s.try_mark_outcome_sent());
    }

    #[test]
    fn test_latch_is_independent_per_lifecycle() {
        let mut s = seeded();
        let first_gen = s.generation();
        let first_latch = s.outcome_latch();
        s.intake(request());
        assert_ne!(s.generation(), first_gen);

        // the newer lifecycle claiming its latch leaves the older one open
        assert!(s.try_mark_outcome_sent());
        assert!(!first_latch.swap(true, Ordering::SeqCst));
        assert!(first_latch.swap(true, Ordering::SeqCst));
    }

    #[test]
    fn test_stale_submission_completion_is_ignored() {
        let mut s = seeded();
        let gen = s.generation();
        s.reset();
        s.finish_submission(gen, SigningPhase::Completed);
        assert_eq!(s.phase(), SigningPhase::Idle);

        let mut s = seeded();
        let old_gen = s.generation();
        s.intake(request());
        s.finish_submission(old_gen, SigningPhase::Completed);
        assert_ne!(s.phase(), SigningPhase::Completed);

        s.finish_submission(s.generation(), SigningPhase::Completed);
        assert_eq!(s.phase(), SigningPhase::Completed);
    }
}
