//! External request intake
//!
//! An origination request arrives from an external caller (e.g. a connected
//! dApp bridge) together with the account it should be signed for. The request
//! is immutable once validated.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::micheline::{MichelineExpr, MichelsonOracle};
use crate::validate;

/// Operation kind accepted by this pipeline
pub const KIND_ORIGINATION: &str = "origination";

/// Contract code and initial storage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractScript {
    pub code: MichelineExpr,
    pub storage: MichelineExpr,
}

/// One operation entry of an external request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationDetail {
    pub kind: String,
    /// Initial balance in integer micro-units
    pub balance: String,
    pub script: ContractScript,
    /// Caller-recommended gas ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Caller-recommended storage ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_limit: Option<u64>,
}

impl OperationDetail {
    /// Caller-supplied gas/storage ceilings; a zero ceiling counts as absent
    pub fn recommendations(&self) -> Recommendations {
        Recommendations {
            gas: self.gas_limit.filter(|v| *v != 0),
            storage: self.storage_limit.filter(|v| *v != 0),
        }
    }
}

/// Gas/storage ceilings merged into the simulation request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendations {
    pub gas: Option<u64>,
    pub storage: Option<u64>,
}

/// The operation list of an external request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation_details: Vec<OperationDetail>,
}

/// The account the request should be signed for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedAccount {
    pub address: String,
    pub pkh: String,
    pub pk: String,
    /// Signing path for hardware accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation_path: Option<String>,
}

/// A complete external origination request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalRequest {
    pub operation_request: OperationRequest,
    pub selected_account: SelectedAccount,
}

impl ExternalRequest {
    /// The single origination entry, if the request has the expected shape:
    /// exactly one operation of kind `"origination"`
    pub fn origination(&self) -> Option<&OperationDetail> {
        match self.operation_request.operation_details.as_slice() {
            [detail] if detail.kind == KIND_ORIGINATION => Some(detail),
            _ => None,
        }
    }
}

/// Gate an origination entry: the balance must be a whole micro-unit amount
/// and both script halves must pass the Michelson oracle. Any failure
/// invalidates the whole request.
pub fn is_valid_origination(detail: &OperationDetail, oracle: &dyn MichelsonOracle) -> bool {
    if detail.balance.is_empty() || !validate::amount(&detail.balance, 0) {
        warn!(balance = %detail.balance, "invalid origination balance");
        return false;
    }
    if let Err(e) = oracle.assert_contract(&detail.script.code) {
        warn!(error = %e, "invalid contract code");
        return false;
    }
    if let Err(e) = oracle.assert_data(&detail.script.storage) {
        warn!(error = %e, "invalid initial storage");
        return false;
    }
    true
}
