//! Fee estimation
//!
//! Default gas/storage/fee/burn recommendations come from an external
//! simulation oracle. Every outstanding call is counted in the session so
//! submission stays blocked while a simulation is in flight.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::request::{Recommendations, SelectedAccount};
use crate::session::{FormSessionState, OriginationPayload, TransactionParams};

/// The origination draft sent to the simulation oracle: the assembled payload
/// plus any caller-supplied ceilings merged in
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginationDraft {
    pub balance: String,
    pub script: crate::request::ContractScript,
    pub gas_limit: u64,
    pub storage_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_recommendation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_recommendation: Option<u64>,
}

impl OriginationDraft {
    /// Merge caller recommendations into a payload snapshot
    pub fn new(payload: OriginationPayload, recommendations: Recommendations) -> Self {
        OriginationDraft {
            balance: payload.balance,
            script: payload.script,
            gas_limit: payload.gas_limit,
            storage_limit: payload.storage_limit,
            gas_recommendation: recommendations.gas,
            storage_recommendation: recommendations.storage,
        }
    }
}

/// External simulation oracle
#[async_trait]
pub trait EstimationOracle: Send + Sync {
    /// Warm network identity data for the account. Best-effort: estimation
    /// proceeds even if preloading fails.
    async fn preload(&self, pkh: &str, pk: &str) -> Result<(), String>;

    /// Simulate the origination and recommend transaction parameters
    async fn estimate_origination(
        &self,
        draft: &OriginationDraft,
        pkh: &str,
    ) -> Result<TransactionParams, String>;
}

/// Drives the counter-guarded estimation flow against the shared session
pub struct FeeEstimator {
    oracle: Arc<dyn EstimationOracle>,
    session: Arc<RwLock<FormSessionState>>,
}

impl FeeEstimator {
    pub fn new(oracle: Arc<dyn EstimationOracle>, session: Arc<RwLock<FormSessionState>>) -> Self {
        FeeEstimator { oracle, session }
    }

    /// Issue an estimation. The in-flight counter is raised before the oracle
    /// call goes out and lowered in the completion path regardless of the
    /// result; the returned handle completes when the session is updated.
    pub async fn estimate(
        &self,
        draft: OriginationDraft,
        account: SelectedAccount,
    ) -> JoinHandle<()> {
        self.session.write().await.begin_estimation();
        let oracle = Arc::clone(&self.oracle);
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Err(error) = oracle.preload(&account.pkh, &account.pk).await {
                warn!(error = %error, "identity preload failed; estimating anyway");
            }
            let result = oracle.estimate_origination(&draft, &account.pkh).await;
            match &result {
                Ok(params) => debug!(?params, "estimation succeeded"),
                Err(error) => warn!(error = %error, "estimation failed"),
            }
            session.write().await.finish_estimation(result);
        })
    }
}

/// In-memory estimation oracle for tests; records every draft it receives
pub struct StaticEstimator {
    result: Mutex<Result<TransactionParams, String>>,
    drafts: Mutex<Vec<OriginationDraft>>,
    delay: Option<Duration>,
}

impl StaticEstimator {
    /// Oracle that always returns the given parameters
    pub fn returning(params: TransactionParams) -> Self {
        StaticEstimator {
            result: Mutex::new(Ok(params)),
            drafts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Oracle that always fails with the given message
    pub fn failing(message: &str) -> Self {
        StaticEstimator {
            result: Mutex::new(Err(message.to_string())),
            drafts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Delay completions, to keep the counter raised in tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Swap the configured result
    pub fn set_result(&self, result: Result<TransactionParams, String>) {
        *self.result.lock() = result;
    }

    /// Drafts received so far
    pub fn drafts(&self) -> Vec<OriginationDraft> {
        self.drafts.lock().clone()
    }
}

#[async_trait]
impl EstimationOracle for StaticEstimator {
    async fn preload(&self, _pkh: &str, _pk: &str) -> Result<(), String> {
        Ok(())
    }

    async fn estimate_origination(
        &self,
        draft: &OriginationDraft,
        _pkh: &str,
    ) -> Result<TransactionParams, String> {
        self.drafts.lock().push(draft.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.lock().clone()
    }
}
