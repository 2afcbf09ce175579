use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Parameters that apply to a single contract at a given block height (spec
/// §4.2-§4.5, §5). Looked up per-height through
/// [`crate::height_indexed::HeightIndexedConfig`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_contract_config"))]
pub struct ContractConfig {
    /// Delay after which, absent a successful quorum, an
    /// `UnsuccessfulEndBatchOpinion` is synthesized (spec §4.3).
    pub unsuccessful_approval_delay_ms: u64,
    /// Delay after a successful quorum before the multisig transaction is
    /// handed to the blockchain client (spec §4.3).
    pub successful_execution_delay_ms: u64,
    /// Delay after an unsuccessful quorum before the multisig transaction is
    /// handed to the blockchain client (spec §4.3).
    pub unsuccessful_execution_delay_ms: u64,
    /// Interval at which opinions are re-broadcast to all peers (spec §4.3
    /// "shareOpinionTimer").
    pub share_opinion_timeout_ms: u64,
    /// Backoff before retrying a `service_unavailable` operation (autorun
    /// probe, synchronize retry, init poll; spec §4.2, §4.5).
    pub service_unavailable_timeout_ms: u64,
    /// Maximum concurrent internet connections per call (spec §5).
    pub max_internet_connections: u32,
    /// Byte buffer size per internet connection (spec §5).
    pub internet_buffer_size: u32,
    /// Internet connection timeout (spec §5).
    pub internet_connection_timeout_ms: u64,
    /// Revocation-check effort cap per internet connection (spec §5 "per
    /// call ... revocation check effort cap"; see `SPEC_FULL.md` §2).
    pub revocation_check_budget: u32,
    /// Caps `PoExAccumulator::history` (spec §3, §4.1, §5
    /// "maxBatchesHistorySize").
    pub max_batches_history_size: usize,
    /// File/function run for the autorun probe (spec §4.2).
    pub autorun_file: String,
    pub autorun_function: String,
    /// Gas limit for the autorun probe call (spec §4.2).
    pub autorun_gas_limit: u64,
    /// `gas / multiplier = actualPayment`, capped at the declared payment
    /// (spec §4.3).
    pub payment_multiplier: u64,
    /// The storage modification ID a freshly-deployed contract's storage
    /// must reach before Init completes (spec §4.5 "Init Task").
    pub contract_deployment_base_modification_id: u64,
}

impl ContractConfig {
    pub fn unsuccessful_approval_delay(&self) -> Duration {
        Duration::from_millis(self.unsuccessful_approval_delay_ms)
    }

    pub fn successful_execution_delay(&self) -> Duration {
        Duration::from_millis(self.successful_execution_delay_ms)
    }

    pub fn unsuccessful_execution_delay(&self) -> Duration {
        Duration::from_millis(self.unsuccessful_execution_delay_ms)
    }

    pub fn share_opinion_timeout(&self) -> Duration {
        Duration::from_millis(self.share_opinion_timeout_ms)
    }

    pub fn service_unavailable_timeout(&self) -> Duration {
        Duration::from_millis(self.service_unavailable_timeout_ms)
    }

    pub fn internet_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.internet_connection_timeout_ms)
    }

    /// A lightweight analogue of `apollo_config`'s `SerializeConfig::dump`,
    /// scoped to documentation: field name -> human-readable description.
    /// We do not vendor the full dump-to-file/CLI-merge machinery since it
    /// plays no behavioral role in the coordinator itself (see
    /// `DESIGN.md`).
    pub fn describe() -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from_iter([
            (
                "unsuccessful_approval_delay_ms",
                "Delay before synthesizing an UnsuccessfulEndBatchOpinion.",
            ),
            ("successful_execution_delay_ms", "Delay before emitting a successful multisig tx."),
            (
                "unsuccessful_execution_delay_ms",
                "Delay before emitting an unsuccessful multisig tx.",
            ),
            ("share_opinion_timeout_ms", "Interval between opinion re-broadcasts."),
            ("service_unavailable_timeout_ms", "Backoff before retrying after service_unavailable."),
            ("max_internet_connections", "Cap on concurrent internet connections per call."),
            ("internet_buffer_size", "Byte buffer size per internet connection."),
            ("internet_connection_timeout_ms", "Internet connection timeout."),
            ("revocation_check_budget", "Effort cap for a single revocation check."),
            ("max_batches_history_size", "Cap on PoExAccumulator::history entries."),
            ("autorun_file", "WASM file the autorun probe runs."),
            ("autorun_function", "Function the autorun probe runs."),
            ("autorun_gas_limit", "Gas limit for the autorun probe."),
            ("payment_multiplier", "Divides consumed gas into an actual payment amount."),
            (
                "contract_deployment_base_modification_id",
                "Modification ID a fresh contract's storage must reach before Init completes.",
            ),
        ])
    }
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            unsuccessful_approval_delay_ms: 30_000,
            successful_execution_delay_ms: 5_000,
            unsuccessful_execution_delay_ms: 5_000,
            share_opinion_timeout_ms: 10_000,
            service_unavailable_timeout_ms: 2_000,
            max_internet_connections: 8,
            internet_buffer_size: 1 << 20,
            internet_connection_timeout_ms: 10_000,
            revocation_check_budget: 32,
            max_batches_history_size: 10_000,
            autorun_file: "main.wasm".to_string(),
            autorun_function: "autorun".to_string(),
            autorun_gas_limit: 1_000_000,
            payment_multiplier: 1,
            contract_deployment_base_modification_id: 0,
        }
    }
}

fn validate_contract_config(config: &ContractConfig) -> Result<(), ValidationError> {
    if config.max_internet_connections == 0 {
        return Err(ValidationError::new("max_internet_connections must be nonzero"));
    }
    if config.payment_multiplier == 0 {
        return Err(ValidationError::new("payment_multiplier must be nonzero"));
    }
    if config.max_batches_history_size == 0 {
        return Err(ValidationError::new("max_batches_history_size must be nonzero"));
    }
    Ok(())
}

#[cfg(test)]
mod config_test {
    use super::*;

    #[test]
    fn default_config_validates() {
        ContractConfig::default().validate().expect("default config must be valid");
    }

    #[test]
    fn zero_multiplier_is_rejected() {
        let mut config = ContractConfig::default();
        config.payment_multiplier = 0;
        assert!(config.validate().is_err());
    }
}
