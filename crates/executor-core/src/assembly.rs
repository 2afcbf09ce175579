//! Batch Assembly (spec §4.2): groups manual/automatic call requests into
//! ordered batches keyed by block height.

use std::collections::BTreeMap;

use executor_types::{Batch, BatchInvariantError, CallId, CallLevel, CallRequest, ContractKey, DraftBatch, DraftBatchStatus};
use tracing::debug;

/// What the caller must do after [`BatchAssembly::add_block`]: either
/// nothing, or dispatch the autorun probe call to the VM and report back
/// through [`BatchAssembly::resolve_autorun_probe`] (spec §4.2 "addBlock").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddBlockOutcome {
    NoProbeNeeded,
    ProbeNeeded(CallRequest),
}

/// The result the autorun probe produced, as reported back to Assembly
/// (spec §4.2: "The probe's return value (success ∧ return==0) decides
/// whether an AUTOMATIC call is appended").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutorunProbeResult {
    pub success: bool,
    pub return_code: i32,
}

impl AutorunProbeResult {
    fn joins_batch(self) -> bool {
        self.success && self.return_code == 0
    }
}

/// Groups manual/automatic call requests into ordered, block-height-keyed
/// drafts, and hands finished drafts out as [`Batch`]es with monotonically
/// assigned indices (spec §4.2).
pub struct BatchAssembly {
    contract_key: ContractKey,
    drafts: BTreeMap<u64, DraftBatch>,
    delayed_batch: Option<Batch>,
    next_batch_index: u64,
    /// Heights `< fixed_below` are immutable (spec §4.2 "fixUnmodifiable").
    fixed_below: u64,
    automatic_executions_enabled_since: Option<u64>,
}

impl BatchAssembly {
    pub fn new(contract_key: ContractKey, initial_batch_index: u64) -> Self {
        Self {
            contract_key,
            drafts: BTreeMap::new(),
            delayed_batch: None,
            next_batch_index: initial_batch_index,
            fixed_below: 0,
            automatic_executions_enabled_since: None,
        }
    }

    pub fn next_batch_index(&self) -> u64 {
        self.next_batch_index
    }

    fn automatic_enabled_at(&self, height: u64) -> bool {
        self.automatic_executions_enabled_since.is_some_and(|since| height >= since)
    }

    fn is_fixed(&self, height: u64) -> bool {
        height < self.fixed_below
    }

    /// `addManualCall(request)` (spec §4.2).
    pub fn add_manual_call(&mut self, request: CallRequest) {
        debug_assert_eq!(request.level, CallLevel::Manual);
        let height = request.block_height;
        let draft = self.drafts.entry(height).or_insert_with(|| DraftBatch::new(height));
        draft.calls.push(request);
    }

    /// `addBlock(height)` (spec §4.2).
    pub fn add_block(
        &mut self,
        height: u64,
        autorun_file: &str,
        autorun_function: &str,
        autorun_gas_limit: u64,
    ) -> AddBlockOutcome {
        if !self.automatic_enabled_at(height) {
            if let Some(draft) = self.drafts.get_mut(&height) {
                if draft.status == DraftBatchStatus::AcceptingManual {
                    draft.status = DraftBatchStatus::Finished;
                }
            }
            return AddBlockOutcome::NoProbeNeeded;
        }

        let draft = self.drafts.entry(height).or_insert_with(|| DraftBatch::new(height));
        draft.status = DraftBatchStatus::AwaitingAutorun;
        let probe_call_id = autorun_probe_call_id(self.contract_key, height);
        let probe = CallRequest::autorun_probe(
            self.contract_key,
            height,
            autorun_file.to_string(),
            autorun_function.to_string(),
            autorun_gas_limit,
            probe_call_id,
        );
        AddBlockOutcome::ProbeNeeded(probe)
    }

    /// Completes the draft at `height` once the autorun probe's result is
    /// known (spec §4.2). If the draft ends up with no calls at all it is
    /// dropped entirely (spec §8 scenario S4).
    pub fn resolve_autorun_probe(
        &mut self,
        height: u64,
        probe_result: AutorunProbeResult,
        automatic_call: CallRequest,
    ) {
        let Some(draft) = self.drafts.get_mut(&height) else { return };
        if probe_result.joins_batch() {
            draft.calls.push(automatic_call);
        }
        draft.status = DraftBatchStatus::Finished;
        if draft.calls.is_empty() {
            self.drafts.remove(&height);
        }
    }

    /// `fixUnmodifiable(nextBlockHeight)` (spec §4.2).
    pub fn fix_unmodifiable(&mut self, next_block_height: u64) {
        self.fixed_below = self.fixed_below.max(next_block_height);
    }

    /// `setAutomaticExecutionsEnabledSince(optHeight)` (spec §4.2).
    pub fn set_automatic_executions_enabled_since(&mut self, since: Option<u64>) {
        self.automatic_executions_enabled_since = since;
        for (height, draft) in self.drafts.iter_mut() {
            if *height < self.fixed_below {
                continue;
            }
            let should_have_tail = since.is_some_and(|since| *height >= since);
            if !should_have_tail && draft.has_automatic_tail() {
                draft.calls.pop();
            }
        }
        if let Some(delayed) = &mut self.delayed_batch {
            let height = delayed.block_height_upper_bound;
            let should_have_tail = since.is_some_and(|since| height >= since) || height < self.fixed_below;
            if !should_have_tail && delayed.has_automatic_tail() {
                delayed.drop_automatic_tail();
                if delayed.is_empty() {
                    self.next_batch_index = self.next_batch_index.saturating_sub(1);
                    self.delayed_batch = None;
                }
            }
        }
    }

    /// `hasNextBatch()` (spec §4.2).
    pub fn has_next_batch(&self) -> bool {
        if self.delayed_batch.is_some() {
            return true;
        }
        self.drafts.values().next().is_some_and(|d| d.status == DraftBatchStatus::Finished)
    }

    /// `nextBatch()` (spec §4.2). Panics if [`Self::has_next_batch`] would
    /// have returned `false`; callers must check first.
    pub fn next_batch(&mut self) -> Result<Batch, BatchInvariantError> {
        if let Some(batch) = self.delayed_batch.take() {
            return Ok(batch);
        }
        let (&height, _) = self.drafts.iter().next().expect("hasNextBatch was checked");
        let draft = self.drafts.remove(&height).expect("just peeked");
        let batch_index = self.next_batch_index;
        self.next_batch_index += 1;
        Batch::new(batch_index, height, draft.calls)
    }

    /// `delayBatch(batch)` (spec §4.2): hands an unfinished batch back to
    /// Assembly. Drops a stale automatic tail, and if that empties the
    /// batch, rewinds `nextBatchIndex`.
    pub fn delay_batch(&mut self, mut batch: Batch) {
        if batch.has_automatic_tail() && !self.automatic_enabled_at(batch.block_height_upper_bound) {
            batch.drop_automatic_tail();
        }
        if batch.is_empty() {
            self.next_batch_index = self.next_batch_index.saturating_sub(1);
            debug!(batch_index = batch.batch_index, "delayed batch became empty, discarding");
            return;
        }
        self.delayed_batch = Some(batch);
    }

    /// `skipBatches(nextBatchIndex)` (spec §4.2): consumes drafts, advancing
    /// `nextBatchIndex` up to (but not past) the provided value.
    pub fn skip_batches(&mut self, next_batch_index: u64) {
        while self.next_batch_index < next_batch_index && self.has_next_batch() {
            if self.next_batch().is_err() {
                break;
            }
        }
        self.next_batch_index = self.next_batch_index.max(next_batch_index);
        if let Some(delayed) = &self.delayed_batch {
            if delayed.batch_index < next_batch_index {
                self.delayed_batch = None;
            }
        }
    }

    /// `isBatchValid(batch)` (spec §4.2).
    pub fn is_batch_valid(&self, batch: &Batch) -> bool {
        match batch.calls.last() {
            None => true,
            Some(last) if last.level != CallLevel::Automatic => true,
            Some(_) => {
                self.is_fixed(batch.block_height_upper_bound)
                    || self.automatic_enabled_at(batch.block_height_upper_bound)
            }
        }
    }

    /// The lowest batch index Assembly still cares about, used by the
    /// Coordinator to evict stale buffered opinions (spec §5 "Resource
    /// caps").
    pub fn min_batch_index(&self) -> u64 {
        self.delayed_batch.as_ref().map(|b| b.batch_index).unwrap_or(self.next_batch_index)
    }
}

/// Deterministic autorun probe call id: a hash over `(contractKey, height)`
/// (spec §4.2).
pub fn autorun_probe_call_id(contract_key: ContractKey, height: u64) -> CallId {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"autorun-probe");
    hasher.update(contract_key.as_bytes());
    hasher.update(height.to_be_bytes());
    CallId::from(<[u8; 32]>::from(hasher.finalize()))
}
