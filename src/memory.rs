//! In-memory ledger gateway
//!
//! Stores committed transactions in commit order and tracks spent outputs.
//! Posts are validated with [`check_tx_inputs`] under the write lock, so two
//! concurrent spends of one output cannot both commit.
//!
//! Two knobs make it behave like a remote ledger:
//! - `visibility_lag`: a committed transaction stays hidden from the next N
//!   read calls. Reads of it by id answer `NotYetVisible`, and so does any
//!   listing it would change: outputs for a key it pays or spends from,
//!   transfers of its asset
//! - `latency`: every call takes this long; a latency above the caller's
//!   timeout fails with `Timeout`

use crate::crypto::PublicKey;
use crate::error::{GatewayError, GatewayResult, LedgerError, Result};
use crate::gateway::LedgerGateway;
use crate::ledger::{check_tx_inputs, ConsumedOutput};
use crate::types::*;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

struct Committed {
    tx: Transaction,
    /// Read clock value after which the transaction is visible
    visible_after: u64,
}

#[derive(Default)]
struct State {
    committed: Vec<Committed>,
    index: HashMap<String, usize>,
    spent: HashSet<OutputRef>,
}

impl State {
    fn consumed(&self, reference: &OutputRef) -> Result<ConsumedOutput> {
        let entry = self
            .index
            .get(&reference.txid)
            .map(|i| &self.committed[*i])
            .ok_or_else(|| LedgerError::Lookup(format!("transaction {} not found", reference.txid)))?;
        let output = entry
            .tx
            .outputs
            .get(reference.output as usize)
            .ok_or_else(|| LedgerError::Lookup(format!("output {} does not exist", reference)))?;
        if self.spent.contains(reference) {
            return Err(LedgerError::Lookup(format!("output {} is already spent", reference)));
        }
        Ok(ConsumedOutput {
            asset_id: entry.tx.asset_id().to_string(),
            output: output.clone(),
        })
    }

    fn output(&self, reference: &OutputRef) -> Option<&Output> {
        let entry = &self.committed[*self.index.get(&reference.txid)?];
        entry.tx.outputs.get(reference.output as usize)
    }

    fn pending(&self, now: u64) -> impl Iterator<Item = &Transaction> {
        self.committed.iter().filter(move |e| now <= e.visible_after).map(|e| &e.tx)
    }

    /// The transaction pays `key` or spends an output `key` holds
    fn touches_key(&self, tx: &Transaction, key: &PublicKey) -> bool {
        tx.outputs.iter().any(|o| o.public_keys.contains(key))
            || tx
                .inputs
                .iter()
                .filter_map(|input| input.fulfills.as_ref())
                .filter_map(|reference| self.output(reference))
                .any(|o| o.public_keys.contains(key))
    }
}

pub struct InMemoryLedger {
    state: RwLock<State>,
    read_clock: AtomicU64,
    visibility_lag: u64,
    latency: Duration,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            read_clock: AtomicU64::new(0),
            visibility_lag: 0,
            latency: Duration::ZERO,
        }
    }

    pub fn with_visibility_lag(mut self, reads: u64) -> Self {
        self.visibility_lag = reads;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of committed transactions, visible or not
    pub fn len(&self) -> usize {
        self.state.read().committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn delay(&self, timeout: Duration) -> GatewayResult<()> {
        if self.latency.is_zero() {
            return Ok(());
        }
        if self.latency > timeout {
            thread::sleep(timeout);
            return Err(GatewayError::Timeout(timeout));
        }
        thread::sleep(self.latency);
        Ok(())
    }

    /// Advance the read clock and return its new value
    fn tick(&self) -> u64 {
        self.read_clock.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl LedgerGateway for InMemoryLedger {
    fn get_transaction(&self, id: &str, timeout: Duration) -> GatewayResult<Transaction> {
        self.delay(timeout)?;
        let now = self.tick();
        let state = self.state.read();

        match state.index.get(id).map(|i| &state.committed[*i]) {
            Some(entry) if now > entry.visible_after => Ok(entry.tx.clone()),
            Some(_) => Err(GatewayError::NotYetVisible(id.to_string())),
            None => Err(GatewayError::NotFound(id.to_string())),
        }
    }

    fn get_outputs_for_key(
        &self,
        public_key: &PublicKey,
        timeout: Duration,
    ) -> GatewayResult<Vec<OutputRef>> {
        self.delay(timeout)?;
        let now = self.tick();
        let state = self.state.read();

        if let Some(tx) = state.pending(now).find(|tx| state.touches_key(tx, public_key)) {
            return Err(GatewayError::NotYetVisible(format!("outputs changed by {}", tx.id)));
        }

        let mut refs = Vec::new();
        for entry in state.committed.iter().filter(|e| now > e.visible_after) {
            for (i, output) in entry.tx.outputs.iter().enumerate() {
                let reference = entry.tx.output_ref(i as u32);
                if output.public_keys.contains(public_key) && !state.spent.contains(&reference) {
                    refs.push(reference);
                }
            }
        }
        Ok(refs)
    }

    fn get_transfers_for_asset(
        &self,
        asset_id: &str,
        timeout: Duration,
    ) -> GatewayResult<Vec<Transaction>> {
        self.delay(timeout)?;
        let now = self.tick();
        let state = self.state.read();

        if let Some(tx) = state.pending(now).find(|tx| tx.asset_id() == asset_id) {
            return Err(GatewayError::NotYetVisible(format!("asset {} changed by {}", asset_id, tx.id)));
        }

        Ok(state
            .committed
            .iter()
            .map(|e| &e.tx)
            .filter(|tx| tx.operation == Operation::Transfer && tx.asset_id() == asset_id)
            .cloned()
            .collect())
    }

    fn post_transaction(&self, tx: &Transaction, timeout: Duration) -> GatewayResult<String> {
        self.delay(timeout)?;
        let mut state = self.state.write();

        if state.index.contains_key(&tx.id) {
            warn!(id = %tx.id, "rejected duplicate transaction");
            return Err(GatewayError::Rejected(format!("{} is already committed", tx.id)));
        }
        if let Err(err) = check_tx_inputs(tx, |reference| state.consumed(reference)) {
            warn!(id = %tx.id, error = %err, "rejected transaction");
            return Err(GatewayError::Rejected(err.to_string()));
        }

        for input in &tx.inputs {
            if let Some(reference) = &input.fulfills {
                state.spent.insert(reference.clone());
            }
        }
        let position = state.committed.len();
        state.index.insert(tx.id.clone(), position);
        state.committed.push(Committed {
            tx: tx.clone(),
            visible_after: self.read_clock.load(Ordering::SeqCst) + self.visibility_lag,
        });

        debug!(id = %tx.id, position, operation = %tx.operation, "committed transaction");
        Ok(tx.id.clone())
    }
}
