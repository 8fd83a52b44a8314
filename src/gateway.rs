//! Read/write boundary to the external ledger service

use crate::assets::AssetData;
use crate::condition::Condition;
use crate::config::{LedgerConfig, RetryPolicy};
use crate::crypto::PublicKey;
use crate::error::{GatewayError, GatewayResult, LedgerError, Result};
use crate::transaction::{is_fulfilled, is_fulfilled_against, verify_tx_id};
use crate::types::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Ledger access consumed by this crate; storage, indexing and consensus
/// live behind it.
///
/// Every call receives the time it may take. Implementations answer
/// `NotYetVisible` rather than `NotFound` when they know a write is pending.
pub trait LedgerGateway {
    fn get_transaction(&self, id: &str, timeout: Duration) -> GatewayResult<Transaction>;

    /// Unspent outputs currently held (alone or jointly) by `public_key`
    fn get_outputs_for_key(
        &self,
        public_key: &PublicKey,
        timeout: Duration,
    ) -> GatewayResult<Vec<OutputRef>>;

    /// TRANSFER transactions of `asset_id` in commit order
    fn get_transfers_for_asset(
        &self,
        asset_id: &str,
        timeout: Duration,
    ) -> GatewayResult<Vec<Transaction>>;

    fn post_transaction(&self, tx: &Transaction, timeout: Duration) -> GatewayResult<String>;
}

impl<G: LedgerGateway + ?Sized> LedgerGateway for &G {
    fn get_transaction(&self, id: &str, timeout: Duration) -> GatewayResult<Transaction> {
        (**self).get_transaction(id, timeout)
    }

    fn get_outputs_for_key(
        &self,
        public_key: &PublicKey,
        timeout: Duration,
    ) -> GatewayResult<Vec<OutputRef>> {
        (**self).get_outputs_for_key(public_key, timeout)
    }

    fn get_transfers_for_asset(
        &self,
        asset_id: &str,
        timeout: Duration,
    ) -> GatewayResult<Vec<Transaction>> {
        (**self).get_transfers_for_asset(asset_id, timeout)
    }

    fn post_transaction(&self, tx: &Transaction, timeout: Duration) -> GatewayResult<String> {
        (**self).post_transaction(tx, timeout)
    }
}

impl<G: LedgerGateway + ?Sized> LedgerGateway for Arc<G> {
    fn get_transaction(&self, id: &str, timeout: Duration) -> GatewayResult<Transaction> {
        (**self).get_transaction(id, timeout)
    }

    fn get_outputs_for_key(
        &self,
        public_key: &PublicKey,
        timeout: Duration,
    ) -> GatewayResult<Vec<OutputRef>> {
        (**self).get_outputs_for_key(public_key, timeout)
    }

    fn get_transfers_for_asset(
        &self,
        asset_id: &str,
        timeout: Duration,
    ) -> GatewayResult<Vec<Transaction>> {
        (**self).get_transfers_for_asset(asset_id, timeout)
    }

    fn post_transaction(&self, tx: &Transaction, timeout: Duration) -> GatewayResult<String> {
        (**self).post_transaction(tx, timeout)
    }
}

/// Run a gateway call, retrying while its result is not yet visible
///
/// 1. Each attempt gets what is left of `timeout`
/// 2. `NotYetVisible` is retried with backoff, up to `policy.max_attempts`
///    attempts and never past `timeout`
/// 3. Any other gateway error, or running out of attempts, is a `Lookup` error
pub fn with_retry<T, F>(policy: &RetryPolicy, timeout: Duration, what: &str, mut op: F) -> Result<T>
where
    F: FnMut(Duration) -> GatewayResult<T>,
{
    let started = Instant::now();
    let mut attempt = 1u32;

    loop {
        let remaining = match timeout.checked_sub(started.elapsed()) {
            Some(left) if !left.is_zero() => left,
            _ => return Err(GatewayError::Timeout(timeout).into()),
        };

        match op(remaining) {
            Ok(value) => return Ok(value),
            Err(GatewayError::NotYetVisible(detail)) if attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                if started.elapsed() + backoff >= timeout {
                    warn!(what, attempt, "gave up waiting for visibility before timeout");
                    return Err(LedgerError::Lookup(format!("{}: {} (timed out)", what, detail)));
                }
                debug!(what, attempt, backoff_ms = backoff.as_millis() as u64, "not yet visible, retrying");
                thread::sleep(backoff);
                attempt += 1;
            }
            Err(err) => {
                debug!(what, attempt, error = %err, "gateway call failed");
                return Err(LedgerError::Lookup(format!("{}: {}", what, err)));
            }
        }
    }
}

pub fn fetch_tx<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    id: &str,
) -> Result<Transaction> {
    let tx = with_retry(&config.retry, config.request_timeout(), "get transaction", |left| {
        gateway.get_transaction(id, left)
    })?;
    if tx.id != id {
        return Err(LedgerError::Lookup(format!("asked for {} but ledger returned {}", id, tx.id)));
    }
    Ok(tx)
}

/// Conditions recorded on the outputs `tx` consumes, in input order
pub fn consumed_conditions<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    tx: &Transaction,
) -> Result<Vec<Condition>> {
    tx.inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let reference = input
                .fulfills
                .as_ref()
                .ok_or_else(|| LedgerError::Lookup(format!("input {} of {} consumes nothing", i, tx.id)))?;
            let prev = fetch_tx(gateway, config, &reference.txid)?;
            prev.outputs
                .get(reference.output as usize)
                .map(|o| o.condition.clone())
                .ok_or_else(|| LedgerError::Lookup(format!("output {} does not exist", reference)))
        })
        .collect()
}

/// Check a transaction read back from the ledger: its id must match its
/// content and every input must be fulfilled
pub fn check_fetched<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    tx: &Transaction,
) -> Result<()> {
    if !verify_tx_id(tx) {
        return Err(LedgerError::FulfillmentMismatch(format!("{} does not hash to its id", tx.id)));
    }
    let fulfilled = match tx.operation {
        Operation::Create => is_fulfilled(tx),
        Operation::Transfer => is_fulfilled_against(tx, &consumed_conditions(gateway, config, tx)?),
    };
    if !fulfilled {
        return Err(LedgerError::FulfillmentMismatch(format!("{} has an unfulfilled input", tx.id)));
    }
    Ok(())
}

/// Fetch a transaction and refuse it unless it is fulfilled
pub fn fetch_fulfilled_tx<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    id: &str,
) -> Result<Transaction> {
    let tx = fetch_tx(gateway, config, id)?;
    check_fetched(gateway, config, &tx)?;
    Ok(tx)
}

/// Every TRANSFER of `asset_id`, each checked as by [`fetch_fulfilled_tx`]
pub fn fetch_transfers<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    asset_id: &str,
) -> Result<Vec<Transaction>> {
    let transfers = with_retry(&config.retry, config.request_timeout(), "get transfers", |left| {
        gateway.get_transfers_for_asset(asset_id, left)
    })?;
    for tx in &transfers {
        check_fetched(gateway, config, tx)?;
    }
    Ok(transfers)
}

pub fn fetch_outputs<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    public_key: &PublicKey,
) -> Result<Vec<OutputRef>> {
    with_retry(&config.retry, config.request_timeout(), "get outputs", |left| {
        gateway.get_outputs_for_key(public_key, left)
    })
}

/// Asset data reachable from the unspent outputs of `public_key`, keyed by
/// asset id, keeping only the assets `keep` accepts
pub fn assets_for_key<G, F>(
    gateway: &G,
    config: &LedgerConfig,
    public_key: &PublicKey,
    keep: F,
) -> Result<BTreeMap<String, AssetData>>
where
    G: LedgerGateway,
    F: Fn(&str, &AssetData) -> bool,
{
    let mut assets = BTreeMap::new();
    for reference in fetch_outputs(gateway, config, public_key)? {
        let tx = fetch_tx(gateway, config, &reference.txid)?;
        let asset_id = tx.asset_id().to_string();
        if assets.contains_key(&asset_id) {
            continue;
        }
        let data = match tx.asset_data() {
            Some(data) => data.clone(),
            None => match fetch_tx(gateway, config, &asset_id)?.asset {
                Asset::Data(data) => data,
                Asset::Id(_) => {
                    return Err(LedgerError::Lookup(format!("asset {} is not a CREATE", asset_id)))
                }
            },
        };
        if keep(&asset_id, &data) {
            assets.insert(asset_id, data);
        }
    }
    Ok(assets)
}
