//! Fixtures shared by the integration tests

#![allow(dead_code)]

use rights_ledger::assets::{AssetData, Party};
use rights_ledger::crypto::Keypair;
use rights_ledger::transaction::{create_tx, default_individual_create_tx, fulfill_tx};
use rights_ledger::*;

pub fn keypair(seed: &str) -> Keypair {
    Keypair::from_seed(seed.as_bytes()).unwrap()
}

pub fn quick_config() -> LedgerConfig {
    init_tracing();
    LedgerConfig {
        request_timeout_ms: 2_000,
        retry: RetryPolicy { max_attempts: 10, initial_backoff_ms: 1, max_backoff_ms: 5 },
    }
}

/// Route library events to the test output; `RUST_LOG=rights_ledger=debug` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn new_ledger() -> RightsLedger<InMemoryLedger> {
    RightsLedger::new(InMemoryLedger::new(), quick_config())
}

/// Register a party record owned by `keypair`, returning its id
pub fn register_party<G: LedgerGateway>(
    ledger: &RightsLedger<G>,
    name: &str,
    keypair: &Keypair,
) -> String {
    let party = AssetData::Party(Party { name: name.to_string(), public_key: keypair.public_key() });
    let mut tx = default_individual_create_tx(party, keypair.public_key());
    fulfill_tx(&mut tx, keypair);
    ledger.submit(&tx).unwrap()
}

/// CREATE `data` with `amount` units held by the issuer
pub fn create_asset<G: LedgerGateway>(
    ledger: &RightsLedger<G>,
    data: AssetData,
    amount: u64,
    issuer: &Keypair,
) -> Transaction {
    let mut tx = create_tx(data, vec![OutputSpec::single(amount, issuer.public_key())], issuer.public_key(), None);
    fulfill_tx(&mut tx, issuer);
    ledger.submit(&tx).unwrap();
    tx
}
