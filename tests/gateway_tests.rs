//! Gateway behaviour seen through the client: visibility lag, timeouts,
//! tampered answers and concurrent callers

mod common;

use common::*;
use rights_ledger::assets::{AssetData, Composition, Right};
use rights_ledger::crypto::PublicKey;
use rights_ledger::error::GatewayResult;
use rights_ledger::transaction::{fulfill_tx, individual_transfer_tx};
use rights_ledger::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_lagging_ledger_is_retried() -> anyhow::Result<()> {
    let ledger = RightsLedger::new(InMemoryLedger::new().with_visibility_lag(3), quick_config());
    let alice = keypair("alice");
    let alice_id = register_party(&ledger, "Alice", &alice);
    let song = create_asset(
        &ledger,
        AssetData::Composition(Composition::new("Song", vec![alice_id.clone()])),
        1,
        &alice,
    );

    let proof = ledger.prove(Role::Composer, "n", &alice_id, &song.id, &alice);
    ledger.verify(Role::Composer, "n", &alice_id, &song.id, &proof)?;
    Ok(())
}

#[test]
fn test_right_holder_follows_lagging_transfer() -> anyhow::Result<()> {
    let ledger = RightsLedger::new(InMemoryLedger::new().with_visibility_lag(5), quick_config());
    let alice = keypair("alice");
    let bob = keypair("bob");
    let alice_id = register_party(&ledger, "Alice", &alice);
    let bob_id = register_party(&ledger, "Bob", &bob);
    let song = create_asset(
        &ledger,
        AssetData::Composition(Composition::new("Song", vec![alice_id.clone()])),
        1,
        &alice,
    );
    let right = create_asset(
        &ledger,
        AssetData::Right(Right {
            right_holders: vec![alice_id.clone()],
            right_to: song.id.clone(),
            transfer_id: None,
        }),
        1,
        &alice,
    );

    let mut to_bob = individual_transfer_tx(1, &right.id, right.output_ref(0), bob.public_key(), alice.public_key());
    fulfill_tx(&mut to_bob, &alice);
    ledger.submit(&to_bob)?;

    // Asked straight after the transfer commits, before it is readable
    let proof = ledger.prove(Role::RightHolder, "n", &bob_id, &right.id, &bob);
    ledger.verify(Role::RightHolder, "n", &bob_id, &right.id, &proof)?;

    let proof = ledger.prove(Role::RightHolder, "n", &alice_id, &right.id, &alice);
    assert!(matches!(
        ledger.verify(Role::RightHolder, "n", &alice_id, &right.id, &proof),
        Err(LedgerError::Authorization(_))
    ));
    Ok(())
}

#[test]
fn test_lag_without_retries_is_lookup_error() {
    let config = LedgerConfig { retry: RetryPolicy::none(), ..quick_config() };
    let ledger = RightsLedger::new(InMemoryLedger::new().with_visibility_lag(3), config);
    let alice = keypair("alice");
    let alice_id = register_party(&ledger, "Alice", &alice);

    assert!(matches!(ledger.fetch_transaction(&alice_id), Err(LedgerError::Lookup(_))));
}

#[test]
fn test_slow_ledger_times_out() {
    let alice = keypair("alice");
    let slow = InMemoryLedger::new().with_latency(Duration::from_millis(40));
    let ledger = RightsLedger::new(
        slow,
        LedgerConfig { request_timeout_ms: 10, retry: RetryPolicy::default() },
    );

    let song = AssetData::Composition(Composition::new("Song", vec![]));
    let mut tx = rights_ledger::transaction::default_individual_create_tx(song, alice.public_key());
    fulfill_tx(&mut tx, &alice);

    assert!(matches!(ledger.submit(&tx), Err(LedgerError::Lookup(_))));
    assert!(matches!(ledger.fetch_transaction(&tx.id), Err(LedgerError::Lookup(_))));
}

/// Answers with the first output amount bumped, as a corrupted store would
struct Tampering(InMemoryLedger);

impl LedgerGateway for Tampering {
    fn get_transaction(&self, id: &str, timeout: Duration) -> GatewayResult<Transaction> {
        let mut tx = self.0.get_transaction(id, timeout)?;
        if let Some(output) = tx.outputs.first_mut() {
            output.amount += 1;
        }
        Ok(tx)
    }

    fn get_outputs_for_key(
        &self,
        public_key: &PublicKey,
        timeout: Duration,
    ) -> GatewayResult<Vec<OutputRef>> {
        self.0.get_outputs_for_key(public_key, timeout)
    }

    fn get_transfers_for_asset(
        &self,
        asset_id: &str,
        timeout: Duration,
    ) -> GatewayResult<Vec<Transaction>> {
        self.0.get_transfers_for_asset(asset_id, timeout)
    }

    fn post_transaction(&self, tx: &Transaction, timeout: Duration) -> GatewayResult<String> {
        self.0.post_transaction(tx, timeout)
    }
}

#[test]
fn test_tampered_transaction_refused() {
    let ledger = RightsLedger::new(Tampering(InMemoryLedger::new()), quick_config());
    let alice = keypair("alice");
    let alice_id = register_party(&ledger, "Alice", &alice);

    assert!(matches!(
        ledger.fetch_transaction(&alice_id),
        Err(LedgerError::FulfillmentMismatch(_))
    ));
}

/// Reads from the inner ledger but turns every post away
struct Refusing(InMemoryLedger);

impl LedgerGateway for Refusing {
    fn get_transaction(&self, id: &str, timeout: Duration) -> GatewayResult<Transaction> {
        self.0.get_transaction(id, timeout)
    }

    fn get_outputs_for_key(
        &self,
        public_key: &PublicKey,
        timeout: Duration,
    ) -> GatewayResult<Vec<OutputRef>> {
        self.0.get_outputs_for_key(public_key, timeout)
    }

    fn get_transfers_for_asset(
        &self,
        asset_id: &str,
        timeout: Duration,
    ) -> GatewayResult<Vec<Transaction>> {
        self.0.get_transfers_for_asset(asset_id, timeout)
    }

    fn post_transaction(&self, tx: &Transaction, _timeout: Duration) -> GatewayResult<String> {
        Err(GatewayError::Rejected(format!("{} conflicts with a newer commit", tx.id)))
    }
}

#[test]
fn test_refused_post_is_rejected_not_lookup() {
    let ledger = RightsLedger::new(Refusing(InMemoryLedger::new()), quick_config());
    let alice = keypair("alice");
    let song = AssetData::Composition(Composition::new("Song", vec![]));
    let mut tx = rights_ledger::transaction::default_individual_create_tx(song, alice.public_key());
    fulfill_tx(&mut tx, &alice);

    assert!(matches!(ledger.submit(&tx), Err(LedgerError::Rejected(_))));
    assert!(ledger.gateway().0.is_empty());
}

#[test]
fn test_concurrent_verification() {
    let ledger = Arc::new(new_ledger());
    let alice = keypair("alice");
    let alice_id = register_party(&*ledger, "Alice", &alice);
    let song = create_asset(
        &*ledger,
        AssetData::Composition(Composition::new("Song", vec![alice_id.clone()])),
        1,
        &alice,
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            let alice = alice.clone();
            let alice_id = alice_id.clone();
            let song_id = song.id.clone();
            thread::spawn(move || {
                let challenge = format!("nonce-{}", i);
                let proof = ledger.prove(Role::Composer, &challenge, &alice_id, &song_id, &alice);
                ledger.verify(Role::Composer, &challenge, &alice_id, &song_id, &proof)
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
}

#[test]
fn test_concurrent_double_spend_commits_once() {
    let ledger = Arc::new(new_ledger());
    let alice = keypair("alice");
    let song = create_asset(&*ledger, AssetData::Composition(Composition::new("Song", vec![])), 1, &alice);

    let handles: Vec<_> = ["bob", "carol", "dave", "erin"]
        .iter()
        .map(|name| {
            let buyer = keypair(name);
            let mut tx = individual_transfer_tx(1, &song.id, song.output_ref(0), buyer.public_key(), alice.public_key());
            fulfill_tx(&mut tx, &alice);
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || ledger.submit(&tx))
        })
        .collect();

    let committed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(committed, 1);
    assert_eq!(ledger.fetch_transfers(&song.id).unwrap().len(), 1);
}

#[test]
fn test_config_from_file() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("rights-ledger-{}.toml", std::process::id()));
    std::fs::write(&path, "request_timeout_ms = 750\n\n[retry]\nmax_attempts = 4\ninitial_backoff_ms = 5\n")?;

    let config = LedgerConfig::from_file(&path)?;
    std::fs::remove_file(&path)?;

    assert_eq!(config.request_timeout(), Duration::from_millis(750));
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.initial_backoff_ms, 5);
    assert_eq!(config.retry.max_backoff_ms, DEFAULT_MAX_BACKOFF_MS);
    Ok(())
}
