//! # Rights-Ledger
//!
//! Provenance and ownership of music rights on an append-only ledger.
//!
//! Every change of ownership is a transaction whose inputs carry
//! cryptographic fulfillments of the conditions on the outputs they consume,
//! and every role claim (composer, right holder, license holder, artist,
//! record label) is checked by a signed challenge-response against what the
//! ledger records.
//!
//! ## Architecture
//!
//! The crate is layered bottom-up:
//! - Conditions and fulfillments (`condition`, `fulfillment`, `codec`)
//! - Transactions (`types`, `transaction`, `cosign`, `assets`)
//! - Ledger access and validation (`gateway`, `ledger`, `memory`, `config`)
//! - Role proofs (`proof`)
//!
//! ## Design Principles
//!
//! 1. **Pure Core**: building, signing and validating never touch shared state
//! 2. **Content Addressing**: a transaction id is the hash of its content
//! 3. **Exact Version Pinning**: signature-critical dependencies are pinned
//! 4. **External Ledger**: storage and consensus live behind [`LedgerGateway`]
//!
//! ## Usage
//!
//! ```rust
//! use rights_ledger::{RightsLedger, InMemoryLedger, LedgerConfig, Role};
//! use rights_ledger::assets::{AssetData, Composition, Party};
//! use rights_ledger::crypto::Keypair;
//! use rights_ledger::transaction::{default_individual_create_tx, fulfill_tx};
//!
//! let ledger = RightsLedger::new(InMemoryLedger::new(), LedgerConfig::default());
//! let alice = Keypair::generate();
//!
//! let party = AssetData::Party(Party { name: "Alice".to_string(), public_key: alice.public_key() });
//! let mut party_tx = default_individual_create_tx(party, alice.public_key());
//! fulfill_tx(&mut party_tx, &alice);
//! let alice_id = ledger.submit(&party_tx).unwrap();
//!
//! let song = AssetData::Composition(Composition::new("Song", vec![alice_id.clone()]));
//! let mut song_tx = default_individual_create_tx(song, alice.public_key());
//! fulfill_tx(&mut song_tx, &alice);
//! let song_id = ledger.submit(&song_tx).unwrap();
//!
//! let proof = ledger.prove(Role::Composer, "nonce", &alice_id, &song_id, &alice);
//! assert!(ledger.verify(Role::Composer, "nonce", &alice_id, &song_id, &proof).is_ok());
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod crypto;
pub mod condition;
pub mod fulfillment;
pub mod codec;
pub mod transaction;
pub mod cosign;
pub mod assets;
pub mod ledger;
pub mod gateway;
pub mod memory;
pub mod config;
pub mod proof;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{GatewayError, LedgerError, Result};
pub use condition::Condition;
pub use fulfillment::Fulfillment;
pub use config::{LedgerConfig, RetryPolicy};
pub use gateway::LedgerGateway;
pub use memory::InMemoryLedger;
pub use proof::Role;

use assets::AssetData;
use crypto::{Keypair, PublicKey};
use secp256k1::ecdsa::Signature;
use std::collections::BTreeMap;
use tracing::debug;

/// Ledger client: a gateway plus the configuration every call runs under
///
/// All methods take `&self`; share one instance across threads by wrapping
/// it (or its gateway) in an `Arc`.
pub struct RightsLedger<G: LedgerGateway> {
    gateway: G,
    config: LedgerConfig,
}

impl<G: LedgerGateway> RightsLedger<G> {
    pub fn new(gateway: G, config: LedgerConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Submit a fully fulfilled transaction
    ///
    /// 1. CREATE must pass `is_fulfilled` before any ledger round trip
    /// 2. Consumed outputs are checked through the gateway
    /// 3. The transaction is posted once; a refusal is `Rejected`, an
    ///    unreachable ledger is `Lookup`
    pub fn submit(&self, tx: &Transaction) -> Result<String> {
        if tx.operation == Operation::Create && !transaction::is_fulfilled(tx) {
            return Err(LedgerError::FulfillmentMismatch(format!("{} is not fulfilled", tx.id)));
        }
        debug!(id = %tx.id, "submitting transaction");
        ledger::submit(&self.gateway, &self.config, tx)
    }

    /// Check a transaction against the ledger without posting it
    pub fn validate(&self, tx: &Transaction) -> Result<()> {
        ledger::validate_with_gateway(&self.gateway, &self.config, tx)
    }

    /// Fetch a committed transaction, refusing it unless fulfilled
    pub fn fetch_transaction(&self, id: &str) -> Result<Transaction> {
        gateway::fetch_fulfilled_tx(&self.gateway, &self.config, id)
    }

    pub fn fetch_transfers(&self, asset_id: &str) -> Result<Vec<Transaction>> {
        gateway::fetch_transfers(&self.gateway, &self.config, asset_id)
    }

    /// Unspent outputs held by `public_key`
    pub fn outputs_for_key(&self, public_key: &PublicKey) -> Result<Vec<OutputRef>> {
        gateway::fetch_outputs(&self.gateway, &self.config, public_key)
    }

    /// Assets reachable from `public_key`'s unspent outputs, filtered by `keep`
    pub fn assets_for_key<F>(
        &self,
        public_key: &PublicKey,
        keep: F,
    ) -> Result<BTreeMap<String, AssetData>>
    where
        F: Fn(&str, &AssetData) -> bool,
    {
        gateway::assets_for_key(&self.gateway, &self.config, public_key, keep)
    }

    pub fn prove(
        &self,
        role: Role,
        challenge: &str,
        claimant_id: &str,
        target_id: &str,
        keypair: &Keypair,
    ) -> Signature {
        proof::prove(role, challenge, claimant_id, target_id, keypair)
    }

    pub fn verify(
        &self,
        role: Role,
        challenge: &str,
        claimant_id: &str,
        target_id: &str,
        signature: &Signature,
    ) -> Result<()> {
        proof::verify(&self.gateway, &self.config, role, challenge, claimant_id, target_id, signature)
    }
}
