//! Ledger-side transaction validation and submission

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::gateway::{fetch_outputs, fetch_tx, LedgerGateway};
use crate::transaction::{input_condition, is_fulfilled, is_fulfilled_against, verify_tx_id};
use crate::types::*;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// An output some transaction wants to spend, with the asset it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedOutput {
    pub asset_id: String,
    pub output: Output,
}

/// CheckTxInputs: 𝒯𝒳 × (𝒪 → ConsumedOutput) → {valid, error}
///
/// For transaction tx:
/// 1. tx.id must be the hash of its content
/// 2. Every output amount is positive
/// 3. CREATE: one input consuming nothing, fulfilled by its declared owners
/// 4. TRANSFER: each input consumes a distinct output that `lookup` can
///    still find, of the same asset, whose condition is the one implied by
///    the input's owners and which the input's fulfillment satisfies
/// 5. TRANSFER: Σ consumed amounts = Σ created amounts
pub fn check_tx_inputs<F>(tx: &Transaction, mut lookup: F) -> Result<()>
where
    F: FnMut(&OutputRef) -> Result<ConsumedOutput>,
{
    // 1. Check the id
    if !verify_tx_id(tx) {
        return Err(LedgerError::FulfillmentMismatch(format!("{} does not hash to its id", tx.id)));
    }

    // 2. Check amounts
    if tx.outputs.is_empty() || tx.outputs.iter().any(|o| o.amount == 0) {
        return Err(LedgerError::Construction("outputs must exist and carry positive amounts".to_string()));
    }

    match tx.operation {
        // 3. CREATE
        Operation::Create => {
            if tx.inputs.len() != 1 || tx.inputs[0].fulfills.is_some() {
                return Err(LedgerError::Construction(
                    "CREATE must have exactly one input consuming nothing".to_string(),
                ));
            }
            if !is_fulfilled(tx) {
                return Err(LedgerError::FulfillmentMismatch(format!("{} is not signed by its issuer", tx.id)));
            }
            Ok(())
        }

        // 4-5. TRANSFER
        Operation::Transfer => {
            let mut seen = BTreeSet::new();
            let mut conditions = Vec::with_capacity(tx.inputs.len());
            let mut consumed_total = 0u64;

            for (i, input) in tx.inputs.iter().enumerate() {
                let reference = input.fulfills.as_ref().ok_or_else(|| {
                    LedgerError::Construction(format!("TRANSFER input {} consumes nothing", i))
                })?;
                if !seen.insert(reference.clone()) {
                    return Err(LedgerError::Construction(format!("output {} consumed twice", reference)));
                }

                let consumed = lookup(reference)?;
                if consumed.asset_id != tx.asset_id() {
                    return Err(LedgerError::Construction(format!(
                        "input {} consumes asset {} instead of {}",
                        i,
                        consumed.asset_id,
                        tx.asset_id()
                    )));
                }
                if input_condition(input).as_ref() != Some(&consumed.output.condition) {
                    return Err(LedgerError::FulfillmentMismatch(format!(
                        "owners of input {} do not hold {}",
                        i, reference
                    )));
                }

                consumed_total = consumed_total.saturating_add(consumed.output.amount);
                conditions.push(consumed.output.condition);
            }

            if !is_fulfilled_against(tx, &conditions) {
                return Err(LedgerError::FulfillmentMismatch(format!("{} has an unfulfilled input", tx.id)));
            }

            let created_total = tx.total_output_amount();
            if consumed_total != created_total {
                return Err(LedgerError::Conservation {
                    consumed: consumed_total,
                    created: created_total,
                });
            }
            Ok(())
        }
    }
}

/// Run [`check_tx_inputs`] with consumed outputs read through the gateway;
/// an output counts as unspent while it is listed for its first owner.
pub fn validate_with_gateway<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    tx: &Transaction,
) -> Result<()> {
    let result = check_tx_inputs(tx, |reference| {
        let prev = fetch_tx(gateway, config, &reference.txid)?;
        let output = prev
            .outputs
            .get(reference.output as usize)
            .cloned()
            .ok_or_else(|| LedgerError::Lookup(format!("output {} does not exist", reference)))?;
        let holder = output
            .public_keys
            .first()
            .ok_or_else(|| LedgerError::Lookup(format!("output {} has no owner", reference)))?;
        if !fetch_outputs(gateway, config, holder)?.contains(reference) {
            return Err(LedgerError::Lookup(format!("output {} is already spent", reference)));
        }
        Ok(ConsumedOutput {
            asset_id: prev.asset_id().to_string(),
            output,
        })
    });

    match &result {
        Ok(()) => debug!(id = %tx.id, "transaction valid against ledger"),
        Err(err) => debug!(id = %tx.id, error = %err, "transaction rejected"),
    }
    result
}

/// Validate then post; the ledger must acknowledge the same id
///
/// A post the ledger turns away, such as the loser of a double-spend race,
/// fails with [`LedgerError::Rejected`]. A post that cannot reach the ledger
/// or times out fails with [`LedgerError::Lookup`].
pub fn submit<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    tx: &Transaction,
) -> Result<String> {
    validate_with_gateway(gateway, config, tx)?;

    let id = gateway.post_transaction(tx, config.request_timeout())?;
    if id != tx.id {
        return Err(LedgerError::Lookup(format!("ledger stored {} as {}", tx.id, id)));
    }
    info!(id = %id, operation = %tx.operation, "transaction submitted");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetData, Composition};
    use crate::crypto::Keypair;
    use crate::transaction::*;
    use std::collections::HashMap;

    fn keypair(seed: &str) -> Keypair {
        Keypair::from_seed(seed.as_bytes()).unwrap()
    }

    fn signed_create(owner: &Keypair, amount: u64) -> Transaction {
        let data = AssetData::Composition(Composition::new("Song", vec!["c".to_string()]));
        let mut tx = individual_create_tx(amount, data, owner.public_key(), owner.public_key());
        fulfill_tx(&mut tx, owner);
        tx
    }

    fn utxos(txs: &[&Transaction]) -> HashMap<OutputRef, ConsumedOutput> {
        let mut set = HashMap::new();
        for tx in txs {
            for (i, output) in tx.outputs.iter().enumerate() {
                set.insert(
                    tx.output_ref(i as u32),
                    ConsumedOutput { asset_id: tx.asset_id().to_string(), output: output.clone() },
                );
            }
        }
        set
    }

    fn lookup_in(
        set: &HashMap<OutputRef, ConsumedOutput>,
    ) -> impl FnMut(&OutputRef) -> Result<ConsumedOutput> + '_ {
        move |reference| {
            set.get(reference)
                .cloned()
                .ok_or_else(|| LedgerError::Lookup(format!("{} not found", reference)))
        }
    }

    #[test]
    fn test_check_create() {
        let alice = keypair("alice");
        let tx = signed_create(&alice, 1);
        let set = HashMap::new();

        assert!(check_tx_inputs(&tx, lookup_in(&set)).is_ok());
    }

    #[test]
    fn test_check_unsigned_create() {
        let alice = keypair("alice");
        let data = AssetData::Composition(Composition::new("Song", vec![]));
        let tx = default_individual_create_tx(data, alice.public_key());
        let set = HashMap::new();

        assert!(matches!(check_tx_inputs(&tx, lookup_in(&set)), Err(LedgerError::FulfillmentMismatch(_))));
    }

    #[test]
    fn test_check_transfer_valid() {
        let alice = keypair("alice");
        let bob = keypair("bob");
        let create = signed_create(&alice, 10);
        let set = utxos(&[&create]);

        let mut transfer = divisible_transfer_tx(
            &[7, 3],
            &create.id,
            create.output_ref(0),
            vec![bob.public_key(), alice.public_key()],
            alice.public_key(),
        );
        fulfill_tx(&mut transfer, &alice);

        assert!(check_tx_inputs(&transfer, lookup_in(&set)).is_ok());
    }

    #[test]
    fn test_check_transfer_not_conserved() {
        let alice = keypair("alice");
        let bob = keypair("bob");
        let create = signed_create(&alice, 10);
        let set = utxos(&[&create]);

        let mut transfer = individual_transfer_tx(11, &create.id, create.output_ref(0), bob.public_key(), alice.public_key());
        fulfill_tx(&mut transfer, &alice);

        assert_eq!(
            check_tx_inputs(&transfer, lookup_in(&set)),
            Err(LedgerError::Conservation { consumed: 10, created: 11 })
        );
    }

    #[test]
    fn test_check_transfer_by_non_owner() {
        let alice = keypair("alice");
        let mallory = keypair("mallory");
        let create = signed_create(&alice, 1);
        let set = utxos(&[&create]);

        let mut transfer = individual_transfer_tx(1, &create.id, create.output_ref(0), mallory.public_key(), mallory.public_key());
        fulfill_tx(&mut transfer, &mallory);

        assert!(matches!(check_tx_inputs(&transfer, lookup_in(&set)), Err(LedgerError::FulfillmentMismatch(_))));
    }

    #[test]
    fn test_check_transfer_missing_output() {
        let alice = keypair("alice");
        let bob = keypair("bob");
        let create = signed_create(&alice, 1);
        let set = HashMap::new();

        let mut transfer = individual_transfer_tx(1, &create.id, create.output_ref(0), bob.public_key(), alice.public_key());
        fulfill_tx(&mut transfer, &alice);

        assert!(matches!(check_tx_inputs(&transfer, lookup_in(&set)), Err(LedgerError::Lookup(_))));
    }

    #[test]
    fn test_check_transfer_wrong_asset() {
        let alice = keypair("alice");
        let bob = keypair("bob");
        let create = signed_create(&alice, 1);
        let set = utxos(&[&create]);

        let mut transfer = individual_transfer_tx(1, "another-asset", create.output_ref(0), bob.public_key(), alice.public_key());
        fulfill_tx(&mut transfer, &alice);

        assert!(matches!(check_tx_inputs(&transfer, lookup_in(&set)), Err(LedgerError::Construction(_))));
    }

    #[test]
    fn test_check_tampered_id() {
        let alice = keypair("alice");
        let mut tx = signed_create(&alice, 1);
        tx.outputs[0].amount = 2;
        let set = HashMap::new();

        assert!(matches!(check_tx_inputs(&tx, lookup_in(&set)), Err(LedgerError::FulfillmentMismatch(_))));
    }
}
