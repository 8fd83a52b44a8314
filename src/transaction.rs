//! Transaction construction, identification and fulfillment

use crate::assets::AssetData;
use crate::codec::{marshal, unmarshal};
use crate::condition::{condition_for_owners, Condition};
use crate::constants::*;
use crate::crypto::{content_hash, Keypair, PublicKey};
use crate::error::{LedgerError, Result};
use crate::fulfillment::{fulfill_from_key, validate, Fulfillment};
use crate::types::*;
use serde::Serialize;
use tracing::debug;

/// Every field but `id`, as hashed into the id
#[derive(Serialize)]
struct TransactionBody<'a> {
    version: &'a str,
    operation: Operation,
    asset: &'a Asset,
    inputs: &'a [Input],
    outputs: &'a [Output],
    metadata: &'a Option<Metadata>,
}

/// CheckConstruction: builder arguments → {ok, ConstructionError}
///
/// Builder arguments are well formed if and only if:
/// 1. |fulfills| = |owners_before| > 0 and |amounts| = |owners_after| > 0
/// 2. every amount is positive and every owner list non-empty
/// 3. CREATE: inline asset data, exactly one input, consuming nothing
/// 4. TRANSFER: an asset reference, every input consuming an output
pub fn check_construction(
    operation: Operation,
    asset: &Asset,
    fulfills: &[Option<OutputRef>],
    owners_before: &[Vec<PublicKey>],
    amounts: &[u64],
    owners_after: &[Vec<PublicKey>],
) -> Result<()> {
    let fail = |msg: String| Err(LedgerError::Construction(msg));

    // 1. Check array lengths
    if fulfills.len() != owners_before.len() {
        return fail(format!(
            "{} input references but {} owner lists",
            fulfills.len(),
            owners_before.len()
        ));
    }
    if amounts.len() != owners_after.len() {
        return fail(format!("{} amounts but {} owner lists", amounts.len(), owners_after.len()));
    }
    if fulfills.is_empty() || amounts.is_empty() {
        return fail("a transaction needs at least one input and one output".to_string());
    }

    // 2. Check amounts and owners
    if let Some(i) = amounts.iter().position(|a| *a == 0) {
        return fail(format!("amount at output {} must be positive", i));
    }
    if let Some(i) = owners_after.iter().position(|o| o.is_empty()) {
        return fail(format!("output {} has no owners", i));
    }
    if let Some(i) = owners_before.iter().position(|o| o.is_empty()) {
        return fail(format!("input {} has no owners", i));
    }

    // 3-4. Check operation shape
    match operation {
        Operation::Create => {
            if !matches!(asset, Asset::Data(_)) {
                return fail("CREATE must carry asset data".to_string());
            }
            if fulfills.len() != 1 || fulfills[0].is_some() {
                return fail("CREATE must have exactly one input consuming nothing".to_string());
            }
        }
        Operation::Transfer => {
            if !matches!(asset, Asset::Id(_)) {
                return fail("TRANSFER must reference an asset id".to_string());
            }
            if let Some(i) = fulfills.iter().position(|f| f.is_none()) {
                return fail(format!("TRANSFER input {} consumes nothing", i));
            }
        }
    }

    Ok(())
}

/// GenerateTx: assemble inputs and outputs, then compute the id
///
/// # Panics
///
/// If the arguments fail [`check_construction`]. Malformed builder input is a
/// programming error, never an invalid transaction.
pub fn generate_tx(
    operation: Operation,
    asset: Asset,
    fulfills: Vec<Option<OutputRef>>,
    owners_before: Vec<Vec<PublicKey>>,
    amounts: &[u64],
    owners_after: Vec<Vec<PublicKey>>,
    metadata: Option<Metadata>,
) -> Transaction {
    if let Err(e) = check_construction(operation, &asset, &fulfills, &owners_before, amounts, &owners_after) {
        panic!("{}", e);
    }

    let inputs = fulfills
        .into_iter()
        .zip(owners_before)
        .map(|(fulfills, owners_before)| Input { fulfillment: None, fulfills, owners_before })
        .collect();
    let outputs = amounts
        .iter()
        .zip(owners_after)
        .map(|(amount, owners)| Output {
            amount: *amount,
            condition: condition_for_owners(&owners),
            public_keys: owners,
        })
        .collect();

    let mut tx = Transaction {
        id: String::new(),
        version: TX_VERSION.to_string(),
        operation,
        asset,
        inputs,
        outputs,
        metadata,
    };
    tx.id = compute_tx_id(&tx);
    debug!(id = %tx.id, operation = %tx.operation, outputs = tx.outputs.len(), "built transaction");
    tx
}

/// BuildCreate: originate `asset` with `issuer` as the single input owner
pub fn create_tx(
    asset: AssetData,
    outputs: Vec<OutputSpec>,
    issuer: PublicKey,
    metadata: Option<Metadata>,
) -> Transaction {
    let (amounts, owners_after): (Vec<u64>, Vec<Vec<PublicKey>>) =
        outputs.into_iter().map(|o| (o.amount, o.owners)).unzip();
    generate_tx(
        Operation::Create,
        Asset::Data(asset),
        vec![None],
        vec![vec![issuer]],
        &amounts,
        owners_after,
        metadata,
    )
}

/// BuildTransfer: move the outputs named by `fulfills` of asset `asset_id`
pub fn transfer_tx(
    asset_id: &str,
    fulfills: Vec<OutputRef>,
    owners_before: Vec<Vec<PublicKey>>,
    outputs: Vec<OutputSpec>,
    metadata: Option<Metadata>,
) -> Transaction {
    let (amounts, owners_after): (Vec<u64>, Vec<Vec<PublicKey>>) =
        outputs.into_iter().map(|o| (o.amount, o.owners)).unzip();
    generate_tx(
        Operation::Transfer,
        Asset::Id(asset_id.to_string()),
        fulfills.into_iter().map(Some).collect(),
        owners_before,
        &amounts,
        owners_after,
        metadata,
    )
}

pub fn individual_create_tx(
    amount: u64,
    data: AssetData,
    owner_after: PublicKey,
    owner_before: PublicKey,
) -> Transaction {
    create_tx(data, vec![OutputSpec::single(amount, owner_after)], owner_before, None)
}

/// One unit of `data`, owned by whoever issues it
pub fn default_individual_create_tx(data: AssetData, owner: PublicKey) -> Transaction {
    individual_create_tx(1, data, owner, owner)
}

/// CREATE for several new owners
///
/// # Panics
///
/// If `owners_after` is empty, or a separate layout does not give exactly one
/// amount per owner.
pub fn multiple_owners_create_tx(
    layout: CoOwnership,
    data: AssetData,
    owners_after: Vec<PublicKey>,
    owner_before: PublicKey,
) -> Transaction {
    assert!(!owners_after.is_empty(), "multiple owners CREATE needs owners");
    let outputs = match layout {
        CoOwnership::Shared(amount) => vec![OutputSpec::new(amount, owners_after)],
        CoOwnership::Separate(amounts) => {
            assert_eq!(
                amounts.len(),
                owners_after.len(),
                "separate ownership needs one amount per owner"
            );
            amounts
                .into_iter()
                .zip(owners_after)
                .map(|(amount, owner)| OutputSpec::single(amount, owner))
                .collect()
        }
    };
    create_tx(data, outputs, owner_before, None)
}

pub fn individual_transfer_tx(
    amount: u64,
    asset_id: &str,
    consume: OutputRef,
    owner_after: PublicKey,
    owner_before: PublicKey,
) -> Transaction {
    transfer_tx(
        asset_id,
        vec![consume],
        vec![vec![owner_before]],
        vec![OutputSpec::single(amount, owner_after)],
        None,
    )
}

/// Split one consumed output into one output per new owner
///
/// # Panics
///
/// Unless there are at least two amounts and exactly one per owner.
pub fn divisible_transfer_tx(
    amounts: &[u64],
    asset_id: &str,
    consume: OutputRef,
    owners_after: Vec<PublicKey>,
    owner_before: PublicKey,
) -> Transaction {
    assert!(
        amounts.len() > 1 && amounts.len() == owners_after.len(),
        "divisible transfer needs one amount per owner and at least two owners"
    );
    let outputs = amounts
        .iter()
        .zip(owners_after)
        .map(|(amount, owner)| OutputSpec::single(*amount, owner))
        .collect();
    transfer_tx(asset_id, vec![consume], vec![vec![owner_before]], outputs, None)
}

/// TxId: SHA256 of the canonical body with `id` absent and fulfillments cleared
pub fn compute_tx_id(tx: &Transaction) -> String {
    let stripped = strip_fulfillments(tx);
    let body = TransactionBody {
        version: &stripped.version,
        operation: stripped.operation,
        asset: &stripped.asset,
        inputs: &stripped.inputs,
        outputs: &stripped.outputs,
        metadata: &stripped.metadata,
    };
    hex::encode(content_hash(&canonical_json(&body)))
}

pub fn verify_tx_id(tx: &Transaction) -> bool {
    compute_tx_id(tx) == tx.id
}

/// Copy of `tx` with every input's fulfillment cleared
pub fn strip_fulfillments(tx: &Transaction) -> Transaction {
    let mut stripped = tx.clone();
    for input in &mut stripped.inputs {
        input.fulfillment = None;
    }
    stripped
}

/// The bytes every input fulfillment signs
pub fn signing_message(tx: &Transaction) -> Vec<u8> {
    canonical_json(&strip_fulfillments(tx))
}

/// Store one fulfillment per input, in input order; the id is untouched
///
/// # Panics
///
/// If the number of fulfillments differs from the number of inputs.
pub fn attach_fulfillments(tx: &mut Transaction, fulfillments: &[Fulfillment]) {
    assert_eq!(
        fulfillments.len(),
        tx.inputs.len(),
        "one fulfillment is required per input"
    );
    for (input, fulfillment) in tx.inputs.iter_mut().zip(fulfillments) {
        input.fulfillment = Some(marshal(fulfillment));
    }
}

/// Sign every input with a single key: the single-owner path
pub fn fulfill_tx(tx: &mut Transaction, keypair: &Keypair) {
    let message = signing_message(tx);
    let fulfillment = fulfill_from_key(&message, keypair);
    for input in &mut tx.inputs {
        input.fulfillment = Some(marshal(&fulfillment));
    }
}

/// Condition implied by an input's declared owners
pub fn input_condition(input: &Input) -> Option<Condition> {
    if input.owners_before.is_empty() {
        return None;
    }
    Some(condition_for_owners(&input.owners_before))
}

/// IsFulfilled: 𝒯𝒳 → {true, false}
///
/// Every input must carry a fulfillment that validates the stripped
/// transaction under the condition of its own declared owners.
pub fn is_fulfilled(tx: &Transaction) -> bool {
    let conditions: Option<Vec<Condition>> = tx.inputs.iter().map(input_condition).collect();
    match conditions {
        Some(conditions) => is_fulfilled_against(tx, &conditions),
        None => false,
    }
}

/// IsFulfilledAgainst: 𝒯𝒳 × Condition* → {true, false}
///
/// As [`is_fulfilled`], with each input checked against the condition recorded
/// on the output it consumes.
pub fn is_fulfilled_against(tx: &Transaction, conditions: &[Condition]) -> bool {
    if tx.inputs.is_empty() || conditions.len() != tx.inputs.len() {
        return false;
    }
    let message = signing_message(tx);

    tx.inputs.iter().zip(conditions).all(|(input, condition)| {
        let uri = match &input.fulfillment {
            Some(uri) => uri,
            None => return false,
        };
        match unmarshal::<Fulfillment>(uri) {
            Ok(fulfillment) => validate(&fulfillment, &message, condition),
            Err(_) => false,
        }
    })
}

/// First owner of the first input
pub fn owner_before(tx: &Transaction) -> Option<&PublicKey> {
    tx.inputs.first().and_then(|i| i.owners_before.first())
}

/// First owner of output `index`
pub fn owner_after(tx: &Transaction, index: usize) -> Option<&PublicKey> {
    tx.outputs.get(index).and_then(|o| o.public_keys.first())
}

/// Output consumed by the first input
pub fn consumed_ref(tx: &Transaction) -> Option<&OutputRef> {
    tx.inputs.first().and_then(|i| i.fulfills.as_ref())
}
