//! Role claims: challenge-response proofs checked against the ledger
//!
//! A claimant proves a role at a target by signing
//! `challenge ++ claimant_id ++ target_id`. The verifier never trusts the
//! claim itself: it resolves the target and the claimant's party record
//! through the gateway and re-derives authorization from what is recorded.
//!
//! Verification fails in a fixed order:
//! 1. the target cannot be resolved, or holds another asset kind: `Lookup`
//! 2. the claimant id is not a party: `Lookup`
//! 3. the role's graph rule rejects the claimant: `Authorization`
//! 4. the signature does not verify under the claimant's key: `Signature`

use crate::assets::{AssetData, Recording};
use crate::codec::unmarshal;
use crate::condition::derive_condition;
use crate::config::LedgerConfig;
use crate::crypto::{verify_signature, Keypair, PublicKey};
use crate::error::{LedgerError, Result};
use crate::fulfillment::{validate, Fulfillment};
use crate::gateway::{fetch_fulfilled_tx, fetch_outputs, fetch_transfers, LedgerGateway};
use crate::types::*;
use secp256k1::ecdsa::Signature;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Composer,
    RightHolder,
    LicenseHolder,
    Artist,
    RecordLabel,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Composer,
        Role::RightHolder,
        Role::LicenseHolder,
        Role::Artist,
        Role::RecordLabel,
    ];

    /// Asset kind a target must hold for this role
    pub fn target_kind(&self) -> &'static str {
        match self {
            Role::Composer => "composition",
            Role::RightHolder => "right",
            Role::LicenseHolder => "license",
            Role::Artist => "recording",
            Role::RecordLabel => "release",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Composer => "composer",
            Role::RightHolder => "right holder",
            Role::LicenseHolder => "license holder",
            Role::Artist => "artist",
            Role::RecordLabel => "record label",
        };
        write!(f, "{}", name)
    }
}

/// The signed bytes; field order is part of the wire contract
pub fn proof_message(challenge: &str, claimant_id: &str, target_id: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(challenge.len() + claimant_id.len() + target_id.len());
    message.extend_from_slice(challenge.as_bytes());
    message.extend_from_slice(claimant_id.as_bytes());
    message.extend_from_slice(target_id.as_bytes());
    message
}

/// Prove: Role × Challenge × ClaimantId × TargetId × SecretKey → Signature
///
/// The role is not part of the signed message: the same signature answers a
/// challenge for any role the claimant holds at the target.
pub fn prove(
    role: Role,
    challenge: &str,
    claimant_id: &str,
    target_id: &str,
    keypair: &Keypair,
) -> Signature {
    debug!(%role, claimant = claimant_id, target = target_id, "signing role proof");
    keypair.sign(&proof_message(challenge, claimant_id, target_id))
}

/// Verify: Role × Challenge × ClaimantId × TargetId × Signature → {ok, error}
pub fn verify<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    role: Role,
    challenge: &str,
    claimant_id: &str,
    target_id: &str,
    signature: &Signature,
) -> Result<()> {
    let result = check_claim(gateway, config, role, challenge, claimant_id, target_id, signature);
    match &result {
        Ok(()) => info!(%role, claimant = claimant_id, target = target_id, "role proof accepted"),
        Err(err) => debug!(%role, claimant = claimant_id, target = target_id, error = %err, "role proof rejected"),
    }
    result
}

fn check_claim<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    role: Role,
    challenge: &str,
    claimant_id: &str,
    target_id: &str,
    signature: &Signature,
) -> Result<()> {
    // 1. Resolve target
    let (target, data) = resolve_target(gateway, config, target_id)?;
    if data.kind() != role.target_kind() {
        return Err(LedgerError::Lookup(format!(
            "{} is a {}, not a {}",
            target_id,
            data.kind(),
            role.target_kind()
        )));
    }

    // 2. Resolve claimant
    let key = resolve_party_key(gateway, config, claimant_id)?;

    // 3. Apply role rule
    let authorized = match (role, &data) {
        (Role::Composer, AssetData::Composition(c)) => c.composers.iter().any(|id| id == claimant_id),
        (Role::LicenseHolder, AssetData::License(l)) => l.licensees.iter().any(|id| id == claimant_id),
        (Role::RightHolder, AssetData::Right(_)) => holds_right(gateway, config, &target, &key)?,
        (Role::Artist, AssetData::Recording(r)) => {
            r.artists.iter().any(|id| id == claimant_id) && signed_recording(r, &key)
        }
        (Role::RecordLabel, AssetData::Release(_)) => is_sole_owner(&target, &key),
        _ => false,
    };
    if !authorized {
        return Err(LedgerError::Authorization(format!(
            "{} is not a {} of {}",
            claimant_id, role, target_id
        )));
    }

    // 4. Check signature
    if !verify_signature(&key, &proof_message(challenge, claimant_id, target_id), signature) {
        return Err(LedgerError::Signature(format!("proof by {} does not verify", claimant_id)));
    }
    Ok(())
}

/// A target transaction and the asset data it carries or moves
pub fn resolve_target<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    target_id: &str,
) -> Result<(Transaction, AssetData)> {
    let target = fetch_fulfilled_tx(gateway, config, target_id)?;
    let data = match &target.asset {
        Asset::Data(data) => data.clone(),
        Asset::Id(asset_id) => match fetch_fulfilled_tx(gateway, config, asset_id)?.asset {
            Asset::Data(data) => data,
            Asset::Id(_) => return Err(LedgerError::Lookup(format!("asset {} is not a CREATE", asset_id))),
        },
    };
    Ok((target, data))
}

/// Public key recorded in the party CREATE `party_id`
pub fn resolve_party_key<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    party_id: &str,
) -> Result<PublicKey> {
    let tx = fetch_fulfilled_tx(gateway, config, party_id)?;
    match tx.asset_data() {
        Some(AssetData::Party(party)) => Ok(party.public_key),
        Some(other) => Err(LedgerError::Lookup(format!("{} is a {}, not a party", party_id, other.kind()))),
        None => Err(LedgerError::Lookup(format!("{} is not a party CREATE", party_id))),
    }
}

/// The key holds an unspent output of the right asset, alone or jointly
fn holds_right<G: LedgerGateway>(
    gateway: &G,
    config: &LedgerConfig,
    target: &Transaction,
    key: &PublicKey,
) -> Result<bool> {
    let asset_id = target.asset_id();
    let mut history: HashSet<String> = fetch_transfers(gateway, config, asset_id)?
        .into_iter()
        .map(|tx| tx.id)
        .collect();
    history.insert(asset_id.to_string());

    Ok(fetch_outputs(gateway, config, key)?
        .iter()
        .any(|reference| history.contains(&reference.txid)))
}

/// The key contributed a validating signature to the recording's aggregate,
/// which must be a threshold fulfillment even for a single performer
fn signed_recording(recording: &Recording, key: &PublicKey) -> bool {
    let aggregate = match recording.threshold_signature.as_deref().map(unmarshal::<Fulfillment>) {
        Some(Ok(aggregate @ Fulfillment::Threshold { .. })) => aggregate,
        _ => return false,
    };
    contributed(&aggregate, key, &recording.signing_message())
}

fn contributed(fulfillment: &Fulfillment, key: &PublicKey, message: &[u8]) -> bool {
    match fulfillment {
        Fulfillment::Simple { public_key, .. } => {
            public_key == key && validate(fulfillment, message, &derive_condition(key))
        }
        Fulfillment::Threshold { subfulfillments, .. } => subfulfillments
            .iter()
            .any(|sub| contributed(&sub.fulfillment, key, message)),
    }
}

/// Exactly one output, held by exactly this key
fn is_sole_owner(target: &Transaction, key: &PublicKey) -> bool {
    match target.outputs.as_slice() {
        [output] => output.public_keys == [*key],
        _ => false,
    }
}
