//! Spending conditions derived from public keys

use crate::constants::*;
use crate::crypto::{key_fingerprint, PublicKey};

/// Condition: a requirement an output places on whoever spends it
///
/// - `Simple`: a signature from the key whose HASH160 is `fingerprint`
/// - `Threshold`: weighted sub-conditions whose satisfied weights reach `threshold`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Simple {
        fingerprint: [u8; FINGERPRINT_LEN],
        cost: u64,
    },
    Threshold {
        threshold: u32,
        subconditions: Vec<WeightedCondition>,
    },
}

/// One slot of a threshold condition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeightedCondition {
    pub weight: u32,
    pub condition: Condition,
}

impl Condition {
    pub fn type_id(&self) -> u8 {
        match self {
            Condition::Simple { .. } => TYPE_SIMPLE,
            Condition::Threshold { .. } => TYPE_THRESHOLD,
        }
    }

    /// Cost: fixed for simple conditions; for thresholds the sum of the
    /// `threshold` most expensive sub-conditions plus a per-slot charge
    pub fn cost(&self) -> u64 {
        match self {
            Condition::Simple { cost, .. } => *cost,
            Condition::Threshold { threshold, subconditions } => {
                let mut costs: Vec<u64> = subconditions.iter().map(|s| s.condition.cost()).collect();
                costs.sort_unstable_by(|a, b| b.cmp(a));
                let top = costs
                    .iter()
                    .take(*threshold as usize)
                    .fold(0u64, |acc, c| acc.saturating_add(*c));
                top.saturating_add(THRESHOLD_SUBCONDITION_COST.saturating_mul(subconditions.len() as u64))
            }
        }
    }

    /// A threshold nobody can reach, or a zero threshold, is never produced
    /// by derivation and is refused by the decoder.
    pub fn is_satisfiable(&self) -> bool {
        match self {
            Condition::Simple { .. } => true,
            Condition::Threshold { threshold, subconditions } => {
                let total = subconditions
                    .iter()
                    .fold(0u64, |acc, s| acc.saturating_add(s.weight as u64));
                *threshold > 0
                    && total >= *threshold as u64
                    && subconditions.iter().all(|s| s.weight > 0 && s.condition.is_satisfiable())
            }
        }
    }
}

/// DeriveCondition: PublicKey → Condition::Simple
pub fn derive_condition(public_key: &PublicKey) -> Condition {
    Condition::Simple {
        fingerprint: key_fingerprint(public_key),
        cost: SIMPLE_CONDITION_COST,
    }
}

/// DeriveThresholdCondition: PublicKey* × ℕ → Condition::Threshold
///
/// One simple sub-condition per key, in key order, each with weight 1.
///
/// # Panics
///
/// If `public_keys` is empty or `threshold` is outside `1..=public_keys.len()`.
pub fn derive_threshold_condition(public_keys: &[PublicKey], threshold: u32) -> Condition {
    assert!(!public_keys.is_empty(), "threshold condition needs at least one key");
    assert!(
        threshold >= 1 && threshold as usize <= public_keys.len(),
        "threshold {} out of range for {} keys",
        threshold,
        public_keys.len()
    );
    Condition::Threshold {
        threshold,
        subconditions: public_keys
            .iter()
            .map(|pk| WeightedCondition {
                weight: DEFAULT_WEIGHT,
                condition: derive_condition(pk),
            })
            .collect(),
    }
}

/// Condition guarding an output held by `owners`: a single owner gets a
/// simple condition, several owners must all co-sign (n-of-n).
///
/// # Panics
///
/// If `owners` is empty.
pub fn condition_for_owners(owners: &[PublicKey]) -> Condition {
    match owners {
        [] => panic!("an output needs at least one owner"),
        [owner] => derive_condition(owner),
        _ => derive_threshold_condition(owners, owners.len() as u32),
    }
}
