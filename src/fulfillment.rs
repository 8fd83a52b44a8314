//! Fulfillment construction and validation

use crate::condition::{derive_condition, Condition, WeightedCondition};
use crate::crypto::{verify_signature, Keypair, PublicKey};
use secp256k1::ecdsa::Signature;

/// Fulfillment: a witness mirroring the shape of a [`Condition`]
///
/// A simple fulfillment carries the signer's public key because the
/// condition only records the key's fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fulfillment {
    Simple {
        public_key: PublicKey,
        signature: Signature,
    },
    Threshold {
        threshold: u32,
        subfulfillments: Vec<WeightedFulfillment>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeightedFulfillment {
    pub weight: u32,
    pub fulfillment: Fulfillment,
}

impl Fulfillment {
    pub fn type_id(&self) -> u8 {
        match self {
            Fulfillment::Simple { .. } => crate::constants::TYPE_SIMPLE,
            Fulfillment::Threshold { .. } => crate::constants::TYPE_THRESHOLD,
        }
    }

    /// Condition this fulfillment was built for, as far as its shape tells.
    /// For a threshold, only the present sub-fulfillments appear.
    pub fn condition(&self) -> Condition {
        match self {
            Fulfillment::Simple { public_key, .. } => derive_condition(public_key),
            Fulfillment::Threshold { threshold, subfulfillments } => Condition::Threshold {
                threshold: *threshold,
                subconditions: subfulfillments
                    .iter()
                    .map(|s| WeightedCondition {
                        weight: s.weight,
                        condition: s.fulfillment.condition(),
                    })
                    .collect(),
            },
        }
    }

    /// Every simple signer found anywhere in this fulfillment, depth first
    pub fn signers(&self) -> Vec<PublicKey> {
        match self {
            Fulfillment::Simple { public_key, .. } => vec![*public_key],
            Fulfillment::Threshold { subfulfillments, .. } => subfulfillments
                .iter()
                .flat_map(|s| s.fulfillment.signers())
                .collect(),
        }
    }
}

/// FulfillFromKey: 𝕊 × SK → Fulfillment::Simple
pub fn fulfill_from_key(message: &[u8], keypair: &Keypair) -> Fulfillment {
    Fulfillment::Simple {
        public_key: keypair.public_key(),
        signature: keypair.sign(message),
    }
}

/// CombineThreshold: Fulfillment* × ℕ* × ℕ → Fulfillment::Threshold
///
/// Pure composition; nothing is validated here.
///
/// # Panics
///
/// If `subfulfillments` and `weights` differ in length.
pub fn combine_threshold(
    subfulfillments: Vec<Fulfillment>,
    weights: &[u32],
    threshold: u32,
) -> Fulfillment {
    assert_eq!(
        subfulfillments.len(),
        weights.len(),
        "one weight is required per sub-fulfillment"
    );
    Fulfillment::Threshold {
        threshold,
        subfulfillments: subfulfillments
            .into_iter()
            .zip(weights.iter())
            .map(|(fulfillment, weight)| WeightedFulfillment { weight: *weight, fulfillment })
            .collect(),
    }
}

/// Validate: Fulfillment × 𝕊 × Condition → {true, false}
///
/// 1. Simple against simple: the signer's derived condition equals the
///    expected one and the signature verifies over `message`
/// 2. Threshold against threshold: each sub-fulfillment claims at most one
///    unused sub-condition slot with the same weight that it validates
///    against; the claimed slot weights must reach the expected threshold
/// 3. Any other pairing fails
pub fn validate(fulfillment: &Fulfillment, message: &[u8], condition: &Condition) -> bool {
    match (fulfillment, condition) {
        (Fulfillment::Simple { public_key, signature }, Condition::Simple { .. }) => {
            derive_condition(public_key) == *condition && verify_signature(public_key, message, signature)
        }
        (
            Fulfillment::Threshold { subfulfillments, .. },
            Condition::Threshold { threshold, subconditions },
        ) => {
            if *threshold == 0 {
                return false;
            }
            let mut claimed = vec![false; subconditions.len()];
            let mut weight_sum: u64 = 0;

            for sub in subfulfillments {
                let slot = subconditions.iter().enumerate().position(|(i, slot)| {
                    !claimed[i]
                        && slot.weight == sub.weight
                        && validate(&sub.fulfillment, message, &slot.condition)
                });
                if let Some(i) = slot {
                    claimed[i] = true;
                    weight_sum += subconditions[i].weight as u64;
                }
            }

            weight_sum >= *threshold as u64
        }
        _ => false,
    }
}
