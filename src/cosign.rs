//! Cooperative multi-party signing: sign → collect → aggregate
//!
//! Each co-owner signs the same message on their own and hands the fragment
//! over out of band. The session only accepts fragments that validate, and
//! aggregates once the collected weight reaches the threshold.

use crate::condition::{condition_for_owners, Condition};
use crate::crypto::PublicKey;
use crate::error::{LedgerError, Result};
use crate::fulfillment::{combine_threshold, validate, Fulfillment};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CosignSession {
    message: Vec<u8>,
    threshold: u32,
    slots: Vec<(u32, Condition)>,
    fragments: Vec<Option<Fulfillment>>,
}

impl CosignSession {
    /// Session collecting fragments for a threshold `condition` over `message`
    pub fn new(message: Vec<u8>, condition: Condition) -> Result<Self> {
        match condition {
            Condition::Threshold { threshold, subconditions } => {
                let slots: Vec<(u32, Condition)> =
                    subconditions.into_iter().map(|s| (s.weight, s.condition)).collect();
                Ok(Self {
                    message,
                    threshold,
                    fragments: vec![None; slots.len()],
                    slots,
                })
            }
            Condition::Simple { .. } => Err(LedgerError::Construction(
                "cosigning needs a threshold condition".to_string(),
            )),
        }
    }

    /// Session for an output jointly held by `owners` (every owner must sign)
    pub fn for_owners(message: Vec<u8>, owners: &[PublicKey]) -> Result<Self> {
        if owners.len() < 2 {
            return Err(LedgerError::Construction("cosigning needs at least two owners".to_string()));
        }
        Self::new(message, condition_for_owners(owners))
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Add one co-owner's fragment, returning the slot it filled
    ///
    /// - `Authorization` if the signer holds no open slot
    /// - `Signature` if the signer holds a slot but the fragment does not validate
    pub fn add_fragment(&mut self, fragment: Fulfillment) -> Result<usize> {
        let fragment_condition = fragment.condition();
        let mut owns_a_slot = false;

        for (i, (_, slot)) in self.slots.iter().enumerate() {
            if self.fragments[i].is_some() {
                continue;
            }
            if *slot == fragment_condition || matches!(slot, Condition::Threshold { .. }) {
                owns_a_slot |= *slot == fragment_condition;
                if validate(&fragment, &self.message, slot) {
                    debug!(slot = i, "accepted cosign fragment");
                    self.fragments[i] = Some(fragment);
                    return Ok(i);
                }
            }
        }

        if owns_a_slot {
            Err(LedgerError::Signature("fragment does not sign the session message".to_string()))
        } else {
            Err(LedgerError::Authorization("fragment signer holds no open slot".to_string()))
        }
    }

    pub fn collected_weight(&self) -> u64 {
        self.slots
            .iter()
            .zip(&self.fragments)
            .filter(|(_, f)| f.is_some())
            .fold(0u64, |acc, ((weight, _), _)| acc + *weight as u64)
    }

    pub fn is_ready(&self) -> bool {
        self.collected_weight() >= self.threshold as u64
    }

    /// Combine collected fragments, in condition order, into one fulfillment
    pub fn aggregate(&self) -> Result<Fulfillment> {
        if !self.is_ready() {
            return Err(LedgerError::FulfillmentMismatch(format!(
                "collected weight {} below threshold {}",
                self.collected_weight(),
                self.threshold
            )));
        }
        let (subs, weights): (Vec<Fulfillment>, Vec<u32>) = self
            .slots
            .iter()
            .zip(&self.fragments)
            .filter_map(|((weight, _), f)| f.clone().map(|f| (f, *weight)))
            .unzip();
        Ok(combine_threshold(subs, &weights, self.threshold))
    }
}
