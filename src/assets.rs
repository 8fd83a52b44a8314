//! Music-rights asset records carried as CREATE asset data
//!
//! Every cross reference (`composers`, `licensees`, `right_to`, ...) is the id
//! of another ledger transaction. Parties are referenced by the id of the
//! CREATE transaction holding their [`Party`] record.

use crate::codec::marshal;
use crate::crypto::{Keypair, PublicKey};
use crate::fulfillment::{fulfill_from_key, Fulfillment};
use crate::types::canonical_json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetData {
    Party(Party),
    Composition(Composition),
    Right(Right),
    License(License),
    Recording(Recording),
    Release(Release),
}

impl AssetData {
    pub fn kind(&self) -> &'static str {
        match self {
            AssetData::Party(_) => "party",
            AssetData::Composition(_) => "composition",
            AssetData::Right(_) => "right",
            AssetData::License(_) => "license",
            AssetData::Recording(_) => "recording",
            AssetData::Release(_) => "release",
        }
    }
}

/// An identity and the key it signs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub public_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    pub title: String,
    pub composers: Vec<String>,
    pub publisher: Option<String>,
    pub iswc: Option<String>,
    pub language: Option<String>,
}

impl Composition {
    pub fn new(title: impl Into<String>, composers: Vec<String>) -> Self {
        Self {
            title: title.into(),
            composers,
            publisher: None,
            iswc: None,
            language: None,
        }
    }
}

/// A share of the rights to a composition or recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Right {
    pub right_holders: Vec<String>,
    pub right_to: String,
    /// The TRANSFER that moved the share this right documents
    pub transfer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub license_for: Vec<String>,
    pub licensees: Vec<String>,
    pub licenser: String,
    pub rights: Vec<String>,
    pub valid_from: String,
    pub valid_through: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub artists: Vec<String>,
    pub recording_of: String,
    pub license: Option<String>,
    pub record_label: Option<String>,
    pub isrc: Option<String>,
    pub duration: Option<String>,
    /// Aggregate of every artist's signature over [`Recording::signing_message`]
    pub threshold_signature: Option<String>,
}

impl Recording {
    pub fn new(artists: Vec<String>, recording_of: impl Into<String>) -> Self {
        Self {
            artists,
            recording_of: recording_of.into(),
            license: None,
            record_label: None,
            isrc: None,
            duration: None,
            threshold_signature: None,
        }
    }

    /// Bytes each artist signs: this record with no threshold signature
    pub fn signing_message(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.threshold_signature = None;
        canonical_json(&unsigned)
    }

    /// One artist's contribution to the aggregate signature
    pub fn sign(&self, keypair: &Keypair) -> Fulfillment {
        fulfill_from_key(&self.signing_message(), keypair)
    }

    pub fn with_threshold_signature(mut self, fulfillment: &Fulfillment) -> Self {
        self.threshold_signature = Some(marshal(fulfillment));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub title: String,
    pub recordings: Vec<String>,
    pub record_label: String,
    pub rights: Vec<String>,
}
