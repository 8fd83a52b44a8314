//! Core ledger types

use crate::assets::AssetData;
use crate::condition::Condition;
use crate::crypto::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Schema-free transaction metadata, kept sorted so serialization is stable
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// OutputRef: 𝒪 = TxId × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub txid: String,
    pub output: u32,
}

impl OutputRef {
    pub fn new(txid: impl Into<String>, output: u32) -> Self {
        Self { txid: txid.into(), output }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Transfer,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Transfer => write!(f, "TRANSFER"),
        }
    }
}

/// Asset: inline data for CREATE, a reference to the CREATE id for TRANSFER
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Data(AssetData),
    Id(String),
}

/// Input: ℐ = Fulfillment? × 𝒪? × PublicKey*
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub fulfillment: Option<String>,
    pub fulfills: Option<OutputRef>,
    pub owners_before: Vec<PublicKey>,
}

/// Output: 𝒯 = ℕ × Condition × PublicKey*
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub amount: u64,
    pub condition: Condition,
    pub public_keys: Vec<PublicKey>,
}

/// Transaction: 𝒯𝒳 = Id × Version × Operation × Asset × ℐ* × 𝒯* × Metadata?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub version: String,
    pub operation: Operation,
    pub asset: Asset,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub metadata: Option<Metadata>,
}

impl Transaction {
    /// Id of the asset this transaction creates or moves
    pub fn asset_id(&self) -> &str {
        match &self.asset {
            Asset::Data(_) => &self.id,
            Asset::Id(id) => id,
        }
    }

    pub fn asset_data(&self) -> Option<&AssetData> {
        match &self.asset {
            Asset::Data(data) => Some(data),
            Asset::Id(_) => None,
        }
    }

    pub fn total_output_amount(&self) -> u64 {
        self.outputs.iter().fold(0u64, |acc, o| acc.saturating_add(o.amount))
    }

    /// Reference to output `index` of this transaction
    pub fn output_ref(&self, index: u32) -> OutputRef {
        OutputRef::new(self.id.clone(), index)
    }
}

/// Amount and owners of one output to be built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub amount: u64,
    pub owners: Vec<PublicKey>,
}

impl OutputSpec {
    pub fn new(amount: u64, owners: Vec<PublicKey>) -> Self {
        Self { amount, owners }
    }

    pub fn single(amount: u64, owner: PublicKey) -> Self {
        Self { amount, owners: vec![owner] }
    }
}

/// How several new owners of a CREATE share it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoOwnership {
    /// One output slot held jointly under an n-of-n threshold condition
    Shared(u64),
    /// One output slot per owner, amounts given in owner order
    Separate(Vec<u64>),
}

/// Canonical JSON bytes: struct fields in declaration order, map keys sorted
pub(crate) fn canonical_json<T: Serialize>(value: &T) -> Vec<u8> {
    // Every type passed here has string map keys.
    serde_json::to_vec(value).expect("ledger types always serialize to JSON")
}
