//! Canonical binary and text encodings of conditions and fulfillments
//!
//! Binary (big-endian, fixed width):
//! - Condition::Simple:      0x01 | fingerprint[20] | cost u64
//! - Condition::Threshold:   0x02 | threshold u32 | count u32 | (weight u32 | Condition)*
//! - Fulfillment::Simple:    0x01 | public_key[33] | signature[64]
//! - Fulfillment::Threshold: 0x02 | threshold u32 | count u32 | (weight u32 | Fulfillment)*
//!
//! Text:
//! - `cc:<type>:<base64url(body)>:<cost>`
//! - `cf:<type>:<base64url(body)>`
//!
//! where `body` is the binary form without its leading type byte. Every value
//! has exactly one encoding; decoders refuse anything that would re-encode
//! differently.

use crate::condition::{Condition, WeightedCondition};
use crate::constants::*;
use crate::crypto::PublicKey;
use crate::error::{Expected, LedgerError, Result};
use crate::fulfillment::{Fulfillment, WeightedFulfillment};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secp256k1::ecdsa::Signature;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deepest nesting of threshold values accepted from the wire
pub const MAX_NESTING_DEPTH: usize = 16;

/// Values with a canonical text URI
pub trait UriCodec: Sized {
    fn to_uri(&self) -> String;
    fn from_uri(uri: &str) -> Result<Self>;
}

/// Marshal: Condition ∪ Fulfillment → 𝕊
///
/// Every value encodes, but a condition only decodes again when
/// [`Condition::is_satisfiable`] holds: a threshold of 0, a zero weight or a
/// threshold above the total weight is written out and then refused by
/// [`unmarshal`] with an `Encoding` error.
pub fn marshal<T: UriCodec>(value: &T) -> String {
    value.to_uri()
}

/// Unmarshal: 𝕊 → Condition ∪ Fulfillment
///
/// Refuses non-canonical text and conditions that can never be met.
pub fn unmarshal<T: UriCodec>(uri: &str) -> Result<T> {
    T::from_uri(uri)
}

// ============================================================================
// BINARY FORM
// ============================================================================

pub fn condition_to_bytes(condition: &Condition) -> Vec<u8> {
    let mut buf = Vec::new();
    write_condition(condition, &mut buf);
    buf
}

pub fn condition_from_bytes(bytes: &[u8]) -> Result<Condition> {
    let mut reader = Reader::new(bytes, Expected::Condition);
    let condition = read_condition(&mut reader, 0)?;
    reader.finish()?;
    Ok(condition)
}

pub fn fulfillment_to_bytes(fulfillment: &Fulfillment) -> Vec<u8> {
    let mut buf = Vec::new();
    write_fulfillment(fulfillment, &mut buf);
    buf
}

pub fn fulfillment_from_bytes(bytes: &[u8]) -> Result<Fulfillment> {
    let mut reader = Reader::new(bytes, Expected::Fulfillment);
    let fulfillment = read_fulfillment(&mut reader, 0)?;
    reader.finish()?;
    Ok(fulfillment)
}

fn write_condition(condition: &Condition, buf: &mut Vec<u8>) {
    buf.push(condition.type_id());
    match condition {
        Condition::Simple { fingerprint, cost } => {
            buf.extend_from_slice(fingerprint);
            buf.extend_from_slice(&cost.to_be_bytes());
        }
        Condition::Threshold { threshold, subconditions } => {
            buf.extend_from_slice(&threshold.to_be_bytes());
            buf.extend_from_slice(&(subconditions.len() as u32).to_be_bytes());
            for sub in subconditions {
                buf.extend_from_slice(&sub.weight.to_be_bytes());
                write_condition(&sub.condition, buf);
            }
        }
    }
}

fn write_fulfillment(fulfillment: &Fulfillment, buf: &mut Vec<u8>) {
    buf.push(fulfillment.type_id());
    match fulfillment {
        Fulfillment::Simple { public_key, signature } => {
            buf.extend_from_slice(&public_key.serialize());
            buf.extend_from_slice(&signature.serialize_compact());
        }
        Fulfillment::Threshold { threshold, subfulfillments } => {
            buf.extend_from_slice(&threshold.to_be_bytes());
            buf.extend_from_slice(&(subfulfillments.len() as u32).to_be_bytes());
            for sub in subfulfillments {
                buf.extend_from_slice(&sub.weight.to_be_bytes());
                write_fulfillment(&sub.fulfillment, buf);
            }
        }
    }
}

fn read_condition(reader: &mut Reader<'_>, depth: usize) -> Result<Condition> {
    if depth > MAX_NESTING_DEPTH {
        return Err(reader.error("nesting too deep"));
    }
    match reader.read_u8()? {
        TYPE_SIMPLE => {
            let fingerprint = reader.read_array::<FINGERPRINT_LEN>()?;
            let cost = reader.read_u64()?;
            Ok(Condition::Simple { fingerprint, cost })
        }
        TYPE_THRESHOLD => {
            let threshold = reader.read_u32()?;
            let count = reader.read_u32()?;
            let mut subconditions = Vec::new();
            for _ in 0..count {
                let weight = reader.read_u32()?;
                let condition = read_condition(reader, depth + 1)?;
                subconditions.push(WeightedCondition { weight, condition });
            }
            Ok(Condition::Threshold { threshold, subconditions })
        }
        other => Err(reader.error(format!("unknown type {}", other))),
    }
}

fn read_fulfillment(reader: &mut Reader<'_>, depth: usize) -> Result<Fulfillment> {
    if depth > MAX_NESTING_DEPTH {
        return Err(reader.error("nesting too deep"));
    }
    match reader.read_u8()? {
        TYPE_SIMPLE => {
            let key_bytes = reader.read_array::<PUBLIC_KEY_LEN>()?;
            let signature_bytes = reader.read_array::<SIGNATURE_LEN>()?;
            let public_key = PublicKey::from_slice(&key_bytes)
                .map_err(|e| reader.error(format!("bad public key: {}", e)))?;
            let signature = Signature::from_compact(&signature_bytes)
                .map_err(|e| reader.error(format!("bad signature: {}", e)))?;
            Ok(Fulfillment::Simple { public_key, signature })
        }
        TYPE_THRESHOLD => {
            let threshold = reader.read_u32()?;
            let count = reader.read_u32()?;
            let mut subfulfillments = Vec::new();
            for _ in 0..count {
                let weight = reader.read_u32()?;
                let fulfillment = read_fulfillment(reader, depth + 1)?;
                subfulfillments.push(WeightedFulfillment { weight, fulfillment });
            }
            Ok(Fulfillment::Threshold { threshold, subfulfillments })
        }
        other => Err(reader.error(format!("unknown type {}", other))),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    expected: Expected,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], expected: Expected) -> Self {
        Self { bytes, pos: 0, expected }
    }

    fn error(&self, reason: impl Into<String>) -> LedgerError {
        LedgerError::encoding(self.expected, reason)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(self.error("truncated input")),
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array::<8>()?))
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(self.error(format!("{} trailing bytes", self.bytes.len() - self.pos)));
        }
        Ok(())
    }
}

// ============================================================================
// TEXT FORM
// ============================================================================

impl UriCodec for Condition {
    fn to_uri(&self) -> String {
        let bytes = condition_to_bytes(self);
        format!(
            "{}:{}:{}:{}",
            CONDITION_PREFIX,
            self.type_id(),
            URL_SAFE_NO_PAD.encode(&bytes[1..]),
            self.cost()
        )
    }

    fn from_uri(uri: &str) -> Result<Self> {
        let fail = |reason: &str| LedgerError::encoding(Expected::Condition, reason);

        let parts: Vec<&str> = uri.split(':').collect();
        if parts.len() != 4 {
            return Err(fail("expected cc:<type>:<payload>:<cost>"));
        }
        if parts[0] != CONDITION_PREFIX {
            return Err(fail("missing cc prefix"));
        }
        let type_id = parse_type(parts[1], Expected::Condition)?;
        let mut bytes = vec![type_id];
        bytes.extend(decode_payload(parts[2], Expected::Condition)?);
        let condition = condition_from_bytes(&bytes)?;

        let cost: u64 = parts[3].parse().map_err(|_| fail("cost is not a number"))?;
        if cost != condition.cost() {
            return Err(fail("stated cost does not match condition"));
        }
        if !condition.is_satisfiable() {
            return Err(fail("threshold can never be reached"));
        }
        if condition.to_uri() != uri {
            return Err(fail("non-canonical encoding"));
        }
        Ok(condition)
    }
}

impl UriCodec for Fulfillment {
    fn to_uri(&self) -> String {
        let bytes = fulfillment_to_bytes(self);
        format!(
            "{}:{}:{}",
            FULFILLMENT_PREFIX,
            self.type_id(),
            URL_SAFE_NO_PAD.encode(&bytes[1..])
        )
    }

    fn from_uri(uri: &str) -> Result<Self> {
        let fail = |reason: &str| LedgerError::encoding(Expected::Fulfillment, reason);

        let parts: Vec<&str> = uri.split(':').collect();
        if parts.len() != 3 {
            return Err(fail("expected cf:<type>:<payload>"));
        }
        if parts[0] != FULFILLMENT_PREFIX {
            return Err(fail("missing cf prefix"));
        }
        let type_id = parse_type(parts[1], Expected::Fulfillment)?;
        let mut bytes = vec![type_id];
        bytes.extend(decode_payload(parts[2], Expected::Fulfillment)?);
        let fulfillment = fulfillment_from_bytes(&bytes)?;

        if fulfillment.to_uri() != uri {
            return Err(fail("non-canonical encoding"));
        }
        Ok(fulfillment)
    }
}

fn parse_type(text: &str, expected: Expected) -> Result<u8> {
    match text {
        "1" => Ok(TYPE_SIMPLE),
        "2" => Ok(TYPE_THRESHOLD),
        other => Err(LedgerError::encoding(expected, format!("unknown type {}", other))),
    }
}

fn decode_payload(text: &str, expected: Expected) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| LedgerError::encoding(expected, format!("bad base64 payload: {}", e)))
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for Condition {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Condition::from_uri(s)
    }
}

impl fmt::Display for Fulfillment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for Fulfillment {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Fulfillment::from_uri(s)
    }
}

// Conditions travel inside transaction JSON as their text URI.
impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_uri())
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        Condition::from_uri(&uri).map_err(de::Error::custom)
    }
}
