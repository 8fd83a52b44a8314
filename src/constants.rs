//! Rights ledger protocol constants

/// Transaction format version written into every transaction
pub const TX_VERSION: &str = "0.9";

/// Cost of a single-key condition
pub const SIMPLE_CONDITION_COST: u64 = 131_072;

/// Cost added per sub-condition of a threshold condition
pub const THRESHOLD_SUBCONDITION_COST: u64 = 1024;

/// Weight given to each owner of a multi-owner output
pub const DEFAULT_WEIGHT: u32 = 1;

/// Key fingerprint length: HASH160
pub const FINGERPRINT_LEN: usize = 20;

/// Compressed secp256k1 public key length
pub const PUBLIC_KEY_LEN: usize = 33;

/// Compact ECDSA signature length
pub const SIGNATURE_LEN: usize = 64;

/// Text prefix of an encoded condition
pub const CONDITION_PREFIX: &str = "cc";

/// Text prefix of an encoded fulfillment
pub const FULFILLMENT_PREFIX: &str = "cf";

/// Type id of single-key conditions and fulfillments
pub const TYPE_SIMPLE: u8 = 1;

/// Type id of weighted threshold conditions and fulfillments
pub const TYPE_THRESHOLD: u8 = 2;

/// Default per-request gateway timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default attempts made while a write is not yet visible
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default first backoff between visibility retries in milliseconds
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 50;

/// Default cap on a single backoff in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1_000;
