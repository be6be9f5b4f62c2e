//! Fixed hash functions used by the locators.
//!
//! Every function here must produce the same value in every process and on
//! every platform: routing tables are rebuilt independently by each client
//! and have to agree.

use std::hash::Hasher;

use sha2::{Digest, Sha256, Sha512};
use siphasher::sip::SipHasher13;

/// Key for the slot hash. Changing it remaps every key.
const SLOT_HASH_KEY: &[u8; 16] = b"0123456789ABCDEF";

/// First eight bytes of a digest, big-endian.
fn leading_u64(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Starting slot of a host's permutation in a table of `table_size` slots.
pub fn permutation_offset(name: &str, table_size: u64) -> u64 {
    leading_u64(&Sha256::digest(name.as_bytes())) % table_size
}

/// Stride of a host's permutation, in `[1, table_size)`.
///
/// `table_size` is prime, so any non-zero stride walks every slot exactly
/// once.
pub fn permutation_skip(name: &str, table_size: u64) -> u64 {
    leading_u64(&Sha512::digest(name.as_bytes())) % (table_size - 1) + 1
}

/// Hash a cache key onto the Maglev lookup table.
pub fn slot_hash(key: &str) -> u64 {
    let mut hasher = SipHasher13::new_with_key(SLOT_HASH_KEY);
    hasher.write(key.as_bytes());
    hasher.finish()
}

/// Hash a cache key for plain modulo routing.
pub fn stable_hash(key: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64(key.as_bytes())
}
