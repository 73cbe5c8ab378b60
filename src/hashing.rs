//! Blake2b helpers shared by the QR schema tree, SS58 checksums and substrate
//! payload hashing.

use blake2::{Blake2b, Blake2b512, Digest};
use typenum::{U16, U32};

/// Computes a Blake2b 256-bit hash of the provided data
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut blake = Blake2b::<U32>::new();
    blake.update(data);
    let hash = blake.finalize();
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// Blake2b 128-bit hash, as used by substrate `Blake2_128Concat` storage keys.
pub fn blake2b_128(data: &[u8]) -> [u8; 16] {
    let mut blake = Blake2b::<U16>::new();
    blake.update(data);
    let hash = blake.finalize();
    let mut result = [0u8; 16];
    result.copy_from_slice(&hash);
    result
}

/// Blake2b-512 over the concatenation of `parts`.
pub fn blake2b_512(parts: &[&[u8]]) -> [u8; 64] {
    let mut blake = Blake2b512::new();
    for part in parts {
        blake.update(part);
    }
    let hash = blake.finalize();
    let mut result = [0u8; 64];
    result.copy_from_slice(&hash);
    result
}
