//! Lock-and-key challenge response.
//!
//! The registration endpoint only issues a token when the `LockAndKey` header
//! carries the exact value computed here. Any deviation is rejected, so the
//! tests pin it to known outputs.

use sha2::{Digest, Sha256};

/// Application id presented during the handshake.
pub const APP_ID: &str = "msmsgs@msnmsgr.com";

/// Shared secret mixed into the challenge hash.
pub const APP_KEY: &str = "Q1P7W2E4J9R8U3S5";

const MODULUS: u64 = 0x7FFF_FFFF;
const MULTIPLIER: u64 = 242_854_337;

/// Compute the `lockAndKeyResponse` for a challenge (the current unix time as a
/// decimal string) with the given application id and key.
///
/// # Example
///
/// ```
/// use skyconn_client::handshake::{APP_ID, APP_KEY, lock_and_key_response};
///
/// assert_eq!(
///     lock_and_key_response("1700000000", APP_ID, APP_KEY),
///     "abe5fadd8fa2021a9041e263584ea4ab"
/// );
/// ```
pub fn lock_and_key_response(challenge: &str, app_id: &str, key: &str) -> String {
    let mut clear = format!("{}{}", challenge, app_id).into_bytes();
    // Always pads, adding a full block when already aligned.
    let pad = 8 - clear.len() % 8;
    clear.extend(std::iter::repeat_n(b'0', pad));

    let words: Vec<u32> = clear
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let digest = Sha256::digest(format!("{}{}", challenge, key).as_bytes());
    let sha: Vec<u32> = digest[..16]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let (mac, sum) = checksum(&words, [sha[0], sha[1], sha[2], sha[3]]);

    [sha[0] ^ mac, sha[1] ^ sum, sha[2] ^ mac, sha[3] ^ sum]
        .iter()
        .map(|word| hex::encode(word.to_le_bytes()))
        .collect()
}

/// Fold the challenge words pairwise through two LCG steps per pair.
fn checksum(words: &[u32], seed: [u32; 4]) -> (u32, u32) {
    let a = u64::from(seed[0]) & MODULUS;
    let b = u64::from(seed[1]) & MODULUS;
    let c = u64::from(seed[2]) & MODULUS;
    let d = u64::from(seed[3]) & MODULUS;

    let mut mac: u64 = 0;
    let mut sum: u64 = 0;
    for pair in words.chunks_exact(2) {
        let datum = (u64::from(pair[0]) * MULTIPLIER) % MODULUS;
        mac = ((mac + datum) * a + b) % MODULUS;
        sum += mac;
        mac = ((mac + u64::from(pair[1])) * c + d) % MODULUS;
        sum += mac;
    }

    mac = (mac + b) % MODULUS;
    sum = (sum + d) % MODULUS;
    (mac as u32, sum as u32)
}
