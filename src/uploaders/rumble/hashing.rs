//! Password hashes expected by the login endpoint.
//!
//! This mirrors the site's client-side login script and has to match it bit for
//! bit: strings are packed little-endian into 32-bit words (zero padded to a
//! word boundary) before every MD5, and each stretch round rehashes the hex of
//! the previous digest followed by the packed, unsalted secret.

use crate::core::{Result, UploadError};

pub const DEFAULT_ROUNDS: usize = 1024;
pub const LOGIN_ROUNDS: usize = 128;

/// Packs the bytes of `s` into little-endian 32-bit words.
pub fn str_bin(s: &str) -> Vec<u32> {
    let bytes = s.as_bytes();
    let mut words = vec![0u32; bytes.len().div_ceil(4)];
    for (i, byte) in bytes.iter().enumerate() {
        words[i >> 2] |= (*byte as u32) << ((i & 3) * 8);
    }
    words
}

fn bin_hash(words: &[u32]) -> [u32; 4] {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let digest = md5::compute(bytes);

    let mut hash = [0u32; 4];
    for (i, chunk) in digest.0.chunks_exact(4).enumerate() {
        hash[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    hash
}

fn bin_hex(hash: &[u32; 4]) -> String {
    let bytes: Vec<u8> = hash.iter().flat_map(|w| w.to_le_bytes()).collect();
    hex::encode(bytes)
}

fn bin_hash_stretch(secret: &str, salt: &str, rounds: usize) -> [u32; 4] {
    let rounds = if rounds == 0 { DEFAULT_ROUNDS } else { rounds };
    let packed_secret = str_bin(secret);
    let mut hash = bin_hash(&str_bin(&format!("{salt}{secret}")));

    for _ in 0..rounds {
        // 32 hex chars pack into exactly 8 words; the secret follows at word 8
        let mut words = str_bin(&bin_hex(&hash));
        words.extend_from_slice(&packed_secret);
        hash = bin_hash(&words);
    }

    hash
}

/// Hex digest of the key stretch. `rounds == 0` means `DEFAULT_ROUNDS`.
pub fn hash_stretch(secret: &str, salt: &str, rounds: usize) -> String {
    bin_hex(&bin_hash_stretch(secret, salt, rounds))
}

/// Plain MD5 hex of `s`.
pub fn md5_hex(s: &str) -> String {
    format!("{:x}", md5::compute(s.as_bytes()))
}

/// `password_hashes` value for the login form, built from the server's salts.
pub fn password_hashes(password: &str, salts: &[String]) -> Result<String> {
    if salts.len() < 3 {
        return Err(UploadError::protocol(format!(
            "expected 3 login salts, got {}",
            salts.len()
        )));
    }

    let hashes = [
        md5_hex(&format!(
            "{}{}",
            hash_stretch(password, &salts[0], LOGIN_ROUNDS),
            salts[1]
        )),
        hash_stretch(password, &salts[2], LOGIN_ROUNDS),
        salts[1].clone(),
    ];

    Ok(hashes.join(","))
}
