//! Raw token secrets and their stored digests.

use std::fmt;

use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Number of random bytes in a secret.
pub const TOKEN_SECRET_BYTES: usize = 32;

const TOKEN_SECRET_HEX_CHARS: usize = TOKEN_SECRET_BYTES * 2;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// The redeemable half of a token. Only its digest is ever persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret {
    bytes: [u8; TOKEN_SECRET_BYTES],
}

impl TokenSecret {
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; TOKEN_SECRET_BYTES];

        OsRng.fill_bytes(&mut bytes);

        Self { bytes }
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; TOKEN_SECRET_BYTES]) -> Self {
        Self { bytes }
    }

    /// Parse the hex form handed out in links. Accepts either case.
    #[must_use]
    pub fn parse(encoded: &str) -> Option<Self> {
        if encoded.len() != TOKEN_SECRET_HEX_CHARS {
            return None;
        }

        let mut bytes = [0_u8; TOKEN_SECRET_BYTES];

        for (byte, pair) in bytes.iter_mut().zip(encoded.as_bytes().chunks_exact(2)) {
            *byte = (decode_nibble(pair[0])? << 4) | decode_nibble(pair[1])?;
        }

        Some(Self { bytes })
    }

    /// Lowercase hex encoding of the secret.
    #[must_use]
    pub fn expose(&self) -> String {
        encode_hex(&self.bytes)
    }

    /// Digest stored in place of the secret.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut encoded = self.expose();
        let digest = hash_secret(&encoded);

        encoded.zeroize();

        digest
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecret(**redacted**)")
    }
}

impl Drop for TokenSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Lowercase hex SHA-256 of the encoded secret.
#[must_use]
pub fn hash_secret(encoded: &str) -> String {
    encode_hex(&Sha256::digest(encoded.as_bytes()))
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);

    for byte in bytes {
        encoded.push(char::from(HEX[usize::from(byte >> 4)]));
        encoded.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }

    encoded
}

fn decode_nibble(value: u8) -> Option<u8> {
    match value {
        b'0'..=b'9' => Some(value - b'0'),
        b'a'..=b'f' => Some(value - b'a' + 10),
        b'A'..=b'F' => Some(value - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_64_lowercase_hex_chars() {
        let secret = TokenSecret::generate();
        let encoded = secret.expose();

        assert_eq!(encoded.len(), 64);
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
            "secret should be lowercase hex"
        );
    }

    #[test]
    fn parse_accepts_the_exposed_form() {
        let secret = TokenSecret::from_bytes([0xAB; TOKEN_SECRET_BYTES]);
        let parsed = TokenSecret::parse(&secret.expose());

        assert_eq!(parsed, Some(secret));
    }

    #[test]
    fn parse_rejects_wrong_length_and_non_hex() {
        assert!(TokenSecret::parse("abcd").is_none());
        assert!(TokenSecret::parse(&"zz".repeat(TOKEN_SECRET_BYTES)).is_none());
    }

    #[test]
    fn digest_is_sha256_of_the_hex_secret() {
        let secret = TokenSecret::from_bytes([0; TOKEN_SECRET_BYTES]);

        assert_eq!(secret.digest(), hash_secret(&"0".repeat(64)));
        assert_eq!(secret.digest().len(), 64);
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = TokenSecret::from_bytes([0xCD; TOKEN_SECRET_BYTES]);

        assert_eq!(format!("{secret:?}"), "TokenSecret(**redacted**)");
    }
}
