use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{DiniError, Result};

/// Hash de 256 bits usado para identificar blocos e transações
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// Creates a zeroed hash
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Creates a hash from a 32-byte array
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the hash
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes the SHA-256 hash of the provided data
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Verifica se o hash atende à dificuldade especificada
    /// (número de dígitos hexadecimais zero no início)
    #[must_use]
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.leading_zero_digits() >= difficulty
    }

    /// Conta os dígitos hexadecimais zero no início do hash
    #[must_use]
    pub fn leading_zero_digits(&self) -> usize {
        let mut zeros = 0;
        for &byte in &self.0 {
            if byte == 0 {
                zeros += 2;
            } else {
                if byte >> 4 == 0 {
                    zeros += 1;
                }
                break;
            }
        }
        zeros
    }

    /// Representação hexadecimal minúscula (64 caracteres)
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Reconstrói o hash a partir de 64 caracteres hexadecimais
    ///
    /// # Errors
    ///
    /// Retorna erro se a string não for hexadecimal válida de 32 bytes
    pub fn from_hex(hex_string: &str) -> Result<Self> {
        let bytes = hex::decode(hex_string).map_err(|_| DiniError::InvalidHash)?;
        let hash: [u8; 32] = bytes.try_into().map_err(|_| DiniError::InvalidHash)?;
        Ok(Self(hash))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let hex_string = String::deserialize(deserializer)?;
        Self::from_hex(&hex_string).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_creation_and_display() {
        let hash = Hash256::zero();
        assert_eq!(
            hash.to_string(),
            "0000000000000000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_sha256_is_deterministic() {
        let data = b"hello world";
        assert_eq!(Hash256::sha256(data), Hash256::sha256(data));
        assert_ne!(Hash256::sha256(data), Hash256::zero());
    }

    #[test]
    fn test_difficulty_check() {
        // Dois bytes zero = quatro dígitos hexadecimais zero
        let easy_hash = Hash256::from_bytes([
            0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0,
        ]);
        assert!(easy_hash.meets_difficulty(4));
        assert!(!easy_hash.meets_difficulty(5));
    }

    #[test]
    fn test_leading_zero_digits() {
        let hash = Hash256::from_bytes([
            0, 0x0f, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0,
        ]);
        // um byte zero + nibble alto zero do segundo byte
        assert_eq!(hash.leading_zero_digits(), 3);
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = Hash256::sha256(b"dini");
        let recovered = Hash256::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, recovered);

        assert!(Hash256::from_hex("zz").is_err());
        assert!(Hash256::from_hex("abcd").is_err());
    }
}
