//! Criptografia RSA-PSS da rede Dini
//!
//! Todas as identidades da rede são chaves RSA de 2048 bits. A forma
//! canônica de uma chave pública é o PEM SPKI com quebras de linha LF;
//! essa string entra no cálculo de hash das transações, portanto todo nó
//! precisa produzir exatamente os mesmos bytes.

use crate::{DiniError, Result};
use once_cell::sync::Lazy;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Tamanho em bits das chaves geradas
const KEY_SIZE: usize = 2048;

/// Chave pública RSA identificando um participante da rede
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: RsaPublicKey,
}

/// Chave privada RSA usada para assinar transações
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: RsaPrivateKey,
}

/// Par de chaves RSA
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl PublicKey {
    /// Carrega uma chave pública a partir de PEM (SPKI)
    ///
    /// # Errors
    ///
    /// Retorna erro se o PEM não representar uma chave RSA válida
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| DiniError::CryptographicError(e.to_string()))?;
        Ok(Self { key })
    }

    /// Forma canônica da chave: PEM SPKI com quebras de linha LF
    #[must_use]
    pub fn to_pem(&self) -> String {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .expect("Chave pública válida")
    }

    /// Verifica uma assinatura RSA-PSS(SHA-256) sobre a mensagem
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let digest = Sha256::digest(message);
        self.key
            .verify(Pss::new::<Sha256>(), &digest, signature)
            .is_ok()
    }

    /// Identificador curto para logs (primeiros 8 dígitos do hash do PEM)
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.to_pem().as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pem())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pem = String::deserialize(deserializer)?;
        Self::from_pem(&pem).map_err(DeError::custom)
    }
}

impl PrivateKey {
    /// Carrega uma chave privada a partir de PEM (PKCS#8)
    ///
    /// # Errors
    ///
    /// Retorna erro se o PEM não representar uma chave RSA válida
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| DiniError::CryptographicError(e.to_string()))?;
        Ok(Self { key })
    }

    /// Exporta a chave em PEM PKCS#8
    #[must_use]
    pub fn to_pem(&self) -> String {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Chave privada válida")
            .to_string()
    }

    /// Assina a mensagem com RSA-PSS(SHA-256)
    ///
    /// # Errors
    ///
    /// Retorna erro se a operação de assinatura falhar
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha256::digest(message);
        let mut rng = rand::thread_rng();
        self.key
            .sign_with_rng(&mut rng, Pss::new::<Sha256>(), &digest)
            .map_err(|e| DiniError::CryptographicError(e.to_string()))
    }

    /// Deriva a chave pública correspondente
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.to_public_key(),
        }
    }
}

impl KeyPair {
    /// Gera um novo par de chaves RSA-2048
    ///
    /// # Errors
    ///
    /// Retorna erro se a geração da chave falhar
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, KEY_SIZE)
            .map_err(|e| DiniError::CryptographicError(e.to_string()))?;
        let public = private.to_public_key();
        Ok(Self {
            public_key: PublicKey { key: public },
            private_key: PrivateKey { key: private },
        })
    }

    /// Reconstrói um par de chaves a partir dos dois PEMs
    ///
    /// # Errors
    ///
    /// Retorna erro se algum dos PEMs for inválido
    pub fn from_pems(private_pem: &str, public_pem: &str) -> Result<Self> {
        Ok(Self {
            public_key: PublicKey::from_pem(public_pem)?,
            private_key: PrivateKey::from_pem(private_pem)?,
        })
    }
}

/// Chaves compartilhadas por todos os nós da rede.
///
/// A chave genesis assina a transação do bloco gênese; a chave lord cunha e
/// queima moedas; a tipping produz a transação de gorjetas de cada bloco; a
/// bonus produz a recompensa de mineração. Distribuídas embutidas no binário.
pub struct WellKnownKeys {
    pub genesis: KeyPair,
    pub lord: KeyPair,
    pub tipping: KeyPair,
    pub bonus: KeyPair,
}

static WELL_KNOWN: Lazy<WellKnownKeys> = Lazy::new(|| WellKnownKeys {
    genesis: KeyPair::from_pems(
        include_str!("../keys/genesis_sk.pem"),
        include_str!("../keys/genesis_pk.pem"),
    )
    .expect("Chave genesis embutida válida"),
    lord: KeyPair::from_pems(
        include_str!("../keys/lord_sk.pem"),
        include_str!("../keys/lord_pk.pem"),
    )
    .expect("Chave lord embutida válida"),
    tipping: KeyPair::from_pems(
        include_str!("../keys/tipping_sk.pem"),
        include_str!("../keys/tipping_pk.pem"),
    )
    .expect("Chave tipping embutida válida"),
    bonus: KeyPair::from_pems(
        include_str!("../keys/bonus_sk.pem"),
        include_str!("../keys/bonus_pk.pem"),
    )
    .expect("Chave bonus embutida válida"),
});

/// Acessa as chaves da rede, carregadas uma única vez
#[must_use]
pub fn well_known() -> &'static WellKnownKeys {
    &WELL_KNOWN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_round_trip() {
        let keypair = KeyPair::generate().unwrap();
        let message = b"Dini - rede de criptomoeda";

        let signature = keypair.private_key.sign(message).unwrap();
        assert!(keypair.public_key.verify(message, &signature));
    }

    #[test]
    fn test_verify_fails_for_tampered_message() {
        let keypair = KeyPair::generate().unwrap();
        let signature = keypair.private_key.sign(b"mensagem original").unwrap();

        assert!(!keypair.public_key.verify(b"mensagem adulterada", &signature));
    }

    #[test]
    fn test_verify_fails_for_wrong_key() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let signature = alice.private_key.sign(b"oi").unwrap();

        assert!(!bob.public_key.verify(b"oi", &signature));
    }

    #[test]
    fn test_pem_round_trip_is_canonical() {
        let keypair = KeyPair::generate().unwrap();
        let pem = keypair.public_key.to_pem();
        let recovered = PublicKey::from_pem(&pem).unwrap();

        assert_eq!(keypair.public_key, recovered);
        assert_eq!(pem, recovered.to_pem());
    }

    #[test]
    fn test_well_known_keys_are_consistent() {
        let keys = well_known();

        // cada chave privada deriva a pública correspondente
        assert_eq!(keys.genesis.private_key.public_key(), keys.genesis.public_key);
        assert_eq!(keys.lord.private_key.public_key(), keys.lord.public_key);
        assert_eq!(keys.tipping.private_key.public_key(), keys.tipping.public_key);
        assert_eq!(keys.bonus.private_key.public_key(), keys.bonus.public_key);

        // as quatro identidades são distintas
        assert_ne!(keys.lord.public_key, keys.tipping.public_key);
        assert_ne!(keys.tipping.public_key, keys.bonus.public_key);
        assert_ne!(keys.genesis.public_key, keys.lord.public_key);
    }
}
