use serde::{Deserialize, Serialize};
use shared::config::wallet::ACTION_ID_LENGTH;
use shared::{Hash256, PrivateKey, PublicKey, Result};
use std::fmt;
use tracing::debug;

/// Transferência assinada de valor entre duas chaves públicas.
///
/// O hash canônico cobre remetente, destinatário, valor e gorjeta — nunca a
/// assinatura — de modo que assinar não altera a identidade da transação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Chave pública do remetente
    pub sender: PublicKey,
    /// Chave pública do destinatário
    pub recipient: PublicKey,
    /// Valor transferido
    pub amount: u64,
    /// Gorjeta oferecida ao minerador
    #[serde(default)]
    pub tip: u64,
    /// Assinatura RSA-PSS em hexadecimal; ausente até a assinatura
    pub signature: Option<String>,
}

impl Transaction {
    /// Cria uma transação ainda não assinada
    #[must_use]
    pub fn new(sender: PublicKey, recipient: PublicKey, amount: u64, tip: u64) -> Self {
        debug!(%sender, %recipient, amount, tip, "transação criada");
        Self {
            sender,
            recipient,
            amount,
            tip,
            signature: None,
        }
    }

    /// Calcula o hash SHA-256 do conteúdo canônico da transação.
    ///
    /// A forma canônica é a concatenação do PEM do remetente, PEM do
    /// destinatário, valor decimal e gorjeta decimal, sem preenchimento.
    #[must_use]
    pub fn calculate_hash(&self) -> Hash256 {
        let data = format!(
            "{}{}{}{}",
            self.sender.to_pem(),
            self.recipient.to_pem(),
            self.amount,
            self.tip
        );
        Hash256::sha256(data.as_bytes())
    }

    /// Assina a transação com a chave privada do remetente
    ///
    /// # Errors
    ///
    /// Retorna erro se a operação de assinatura falhar
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<()> {
        let hash_hex = self.calculate_hash().to_hex();
        let signature = private_key.sign(hash_hex.as_bytes())?;
        self.signature = Some(hex::encode(signature));
        debug!(id = ?self.id(), "transação assinada");
        Ok(())
    }

    /// Verifica a assinatura contra a chave pública do remetente.
    /// Falha fechada: assinatura ausente ou ilegível resulta em `false`.
    #[must_use]
    pub fn verify_signature(&self) -> bool {
        let Some(signature_hex) = &self.signature else {
            return false;
        };
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let hash_hex = self.calculate_hash().to_hex();
        self.sender.verify(hash_hex.as_bytes(), &signature)
    }

    /// Identidade da transação: primeiros dígitos hexadecimais da assinatura.
    /// `None` enquanto a transação não for assinada.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.signature
            .as_ref()
            .filter(|signature| signature.len() >= ACTION_ID_LENGTH)
            .map(|signature| signature[..ACTION_ID_LENGTH].to_string())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction({} -> {}: {} +{})",
            self.sender, self.recipient, self.amount, self.tip
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;

    fn signed_transaction(amount: u64, tip: u64) -> (Transaction, KeyPair) {
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();
        let mut transaction = Transaction::new(
            sender.public_key.clone(),
            recipient.public_key.clone(),
            amount,
            tip,
        );
        transaction.sign(&sender.private_key).unwrap();
        (transaction, sender)
    }

    #[test]
    fn test_hash_is_deterministic_and_ignores_signature() {
        let (mut transaction, _) = signed_transaction(10, 1);
        let hash_before = transaction.calculate_hash();

        transaction.signature = None;
        assert_eq!(hash_before, transaction.calculate_hash());
    }

    #[test]
    fn test_sign_and_verify() {
        let (transaction, _) = signed_transaction(10, 1);
        assert!(transaction.signature.is_some());
        assert!(transaction.verify_signature());
    }

    #[test]
    fn test_verify_fails_after_tampering() {
        let (mut transaction, _) = signed_transaction(10, 1);
        transaction.amount = 20;
        assert!(!transaction.verify_signature());
    }

    #[test]
    fn test_verify_fails_without_signature() {
        let sender = KeyPair::generate().unwrap();
        let transaction =
            Transaction::new(sender.public_key.clone(), sender.public_key.clone(), 5, 0);
        assert!(!transaction.verify_signature());
        assert!(transaction.id().is_none());
    }

    #[test]
    fn test_id_is_signature_prefix() {
        let (transaction, _) = signed_transaction(10, 1);
        let id = transaction.id().unwrap();
        assert_eq!(id.len(), 8);
        assert!(transaction.signature.unwrap().starts_with(&id));
    }
}
