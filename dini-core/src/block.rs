use crate::transaction::Transaction;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::config::consensus::BLOCK_REWARD;
use shared::{well_known, Hash256, Result};
use std::fmt;
use tracing::warn;

/// Bloco da blockchain Dini.
///
/// As transações têm posição semântica fixa: o índice 0 é a transação de
/// gorjetas (chave tipping → minerador, soma das gorjetas), o último índice
/// é a recompensa (chave bonus → minerador, valor fixo) e o meio são as
/// transações comuns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Hash do bloco anterior na cadeia
    pub previous_hash: Hash256,
    /// Transações na ordem canônica
    pub transactions: Vec<Transaction>,
    /// Dígitos hexadecimais zero exigidos no hash
    pub difficulty: usize,
    /// Segundos Unix em decimal; `"time-zero"` no bloco gênese
    pub timestamp: String,
    /// Nonce da prova de trabalho
    pub nonce: u64,
    /// Hash do bloco; ausente até a mineração
    pub hash: Option<Hash256>,
}

impl Block {
    /// Cria um bloco ainda não minerado sobre o hash anterior dado
    #[must_use]
    pub fn new(previous_hash: Hash256, transactions: Vec<Transaction>, difficulty: usize) -> Self {
        Self {
            previous_hash,
            transactions,
            difficulty,
            timestamp: Utc::now().timestamp().to_string(),
            nonce: 0,
            hash: None,
        }
    }

    /// Calcula o hash SHA-256 do conteúdo canônico do bloco.
    ///
    /// As transações entram como a concatenação dos seus hashes canônicos,
    /// de modo que o hash do bloco independe das assinaturas.
    #[must_use]
    pub fn calculate_hash(&self) -> Hash256 {
        let serialized_transactions: String = self
            .transactions
            .iter()
            .map(|tx| tx.calculate_hash().to_hex())
            .collect();
        let data = format!(
            "{}{}{}{}{}",
            self.previous_hash, serialized_transactions, self.difficulty, self.timestamp, self.nonce
        );
        Hash256::sha256(data.as_bytes())
    }

    /// Verifica se o campo de hash satisfaz a prova de trabalho: o valor
    /// precisa recomputar corretamente e começar com `difficulty` zeros
    #[must_use]
    pub fn proof_of_work_valid(&self) -> bool {
        self.hash
            .is_some_and(|hash| hash.meets_difficulty(self.difficulty) && hash == self.calculate_hash())
    }

    /// Valida a estrutura tripla do bloco e todas as transações internas.
    ///
    /// Regras: toda transação comum verifica e tem valor positivo; as chaves
    /// tipping e bonus nunca aparecem como remetente comum; a transação de
    /// gorjetas soma exatamente as gorjetas comuns; a recompensa tem o valor
    /// fixo da rede.
    #[must_use]
    pub fn validate_block(&self) -> bool {
        if self.transactions.len() < 2 {
            warn!("bloco sem estrutura tripla: {} transações", self.transactions.len());
            return false;
        }

        let tipping_pk = &well_known().tipping.public_key;
        let bonus_pk = &well_known().bonus.public_key;
        let tips_transaction = &self.transactions[0];
        let bonus_transaction = &self.transactions[self.transactions.len() - 1];

        let mut tips_sum = 0u64;
        for transaction in &self.transactions[1..self.transactions.len() - 1] {
            if transaction.sender == *bonus_pk || transaction.sender == *tipping_pk {
                warn!(%transaction, "transação comum usa chave reservada como remetente");
                return false;
            }
            if transaction.amount == 0 {
                warn!(%transaction, "transação comum com valor nulo");
                return false;
            }
            if !transaction.verify_signature() {
                warn!(%transaction, "transação com assinatura inválida");
                return false;
            }
            tips_sum += transaction.tip;
        }

        if tips_transaction.sender != *tipping_pk {
            warn!("transação de gorjetas não usa a chave tipping");
            return false;
        }
        if tips_transaction.amount != tips_sum {
            warn!(
                expected = tips_sum,
                actual = tips_transaction.amount,
                "soma das gorjetas não confere"
            );
            return false;
        }

        if bonus_transaction.sender != *bonus_pk {
            warn!("transação de recompensa não usa a chave bonus");
            return false;
        }
        if bonus_transaction.amount != BLOCK_REWARD {
            warn!(
                expected = BLOCK_REWARD,
                actual = bonus_transaction.amount,
                "valor da recompensa não confere"
            );
            return false;
        }

        true
    }

    /// Insere no índice 0 a transação de gorjetas, assinada pela chave
    /// tipping, somando as gorjetas das transações já presentes
    ///
    /// # Errors
    ///
    /// Retorna erro se a assinatura falhar
    pub fn add_tipping_transaction(&mut self, miner_pk: &shared::PublicKey) -> Result<()> {
        let keys = well_known();
        let tips_sum = self.transactions.iter().map(|tx| tx.tip).sum();

        let mut tipping = Transaction::new(
            keys.tipping.public_key.clone(),
            miner_pk.clone(),
            tips_sum,
            0,
        );
        tipping.sign(&keys.tipping.private_key)?;
        self.transactions.insert(0, tipping);
        Ok(())
    }

    /// Anexa ao fim a transação de recompensa, assinada pela chave bonus
    ///
    /// # Errors
    ///
    /// Retorna erro se a assinatura falhar
    pub fn add_bonus_transaction(&mut self, miner_pk: &shared::PublicKey) -> Result<()> {
        let keys = well_known();

        let mut bonus = Transaction::new(
            keys.bonus.public_key.clone(),
            miner_pk.clone(),
            BLOCK_REWARD,
            0,
        );
        bonus.sign(&keys.bonus.private_key)?;
        self.transactions.push(bonus);
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hash = self
            .hash
            .map_or_else(|| "None".to_string(), |h| format!("{}...", &h.to_hex()[..6]));
        write!(
            f,
            "Block(prev: {}..., hash: {}, nonce: {}, transações: {})",
            &self.previous_hash.to_hex()[..6],
            hash,
            self.nonce,
            self.transactions.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;

    fn sample_transaction(amount: u64, tip: u64) -> Transaction {
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();
        let mut transaction =
            Transaction::new(sender.public_key, recipient.public_key, amount, tip);
        transaction.sign(&sender.private_key).unwrap();
        transaction
    }

    fn sample_block(amounts_and_tips: &[(u64, u64)]) -> Block {
        let miner = KeyPair::generate().unwrap();
        let transactions = amounts_and_tips
            .iter()
            .map(|&(amount, tip)| sample_transaction(amount, tip))
            .collect();
        let mut block = Block::new(Hash256::sha256(b"0"), transactions, 2);
        block.add_tipping_transaction(&miner.public_key).unwrap();
        block.add_bonus_transaction(&miner.public_key).unwrap();
        block
    }

    #[test]
    fn test_hash_is_deterministic() {
        let block = sample_block(&[(10, 1), (20, 2)]);
        assert_eq!(block.calculate_hash(), block.calculate_hash());
    }

    #[test]
    fn test_triple_structure_is_valid() {
        let block = sample_block(&[(10, 1), (20, 2)]);

        assert_eq!(block.transactions.len(), 4);
        assert_eq!(block.transactions[0].amount, 3); // soma das gorjetas
        assert_eq!(block.transactions[3].amount, BLOCK_REWARD);
        assert!(block.validate_block());
    }

    #[test]
    fn test_rejects_wrong_tip_sum() {
        let mut block = sample_block(&[(10, 1)]);
        block.transactions[0].amount = 999;
        assert!(!block.validate_block());
    }

    #[test]
    fn test_rejects_zero_amount_transaction() {
        let mut block = sample_block(&[(10, 1)]);
        let zero = sample_transaction(0, 0);
        block.transactions.insert(1, zero);
        assert!(!block.validate_block());
    }

    #[test]
    fn test_rejects_reserved_sender() {
        let mut block = sample_block(&[(10, 1)]);
        let keys = well_known();
        let recipient = KeyPair::generate().unwrap();
        let mut forged = Transaction::new(
            keys.bonus.public_key.clone(),
            recipient.public_key,
            50,
            1,
        );
        forged.sign(&keys.bonus.private_key).unwrap();
        // refaz a transação de gorjetas para a soma continuar correta
        block.transactions.insert(1, forged);
        block.transactions[0].amount += 1;
        assert!(!block.validate_block());
    }

    #[test]
    fn test_rejects_wrong_reward() {
        let mut block = sample_block(&[(10, 1)]);
        let last = block.transactions.len() - 1;
        block.transactions[last].amount = BLOCK_REWARD + 1;
        assert!(!block.validate_block());
    }

    #[test]
    fn test_proof_of_work_requires_mined_hash() {
        let mut block = sample_block(&[(10, 1)]);
        assert!(!block.proof_of_work_valid());

        block.difficulty = 1;
        loop {
            let hash = block.calculate_hash();
            if hash.meets_difficulty(block.difficulty) {
                block.hash = Some(hash);
                break;
            }
            block.nonce += 1;
        }
        assert!(block.proof_of_work_valid());

        // adulterar o nonce invalida o campo de hash
        block.nonce += 1;
        assert!(!block.proof_of_work_valid());
    }
}
