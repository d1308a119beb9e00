use crate::block::Block;
use crate::blockchain::genesis_hash;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{well_known, DiniError, Hash256, PublicKey, Result};
use std::collections::HashMap;
use tracing::{info, warn};

/// Classificação de uma ação da carteira
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Buy,
    Sell,
    Transfer,
    Mine,
    Tip,
}

/// Situação de uma ação no ciclo de vida pendente → aprovada
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Approved,
    Failed,
}

/// Registro de uma transação que toca a carteira do dono
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Prefixo da assinatura da transação
    pub id: String,
    /// Classificação da ação
    #[serde(rename = "type")]
    pub kind: ActionType,
    /// Valor movimentado
    pub amount: u64,
    /// Situação corrente
    pub status: ActionStatus,
    /// Momento do registro
    pub timestamp: DateTime<Utc>,
    /// Detalhes opcionais
    pub details: Option<String>,
}

impl Action {
    fn new(id: String, kind: ActionType, amount: u64, status: ActionStatus) -> Self {
        Self {
            id,
            kind,
            amount,
            status,
            timestamp: Utc::now(),
            details: None,
        }
    }
}

/// Cadeia leve de um usuário: saldo, hash do último bloco aplicado e o mapa
/// de ações que tocam o dono.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Chave pública do dono
    pub owner: PublicKey,
    /// Saldo corrente; pode ficar negativo, não há verificação prévia
    pub balance: i64,
    /// Ações indexadas pelo prefixo da assinatura
    pub actions: HashMap<String, Action>,
    /// Hash do último bloco aplicado; inicia no gênese
    pub latest_hash: Hash256,
}

impl Wallet {
    /// Cria uma carteira vazia apontando para o bloco gênese
    #[must_use]
    pub fn new(owner: PublicKey) -> Self {
        Self {
            owner,
            balance: 0,
            actions: HashMap::new(),
            latest_hash: genesis_hash(),
        }
    }

    /// Registra uma ação pendente para uma transação recém-iniciada pelo dono
    ///
    /// # Errors
    ///
    /// Retorna erro se a transação ainda não foi assinada
    pub fn add_pending_action(
        &mut self,
        transaction: &Transaction,
        kind: ActionType,
    ) -> Result<String> {
        let id = transaction.id().ok_or(DiniError::MissingSignature)?;
        let action = Action::new(id.clone(), kind, transaction.amount, ActionStatus::Pending);
        self.actions.insert(id.clone(), action);
        Ok(id)
    }

    /// Filtra uma transação recebida e atualiza saldo e ações.
    ///
    /// Transações irrelevantes (o dono não é remetente nem destinatário)
    /// retornam `false` sem registrar nada. Uma ação pendente com a mesma
    /// identidade passa a aprovada mantendo o tipo; transações inéditas são
    /// classificadas pelas chaves notórias e entram já aprovadas.
    pub fn filter_and_add_transaction(&mut self, transaction: &Transaction) -> bool {
        #[allow(clippy::cast_possible_wrap)]
        if transaction.sender == self.owner {
            self.balance -= transaction.amount as i64;
        } else if transaction.recipient == self.owner {
            self.balance += transaction.amount as i64;
        } else {
            return false;
        }

        let Some(id) = transaction.id() else {
            warn!(%transaction, "transação relevante sem assinatura; ação não registrada");
            return true;
        };

        if let Some(action) = self.actions.get_mut(&id) {
            action.status = ActionStatus::Approved;
            info!(id, kind = ?action.kind, amount = action.amount, "ação pendente aprovada");
        } else {
            let kind = Self::classify(transaction);
            info!(id, ?kind, amount = transaction.amount, "nova ação aprovada");
            let action = Action::new(id.clone(), kind, transaction.amount, ActionStatus::Approved);
            self.actions.insert(id, action);
        }
        true
    }

    /// Classifica uma transação inédita pelas chaves notórias da rede
    fn classify(transaction: &Transaction) -> ActionType {
        let keys = well_known();
        let mut kind = ActionType::Transfer;
        if transaction.sender == keys.lord.public_key {
            kind = ActionType::Buy;
        }
        if transaction.recipient == keys.lord.public_key {
            kind = ActionType::Sell;
        }
        if transaction.sender == keys.bonus.public_key {
            kind = ActionType::Mine;
        }
        if transaction.sender == keys.tipping.public_key {
            kind = ActionType::Tip;
        }
        kind
    }

    /// Aplica um bloco recebido à carteira.
    ///
    /// Um bloco cujo hash anterior não coincide com o último aplicado é
    /// reportado como já visto (`true`) — a carteira está defasada ou o
    /// bloco pertence a um fork, e o pedido de atualização de cadeia
    /// resolve a lacuna. Caso contrário avança o hash, filtra cada
    /// transação e retorna `false` (conteúdo novo).
    pub fn filter_and_add_block(&mut self, block: &Block) -> bool {
        if block.previous_hash != self.latest_hash {
            warn!(
                wallet_hash = %self.latest_hash,
                block_prev = %block.previous_hash,
                "bloco rejeitado pela carteira: hash anterior não confere"
            );
            return true;
        }
        let Some(block_hash) = block.hash else {
            warn!(%block, "bloco sem hash ignorado pela carteira");
            return true;
        };

        self.latest_hash = block_hash;
        let mut relevant = 0usize;
        for transaction in &block.transactions {
            if self.filter_and_add_transaction(transaction) {
                relevant += 1;
            }
        }
        info!(%block, relevant, "bloco aplicado à carteira");
        false
    }

    /// Retorna as `limit` ações mais recentes por timestamp decrescente;
    /// `None` devolve todas
    #[must_use]
    pub fn recent_actions(&self, limit: Option<usize>) -> Vec<Action> {
        let mut actions: Vec<Action> = self.actions.values().cloned().collect();
        actions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            actions.truncate(limit);
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;

    fn signed(sender: &KeyPair, recipient: &PublicKey, amount: u64, tip: u64) -> Transaction {
        let mut transaction = Transaction::new(
            sender.public_key.clone(),
            recipient.clone(),
            amount,
            tip,
        );
        transaction.sign(&sender.private_key).unwrap();
        transaction
    }

    #[test]
    fn test_irrelevant_transaction_is_discarded() {
        let owner = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let third = KeyPair::generate().unwrap();
        let mut wallet = Wallet::new(owner.public_key);

        let transaction = signed(&other, &third.public_key, 10, 0);
        assert!(!wallet.filter_and_add_transaction(&transaction));
        assert_eq!(wallet.balance, 0);
        assert!(wallet.actions.is_empty());
    }

    #[test]
    fn test_balance_conservation() {
        let owner = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let mut wallet = Wallet::new(owner.public_key.clone());

        // crédito de 30, débito de 50: saldo = -20, sem verificação prévia
        let credit = signed(&other, &owner.public_key, 30, 0);
        let debit = signed(&owner, &other.public_key, 50, 0);
        wallet.filter_and_add_transaction(&credit);
        wallet.filter_and_add_transaction(&debit);

        assert_eq!(wallet.balance, -20);
        assert_eq!(wallet.actions.len(), 2);
    }

    #[test]
    fn test_pending_action_becomes_approved() {
        let owner = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let mut wallet = Wallet::new(owner.public_key.clone());

        let transaction = signed(&owner, &other.public_key, 40, 2);
        let id = wallet
            .add_pending_action(&transaction, ActionType::Transfer)
            .unwrap();
        assert_eq!(wallet.actions[&id].status, ActionStatus::Pending);

        wallet.filter_and_add_transaction(&transaction);
        let action = &wallet.actions[&id];
        assert_eq!(action.status, ActionStatus::Approved);
        assert_eq!(action.kind, ActionType::Transfer);
        assert_eq!(wallet.balance, -40);
    }

    #[test]
    fn test_classification_by_well_known_keys() {
        let owner = KeyPair::generate().unwrap();
        let keys = well_known();
        let mut wallet = Wallet::new(owner.public_key.clone());

        let buy = signed(&keys.lord, &owner.public_key, 100, 0);
        let mine = signed(&keys.bonus, &owner.public_key, 100, 0);
        let tip = signed(&keys.tipping, &owner.public_key, 3, 0);
        let sell = signed(&owner, &keys.lord.public_key, 25, 0);

        for transaction in [&buy, &mine, &tip, &sell] {
            wallet.filter_and_add_transaction(transaction);
        }

        assert_eq!(wallet.actions[&buy.id().unwrap()].kind, ActionType::Buy);
        assert_eq!(wallet.actions[&mine.id().unwrap()].kind, ActionType::Mine);
        assert_eq!(wallet.actions[&tip.id().unwrap()].kind, ActionType::Tip);
        assert_eq!(wallet.actions[&sell.id().unwrap()].kind, ActionType::Sell);
        assert_eq!(wallet.balance, 100 + 100 + 3 - 25);
    }

    #[test]
    fn test_lagging_block_is_reported_seen() {
        let owner = KeyPair::generate().unwrap();
        let mut wallet = Wallet::new(owner.public_key.clone());

        let mut block = Block::new(Hash256::sha256(b"fork"), vec![], 1);
        block.hash = Some(block.calculate_hash());

        assert!(wallet.filter_and_add_block(&block));
        assert_eq!(wallet.latest_hash, genesis_hash());
    }

    #[test]
    fn test_block_application_advances_latest_hash() {
        let owner = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let mut wallet = Wallet::new(owner.public_key.clone());

        let transaction = signed(&other, &owner.public_key, 15, 0);
        let mut block = Block::new(wallet.latest_hash, vec![transaction], 1);
        block.hash = Some(block.calculate_hash());

        assert!(!wallet.filter_and_add_block(&block));
        assert_eq!(wallet.latest_hash, block.hash.unwrap());
        assert_eq!(wallet.balance, 15);

        // reaplicar o mesmo bloco agora é "já visto"
        assert!(wallet.filter_and_add_block(&block));
    }

    #[test]
    fn test_wallet_serialization_round_trip() {
        let owner = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let mut wallet = Wallet::new(owner.public_key.clone());
        let transaction = signed(&other, &owner.public_key, 15, 0);
        wallet.filter_and_add_transaction(&transaction);

        let json = serde_json::to_string(&wallet).unwrap();
        let recovered: Wallet = serde_json::from_str(&json).unwrap();

        assert_eq!(recovered.owner, wallet.owner);
        assert_eq!(recovered.balance, wallet.balance);
        assert_eq!(recovered.latest_hash, wallet.latest_hash);
        assert_eq!(recovered.actions.len(), 1);
    }

    #[test]
    fn test_recent_actions_ordering() {
        let owner = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let mut wallet = Wallet::new(owner.public_key.clone());

        for amount in [10, 20, 30] {
            let transaction = signed(&other, &owner.public_key, amount, 0);
            wallet.filter_and_add_transaction(&transaction);
        }

        let all = wallet.recent_actions(None);
        assert_eq!(all.len(), 3);
        let two = wallet.recent_actions(Some(2));
        assert_eq!(two.len(), 2);
        assert!(two[0].timestamp >= two[1].timestamp);
    }
}
