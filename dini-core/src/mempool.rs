use crate::transaction::Transaction;
use shared::config::consensus::MAX_TRANSACTIONS_PER_BLOCK;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Conjunto de transações admitidas mas ainda não mineradas.
///
/// A identidade estrutural é o prefixo da assinatura, o mesmo usado pelas
/// carteiras; inserir a mesma transação duas vezes não altera o conjunto.
#[derive(Debug, Default)]
pub struct Mempool {
    transactions: HashMap<String, Transaction>,
}

impl Mempool {
    /// Cria um mempool vazio
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insere uma transação; idempotente. Retorna `true` se era inédita.
    /// Transações sem assinatura não têm identidade e são descartadas.
    pub fn add_transaction(&mut self, transaction: Transaction) -> bool {
        let Some(id) = transaction.id() else {
            warn!(%transaction, "transação sem assinatura descartada do mempool");
            return false;
        };
        if self.transactions.contains_key(&id) {
            return false;
        }
        debug!(%transaction, id, "transação admitida no mempool");
        self.transactions.insert(id, transaction);
        true
    }

    /// Verifica se a transação já está no conjunto
    #[must_use]
    pub fn has_transaction(&self, transaction: &Transaction) -> bool {
        transaction
            .id()
            .is_some_and(|id| self.transactions.contains_key(&id))
    }

    /// Remove um lote de transações; chamada quando um bloco é aceito
    pub fn remove_transactions(&mut self, transactions: &[Transaction]) {
        for transaction in transactions {
            if let Some(id) = transaction.id() {
                self.transactions.remove(&id);
            }
        }
    }

    /// Seleciona até `limit` transações por gorjeta decrescente, com
    /// desempate estável pelo identificador
    #[must_use]
    pub fn select_transactions(&self, limit: usize) -> Vec<Transaction> {
        let mut entries: Vec<(&String, &Transaction)> = self.transactions.iter().collect();
        entries.sort_by(|(id_a, tx_a), (id_b, tx_b)| {
            tx_b.tip.cmp(&tx_a.tip).then_with(|| id_a.cmp(id_b))
        });
        entries
            .into_iter()
            .take(limit)
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    /// Seleção com o limite padrão de transações por bloco
    #[must_use]
    pub fn select_for_block(&self) -> Vec<Transaction> {
        self.select_transactions(MAX_TRANSACTIONS_PER_BLOCK)
    }

    /// Número de transações pendentes
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Verifica se o mempool está vazio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
