use crate::block::Block;
use crate::transaction::Transaction;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use shared::config::consensus::DIFFICULTY_LEVEL;
use shared::{well_known, Hash256};
use tracing::{info, warn};

/// Timestamp fixo do bloco gênese, igual em todos os nós
const GENESIS_TIMESTAMP: &str = "time-zero";

static GENESIS_HASH: Lazy<Hash256> = Lazy::new(|| {
    genesis_block()
        .hash
        .expect("Bloco gênese sempre possui hash")
});

/// Constrói o bloco gênese determinístico.
///
/// Conteúdo fixo: hash anterior = SHA-256 de `"0"`, uma única transação de
/// valor zero da chave genesis para ela mesma, timestamp `"time-zero"` e
/// nonce zero. O hash independe da assinatura, portanto todos os nós
/// concordam com a raiz da cadeia sem negociação.
#[must_use]
pub fn genesis_block() -> Block {
    let keys = well_known();
    let mut genesis_transaction = Transaction::new(
        keys.genesis.public_key.clone(),
        keys.genesis.public_key.clone(),
        0,
        0,
    );
    genesis_transaction
        .sign(&keys.genesis.private_key)
        .expect("Assinatura do bloco gênese válida");

    let mut genesis = Block::new(
        Hash256::sha256(b"0"),
        vec![genesis_transaction],
        DIFFICULTY_LEVEL,
    );
    genesis.timestamp = GENESIS_TIMESTAMP.to_string();
    genesis.hash = Some(genesis.calculate_hash()); // gênese é pré-minerado
    genesis
}

/// Hash do bloco gênese, computado uma única vez
#[must_use]
pub fn genesis_hash() -> Hash256 {
    *GENESIS_HASH
}

/// Cadeia ordenada de blocos começando no gênese
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blockchain {
    /// Blocos da cadeia
    pub chain: Vec<Block>,
}

impl Blockchain {
    /// Cria uma blockchain contendo apenas o bloco gênese
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: vec![genesis_block()],
        }
    }

    /// Último bloco da cadeia
    ///
    /// # Panics
    ///
    /// Nunca entra em pânico: o bloco gênese sempre existe
    #[must_use]
    pub fn get_latest_block(&self) -> &Block {
        self.chain.last().expect("Gênese sempre existe")
    }

    /// Hash do último bloco da cadeia
    #[must_use]
    pub fn latest_hash(&self) -> Hash256 {
        self.get_latest_block()
            .hash
            .expect("Blocos aceitos sempre possuem hash")
    }

    /// Admite um bloco no topo da cadeia.
    ///
    /// Aceita apenas se a prova de trabalho vale sob a dificuldade do
    /// próprio bloco, o hash anterior encadeia no topo atual e a estrutura
    /// interna valida. Retorna `true` quando o bloco foi anexado.
    pub fn filter_and_add_block(&mut self, new_block: Block) -> bool {
        if !new_block.proof_of_work_valid() {
            warn!(%new_block, "bloco rejeitado: prova de trabalho inválida");
            return false;
        }

        if new_block.previous_hash != self.latest_hash() {
            warn!(%new_block, "bloco rejeitado: hash anterior não encadeia no topo");
            return false;
        }

        if !new_block.validate_block() {
            warn!(%new_block, "bloco rejeitado: transações inválidas");
            return false;
        }

        info!(%new_block, "novo bloco anexado");
        self.chain.push(new_block);
        true
    }

    /// Retorna os blocos estritamente posteriores ao bloco com o hash dado,
    /// ou vazio se o hash não pertence à cadeia
    #[must_use]
    pub fn get_blocks_after(&self, latest_hash: &Hash256) -> Vec<Block> {
        let position = self
            .chain
            .iter()
            .position(|block| block.hash.as_ref() == Some(latest_hash));

        match position {
            Some(index) => self.chain[index + 1..].to_vec(),
            None => {
                warn!(%latest_hash, "hash não encontrado na cadeia");
                Vec::new()
            }
        }
    }

    /// Monta uma sub-cadeia para atender um pedido de atualização: gênese
    /// seguido dos blocos posteriores ao hash informado. Um hash que não
    /// pertence à cadeia recebe a cauda completa — o par filtra o que já tem.
    #[must_use]
    pub fn create_sub_blockchain(&self, latest_hash: &Hash256) -> Self {
        let mut sub_blockchain = Self::new();

        let known = self
            .chain
            .iter()
            .any(|block| block.hash.as_ref() == Some(latest_hash));
        if known {
            sub_blockchain.chain.extend(self.get_blocks_after(latest_hash));
        } else {
            sub_blockchain.chain.extend(self.chain[1..].to_vec());
        }

        info!(
            blocks = sub_blockchain.chain.len() - 1,
            %latest_hash,
            "sub-cadeia criada"
        );
        sub_blockchain
    }

    /// Revalida a cadeia inteira a partir do índice 1: recomputação dos
    /// hashes, prova de trabalho, encadeamento e validade dos blocos
    #[must_use]
    pub fn is_chain_valid(&self) -> bool {
        for i in 1..self.chain.len() {
            let current = &self.chain[i];
            let previous = &self.chain[i - 1];

            if !current.proof_of_work_valid() {
                warn!(index = i, "prova de trabalho inválida");
                return false;
            }

            if Some(current.previous_hash) != previous.hash {
                warn!(index = i, "encadeamento de hashes quebrado");
                return false;
            }

            if !current.validate_block() {
                warn!(index = i, "bloco com transações inválidas");
                return false;
            }
        }

        true
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}
