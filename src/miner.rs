//! Papel de minerador: validador de cadeia completa e produtor de blocos.
//!
//! O minerador mantém a blockchain persistida e um mempool, serve pedidos de
//! atualização de cadeia e roda o laço de mineração em tarefa dedicada. A
//! chegada de um bloco alheio aciona a flag de aborto do motor, de modo que
//! a tentativa corrente é abandonada e um candidato novo é construído sobre
//! o topo atualizado em vez de desperdiçar trabalho num pai obsoleto.

use crate::bootstrap::{connect_to_announced, discover_peers};
use crate::node::{Node, Role};
use crate::protocol::Message;
use dini_core::{Block, Blockchain, Mempool, MiningEngine, Transaction};
use shared::config::consensus::DIFFICULTY_LEVEL;
use shared::config::files::BLOCKCHAIN_FILE;
use shared::{Address, Hash256, KeyPair, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{error, info, warn};

/// Minerador: blockchain completa, mempool e motor de mineração
pub struct Miner {
    self_ref: Weak<Miner>,
    node: Arc<Node>,
    keys: KeyPair,
    blockchain: Mutex<Blockchain>,
    mempool: Mutex<Mempool>,
    engine: MiningEngine,
    currently_mining: AtomicBool,
    blockchain_path: PathBuf,
}

impl Miner {
    /// Carrega a blockchain do disco, inicia o despacho, descobre pares e
    /// pede uma atualização de cadeia com o topo local
    ///
    /// # Errors
    ///
    /// Retorna erro se o estado inicial não puder ser persistido
    pub async fn start(node: Arc<Node>, keys: KeyPair, data_dir: &Path) -> Result<Arc<Self>> {
        let blockchain_path = data_dir.join(BLOCKCHAIN_FILE);
        let blockchain = load_blockchain(&blockchain_path);

        let miner = Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            node: Arc::clone(&node),
            keys,
            blockchain: Mutex::new(blockchain),
            mempool: Mutex::new(Mempool::new()),
            engine: MiningEngine::default(),
            currently_mining: AtomicBool::new(false),
            blockchain_path,
        });
        miner.save_blockchain()?;

        node.run(Arc::clone(&miner));
        discover_peers(&node, data_dir).await;

        let latest = miner.latest_hash();
        node.send_distributed(&Message::chain_request(latest), None);

        Ok(miner)
    }

    /// Inicia o laço de mineração em tarefa dedicada.
    ///
    /// `block_budget` limita quantos blocos minerar; `-1` minera para sempre.
    pub fn start_mining(&self, block_budget: i64) {
        if self.currently_mining.swap(true, Ordering::SeqCst) {
            info!("mineração já em andamento; chamada ignorada");
            return;
        }
        let miner = self.self_ref.upgrade().expect("minerador ainda vivo");
        tokio::spawn(mining_loop(miner, block_budget));
    }

    /// Interrompe o laço de mineração e a tentativa corrente
    pub fn stop_mining(&self) {
        self.currently_mining.store(false, Ordering::SeqCst);
        self.engine.abort();
    }

    /// Verifica se o laço de mineração está ativo
    #[must_use]
    pub fn is_mining(&self) -> bool {
        self.currently_mining.load(Ordering::SeqCst)
    }

    /// Monta um candidato com as transações de maior gorjeta sobre o topo
    /// atual, com as transações de gorjeta e recompensa do próprio minerador.
    /// `None` enquanto o mempool está vazio.
    fn create_candidate(&self) -> Option<Block> {
        let transactions = self
            .mempool
            .lock()
            .expect("lock do mempool")
            .select_for_block();
        if transactions.is_empty() {
            return None;
        }

        let previous_hash = self.latest_hash();
        let mut block = Block::new(previous_hash, transactions, DIFFICULTY_LEVEL);
        if let Err(e) = block.add_tipping_transaction(&self.keys.public_key) {
            error!(%e, "falha ao assinar a transação de gorjetas");
            return None;
        }
        if let Err(e) = block.add_bonus_transaction(&self.keys.public_key) {
            error!(%e, "falha ao assinar a transação de recompensa");
            return None;
        }
        info!(%block, "candidato criado para mineração");
        Some(block)
    }

    /// Hash do topo da cadeia local
    #[must_use]
    pub fn latest_hash(&self) -> Hash256 {
        self.blockchain
            .lock()
            .expect("lock da blockchain")
            .latest_hash()
    }

    /// Número de blocos na cadeia local
    #[must_use]
    pub fn chain_length(&self) -> usize {
        self.blockchain
            .lock()
            .expect("lock da blockchain")
            .chain
            .len()
    }

    /// Cópia da cadeia local para inspeção
    #[must_use]
    pub fn blockchain_snapshot(&self) -> Blockchain {
        self.blockchain
            .lock()
            .expect("lock da blockchain")
            .clone()
    }

    /// Número de transações pendentes no mempool
    #[must_use]
    pub fn mempool_size(&self) -> usize {
        self.mempool.lock().expect("lock do mempool").len()
    }

    /// Endereços dos pares conectados ao nó do minerador
    #[must_use]
    pub fn connected_peers(&self) -> Vec<Address> {
        self.node.connected_addresses()
    }

    /// Persiste a cadeia no arquivo do minerador
    fn save_blockchain(&self) -> Result<()> {
        let blockchain = self.blockchain.lock().expect("lock da blockchain");
        save_blockchain(&self.blockchain_path, &blockchain)
    }

    fn save_blockchain_logged(&self) {
        if let Err(e) = self.save_blockchain() {
            error!(%e, "falha ao salvar a blockchain");
        }
    }
}

impl Role for Miner {
    fn process_node_data(&self, addresses: Vec<Address>) {
        connect_to_announced(&self.node, addresses);
    }

    fn serve_blockchain_request(&self, latest_hash: &Hash256) -> Option<Blockchain> {
        let sub_blockchain = self
            .blockchain
            .lock()
            .expect("lock da blockchain")
            .create_sub_blockchain(latest_hash);
        info!(%latest_hash, "servindo pedido de atualização de cadeia");
        Some(sub_blockchain)
    }

    fn process_blockchain_data(&self, blockchain: Blockchain) {
        // sinal de novo bloco: abandona a tentativa corrente
        self.engine.abort();

        let mut added = 0usize;
        {
            let mut chain = self.blockchain.lock().expect("lock da blockchain");
            let relevant = blockchain.get_blocks_after(&chain.latest_hash());
            for block in relevant {
                let transactions = block.transactions.clone();
                if chain.filter_and_add_block(block) {
                    self.mempool
                        .lock()
                        .expect("lock do mempool")
                        .remove_transactions(&transactions);
                    added += 1;
                }
            }
        }

        if added > 0 {
            self.save_blockchain_logged();
        }
        info!(added, "sub-cadeia recebida e mesclada");
    }

    fn process_block_data(&self, block: Block) -> bool {
        let transactions = block.transactions.clone();
        let added = self
            .blockchain
            .lock()
            .expect("lock da blockchain")
            .filter_and_add_block(block);

        if added {
            self.mempool
                .lock()
                .expect("lock do mempool")
                .remove_transactions(&transactions);
            self.save_blockchain_logged();
            // recomeça a mineração sobre o novo topo
            self.engine.abort();
            return false;
        }
        // bloco rejeitado ou repetido: reporta como já visto para o flood parar
        true
    }

    fn process_transaction_data(&self, transaction: Transaction) -> bool {
        if self
            .mempool
            .lock()
            .expect("lock do mempool")
            .has_transaction(&transaction)
        {
            return true;
        }
        if !transaction.verify_signature() {
            warn!(%transaction, "transação com assinatura inválida descartada");
            return true;
        }
        if transaction.amount == 0 {
            warn!(%transaction, "transação com valor nulo descartada");
            return true;
        }

        let added = self
            .mempool
            .lock()
            .expect("lock do mempool")
            .add_transaction(transaction);
        !added
    }
}

/// Laço de mineração: constrói candidatos, procura nonce e difunde blocos
async fn mining_loop(miner: Arc<Miner>, mut block_budget: i64) {
    info!(block_budget, "laço de mineração iniciado");

    while miner.currently_mining.load(Ordering::SeqCst) && block_budget != 0 {
        // limpa o sinal de novo bloco antes de montar o candidato
        miner.engine.clear_abort();

        let Some(candidate) = miner.create_candidate() else {
            tokio::time::sleep(Duration::from_millis(200)).await;
            continue;
        };

        let engine = miner.engine.clone();
        let difficulty = candidate.difficulty;
        let mined = tokio::task::spawn_blocking(move || engine.mine(&candidate, difficulty))
            .await
            .ok()
            .flatten();

        let Some(block) = mined else {
            info!("mineração interrompida por novo bloco; recomeçando no topo atualizado");
            continue;
        };

        let transactions = block.transactions.clone();
        let accepted = miner
            .blockchain
            .lock()
            .expect("lock da blockchain")
            .filter_and_add_block(block.clone());

        if accepted {
            miner
                .mempool
                .lock()
                .expect("lock do mempool")
                .remove_transactions(&transactions);
            miner.save_blockchain_logged();
            miner.node.send_distributed(&Message::block_broadcast(block), None);
            if block_budget > 0 {
                block_budget -= 1;
            }
        } else {
            // outro bloco chegou primeiro nesta altura; o candidato era obsoleto
            info!("bloco minerado rejeitado localmente; topo mudou durante a mineração");
        }
    }

    miner.currently_mining.store(false, Ordering::SeqCst);
    info!("laço de mineração encerrado");
}

/// Carrega a blockchain do disco; arquivo ausente ou ilegível inicia cadeia nova
fn load_blockchain(path: &Path) -> Blockchain {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => match serde_json::from_str(&contents) {
            Ok(blockchain) => {
                info!(path = %path.display(), "blockchain carregada do disco");
                blockchain
            }
            Err(e) => {
                error!(%e, "falha ao carregar a blockchain; iniciando cadeia nova");
                Blockchain::new()
            }
        },
        _ => {
            info!(path = %path.display(), "sem blockchain persistida; iniciando cadeia nova");
            Blockchain::new()
        }
    }
}

fn save_blockchain(path: &Path, blockchain: &Blockchain) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(blockchain)
        .map_err(|e| shared::DiniError::SerializationError(e.to_string()))?;
    fs::write(path, contents)?;
    Ok(())
}
