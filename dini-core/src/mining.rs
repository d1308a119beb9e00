use crate::block::Block;
use shared::config::mining::{NONCE_SPACE, WORKER_COUNT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info};

/// Configuração do motor de mineração
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Número de threads trabalhadoras
    pub workers: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            workers: WORKER_COUNT,
        }
    }
}

/// Motor de busca paralela de nonce.
///
/// Divide o espaço [0, 2^32) em subfaixas disjuntas, uma por trabalhadora.
/// Cada trabalhadora consulta a flag de aborto a cada nonce; a primeira que
/// encontra um hash válido publica o bloco e aciona a flag para derrubar as
/// demais. A flag também é acionada de fora pelo papel de minerador quando
/// um bloco alheio chega, para a tentativa corrente ser abandonada.
#[derive(Debug, Clone)]
pub struct MiningEngine {
    config: MinerConfig,
    abort: Arc<AtomicBool>,
}

impl MiningEngine {
    /// Cria um motor com a configuração dada
    #[must_use]
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Aciona o aborto da tentativa corrente
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Limpa a flag de aborto antes de uma nova tentativa
    pub fn clear_abort(&self) {
        self.abort.store(false, Ordering::SeqCst);
    }

    /// Verifica se a flag de aborto está acionada
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Procura um nonce que satisfaça a dificuldade dada.
    ///
    /// Retorna o bloco com nonce e hash preenchidos, ou `None` se a flag de
    /// aborto foi acionada antes de uma solução ser encontrada.
    #[must_use]
    pub fn mine(&self, block: &Block, difficulty: usize) -> Option<Block> {
        let result: Arc<Mutex<Option<Block>>> = Arc::new(Mutex::new(None));
        let mut handles = Vec::with_capacity(self.config.workers);

        let nonce_per_worker = NONCE_SPACE / self.config.workers as u64;

        for worker_id in 0..self.config.workers {
            let mut worker_block = block.clone();
            let abort = Arc::clone(&self.abort);
            let result = Arc::clone(&result);

            let start_nonce = worker_id as u64 * nonce_per_worker;
            let end_nonce = if worker_id == self.config.workers - 1 {
                NONCE_SPACE
            } else {
                (worker_id as u64 + 1) * nonce_per_worker
            };

            let handle = thread::spawn(move || {
                for nonce in start_nonce..end_nonce {
                    if abort.load(Ordering::SeqCst) {
                        return;
                    }

                    worker_block.nonce = nonce;
                    let hash = worker_block.calculate_hash();
                    if hash.meets_difficulty(difficulty) {
                        worker_block.hash = Some(hash);
                        debug!(nonce, %hash, "nonce válido encontrado");
                        *result.lock().expect("lock do resultado") = Some(worker_block);
                        abort.store(true, Ordering::SeqCst);
                        return;
                    }
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.join();
        }

        let mined = result.lock().expect("lock do resultado").take();
        match &mined {
            Some(block) => info!(%block, "bloco minerado"),
            None => debug!("mineração abortada sem solução"),
        }
        mined
    }
}

impl Default for MiningEngine {
    fn default() -> Self {
        Self::new(MinerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use shared::{Hash256, KeyPair};

    fn candidate_block() -> Block {
        let miner = KeyPair::generate().unwrap();
        let sender = KeyPair::generate().unwrap();
        let recipient = KeyPair::generate().unwrap();
        let mut transaction =
            Transaction::new(sender.public_key, recipient.public_key, 10, 1);
        transaction.sign(&sender.private_key).unwrap();

        let mut block = Block::new(Hash256::sha256(b"0"), vec![transaction], 1);
        block.add_tipping_transaction(&miner.public_key).unwrap();
        block.add_bonus_transaction(&miner.public_key).unwrap();
        block
    }

    #[test]
    fn test_mine_finds_valid_nonce() {
        let engine = MiningEngine::new(MinerConfig { workers: 2 });
        let candidate = candidate_block();

        let mined = engine.mine(&candidate, 1).expect("solução em dificuldade 1");
        let hash = mined.hash.unwrap();
        assert!(hash.meets_difficulty(1));
        assert_eq!(hash, mined.calculate_hash());
    }

    #[test]
    fn test_mine_respects_abort_flag() {
        let engine = MiningEngine::new(MinerConfig { workers: 2 });
        engine.abort();

        // dificuldade impossível + flag acionada: retorna sem solução
        let mined = engine.mine(&candidate_block(), 64);
        assert!(mined.is_none());
    }

    #[test]
    fn test_clear_abort_allows_new_attempt() {
        let engine = MiningEngine::new(MinerConfig { workers: 1 });
        engine.abort();
        assert!(engine.is_aborted());

        engine.clear_abort();
        assert!(!engine.is_aborted());
        assert!(engine.mine(&candidate_block(), 1).is_some());
    }
}
