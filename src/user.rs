//! Papel de usuário: detentor de carteira leve.
//!
//! O usuário acompanha apenas as transações que tocam a própria chave.
//! Compras e vendas de Dinis são transações com a chave lord da rede — o
//! "banco central" cunha e queima moedas, e qualquer nó que conhece a chave
//! compartilhada pode fazê-lo, uma simplificação deliberada do protocolo.

use crate::bootstrap::{connect_to_announced, discover_peers};
use crate::node::{Node, Role};
use crate::protocol::Message;
use dini_core::{Action, ActionType, Block, Blockchain, Transaction, Wallet};
use shared::config::files::WALLET_FILE;
use shared::config::wallet::EXCHANGE_TIP;
use shared::{well_known, Address, DiniError, Hash256, KeyPair, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Usuário: carteira leve e iniciador de transações
pub struct User {
    node: Arc<Node>,
    keys: KeyPair,
    wallet: Mutex<Wallet>,
    wallet_path: PathBuf,
}

impl User {
    /// Carrega a carteira do disco, inicia o despacho, descobre pares e
    /// pede a atualização de cadeia para alcançar o topo da rede
    ///
    /// # Errors
    ///
    /// Retorna erro se o estado inicial não puder ser persistido
    pub async fn start(node: Arc<Node>, keys: KeyPair, data_dir: &Path) -> Result<Arc<Self>> {
        let wallet_path = data_dir.join(WALLET_FILE);
        let wallet = load_wallet(&wallet_path, &keys);

        let user = Arc::new(Self {
            node: Arc::clone(&node),
            keys,
            wallet: Mutex::new(wallet),
            wallet_path,
        });
        user.save_wallet()?;

        node.run(Arc::clone(&user));
        discover_peers(&node, data_dir).await;
        user.request_blockchain_update();

        Ok(user)
    }

    /// Pede aos pares uma sub-cadeia a partir do último bloco aplicado
    pub fn request_blockchain_update(&self) {
        let latest_hash = self.wallet.lock().expect("lock da carteira").latest_hash;
        info!(%latest_hash, "pedindo atualização de cadeia");
        self.node
            .send_distributed(&Message::chain_request(latest_hash), None);
    }

    /// Compra Dinis: transação da chave lord para o próprio usuário,
    /// assinada com a chave secreta lord compartilhada pela rede
    ///
    /// # Errors
    ///
    /// Retorna erro se a assinatura ou a persistência falharem
    pub fn buy_dinis(&self, amount: u64) -> Result<String> {
        let keys = well_known();
        let mut transaction = Transaction::new(
            keys.lord.public_key.clone(),
            self.keys.public_key.clone(),
            amount,
            EXCHANGE_TIP,
        );
        transaction.sign(&keys.lord.private_key)?;

        let id = self.register_and_broadcast(transaction, ActionType::Buy)?;
        info!(amount, id, "compra de Dinis transmitida");
        Ok(id)
    }

    /// Vende Dinis: transação do usuário para a chave lord (queima)
    ///
    /// # Errors
    ///
    /// Retorna erro se a assinatura ou a persistência falharem
    pub fn sell_dinis(&self, amount: u64) -> Result<String> {
        let keys = well_known();
        let mut transaction = Transaction::new(
            self.keys.public_key.clone(),
            keys.lord.public_key.clone(),
            amount,
            EXCHANGE_TIP,
        );
        transaction.sign(&self.keys.private_key)?;

        let id = self.register_and_broadcast(transaction, ActionType::Sell)?;
        info!(amount, id, "venda de Dinis transmitida");
        Ok(id)
    }

    /// Transfere Dinis para um par conhecido pelo nome anunciado
    ///
    /// # Errors
    ///
    /// Retorna erro se o nome for desconhecido ou a assinatura falhar
    pub fn add_transaction(&self, name: &str, amount: u64, tip: u64) -> Result<String> {
        let recipient = self
            .node
            .lookup_name(name)
            .ok_or_else(|| DiniError::UnknownPeer(name.to_string()))?;

        let mut transaction =
            Transaction::new(self.keys.public_key.clone(), recipient, amount, tip);
        transaction.sign(&self.keys.private_key)?;

        let id = self.register_and_broadcast(transaction, ActionType::Transfer)?;
        info!(name, amount, tip, id, "transferência transmitida");
        Ok(id)
    }

    /// Registra a ação pendente, persiste a carteira e difunde a transação
    fn register_and_broadcast(
        &self,
        transaction: Transaction,
        kind: ActionType,
    ) -> Result<String> {
        let id = self
            .wallet
            .lock()
            .expect("lock da carteira")
            .add_pending_action(&transaction, kind)?;
        self.save_wallet()?;
        self.node
            .send_distributed(&Message::transaction_response(transaction), None);
        Ok(id)
    }

    /// Saldo corrente da carteira
    #[must_use]
    pub fn balance(&self) -> i64 {
        self.wallet.lock().expect("lock da carteira").balance
    }

    /// Hash do último bloco aplicado à carteira
    #[must_use]
    pub fn latest_hash(&self) -> Hash256 {
        self.wallet.lock().expect("lock da carteira").latest_hash
    }

    /// Ações mais recentes da carteira
    #[must_use]
    pub fn recent_actions(&self, limit: Option<usize>) -> Vec<Action> {
        self.wallet
            .lock()
            .expect("lock da carteira")
            .recent_actions(limit)
    }

    /// Consulta uma ação pelo identificador
    #[must_use]
    pub fn action(&self, id: &str) -> Option<Action> {
        self.wallet
            .lock()
            .expect("lock da carteira")
            .actions
            .get(id)
            .cloned()
    }

    fn save_wallet(&self) -> Result<()> {
        let wallet = self.wallet.lock().expect("lock da carteira");
        save_wallet(&self.wallet_path, &wallet)
    }

    fn save_wallet_logged(&self) {
        if let Err(e) = self.save_wallet() {
            error!(%e, "falha ao salvar a carteira");
        }
    }
}

impl Role for User {
    fn process_node_data(&self, addresses: Vec<Address>) {
        connect_to_announced(&self.node, addresses);
    }

    fn process_block_data(&self, block: Block) -> bool {
        let already_seen = self
            .wallet
            .lock()
            .expect("lock da carteira")
            .filter_and_add_block(&block);
        self.save_wallet_logged();
        already_seen
    }

    fn process_blockchain_data(&self, blockchain: Blockchain) {
        {
            let mut wallet = self.wallet.lock().expect("lock da carteira");
            let relevant = blockchain.get_blocks_after(&wallet.latest_hash);
            for block in relevant {
                wallet.filter_and_add_block(&block);
            }
        }
        self.save_wallet_logged();
        info!("resposta de cadeia aplicada à carteira");
    }
}

/// Carrega a carteira do disco; ausente ou ilegível inicia carteira nova
fn load_wallet(path: &Path, keys: &KeyPair) -> Wallet {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => match serde_json::from_str(&contents) {
            Ok(wallet) => {
                info!(path = %path.display(), "carteira carregada do disco");
                wallet
            }
            Err(e) => {
                warn!(%e, "falha ao carregar a carteira; iniciando carteira nova");
                Wallet::new(keys.public_key.clone())
            }
        },
        _ => {
            info!(path = %path.display(), "sem carteira persistida; iniciando carteira nova");
            Wallet::new(keys.public_key.clone())
        }
    }
}

fn save_wallet(path: &Path, wallet: &Wallet) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(wallet)
        .map_err(|e| DiniError::SerializationError(e.to_string()))?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WALLET_FILE);
        let keys = KeyPair::generate().unwrap();

        let wallet = Wallet::new(keys.public_key.clone());
        save_wallet(&path, &wallet).unwrap();

        let loaded = load_wallet(&path, &keys);
        assert_eq!(loaded.owner, keys.public_key);
        assert_eq!(loaded.latest_hash, wallet.latest_hash);
    }

    #[test]
    fn test_corrupt_wallet_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WALLET_FILE);
        let keys = KeyPair::generate().unwrap();

        fs::write(&path, "não é json").unwrap();
        let loaded = load_wallet(&path, &keys);
        assert_eq!(loaded.balance, 0);
        assert_eq!(loaded.owner, keys.public_key);
    }
}
