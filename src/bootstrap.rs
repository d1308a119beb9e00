//! Papel de diretório de bootstrap.
//!
//! Um bootstrap persiste o próprio endereço no arquivo de diretório JSON,
//! conecta-se aos demais endereços listados e faz gossip de endereços de
//! pares. Deliberadamente não participa do consenso: todos os tratadores de
//! cadeia e transação ficam nos padrões da interface.

use crate::node::{Node, Role};
use crate::protocol::Message;
use serde::{Deserialize, Serialize};
use shared::config::files::BOOTSTRAP_DIRECTORY_FILE;
use shared::{Address, DiniError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Conteúdo do arquivo de diretório: `{"bootstrap_addresses": [["ip", porta], ...]}`
#[derive(Debug, Default, Serialize, Deserialize)]
struct BootstrapDirectory {
    bootstrap_addresses: Vec<Address>,
}

/// Diretório de bootstrap: livro de endereços da rede
pub struct Bootstrap {
    node: Arc<Node>,
    directory_path: PathBuf,
    registered: AtomicBool,
}

impl Bootstrap {
    /// Registra o endereço no diretório, inicia o despacho e descobre pares
    ///
    /// # Errors
    ///
    /// Retorna erro se o arquivo de diretório não puder ser escrito
    pub async fn start(node: Arc<Node>, data_dir: &Path) -> Result<Arc<Self>> {
        let bootstrap = Arc::new(Self {
            node: Arc::clone(&node),
            directory_path: data_dir.join(BOOTSTRAP_DIRECTORY_FILE),
            registered: AtomicBool::new(false),
        });

        bootstrap.register_address()?;
        node.run(Arc::clone(&bootstrap));
        discover_peers(&node, data_dir).await;
        Ok(bootstrap)
    }

    /// Acrescenta o próprio endereço ao arquivo de diretório
    fn register_address(&self) -> Result<()> {
        let mut directory = load_directory(&self.directory_path);
        if !directory.bootstrap_addresses.contains(self.node.address()) {
            directory.bootstrap_addresses.push(self.node.address().clone());
            save_directory(&self.directory_path, &directory)?;
            info!(address = %self.node.address(), "endereço registrado no diretório");
        }
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Remove o próprio endereço do arquivo de diretório
    fn unregister_address(&self) {
        if !self.registered.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut directory = load_directory(&self.directory_path);
        let before = directory.bootstrap_addresses.len();
        directory
            .bootstrap_addresses
            .retain(|address| address != self.node.address());
        if directory.bootstrap_addresses.len() == before {
            warn!(address = %self.node.address(), "endereço não estava no diretório");
        }
        if let Err(e) = save_directory(&self.directory_path, &directory) {
            warn!(%e, "falha ao salvar o diretório na remoção");
        } else {
            info!(address = %self.node.address(), "endereço removido do diretório");
        }
    }

    /// Encerramento ordenado: sai do diretório e derruba o nó
    pub fn shutdown(&self) {
        self.unregister_address();
        self.node.shutdown();
    }
}

impl Drop for Bootstrap {
    fn drop(&mut self) {
        self.unregister_address();
    }
}

impl Role for Bootstrap {
    fn serve_node_request(&self) -> Option<Vec<Address>> {
        Some(self.node.connected_addresses())
    }

    fn process_node_data(&self, addresses: Vec<Address>) {
        connect_to_announced(&self.node, addresses);
    }
}

/// Conecta a cada endereço anunciado ainda desconhecido. Compartilhada por
/// todos os papéis: qualquer nó que recebe uma lista de pares tenta
/// completar a malha.
pub fn connect_to_announced(node: &Arc<Node>, addresses: Vec<Address>) {
    for address in addresses {
        if address == *node.address() || node.is_connected(&address) {
            continue;
        }
        let node = Arc::clone(node);
        tokio::spawn(async move {
            if let Err(e) = node.connect_to_node(address.clone()).await {
                warn!(%address, %e, "falha ao conectar a par anunciado");
            }
        });
    }
}

/// Lê o diretório; arquivo ausente, vazio ou corrompido vale como vazio
fn load_directory(path: &Path) -> BootstrapDirectory {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => {
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(%e, "diretório de bootstrap corrompido; tratando como vazio");
                BootstrapDirectory::default()
            })
        }
        _ => BootstrapDirectory::default(),
    }
}

fn save_directory(path: &Path, directory: &BootstrapDirectory) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(directory)
        .map_err(|e| DiniError::SerializationError(e.to_string()))?;
    fs::write(path, contents)?;
    Ok(())
}

/// Sequência de descoberta usada por todos os papéis na partida: conecta a
/// cada endereço do diretório e em seguida pede mais pares aos conectados
pub async fn discover_peers(node: &Arc<Node>, data_dir: &Path) {
    let directory = load_directory(&data_dir.join(BOOTSTRAP_DIRECTORY_FILE));
    for address in directory.bootstrap_addresses {
        if address == *node.address() {
            continue;
        }
        if let Err(e) = node.connect_to_node(address.clone()).await {
            warn!(%address, %e, "falha ao conectar a bootstrap");
        }
    }

    debug!("enviando pedido de descoberta de nós");
    node.send_distributed(&Message::node_request(), None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BOOTSTRAP_DIRECTORY_FILE);

        let directory = BootstrapDirectory {
            bootstrap_addresses: vec![
                Address::new("127.0.0.1", 8001),
                Address::new("10.0.0.2", 8002),
            ],
        };
        save_directory(&path, &directory).unwrap();

        let loaded = load_directory(&path);
        assert_eq!(loaded.bootstrap_addresses.len(), 2);
        assert_eq!(loaded.bootstrap_addresses[0], Address::new("127.0.0.1", 8001));
    }

    #[test]
    fn test_missing_or_corrupt_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BOOTSTRAP_DIRECTORY_FILE);

        assert!(load_directory(&path).bootstrap_addresses.is_empty());

        fs::write(&path, "{isto não é json").unwrap();
        assert!(load_directory(&path).bootstrap_addresses.is_empty());
    }

    #[test]
    fn test_directory_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BOOTSTRAP_DIRECTORY_FILE);

        let directory = BootstrapDirectory {
            bootstrap_addresses: vec![Address::new("127.0.0.1", 8001)],
        };
        save_directory(&path, &directory).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw["bootstrap_addresses"][0],
            serde_json::json!(["127.0.0.1", 8001])
        );
    }
}
