//! Parâmetros fixos do protocolo Dini
//!
//! Os valores de consenso precisam ser idênticos em todos os nós da rede.

/// Parâmetros de consenso
pub mod consensus {
    /// Dígitos hexadecimais zero exigidos no início do hash de um bloco
    pub const DIFFICULTY_LEVEL: usize = 3;

    /// Recompensa fixa paga ao minerador em cada bloco
    pub const BLOCK_REWARD: u64 = 100;

    /// Máximo de transações comuns selecionadas para um bloco
    pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 1024;
}

/// Parâmetros do motor de mineração
pub mod mining {
    /// Número de threads trabalhadoras na busca de nonce
    pub const WORKER_COUNT: usize = 7;

    /// Espaço total de nonce explorado: [0, 2^32)
    pub const NONCE_SPACE: u64 = 1 << 32;
}

/// Parâmetros da carteira
pub mod wallet {
    /// Comprimento do identificador de ação: primeiros dígitos
    /// hexadecimais da assinatura da transação
    pub const ACTION_ID_LENGTH: usize = 8;

    /// Gorjeta fixa anexada às operações de compra e venda com a chave lord
    pub const EXCHANGE_TIP: u64 = 100;
}

/// Nomes de arquivos persistentes
pub mod files {
    /// Diretório raiz de dados de um nó
    pub const DATA_DIR: &str = "data";

    /// Diretório JSON com os endereços de bootstrap ativos
    pub const BOOTSTRAP_DIRECTORY_FILE: &str = "bootstrap_directory.json";

    /// Blockchain completa persistida por um minerador
    pub const BLOCKCHAIN_FILE: &str = "blockchain.json";

    /// Carteira persistida por um usuário
    pub const WALLET_FILE: &str = "wallet.json";
}
