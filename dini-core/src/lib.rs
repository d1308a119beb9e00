pub mod block;
pub mod blockchain;
pub mod mempool;
pub mod mining;
pub mod transaction;
pub mod wallet;

// Re-exports principais
pub use block::Block;
pub use blockchain::{genesis_block, genesis_hash, Blockchain};
pub use mempool::Mempool;
pub use mining::{MinerConfig, MiningEngine};
pub use transaction::Transaction;
pub use wallet::{Action, ActionStatus, ActionType, Wallet};

// Re-exports de tipos compartilhados
pub use shared::{DiniError, Hash256, Result};
