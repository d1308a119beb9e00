//! Rede Dini: nós peer-to-peer que descobrem pares por diretórios de
//! bootstrap, fazem gossip de transações assinadas e blocos minerados e
//! convergem para uma única cadeia de prova de trabalho.

pub mod bootstrap;
pub mod miner;
pub mod node;
pub mod protocol;
pub mod user;

pub use bootstrap::Bootstrap;
pub use miner::Miner;
pub use node::{Node, Role};
pub use user::User;
