pub mod config;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{well_known, KeyPair, PrivateKey, PublicKey, WellKnownKeys};
pub use error::DiniError;
pub use hash::Hash256;
pub use types::{Address, Amount};

pub type Result<T> = std::result::Result<T, DiniError>;
