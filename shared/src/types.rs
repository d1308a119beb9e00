//! Tipos compartilhados entre os módulos da rede Dini

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alias para valor monetário em Dinis
pub type Amount = u64;

/// Endereço de rede anunciado por um nó: (ip, porta).
///
/// Serializa como par JSON `["ip", porta]`, o formato usado pelo arquivo de
/// diretório de bootstrap e pelo quadro `init`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String, pub u16);

impl Address {
    /// Cria um novo endereço de rede
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self(ip.into(), port)
    }

    /// Endereço IP do nó
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.0
    }

    /// Porta de escuta do nó
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.1
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let address = Address::new("127.0.0.1", 8001);
        assert_eq!(address.to_string(), "127.0.0.1:8001");
        assert_eq!(address.ip(), "127.0.0.1");
        assert_eq!(address.port(), 8001);
    }
}
