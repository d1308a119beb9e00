use thiserror::Error;

/// Erros de toda a rede Dini
#[derive(Error, Debug)]
pub enum DiniError {
    #[error("Transação inválida: {0}")]
    InvalidTransaction(String),

    #[error("Bloco inválido: {0}")]
    InvalidBlock(String),

    #[error("Hash inválido")]
    InvalidHash,

    #[error("Assinatura inválida")]
    InvalidSignature,

    #[error("Assinatura ausente")]
    MissingSignature,

    #[error("Dificuldade insuficiente")]
    InsufficientDifficulty,

    #[error("Erro criptográfico: {0}")]
    CryptographicError(String),

    #[error("Erro de serialização: {0}")]
    SerializationError(String),

    #[error("Quadro malformado: {0}")]
    MalformedFrame(String),

    #[error("Subtipo de mensagem desconhecido: {0}")]
    UnknownSubtype(String),

    #[error("Nó desconhecido: {0}")]
    UnknownPeer(String),

    #[error("Erro de I/O: {0}")]
    IoError(String),

    #[error("Erro de rede: {0}")]
    NetworkError(String),
}

impl From<std::io::Error> for DiniError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
