//! Protocolo de quadros da rede Dini.
//!
//! Cada quadro é `<comprimento ASCII decimal> ":" <tipo de 4 bytes>
//! <subtipo de 4 bytes> <payload>`, com o comprimento cobrindo apenas o
//! payload. O payload é uma lista JSON cujo primeiro elemento é o objeto de
//! domínio em forma de dicionário; o subtipo dirige a decodificação para um
//! tipo soma fechado na própria fronteira do protocolo.

use dini_core::{Block, Blockchain, Transaction};
use serde_json::Value;
use shared::{Address, DiniError, Hash256, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Tamanho dos campos de tipo e subtipo no quadro
const TAG_LENGTH: usize = 4;

/// Limite de dígitos no prefixo de comprimento
const MAX_LENGTH_DIGITS: usize = 9;

/// Payload máximo aceito; acima disso o fluxo é considerado corrompido
const MAX_PAYLOAD_LENGTH: usize = 64 * 1024 * 1024;

/// Disciplina da mensagem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    /// Pedido de objeto (`reqt`)
    Request,
    /// Resposta ou envio direto (`resp`)
    Response,
    /// Difusão com flood (`bcst`)
    Broadcast,
}

impl MsgType {
    const fn tag(self) -> &'static str {
        match self {
            Self::Request => "reqt",
            Self::Response => "resp",
            Self::Broadcast => "bcst",
        }
    }

    fn from_tag(tag: &[u8]) -> Result<Self> {
        match tag {
            b"reqt" => Ok(Self::Request),
            b"resp" => Ok(Self::Response),
            b"bcst" => Ok(Self::Broadcast),
            _ => Err(DiniError::UnknownSubtype(format!(
                "tipo de mensagem {:?}",
                String::from_utf8_lossy(tag)
            ))),
        }
    }
}

/// Assunto da mensagem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgSubtype {
    /// Canal de diagnóstico sem efeito semântico
    Test,
    /// Endereços de pares conhecidos
    Node,
    /// Anúncio do endereço de escuta na abertura da conexão
    Init,
    /// Cartão de nome: nome do nó + chave pública PEM
    Name,
    /// Um bloco minerado
    Block,
    /// Uma transação assinada
    Transaction,
    /// Uma sub-cadeia para atualização
    Blockchain,
}

impl MsgSubtype {
    const fn tag(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Node => "node",
            Self::Init => "init",
            Self::Name => "name",
            Self::Block => "blok",
            Self::Transaction => "trsn",
            Self::Blockchain => "bkcn",
        }
    }

    fn from_tag(tag: &[u8]) -> Result<Self> {
        match tag {
            b"test" => Ok(Self::Test),
            b"node" => Ok(Self::Node),
            b"init" => Ok(Self::Init),
            b"name" => Ok(Self::Name),
            b"blok" => Ok(Self::Block),
            b"trsn" => Ok(Self::Transaction),
            b"bkcn" => Ok(Self::Blockchain),
            _ => Err(DiniError::UnknownSubtype(
                String::from_utf8_lossy(tag).into_owned(),
            )),
        }
    }
}

/// Corpo tipado de uma mensagem, decodificado pelo par (tipo, subtipo)
#[derive(Debug, Clone)]
pub enum MsgBody {
    /// Sem payload (pedidos de endereços)
    Empty,
    /// Endereço de escuta anunciado (`init`)
    Address(Address),
    /// Lista de endereços de pares (`node`)
    AddressList(Vec<Address>),
    /// Cartão de nome (`name`)
    NameCard { name: String, public_key_pem: String },
    /// Bloco (`blok`)
    Block(Block),
    /// Transação (`trsn`)
    Transaction(Transaction),
    /// Sub-cadeia (`bkcn` em resposta)
    Blockchain(Blockchain),
    /// Hash do topo do requisitante (`bkcn` em pedido)
    LatestHash(Hash256),
    /// Texto de diagnóstico (`test`)
    Text(String),
}

/// Mensagem completa do protocolo
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: MsgType,
    pub subtype: MsgSubtype,
    pub body: MsgBody,
}

impl Message {
    /// Anúncio do endereço de escuta, primeiro quadro de toda conexão de saída
    #[must_use]
    pub const fn init(address: Address) -> Self {
        Self {
            msg_type: MsgType::Response,
            subtype: MsgSubtype::Init,
            body: MsgBody::Address(address),
        }
    }

    /// Cartão de nome enviado logo após o início da recepção
    #[must_use]
    pub const fn name_card(name: String, public_key_pem: String) -> Self {
        Self {
            msg_type: MsgType::Response,
            subtype: MsgSubtype::Name,
            body: MsgBody::NameCard {
                name,
                public_key_pem,
            },
        }
    }

    /// Pedido distribuído de endereços de pares
    #[must_use]
    pub const fn node_request() -> Self {
        Self {
            msg_type: MsgType::Request,
            subtype: MsgSubtype::Node,
            body: MsgBody::Empty,
        }
    }

    /// Resposta focada com a lista de pares conectados
    #[must_use]
    pub const fn node_response(addresses: Vec<Address>) -> Self {
        Self {
            msg_type: MsgType::Response,
            subtype: MsgSubtype::Node,
            body: MsgBody::AddressList(addresses),
        }
    }

    /// Pedido de atualização de cadeia a partir do hash dado
    #[must_use]
    pub const fn chain_request(latest_hash: Hash256) -> Self {
        Self {
            msg_type: MsgType::Request,
            subtype: MsgSubtype::Blockchain,
            body: MsgBody::LatestHash(latest_hash),
        }
    }

    /// Resposta focada com uma sub-cadeia
    #[must_use]
    pub const fn chain_response(blockchain: Blockchain) -> Self {
        Self {
            msg_type: MsgType::Response,
            subtype: MsgSubtype::Blockchain,
            body: MsgBody::Blockchain(blockchain),
        }
    }

    /// Envio direto de uma transação assinada aos pares
    #[must_use]
    pub const fn transaction_response(transaction: Transaction) -> Self {
        Self {
            msg_type: MsgType::Response,
            subtype: MsgSubtype::Transaction,
            body: MsgBody::Transaction(transaction),
        }
    }

    /// Difusão de um bloco recém-minerado
    #[must_use]
    pub const fn block_broadcast(block: Block) -> Self {
        Self {
            msg_type: MsgType::Broadcast,
            subtype: MsgSubtype::Block,
            body: MsgBody::Block(block),
        }
    }

    /// Serializa a mensagem no formato de quadro do protocolo
    ///
    /// # Errors
    ///
    /// Retorna erro se a serialização JSON do corpo falhar
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = self.payload_bytes()?;
        let mut frame =
            Vec::with_capacity(payload.len() + MAX_LENGTH_DIGITS + 1 + 2 * TAG_LENGTH);
        frame.extend_from_slice(payload.len().to_string().as_bytes());
        frame.push(b':');
        frame.extend_from_slice(self.msg_type.tag().as_bytes());
        frame.extend_from_slice(self.subtype.tag().as_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    fn payload_bytes(&self) -> Result<Vec<u8>> {
        let items: Option<Vec<Value>> = match &self.body {
            MsgBody::Empty => None,
            MsgBody::Address(address) => Some(vec![json_value(address)?]),
            MsgBody::AddressList(addresses) => Some(vec![json_value(addresses)?]),
            MsgBody::NameCard {
                name,
                public_key_pem,
            } => Some(vec![json_value(name)?, json_value(public_key_pem)?]),
            MsgBody::Block(block) => Some(vec![json_value(block)?]),
            MsgBody::Transaction(transaction) => Some(vec![json_value(transaction)?]),
            MsgBody::Blockchain(blockchain) => Some(vec![json_value(blockchain)?]),
            MsgBody::LatestHash(hash) => Some(vec![json_value(hash)?]),
            MsgBody::Text(text) => Some(vec![json_value(text)?]),
        };

        match items {
            None => Ok(Vec::new()),
            Some(items) => serde_json::to_vec(&Value::Array(items))
                .map_err(|e| DiniError::SerializationError(e.to_string())),
        }
    }
}

fn json_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| DiniError::SerializationError(e.to_string()))
}

fn from_item<T: serde::de::DeserializeOwned>(items: &[Value], index: usize) -> Result<T> {
    let item = items
        .get(index)
        .ok_or_else(|| DiniError::SerializationError("payload sem o elemento esperado".into()))?;
    serde_json::from_value(item.clone())
        .map_err(|e| DiniError::SerializationError(e.to_string()))
}

/// Decodifica o corpo tipado a partir do par (tipo, subtipo)
fn decode_body(msg_type: MsgType, subtype: MsgSubtype, payload: &[u8]) -> Result<MsgBody> {
    if payload.is_empty() {
        return Ok(MsgBody::Empty);
    }

    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| DiniError::SerializationError(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(DiniError::SerializationError(
            "payload não é uma lista".into(),
        ));
    };

    let body = match subtype {
        MsgSubtype::Test => MsgBody::Text(from_item(&items, 0)?),
        MsgSubtype::Init => MsgBody::Address(from_item(&items, 0)?),
        MsgSubtype::Node => MsgBody::AddressList(from_item(&items, 0)?),
        MsgSubtype::Name => MsgBody::NameCard {
            name: from_item(&items, 0)?,
            public_key_pem: from_item(&items, 1)?,
        },
        MsgSubtype::Block => MsgBody::Block(from_item(&items, 0)?),
        MsgSubtype::Transaction => MsgBody::Transaction(from_item(&items, 0)?),
        MsgSubtype::Blockchain => match msg_type {
            MsgType::Request => MsgBody::LatestHash(from_item(&items, 0)?),
            _ => MsgBody::Blockchain(from_item(&items, 0)?),
        },
    };
    Ok(body)
}

/// Lê uma mensagem completa do fluxo.
///
/// Apenas erros de I/O encerram a conexão; quadros malformados
/// (`MalformedFrame`) e payloads bem delimitados que não decodificam
/// (`UnknownSubtype`, `SerializationError`) são registrados e descartados
/// pelo chamador, mantendo a conexão aberta.
///
/// # Errors
///
/// Retorna erro de I/O, de enquadramento ou de decodificação
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    // comprimento em ASCII decimal até ':'
    let mut length_digits = String::new();
    loop {
        let byte = reader.read_u8().await?;
        if byte == b':' {
            break;
        }
        if !byte.is_ascii_digit() || length_digits.len() >= MAX_LENGTH_DIGITS {
            return Err(DiniError::MalformedFrame(format!(
                "prefixo de comprimento inválido: {length_digits:?} + {byte:#04x}"
            )));
        }
        length_digits.push(char::from(byte));
    }
    if length_digits.is_empty() {
        return Err(DiniError::MalformedFrame("comprimento vazio".into()));
    }
    let payload_len: usize = length_digits
        .parse()
        .map_err(|_| DiniError::MalformedFrame(format!("comprimento ilegível: {length_digits}")))?;
    if payload_len > MAX_PAYLOAD_LENGTH {
        return Err(DiniError::MalformedFrame(format!(
            "payload de {payload_len} bytes excede o limite"
        )));
    }

    let mut type_tag = [0u8; TAG_LENGTH];
    reader.read_exact(&mut type_tag).await?;
    let mut subtype_tag = [0u8; TAG_LENGTH];
    reader.read_exact(&mut subtype_tag).await?;

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    // valida as tags só depois de consumir o payload, mantendo o fluxo em sincronia
    let msg_type = MsgType::from_tag(&type_tag)?;
    let subtype = MsgSubtype::from_tag(&subtype_tag)?;
    let body = decode_body(msg_type, subtype, &payload)?;

    Ok(Message {
        msg_type,
        subtype,
        body,
    })
}
