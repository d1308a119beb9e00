//! Camada de pares da rede Dini.
//!
//! Um [`Node`] mantém as conexões TCP, recebe quadros em uma tarefa por par,
//! drena tudo por uma única fila de despacho e expõe as três disciplinas de
//! envio: focada, distribuída e difusão com flood. O conteúdo das mensagens
//! é entregue a um [`Role`] — bootstrap, minerador ou usuário — que o nó não
//! conhece além da interface de tratadores.

use crate::protocol::{self, Message, MsgBody, MsgSubtype, MsgType};
use dini_core::{Block, Blockchain, Transaction};
use shared::{Address, DiniError, Hash256, PublicKey, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

/// Interface de um papel da rede com os sete tratadores de mensagens.
///
/// Os padrões correspondem ao comportamento de um bootstrap: servir nada de
/// cadeia e reportar conteúdo de consenso como já visto, o que impede um nó
/// sem estado de re-propagar o mesmo broadcast indefinidamente.
pub trait Role: Send + Sync + 'static {
    /// Responde um pedido de endereços; `None` descarta o pedido em silêncio
    fn serve_node_request(&self) -> Option<Vec<Address>> {
        None
    }

    /// Responde um pedido de atualização de cadeia a partir do hash dado
    fn serve_blockchain_request(&self, _latest_hash: &Hash256) -> Option<Blockchain> {
        None
    }

    /// Processa uma lista de endereços de pares recebida
    fn process_node_data(&self, _addresses: Vec<Address>) {}

    /// Processa um bloco recebido; `true` significa conteúdo já visto
    fn process_block_data(&self, _block: Block) -> bool {
        true
    }

    /// Processa uma sub-cadeia recebida em resposta a um pedido
    fn process_blockchain_data(&self, _blockchain: Blockchain) {}

    /// Processa uma transação recebida; `true` significa conteúdo já visto
    fn process_transaction_data(&self, _transaction: Transaction) -> bool {
        true
    }

    /// Canal de diagnóstico; sem efeito semântico
    fn process_test_data(&self, text: &str) -> bool {
        info!(text, "mensagem de teste recebida");
        true
    }
}

/// Mensagem enfileirada com o endereço do par de origem
struct Envelope {
    source: Address,
    message: Message,
}

/// Nó de comunicação: conexões, fila de mensagens e disciplinas de envio
pub struct Node {
    self_ref: Weak<Node>,
    address: Address,
    name: String,
    public_key: Option<PublicKey>,
    connections: RwLock<HashMap<Address, UnboundedSender<Vec<u8>>>>,
    names_to_pk: RwLock<HashMap<String, PublicKey>>,
    queue_tx: UnboundedSender<Envelope>,
    queue_rx: Mutex<Option<UnboundedReceiver<Envelope>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Abre o socket de escuta e inicia a tarefa de aceitação.
    ///
    /// `address` é o endereço anunciado aos pares; a escuta é em `0.0.0.0`
    /// na porta dada. Papéis sem chave pública (bootstraps) passam `None` e
    /// não enviam cartão de nome.
    ///
    /// # Errors
    ///
    /// Retorna erro se o socket de escuta não puder ser aberto
    pub async fn bind(
        address: Address,
        name: &str,
        public_key: Option<PublicKey>,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(("0.0.0.0", address.port())).await?;
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let node = Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            address,
            name: name.to_string(),
            public_key,
            connections: RwLock::new(HashMap::new()),
            names_to_pk: RwLock::new(HashMap::new()),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            tasks: Mutex::new(Vec::new()),
        });

        let accept_handle = tokio::spawn(accept_loop(Arc::clone(&node), listener));
        node.tasks.lock().expect("lock de tarefas").push(accept_handle);

        info!(address = %node.address, name = %node.name, "nó escutando");
        Ok(node)
    }

    /// Endereço anunciado deste nó
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Arc vivo deste nó; só falha se o nó já foi inteiramente descartado
    fn arc(&self) -> Arc<Self> {
        self.self_ref.upgrade().expect("nó ainda vivo")
    }

    /// Inicia a tarefa de despacho entregando as mensagens ao papel dado
    pub fn run<R: Role>(&self, role: Arc<R>) {
        let receiver = self.queue_rx.lock().expect("lock da fila").take();
        let Some(mut receiver) = receiver else {
            warn!("despacho já iniciado; chamada ignorada");
            return;
        };

        let node = self.arc();
        let handle = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                dispatch(&node, role.as_ref(), envelope);
            }
        });
        self.tasks.lock().expect("lock de tarefas").push(handle);
    }

    /// Conecta a um par e anuncia o próprio endereço com `resp/init`.
    ///
    /// O quadro de init é obrigatório porque o lado que aceita enxerga
    /// apenas a porta efêmera remota, não a porta de escuta do par.
    ///
    /// # Errors
    ///
    /// Retorna erro se a conexão TCP falhar
    pub async fn connect_to_node(&self, address: Address) -> Result<()> {
        if address == self.address {
            return Ok(());
        }
        if self.is_connected(&address) {
            debug!(%address, "par já conectado");
            return Ok(());
        }

        let stream = TcpStream::connect((address.ip(), address.port()))
            .await
            .map_err(|e| DiniError::NetworkError(format!("falha ao conectar a {address}: {e}")))?;

        let init_frame = Message::init(self.address.clone()).encode()?;
        self.install_connection(address, stream, Some(init_frame));
        Ok(())
    }

    /// Registra a conexão, inicia as tarefas de escrita e recepção e envia
    /// o cartão de nome quando o papel possui chave pública
    fn install_connection(&self, address: Address, stream: TcpStream, init_frame: Option<Vec<u8>>) {
        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        if let Some(frame) = init_frame {
            let _ = writer_tx.send(frame);
        }
        if let Some(public_key) = &self.public_key {
            match Message::name_card(self.name.clone(), public_key.to_pem()).encode() {
                Ok(frame) => {
                    let _ = writer_tx.send(frame);
                }
                Err(e) => error!(%e, "falha ao codificar cartão de nome"),
            }
        }

        {
            let mut connections = self.connections.write().expect("lock de conexões");
            if connections.contains_key(&address) {
                warn!(%address, "par já conectado; conexão duplicada descartada");
                return;
            }
            connections.insert(address.clone(), writer_tx);
        }

        let reader_handle = tokio::spawn(receive_loop(self.arc(), address.clone(), read_half));
        tokio::spawn(writer_loop(
            self.arc(),
            address.clone(),
            write_half,
            writer_rx,
            reader_handle.abort_handle(),
        ));
        info!(%address, "conexão estabelecida");
    }

    /// Envia um quadro a um único par; falha em silêncio se o par sumiu
    pub fn send_focused(&self, address: &Address, message: &Message) -> bool {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(%e, "falha ao codificar mensagem focada");
                return false;
            }
        };

        let sender = {
            let connections = self.connections.read().expect("lock de conexões");
            connections.get(address).cloned()
        };
        match sender {
            Some(sender) => {
                let delivered = sender.send(frame).is_ok();
                if !delivered {
                    warn!(%address, "escritor do par encerrado");
                }
                delivered
            }
            None => {
                warn!(%address, "par não encontrado para mensagem focada");
                false
            }
        }
    }

    /// Envia um quadro a todos os pares, exceto o opcionalmente excluído.
    /// O mapa só fica travado durante o snapshot; as escritas acontecem fora.
    pub fn send_distributed(&self, message: &Message, excluded: Option<&Address>) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!(%e, "falha ao codificar mensagem distribuída");
                return;
            }
        };

        let targets: Vec<(Address, UnboundedSender<Vec<u8>>)> = {
            let connections = self.connections.read().expect("lock de conexões");
            connections
                .iter()
                .filter(|(address, _)| excluded != Some(*address))
                .map(|(address, sender)| (address.clone(), sender.clone()))
                .collect()
        };

        for (address, sender) in &targets {
            if sender.send(frame.clone()).is_err() {
                warn!(%address, "falha ao enviar mensagem distribuída");
            }
        }
        debug!(
            count = targets.len(),
            subtype = ?message.subtype,
            "mensagem distribuída"
        );
    }

    /// Endereços de todos os pares conectados
    #[must_use]
    pub fn connected_addresses(&self) -> Vec<Address> {
        self.connections
            .read()
            .expect("lock de conexões")
            .keys()
            .cloned()
            .collect()
    }

    /// Verifica se o par está no mapa de conexões
    #[must_use]
    pub fn is_connected(&self, address: &Address) -> bool {
        self.connections
            .read()
            .expect("lock de conexões")
            .contains_key(address)
    }

    /// Resolve um nome de nó para a chave pública anunciada
    #[must_use]
    pub fn lookup_name(&self, name: &str) -> Option<PublicKey> {
        self.names_to_pk
            .read()
            .expect("lock de nomes")
            .get(name)
            .cloned()
    }

    fn record_name(&self, name: String, public_key: PublicKey) {
        debug!(name, %public_key, "cartão de nome registrado");
        self.names_to_pk
            .write()
            .expect("lock de nomes")
            .insert(name, public_key);
    }

    fn remove_connection(&self, address: &Address) {
        self.connections
            .write()
            .expect("lock de conexões")
            .remove(address);
        info!(%address, "par removido");
    }

    /// Encerramento: derruba as tarefas de aceitação e despacho e fecha as
    /// conexões descartando os escritores
    pub fn shutdown(&self) {
        for task in self.tasks.lock().expect("lock de tarefas").drain(..) {
            task.abort();
        }
        self.connections
            .write()
            .expect("lock de conexões")
            .clear();
        info!(address = %self.address, "nó encerrado");
    }
}

/// Aceita conexões entrantes; cada uma é negociada em tarefa própria
async fn accept_loop(node: Arc<Node>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!(%remote, "conexão entrante");
                tokio::spawn(handle_incoming(Arc::clone(&node), stream));
            }
            Err(e) => {
                error!(%e, "erro ao aceitar conexão");
            }
        }
    }
}

/// Lê o primeiro quadro de uma conexão entrante, que precisa ser o
/// `resp/init` com o endereço de escuta anunciado pelo par
async fn handle_incoming(node: Arc<Node>, mut stream: TcpStream) {
    match protocol::read_message(&mut stream).await {
        Ok(Message {
            msg_type: MsgType::Response,
            subtype: MsgSubtype::Init,
            body: MsgBody::Address(address),
        }) => {
            node.install_connection(address, stream, None);
        }
        Ok(message) => {
            warn!(
                subtype = ?message.subtype,
                "primeiro quadro da conexão não é init; conexão descartada"
            );
        }
        Err(e) => {
            warn!(%e, "falha ao ler o quadro de init; conexão descartada");
        }
    }
}

/// Escoa os quadros enfileirados para o socket do par. Falha de escrita é
/// erro de socket: o par sai do mapa de conexões e a tarefa de recepção
/// correspondente é derrubada.
async fn writer_loop(
    node: Arc<Node>,
    address: Address,
    mut write_half: OwnedWriteHalf,
    mut receiver: UnboundedReceiver<Vec<u8>>,
    reader_abort: AbortHandle,
) {
    while let Some(frame) = receiver.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            warn!(%address, %e, "falha de escrita; fechando conexão");
            node.remove_connection(&address);
            reader_abort.abort();
            return;
        }
    }
}

/// Recebe quadros de um par e os enfileira para despacho. Apenas erros de
/// socket fecham a conexão e removem o par; quadros malformados ou
/// indecifráveis são registrados e descartados mantendo a conexão.
async fn receive_loop(node: Arc<Node>, address: Address, read_half: OwnedReadHalf) {
    let mut reader = BufReader::new(read_half);
    loop {
        match protocol::read_message(&mut reader).await {
            Ok(message) => {
                let envelope = Envelope {
                    source: address.clone(),
                    message,
                };
                if node.queue_tx.send(envelope).is_err() {
                    break;
                }
            }
            Err(DiniError::IoError(e)) => {
                debug!(%address, %e, "conexão encerrada");
                break;
            }
            Err(e) => {
                warn!(%address, %e, "quadro descartado");
            }
        }
    }
    node.remove_connection(&address);
}

/// Roteia uma mensagem pelo par (tipo, subtipo) até o tratador do papel
fn dispatch<R: Role>(node: &Arc<Node>, role: &R, envelope: Envelope) {
    let Envelope { source, message } = envelope;
    match message.msg_type {
        MsgType::Request => {
            let reply = match (message.subtype, &message.body) {
                (MsgSubtype::Node, _) => role.serve_node_request().map(Message::node_response),
                (MsgSubtype::Blockchain, MsgBody::LatestHash(latest_hash)) => role
                    .serve_blockchain_request(latest_hash)
                    .map(Message::chain_response),
                _ => {
                    warn!(subtype = ?message.subtype, "pedido inválido ignorado");
                    None
                }
            };
            // sem resposta: descarta e confia que outro par atenda
            if let Some(reply) = reply {
                debug!(%source, subtype = ?reply.subtype, "respondendo pedido");
                node.send_focused(&source, &reply);
            }
        }
        MsgType::Response => match message.body {
            MsgBody::NameCard {
                name,
                public_key_pem,
            } => match PublicKey::from_pem(&public_key_pem) {
                Ok(public_key) => node.record_name(name, public_key),
                Err(e) => warn!(name, %e, "cartão de nome com chave ilegível"),
            },
            MsgBody::AddressList(addresses) => role.process_node_data(addresses),
            MsgBody::Block(block) => {
                role.process_block_data(block);
            }
            MsgBody::Blockchain(blockchain) => role.process_blockchain_data(blockchain),
            MsgBody::Transaction(transaction) => {
                role.process_transaction_data(transaction);
            }
            MsgBody::Text(text) => {
                role.process_test_data(&text);
            }
            MsgBody::Address(_) => debug!(%source, "init fora de ordem ignorado"),
            MsgBody::Empty | MsgBody::LatestHash(_) => {
                warn!(%source, "resposta sem corpo útil ignorada");
            }
        },
        MsgType::Broadcast => {
            let already_seen = match &message.body {
                MsgBody::Block(block) => role.process_block_data(block.clone()),
                MsgBody::Transaction(transaction) => {
                    role.process_transaction_data(transaction.clone())
                }
                MsgBody::Text(text) => role.process_test_data(text),
                _ => {
                    warn!(subtype = ?message.subtype, "difusão inválida ignorada");
                    true
                }
            };
            // flood com supressão de duplicatas: re-propaga apenas conteúdo
            // inédito, nunca de volta ao par de origem
            if !already_seen {
                node.send_distributed(&message, Some(&source));
            }
        }
    }
}
