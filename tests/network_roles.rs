//! Testes ponta a ponta dos papéis da rede sobre TCP local: mineração solo,
//! compra com difusão e aprovação, transferência entre usuários e
//! atualização de cadeia de um nó atrasado.

use dini::node::{Node, Role};
use dini::{Bootstrap, Miner, User};
use dini_core::{ActionStatus, Transaction};
use shared::config::consensus::BLOCK_REWARD;
use shared::{well_known, Address, KeyPair};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const MINING_TIMEOUT: Duration = Duration::from_secs(120);
const NETWORK_TIMEOUT: Duration = Duration::from_secs(20);

/// Papel inerte: todos os tratadores nos padrões
struct Idle;
impl Role for Idle {}

async fn wait_until<F>(timeout: Duration, description: &str, check: F)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("tempo esgotado aguardando: {description}");
}

fn local(port: u16) -> Address {
    Address::new("127.0.0.1", port)
}

fn signed_transaction(amount: u64, tip: u64) -> Transaction {
    let sender = KeyPair::generate().unwrap();
    let recipient = KeyPair::generate().unwrap();
    let mut transaction = Transaction::new(sender.public_key, recipient.public_key, amount, tip);
    transaction.sign(&sender.private_key).unwrap();
    transaction
}

async fn spawn_node(port: u16, name: &str, public_key: Option<shared::PublicKey>) -> Arc<Node> {
    Node::bind(local(port), name, public_key)
        .await
        .expect("porta de teste livre")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nodes_exchange_name_cards_on_connect() {
    let keys_a = KeyPair::generate().unwrap();
    let keys_b = KeyPair::generate().unwrap();

    let node_a = spawn_node(18101, "alfa", Some(keys_a.public_key.clone()))
        .await;
    let node_b = spawn_node(18102, "beta", Some(keys_b.public_key.clone()))
        .await;
    node_a.run(Arc::new(Idle));
    node_b.run(Arc::new(Idle));

    node_b.connect_to_node(local(18101)).await.unwrap();

    wait_until(NETWORK_TIMEOUT, "troca de cartões de nome", || {
        node_a.lookup_name("beta").is_some() && node_b.lookup_name("alfa").is_some()
    })
    .await;

    assert_eq!(node_a.lookup_name("beta").unwrap(), keys_b.public_key);
    assert_eq!(node_b.lookup_name("alfa").unwrap(), keys_a.public_key);
    assert!(node_a.is_connected(&local(18102)));
    assert!(node_b.is_connected(&local(18101)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn solo_miner_mines_injected_transaction() {
    let data_dir = tempfile::tempdir().unwrap();
    let keys = KeyPair::generate().unwrap();
    let miner_pk = keys.public_key.clone();

    let node = spawn_node(18111, "miner-solo", Some(keys.public_key.clone()))
        .await;
    let miner = Miner::start(node, keys, data_dir.path()).await.unwrap();

    let transaction = signed_transaction(10, 1);
    assert!(!miner.process_transaction_data(transaction.clone()));
    assert_eq!(miner.mempool_size(), 1);

    miner.start_mining(1);
    wait_until(MINING_TIMEOUT, "mineração do bloco", || {
        miner.chain_length() == 2
    })
    .await;

    let blockchain = miner.blockchain_snapshot();
    assert!(blockchain.is_chain_valid());

    // estrutura tripla: [gorjetas=1, comum=10, recompensa]
    let block = &blockchain.chain[1];
    assert_eq!(block.transactions.len(), 3);
    assert_eq!(block.transactions[0].sender, well_known().tipping.public_key);
    assert_eq!(block.transactions[0].amount, 1);
    assert_eq!(block.transactions[0].recipient, miner_pk);
    assert_eq!(block.transactions[1].id(), transaction.id());
    assert_eq!(block.transactions[2].sender, well_known().bonus.public_key);
    assert_eq!(block.transactions[2].amount, BLOCK_REWARD);
    assert!(block.proof_of_work_valid());

    // as transações mineradas saíram do mempool
    assert_eq!(miner.mempool_size(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_transactions_never_enter_the_mempool() {
    let data_dir = tempfile::tempdir().unwrap();
    let keys = KeyPair::generate().unwrap();

    let node = spawn_node(18115, "miner-rigoroso", Some(keys.public_key.clone()))
        .await;
    let miner = Miner::start(node, keys, data_dir.path()).await.unwrap();

    // valor nulo com assinatura válida: descartada, mempool inalterado
    let zero_amount = signed_transaction(0, 1);
    assert!(zero_amount.verify_signature());
    assert!(miner.process_transaction_data(zero_amount));
    assert_eq!(miner.mempool_size(), 0);

    // assinatura adulterada: descartada
    let mut tampered = signed_transaction(10, 1);
    tampered.amount = 99;
    assert!(miner.process_transaction_data(tampered));
    assert_eq!(miner.mempool_size(), 0);

    // válida entra uma única vez; a repetição é reportada como já vista
    let valid = signed_transaction(10, 1);
    assert!(!miner.process_transaction_data(valid.clone()));
    assert!(miner.process_transaction_data(valid));
    assert_eq!(miner.mempool_size(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn buy_broadcast_mine_and_transfer_between_users() {
    let data_dir = tempfile::tempdir().unwrap();

    // diretório de bootstrap sem chave pública
    let bootstrap_node = spawn_node(18121, "bootstrap", None).await;
    let _bootstrap = Bootstrap::start(bootstrap_node, data_dir.path())
        .await
        .unwrap();

    // minerador descobre o bootstrap pelo arquivo de diretório
    let miner_keys = KeyPair::generate().unwrap();
    let miner_node = spawn_node(18122, "miner-m", Some(miner_keys.public_key.clone()))
        .await;
    let miner = Miner::start(miner_node, miner_keys, data_dir.path())
        .await
        .unwrap();

    // dois usuários entram pela mesma descoberta
    let user1_keys = KeyPair::generate().unwrap();
    let user1_node = spawn_node(18123, "u1", Some(user1_keys.public_key.clone()))
        .await;
    let user1 = User::start(Arc::clone(&user1_node), user1_keys, data_dir.path())
        .await
        .unwrap();

    let user2_keys = KeyPair::generate().unwrap();
    let user2_node = spawn_node(18124, "u2", Some(user2_keys.public_key.clone()))
        .await;
    let user2 = User::start(Arc::clone(&user2_node), user2_keys, data_dir.path())
        .await
        .unwrap();

    // o gossip de endereços forma a malha completa
    wait_until(NETWORK_TIMEOUT, "malha de pares do usuário 1", || {
        user1_node.connected_addresses().len() >= 3
    })
    .await;
    wait_until(NETWORK_TIMEOUT, "malha de pares do usuário 2", || {
        user2_node.connected_addresses().len() >= 3
    })
    .await;

    // compra: ação pendente + difusão até o mempool do minerador
    let buy_id = user1.buy_dinis(100).unwrap();
    assert_eq!(
        user1.action(&buy_id).unwrap().status,
        ActionStatus::Pending
    );
    wait_until(NETWORK_TIMEOUT, "transação de compra no mempool", || {
        miner.mempool_size() == 1
    })
    .await;

    miner.start_mining(1);
    wait_until(MINING_TIMEOUT, "aprovação da compra", || {
        user1
            .action(&buy_id)
            .is_some_and(|action| action.status == ActionStatus::Approved)
    })
    .await;

    assert_eq!(user1.balance(), 100);
    assert_eq!(miner.chain_length(), 2);
    assert_eq!(user1.latest_hash(), miner.latest_hash());

    // transferência por nome: u1 conhece "u2" pelo cartão de nome
    wait_until(NETWORK_TIMEOUT, "cartão de nome de u2", || {
        user1_node.lookup_name("u2").is_some()
    })
    .await;
    wait_until(MINING_TIMEOUT, "u2 alcançar o topo", || {
        user2.latest_hash() == miner.latest_hash()
    })
    .await;

    wait_until(NETWORK_TIMEOUT, "laço de mineração encerrar", || {
        !miner.is_mining()
    })
    .await;

    let transfer_id = user1.add_transaction("u2", 40, 2).unwrap();
    wait_until(NETWORK_TIMEOUT, "transferência no mempool", || {
        miner.mempool_size() == 1
    })
    .await;

    miner.start_mining(1);
    wait_until(MINING_TIMEOUT, "aprovação da transferência", || {
        user1
            .action(&transfer_id)
            .is_some_and(|action| action.status == ActionStatus::Approved)
    })
    .await;

    // o saldo debita o valor; a gorjeta chega ao minerador pela transação
    // de gorjetas do bloco
    assert_eq!(user1.balance(), 60);
    wait_until(NETWORK_TIMEOUT, "crédito em u2", || user2.balance() == 40)
        .await;

    let blockchain = miner.blockchain_snapshot();
    assert!(blockchain.is_chain_valid());
    let last_block = &blockchain.chain[2];
    assert_eq!(last_block.transactions[0].amount, 2); // gorjeta agregada
    assert_eq!(
        last_block.transactions[last_block.transactions.len() - 1].amount,
        BLOCK_REWARD
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lagging_user_catches_up_to_miner_tip() {
    let data_dir = tempfile::tempdir().unwrap();
    let miner_keys = KeyPair::generate().unwrap();

    let miner_node = spawn_node(18131, "miner-adiantado", Some(miner_keys.public_key.clone()))
        .await;
    let miner = Miner::start(miner_node, miner_keys, data_dir.path())
        .await
        .unwrap();

    // minera dois blocos antes do usuário existir
    for expected_length in [2usize, 3] {
        assert!(!miner.process_transaction_data(signed_transaction(10, 1)));
        miner.start_mining(1);
        wait_until(MINING_TIMEOUT, "bloco minerado", || {
            miner.chain_length() == expected_length
        })
        .await;
        wait_until(NETWORK_TIMEOUT, "laço de mineração encerrar", || {
            !miner.is_mining()
        })
        .await;
    }
    assert_eq!(miner.chain_length(), 3);

    // o usuário parte do gênese e alcança o topo com um único pedido
    let user_keys = KeyPair::generate().unwrap();
    let user_node = spawn_node(18132, "u-atrasado", Some(user_keys.public_key.clone()))
        .await;
    let user = User::start(Arc::clone(&user_node), user_keys, data_dir.path())
        .await
        .unwrap();
    assert_eq!(user.latest_hash(), dini_core::genesis_hash());

    user_node.connect_to_node(local(18131)).await.unwrap();
    wait_until(NETWORK_TIMEOUT, "conexão com o minerador", || {
        user_node.is_connected(&local(18131))
    })
    .await;

    user.request_blockchain_update();
    wait_until(NETWORK_TIMEOUT, "carteira alcançar o topo", || {
        user.latest_hash() == miner.latest_hash()
    })
    .await;
}
