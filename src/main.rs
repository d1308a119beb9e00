use clap::{Args, Parser, Subcommand};
use dini::{Bootstrap, Miner, Node, User};
use shared::{Address, KeyPair};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "dini")]
#[command(about = "Dini - Rede de criptomoeda peer-to-peer com prova de trabalho")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Endereço IP anunciado aos pares
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    /// Diretório de dados (diretório de bootstrap, blockchain, carteira)
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Nível de log (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Diretório de bootstrap: gossip de endereços, sem consenso
    Bootstrap(BootstrapArgs),
    /// Minerador: validador de cadeia completa e produtor de blocos
    Miner(MinerArgs),
    /// Usuário: carteira leve e iniciador de transações
    User(UserArgs),
}

#[derive(Args)]
struct BootstrapArgs {
    /// Porta de escuta
    #[arg(short, long, default_value = "8000")]
    port: u16,
}

#[derive(Args)]
struct MinerArgs {
    /// Porta de escuta
    #[arg(short, long, default_value = "8100")]
    port: u16,

    /// Nome anunciado aos pares
    #[arg(long, default_value = "miner")]
    name: String,

    /// Blocos a minerar; -1 minera para sempre
    #[arg(long, default_value = "-1")]
    blocks: i64,
}

#[derive(Args)]
struct UserArgs {
    /// Porta de escuta
    #[arg(short, long, default_value = "8200")]
    port: u16,

    /// Nome anunciado aos pares
    #[arg(long, default_value = "user")]
    name: String,

    /// Compra essa quantidade de Dinis logo após a partida
    #[arg(long)]
    buy: Option<u64>,
}

#[tokio::main]
async fn main() -> shared::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match &cli.command {
        Commands::Bootstrap(args) => run_bootstrap(&cli, args).await,
        Commands::Miner(args) => run_miner(&cli, args).await,
        Commands::User(args) => run_user(&cli, args).await,
    }
}

async fn run_bootstrap(cli: &Cli, args: &BootstrapArgs) -> shared::Result<()> {
    let address = Address::new(cli.ip.clone(), args.port);
    let node = Node::bind(address, "bootstrap", None).await?;
    let bootstrap = Bootstrap::start(node, &cli.data_dir).await?;

    info!("diretório de bootstrap no ar; Ctrl+C encerra");
    wait_for_shutdown().await;
    bootstrap.shutdown();
    Ok(())
}

async fn run_miner(cli: &Cli, args: &MinerArgs) -> shared::Result<()> {
    let keys = KeyPair::generate()?;
    let address = Address::new(cli.ip.clone(), args.port);
    let node = Node::bind(address, &args.name, Some(keys.public_key.clone())).await?;
    let miner = Miner::start(node, keys, &cli.data_dir).await?;

    miner.start_mining(args.blocks);
    info!(blocks = args.blocks, "minerador no ar; Ctrl+C encerra");
    wait_for_shutdown().await;
    miner.stop_mining();
    Ok(())
}

async fn run_user(cli: &Cli, args: &UserArgs) -> shared::Result<()> {
    let keys = KeyPair::generate()?;
    let address = Address::new(cli.ip.clone(), args.port);
    let node = Node::bind(address, &args.name, Some(keys.public_key.clone())).await?;
    let user = User::start(node, keys, &cli.data_dir).await?;

    if let Some(amount) = args.buy {
        // dá tempo da descoberta de pares alcançar um minerador
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let id = user.buy_dinis(amount)?;
        info!(amount, id, "compra inicial registrada");
    }

    info!("usuário no ar; Ctrl+C encerra");
    wait_for_shutdown().await;
    info!(balance = user.balance(), "carteira ao encerrar");
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "falha ao aguardar Ctrl+C");
    }
}
