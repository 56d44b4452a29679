use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "solace")]
#[command(about = "Solace CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the completion relay (HTTP endpoint the chat clients talk to).
    Relay {
        /// Config file path (default: SOLACE_CONFIG_PATH or ~/.solace/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 5000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the support bot via the relay (interactive, guest session).
    Chat {
        /// Config file path (default: SOLACE_CONFIG_PATH or ~/.solace/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("solace {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Relay { config, port }) => {
            if let Err(e) = run_relay(config, port).await {
                log::error!("relay failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_relay(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.relay.port = p;
    }
    log::info!(
        "starting relay on {}:{}",
        config.relay.bind,
        config.relay.port
    );
    lib::relay::run_relay(config).await
}

/// Interactive guest session: messages live in memory only and nothing is
/// written durably.
async fn run_chat(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _path) = lib::config::load_config(config_path)?;
    let base_url = format!(
        "http://{}:{}",
        config.relay.bind.trim(),
        config.relay.port
    );
    let token = lib::config::resolve_relay_token(&config);
    let relay = Arc::new(lib::relay::RelayClient::new(Some(base_url), token));
    let store = Arc::new(lib::store::MemoryStore::new());
    let controller = lib::session::SessionController::new(store, relay);
    controller.open_new_thread().await;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        let before = controller.state().await.messages.len();
        controller.send_message(input).await;
        let messages = controller.state().await.messages;
        // The user message alone means the relay call failed.
        if messages.len() > before + 1 {
            if let Some(last) = messages.last() {
                println!("< {}", last.text.trim());
            }
        } else {
            eprintln!("chat error: no reply from the relay (is it running?)");
        }
    }

    Ok(())
}
