use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nutribot")]
#[command(about = "Nutribot: LINE nutrition assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory with a default config.json and a .env template.
    Init {
        /// Config file path (default: NUTRIBOT_CONFIG_PATH or ~/.nutribot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the LINE webhook server. Needs LINE_CHANNEL_SECRET, LINE_CHANNEL_ACCESS_TOKEN and OPENAI_API_KEY (env, .env, or config).
    Serve {
        /// Config file path (default: NUTRIBOT_CONFIG_PATH or ~/.nutribot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 10000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Answer one message locally, exactly as the bot would on LINE, and print the reply.
    Ask {
        /// Config file path (default: NUTRIBOT_CONFIG_PATH or ~/.nutribot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// The user message.
        message: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("nutribot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, message }) => {
            if let Err(e) = run_ask(config, &message).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    println!("fill in {} before running `nutribot serve`", dir.join(".env").display());
    Ok(())
}

/// Load `.env` files first so NUTRIBOT_CONFIG_PATH and secrets from them are visible to config loading.
fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<lib::config::Config> {
    let path = lib::config::load_env_files(config_path);
    let (config, path) = lib::config::load_config(Some(path))?;
    log::debug!("using config {}", path.display());
    Ok(config)
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config).await
}

async fn run_ask(config_path: Option<PathBuf>, message: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let secrets = lib::config::Secrets::from_env(&config);
    let bot = lib::bot::Bot::from_config(&config, &secrets)?;
    let reply = bot.respond(message).await;
    log::debug!("reply kind: {}", reply.kind());
    println!("{}", reply.text());
    Ok(())
}
