use agent_relay::auth::ApiKeyAuth;
use agent_relay::catalog::{CatalogStore, FileCatalog};
use agent_relay::chat::{ChatMessage, ChatRequest};
use agent_relay::config::Config;
use agent_relay::dispatch::Dispatcher;
use agent_relay::server::{self, AppState};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "agent-relay",
    about = "OpenAI-compatible relay that routes each chat request to the best agent or model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Serve the OpenAI-compatible API
    Serve {
        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Listen address override, e.g. 127.0.0.1:3000
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show how a request would be routed, without forwarding it
    Select {
        /// User message to route
        text: String,

        /// Model the caller would send
        #[arg(long)]
        model: Option<String>,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },

    /// Print the catalog (secrets omitted)
    Catalog {
        /// Include inactive records
        #[arg(long)]
        all: bool,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path)?
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn load_catalog(config: &Config) -> Result<Arc<dyn CatalogStore>> {
    let catalog = FileCatalog::load(&config.catalog.path)
        .with_context(|| format!("loading catalog {}", config.catalog.path.display()))?;
    Ok(Arc::new(catalog))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agent_relay=info,tower_http=info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, bind } => {
            let cfg = load_config(&config)?;
            let store = load_catalog(&cfg)?;
            let dispatcher = Dispatcher::from_config(&cfg, store)?;
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let auth = ApiKeyAuth::new(cfg.server.api_key());
            if !auth.is_enabled() {
                warn!(env = %cfg.server.api_key_env, "no API key configured, /v1 and /api are open");
            }
            let state = AppState {
                dispatcher: Arc::new(dispatcher),
                auth,
            };
            server::serve(state, &bind).await?;
            Ok(())
        }
        Command::Select {
            text,
            model,
            config,
        } => {
            let cfg = load_config(&config)?;
            let store = load_catalog(&cfg)?;
            let dispatcher = Dispatcher::from_config(&cfg, store)?;
            let request = ChatRequest {
                model,
                messages: vec![ChatMessage::user(text)],
                temperature: None,
                top_p: None,
                max_tokens: None,
                stream: None,
                extra: Default::default(),
            };
            let plan = dispatcher.plan(&request).await?;
            println!("{}", serde_json::to_string_pretty(&plan.summary())?);
            Ok(())
        }
        Command::Catalog { all, config } => {
            let cfg = load_config(&config)?;
            let store = load_catalog(&cfg)?;
            let listing = json!({
                "agents": store.list_agents(all).await?,
                "models": store.list_models(all).await?,
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
            Ok(())
        }
    }
}
