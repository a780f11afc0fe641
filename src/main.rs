//! ideastream - Authenticated SSE relay for streamed LLM completions
//!
//! Verifies a bearer token, sends a fixed prompt to an OpenAI-compatible
//! provider and streams the reply back as server-sent events.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ideastream::api::run_server;
use ideastream::provider::{CompletionProvider, OpenAiProvider};
use ideastream::Config;

#[derive(Parser)]
#[command(name = "ideastream")]
#[command(about = "Authenticated SSE relay for streamed LLM completions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file (environment only when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and print the resolved settings
    Check {
        /// Path to configuration file (environment only when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Send the configured prompt once, without streaming, and print the reply
    Probe {
        /// Path to configuration file (environment only when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ideastream=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = Config::load(config.as_deref())?;

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
                config.listen_addr()?;
            }

            run_server(config).await
        }

        Commands::Check { config } => {
            let config = Config::load(config.as_deref())?;

            println!("Configuration OK");
            println!("  listen:     {}", config.server.listen);
            println!("  route:      GET {}", config.server.route);
            println!(
                "  jwks:       {} ({})",
                config.auth.jwks_url, config.auth.jwks_source
            );
            println!("  provider:   {}", config.provider.base_url);
            println!("  model:      {}", config.provider.model);
            println!(
                "  api key:    {} ({})",
                config.provider.api_key, config.provider.key_source
            );
            println!("  prompt:     {} message(s)", config.prompt.messages().len());
            Ok(())
        }

        Commands::Probe { config } => {
            let config = Config::load(config.as_deref())?;
            let provider = OpenAiProvider::from_config(&config.provider)?;

            tracing::info!(
                provider = %provider.name(),
                model = %config.provider.model,
                "Sending probe completion"
            );

            let reply = provider
                .complete(&config.prompt, &config.provider.model)
                .await?;
            println!("{}", reply);
            Ok(())
        }
    }
}
