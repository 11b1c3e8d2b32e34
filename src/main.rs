use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ragchat::chat::AzureOpenAiClient;
use ragchat::config::{self, Cli, Settings};
use ragchat::console::{self, Console};
use ragchat::identity::{DefaultCredential, TokenProvider};
use ragchat::registry::{ConnectionRegistry, ConnectionType, ProjectClient, SearchConnection};
use ragchat::session::{Session, SessionConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing (logging) subscriber on stderr so it never mixes with replies.
    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=ragchat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // First pass only to find --env-file; env-backed flags are re-read below.
    let cli = Cli::parse();
    config::load_dotenv(cli.env_file.as_deref()).context("Failed to load environment")?;
    let cli = Cli::parse();

    let print_config = cli.print_config;
    let settings = Settings::from_cli(cli).context("Invalid configuration")?;
    if print_config {
        println!("{}", settings);
        return Ok(());
    }

    if settings.clear_screen {
        console::clear_screen(&mut io::stdout()).context("Failed to clear the screen")?;
    }

    info!(project = %settings.project.project_name, "Connecting to project");
    let credential: Arc<dyn TokenProvider> = Arc::new(DefaultCredential::from_env());
    let project = ProjectClient::new(&settings.project, credential.clone());

    let search = project
        .default_connection(ConnectionType::AzureAiSearch)
        .await
        .context("Failed to resolve the search connection")?;
    let search = SearchConnection::try_from(search)?;

    let openai = project
        .default_connection(ConnectionType::AzureOpenAi)
        .await
        .context("Failed to resolve the Azure OpenAI connection")?;
    let backend = AzureOpenAiClient::from_connection(&openai, settings.api_version.clone(), credential);

    let mut session = Session::new(
        SessionConfig::from(&settings),
        search,
        backend,
        Console::stdio(),
    );
    let termination = session.run().await.context("Chat session failed")?;
    info!(?termination, "Chat session ended");
    Ok(())
}
