use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_lsp::{LspService, Server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use types_installer_lsp::backend::TypesInstallerBackend;

#[derive(Parser)]
#[command(name = "types-installer-lsp")]
#[command(about = "Language server that offers to install missing @types packages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the LSP server (default behavior)
    Lsp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries JSON-RPC
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;

    match cli.command {
        Some(Commands::Lsp) | None => run_lsp().await,
    }

    Ok(())
}

async fn run_lsp() {
    tracing::info!("Starting types installer LSP server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(TypesInstallerBackend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
