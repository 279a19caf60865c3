//! codeflow - exercise a backend-mediated OAuth 2.0 code flow from the terminal
//!
//! Each invocation is one "page load": the current session is read from the
//! store, the requested action runs, and the resulting page is printed.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use codeflow::prelude::*;

const DEFAULT_APP_NAME: &str = "codeflow";

/// How long `login` waits for the provider to send the browser back
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Parser)]
#[command(name = "codeflow", version, about = "Exercise an OAuth 2.0 authorization code flow against a backend")]
struct Cli {
    /// Where the session is persisted between invocations
    #[arg(long, value_enum, default_value_t = StoreKind::File)]
    store: StoreKind,

    /// Application name used for the data directory or keyring service
    #[arg(long, default_value = DEFAULT_APP_NAME)]
    app_name: String,

    /// Store directory, overriding the platform data directory (file store only)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Backend origin, overriding CODEFLOW_BACKEND_URL
    #[arg(long)]
    backend_url: Option<Url>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    File,
    Keyring,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render the page for the stored session
    Status,
    /// Open the login page and wait for the provider to redirect back
    Login {
        /// Ask the provider for a fresh interactive login
        #[arg(long)]
        force: bool,
        /// Only open the browser; finish later with `codeflow callback <url>`
        #[arg(long)]
        no_wait: bool,
        /// Seconds to wait for the redirect
        #[arg(long, default_value_t = DEFAULT_CALLBACK_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Load the page at a callback URL copied from the browser
    Callback { url: Url },
    /// Fetch the signed-in user's profile
    Profile,
    /// Print the stored access token
    CopyToken,
    /// End the session
    Logout,
    /// End the session and force an interactive login next time
    FullLogout,
}

impl Command {
    /// `copy-token` output is piped into other tools, so stdout carries only the token
    fn prints_page(&self) -> bool {
        !matches!(self, Command::CopyToken)
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=codeflow=debug); stdout stays
    // reserved for the page and the copied token.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = HarnessConfig::from_env().context("Failed to load configuration")?;
    if let Some(backend_url) = cli.backend_url.clone() {
        config = config.with_backend_url(backend_url)?;
    }

    match cli.store {
        StoreKind::File => {
            let store = match &cli.data_dir {
                Some(dir) => FileStore::with_path(dir.clone()),
                None => FileStore::new(&cli.app_name),
            }
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to open session store")?;
            run(cli.command, config, Arc::new(store)).await
        }
        StoreKind::Keyring => {
            run(cli.command, config, Arc::new(SecureStore::new(&cli.app_name))).await
        }
    }
}

async fn run<S: KeyValueStore>(command: Command, config: HarnessConfig, store: Arc<S>) -> Result<()> {
    let navigator = Arc::new(BrowserNavigator::new(config.logout_redirect_url.clone()));
    let view = Arc::new(ViewState::new());
    let backend = HttpBackend::new(&config)?;
    let controller = SessionController::new(config, store, backend, navigator.clone(), view.clone());

    let print_page = command.prints_page();
    let outcome = match command {
        Command::Status => {
            let page = navigator.location();
            controller.initialize(&page).await;
            Ok(())
        }
        Command::Login {
            force,
            no_wait,
            timeout,
        } => login(&controller, force, no_wait, Duration::from_secs(timeout)).await,
        Command::Callback { url } => {
            controller.initialize(&url).await;
            Ok(())
        }
        Command::Profile => {
            // The fetch-data control lives on a loaded page
            controller.render().await;
            controller.fetch_profile().await.map(|_| ())
        }
        Command::CopyToken => controller.copy_token().map(|token| println!("{}", token)),
        Command::Logout => controller.logout().await.map(|_| ()),
        Command::FullLogout => controller.full_logout().await.map(|_| ()),
    };

    for alert in view.take_alerts() {
        eprintln!("! {}", alert);
    }
    if print_page {
        print!("{}", view);
    }

    outcome.map_err(Into::into)
}

async fn login<S, B, N, V>(
    controller: &SessionController<S, B, N, V>,
    force: bool,
    no_wait: bool,
    timeout: Duration,
) -> codeflow::error::Result<()>
where
    S: KeyValueStore,
    B: Backend,
    N: Navigator,
    V: View,
{
    if no_wait {
        let url = controller.login(force)?;
        eprintln!("Opened {}", url);
        return Ok(());
    }

    // Listen before the browser is sent anywhere so the redirect cannot race us
    let server = CallbackServer::bind(&controller.config().callback_url).await?;
    let url = controller.login(force)?;
    eprintln!("Opened {} - waiting for the redirect to {}", url, server.redirect_uri());

    let page = server.wait_for_callback(timeout).await?;
    info!("callback received");
    controller.initialize(&page).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_token_output_is_only_the_token() {
        let cli = Cli::try_parse_from(["codeflow", "copy-token"]).unwrap();
        assert!(!cli.command.prints_page());

        for args in [["codeflow", "profile"], ["codeflow", "status"], ["codeflow", "logout"]] {
            let cli = Cli::try_parse_from(args).unwrap();
            assert!(cli.command.prints_page());
        }
    }
}
