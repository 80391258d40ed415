//! botcast-auth - One-time authorization of the posting account
//!
//! Runs the OAuth2 authorization-code flow with PKCE: prints the authorize
//! URL, waits for the browser redirect on the local callback address,
//! exchanges the code and writes `tokens.json` for `botcast-send`.

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use libbotcast::config::Config;
use libbotcast::credentials::pkce::{
    random_state, verify_state, AuthorizeRequest, Callback, CallbackQuery, PkcePair,
    RedirectTarget,
};
use libbotcast::credentials::{save_credential, Credential, HttpTokenExchange, TokenExchange};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// How long to wait for the browser to come back
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// How long the callback server may take to finish its last response
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "botcast-auth")]
#[command(version)]
#[command(about = "Authorize botcast-send to post on your account")]
#[command(long_about = "\
botcast-auth - Authorize botcast-send to post on your account

DESCRIPTION:
    Prints an authorization URL; no browser is launched. Copy the URL into a
    browser yourself, approve the app, and the provider redirects back to the local callback address from
    [platform].redirect_uri. The resulting tokens are saved to
    <data_dir>/tokens.json, where botcast-send picks them up and keeps them
    fresh.

USAGE:
    # Write a starter configuration
    botcast-auth --init > ~/.config/botcast/config.toml

    # Authorize
    botcast-auth
")]
struct Cli {
    /// Configuration file (overrides $BOTCAST_CONFIG and the default path)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print an example configuration to stdout and exit
    #[arg(long)]
    init: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    libbotcast::logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if cli.init {
        print!("{}", Config::example().to_toml()?);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let redirect = RedirectTarget::parse(&config.platform.redirect_uri)?;

    let mut rng = rand::thread_rng();
    let pkce = PkcePair::generate(&mut rng);
    let state = random_state(&mut rng);

    let url = AuthorizeRequest {
        authorize_url: &config.platform.authorize_url,
        client_id: &config.platform.client_id,
        redirect_uri: &config.platform.redirect_uri,
        scopes: &config.platform.scopes,
        state: &state,
        code_challenge: &pkce.challenge,
    }
    .url()?;

    let listener = TcpListener::bind(redirect.bind_addr())
        .await
        .with_context(|| format!("Failed to listen on {}", redirect.bind_addr()))?;

    println!("Open this URL in your browser to authorize botcast:\n\n{}\n", url);
    info!("Waiting for the callback on {}", config.platform.redirect_uri);

    let callback = wait_for_callback(listener, &redirect.path, CALLBACK_TIMEOUT).await?;
    verify_state(&callback, &state)?;

    info!("Exchanging authorization code for tokens...");
    let exchange = HttpTokenExchange::new(
        config.platform.token_url.clone(),
        config.platform.client_id.clone(),
        config.platform.redirect_uri.clone(),
        config.platform_timeout()?,
    )?;
    let response = exchange
        .exchange_code(&callback.code, &pkce.verifier)
        .await?;
    if response.refresh_token.is_none() {
        warn!("No refresh token issued; add the offline.access scope so botcast-send can renew access");
    }

    let credential = Credential::from_response(response, chrono::Utc::now(), None)?;
    let tokens_path = config.tokens_path();
    save_credential(&tokens_path, &credential)?;

    println!("Saved tokens to {}", tokens_path.display());
    println!("Authorization complete. Start posting with: botcast-send");
    Ok(())
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<libbotcast::Result<Callback>>>>>;

/// Router answering the redirect on `path`; the first hit is forwarded to `tx`
fn callback_router(path: &str, tx: oneshot::Sender<libbotcast::Result<Callback>>) -> Router {
    let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));
    Router::new()
        .route(path, get(handle_callback))
        .with_state(sender)
}

async fn handle_callback(
    State(sender): State<CallbackSender>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, Html<&'static str>) {
    let result = query.into_callback();
    let reply = match &result {
        Ok(_) => (
            StatusCode::OK,
            Html("<html><body><p>Authorization received. You can close this window.</p></body></html>"),
        ),
        Err(e) => {
            warn!("Rejected callback: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Html("<html><body><p>Authorization failed.</p></body></html>"),
            )
        }
    };

    match sender.lock().await.take() {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => debug!("Ignoring repeated callback"),
    }
    reply
}

/// Serve the callback route on `listener` until the first redirect arrives
/// or `timeout` passes, then shut the server down
async fn wait_for_callback(listener: TcpListener, path: &str, timeout: Duration) -> Result<Callback> {
    let (tx, rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = callback_router(path, tx);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let received = tokio::time::timeout(timeout, rx).await;
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Err(e))) => warn!("Callback server error: {}", e),
        Ok(Err(e)) => warn!("Callback server task failed: {}", e),
        Err(_) => debug!("Callback server did not stop within {:?}", SHUTDOWN_GRACE),
        Ok(Ok(Ok(()))) => {}
    }

    let callback = received
        .map_err(|_| {
            anyhow::anyhow!(
                "Did not receive the authorization callback within {}s",
                timeout.as_secs()
            )
        })?
        .context("Callback server stopped before the redirect arrived")??;
    Ok(callback)
}
