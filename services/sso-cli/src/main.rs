//! Sesame SSO command-line client
//!
//! Drives the library end to end from a terminal:
//! - `login`: print an authorization URL, read the redirect back from stdin,
//!   exchange the code and fetch the Sesame credentials
//! - `refresh`, `revoke`, `userinfo`, `credentials`: single provider calls
//!
//! Logs go to stderr as JSON; command output goes to stdout.

mod config;

use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use sesame_sso::{AuthorizationRequest, SsoClient, TokenSet, TokenTypeHint};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const USAGE: &str = "usage: sesame-sso [--config <path>] <command>

commands:
  login [--scope <scope>] [--param <name=value>]...
  refresh <refresh_token>
  revoke <token> [access|refresh]
  userinfo <access_token>
  credentials <access_token>";

/// A parsed command line.
#[derive(Debug, PartialEq)]
enum Command {
    Login {
        scope: Option<String>,
        params: Vec<(String, String)>,
    },
    Refresh(String),
    Revoke(String, TokenTypeHint),
    UserInfo(String),
    Credentials(String),
}

/// Parsed invocation: optional config path plus the command.
#[derive(Debug, PartialEq)]
struct Invocation {
    config_path: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = Some(path.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let Some((name, operands)) = rest.split_first() else {
        bail!("missing command\n\n{USAGE}");
    };

    let command = match (*name, operands) {
        ("login", operands) => parse_login(operands)?,
        ("refresh", [token]) => Command::Refresh(token.to_string()),
        ("revoke", [token]) => Command::Revoke(token.to_string(), TokenTypeHint::AccessToken),
        ("revoke", [token, hint]) => Command::Revoke(
            token.to_string(),
            hint.parse().map_err(anyhow::Error::msg)?,
        ),
        ("userinfo", [token]) => Command::UserInfo(token.to_string()),
        ("credentials", [token]) => Command::Credentials(token.to_string()),
        _ => bail!("unrecognized command line\n\n{USAGE}"),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

fn parse_login(operands: &[&str]) -> Result<Command> {
    let mut scope = None;
    let mut params = Vec::new();
    let mut iter = operands.iter();
    while let Some(flag) = iter.next() {
        match *flag {
            "--scope" => {
                scope = Some(iter.next().context("--scope requires a value")?.to_string());
            }
            "--param" => {
                let pair = iter.next().context("--param requires name=value")?;
                let (name, value) = pair
                    .split_once('=')
                    .with_context(|| format!("--param expects name=value, got: {pair}"))?;
                params.push((name.to_string(), value.to_string()));
            }
            other => bail!("unknown login option: {other}"),
        }
    }
    Ok(Command::Login { scope, params })
}

/// Extract `code` and `state` from a pasted redirect URL or bare query string.
///
/// A provider-reported `error` in the callback is surfaced as a failure.
fn parse_callback(input: &str) -> Result<(String, String)> {
    let input = input.trim();
    let url = if input.starts_with("http://") || input.starts_with("https://") {
        Url::parse(input).context("invalid callback URL")?
    } else {
        Url::parse(&format!("http://callback/?{}", input.trim_start_matches('?')))
            .context("invalid callback query")?
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        bail!("provider returned error on callback: {error}");
    }
    let code = code.context("callback is missing the code parameter")?;
    let state = state.context("callback is missing the state parameter")?;
    Ok((code, state))
}

/// Token set as printable JSON (the user asked for these tokens).
fn tokens_json(tokens: &TokenSet) -> serde_json::Value {
    let expires_at = tokens.expires_at(SystemTime::now()).and_then(|at| {
        at.duration_since(SystemTime::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    });
    serde_json::json!({
        "access_token": tokens.access_token.expose(),
        "refresh_token": tokens.refresh_token.as_ref().map(|t| t.expose().clone()),
        "expires_in": tokens.expires_in,
        "expires_at": expires_at,
        "token_type": tokens.token_type,
    })
}

async fn login(
    client: &SsoClient,
    scope: Option<String>,
    params: Vec<(String, String)>,
) -> Result<()> {
    let mut request = AuthorizationRequest::new();
    request.scope = scope;
    request.extra_params = params;

    let login = client.authorization_url(request).await?;
    println!("Open this URL in a browser and sign in:\n\n{}\n", login.url);
    println!("Paste the full redirect URL (or its query string):");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading callback from stdin")?;
    let (code, state) = parse_callback(&line)?;

    let tokens = client
        .exchange_code(&code, &state)
        .await
        .context("completing login")?;
    info!(token_type = %tokens.token_type, "login completed");

    let credentials = client
        .sesame_credentials(tokens.access_token.expose())
        .await
        .context("fetching sesame credentials")?;

    let output = serde_json::json!({
        "tokens": tokens_json(&tokens),
        "region": credentials.region,
        "api_base_url": credentials.api_base_url(),
        "associated_accounts": credentials.associated_accounts,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &SsoClient, command: Command) -> Result<()> {
    match command {
        Command::Login { scope, params } => login(client, scope, params).await?,
        Command::Refresh(token) => {
            let tokens = client.refresh_token(&token).await?;
            println!("{}", serde_json::to_string_pretty(&tokens_json(&tokens))?);
        }
        Command::Revoke(token, hint) => {
            client.revoke_token(&token, hint).await?;
            println!("revoked {}", hint.as_str());
        }
        Command::UserInfo(token) => {
            let claims = client.userinfo(&token).await?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Command::Credentials(token) => {
            let credentials = client.sesame_credentials(&token).await?;
            let output = serde_json::json!({
                "private_token": credentials.private_token.as_ref().map(|t| t.expose().clone()),
                "public_token": credentials.public_token,
                "region": credentials.region,
                "api_base_url": credentials.api_base_url(),
                "associated_accounts": credentials.associated_accounts,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = parse_args(&args)?;

    let config_path = Config::resolve_path(invocation.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let client = SsoClient::new(config.sso_config()?).context("creating sso client")?;

    let result = run(&client, invocation.command).await;
    client.shutdown();
    result
}
