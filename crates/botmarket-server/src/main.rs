mod app;
mod routes;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use botmarket_api::Principal;
use botmarket_auth::TokenState;
use botmarket_connectors::{EnvSecretStore, build_providers};
use botmarket_core::{
    AppConfig, apply_env_overrides, default_config_dir, load_config_from_dir, validate_config,
    write_default_config_file,
};
use botmarket_runtime::{AppRuntime, codec_from_secrets};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "botmarket", about = "botmarket: bot marketplace and SaaS directory server")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a commented default botmarket.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Validate config, session secret and OAuth providers without serving
    Check,
    /// Run the HTTP server
    Serve {
        /// Overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Issue or inspect session tokens with the configured secret
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Debug, Subcommand)]
enum TokenCommands {
    Issue {
        #[arg(long)]
        id: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Lifetime in seconds; defaults to session.token_ttl_secs
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    Verify {
        token: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);

    match cli.command {
        Commands::Init { force } => {
            let path = write_default_config_file(&cfg_dir, force)
                .with_context(|| format!("writing config into {}", cfg_dir.display()))?;
            pout(
                cli.json,
                serde_json::json!({"message": "init complete", "config_file": path}),
                &format!("Wrote {}", path.display()),
            )?;
        }
        Commands::Check => {
            let config = load_config(&cfg_dir)?;
            let secrets = EnvSecretStore;
            codec_from_secrets(&config, &secrets).context("session secret")?;
            let providers = build_providers(&config.oauth, &secrets).context("oauth providers")?;
            let names: Vec<&String> = providers.keys().collect();
            pout(
                cli.json,
                serde_json::json!({
                    "ok": true,
                    "bind": config.server.bind,
                    "protected": config.session.protected,
                    "oauth_providers": names,
                    "store": config.store.resolved_path(),
                }),
                &format!("Config OK ({} oauth provider(s))", names.len()),
            )?;
        }
        Commands::Serve { bind } => {
            let mut config = load_config(&cfg_dir)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await?;
        }
        Commands::Token { command } => {
            let config = load_config(&cfg_dir)?;
            let codec = codec_from_secrets(&config, &EnvSecretStore).context("session secret")?;
            match command {
                TokenCommands::Issue {
                    id,
                    email,
                    name,
                    ttl_secs,
                } => {
                    let principal = Principal { id, email, name };
                    let ttl = ttl_secs.map_or_else(|| codec.ttl(), Duration::from_secs);
                    let token = codec.issue_with_ttl(&principal, ttl)?;
                    pout(cli.json, serde_json::json!({"token": token}), &token)?;
                }
                TokenCommands::Verify { token } => match codec.validate(&token) {
                    TokenState::Valid(claims) => {
                        let text = format!("valid: {} (exp {})", claims.id, claims.exp);
                        pout(
                            cli.json,
                            serde_json::json!({"valid": true, "claims": claims}),
                            &text,
                        )?;
                    }
                    TokenState::Invalid => {
                        pout(cli.json, serde_json::json!({"valid": false}), "invalid")?;
                    }
                },
            }
        }
    }

    Ok(())
}

fn load_config(dir: &Path) -> anyhow::Result<AppConfig> {
    let config = load_config_from_dir(dir)
        .with_context(|| format!("loading config from {}", dir.display()))?;
    let config = apply_env_overrides(config);
    validate_config(&config).context("invalid configuration")?;
    Ok(config)
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let bind = config.server.bind.clone();
    let runtime = Arc::new(AppRuntime::from_config(config).context("building runtime")?);
    let providers: Vec<&str> = runtime.provider_ids().collect();
    tracing::info!(?providers, "runtime ready");

    let router = app::build_router(runtime.clone()).context("building router")?;
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
