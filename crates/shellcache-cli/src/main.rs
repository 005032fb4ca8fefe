//! Shellcache CLI - drives the cache engine from the command line.
//!
//! Each sub-command maps onto one host hook of the engine: install and
//! activate, the interception hook, the control channel and the
//! connectivity signal. Stores are kept on disk between runs.

mod config;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use shellcache_core::{
    DiskStorage, Engine, HttpFetcher, Interception, LifecycleState, MessageOutcome,
    MessageSource,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: shellcache <command> [args]

Commands:
  install            Pre-cache the app shell and retire older generations
  fetch <url>        Serve one request through the engine
  preload <url>...   Store URLs in the dynamic store (CACHE_URLS)
  clear              Delete every store this engine owns (CLEAR_CACHE)
  sync [tag]         Fire the connectivity signal (default: configured tag)
  stores             List stores and their entry counts";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn build_engine() -> Result<Engine> {
    let config = config::load()?;
    let store_dir = config::store_dir()?;
    let storage = DiskStorage::new(store_dir.clone())
        .with_context(|| format!("Failed to open store directory {}", store_dir.display()))?;
    let fetcher = HttpFetcher::new(config.fetch_timeout())?;
    Ok(Engine::new(config, Arc::new(storage), Arc::new(fetcher))?)
}

/// The CLI speaks for the application itself.
fn app_source(engine: &Engine) -> MessageSource {
    MessageSource {
        client_id: "cli".to_string(),
        url: engine.config().origin.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let engine = build_engine()?;
    info!(generation = %engine.generation().tag(), command = %command, "shellcache starting");

    match command.as_str() {
        "install" => install(&engine).await,
        "fetch" => {
            let url = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("fetch needs a URL"))?;
            fetch(&engine, url).await
        }
        "preload" => send(&engine, serde_json::json!({"type": "CACHE_URLS", "urls": &args[2..]})).await,
        "clear" => send(&engine, serde_json::json!({"type": "CLEAR_CACHE"})).await,
        "sync" => {
            let tag = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| engine.config().sync_tag.clone());
            if !engine.handle_sync(&tag).await {
                eprintln!("No handler for sync tag {}", tag);
            }
            Ok(())
        }
        "stores" => list_stores(&engine).await,
        other => {
            eprintln!("{}", USAGE);
            anyhow::bail!("Unknown command: {}", other)
        }
    }
}

async fn install(engine: &Engine) -> Result<()> {
    engine.install().await.context("Install failed")?;
    let retired = engine.activate().await;
    println!(
        "Installed generation {} ({} shell resources), retired {} old store(s)",
        engine.generation().tag(),
        engine.config().shell_urls.len(),
        retired.len()
    );
    Ok(())
}

async fn fetch(engine: &Engine, url: &str) -> Result<()> {
    engine.activate().await;
    if engine.lifecycle().state != LifecycleState::Activated {
        anyhow::bail!(
            "Generation {} is not installed; run `shellcache install` first",
            engine.generation().tag()
        );
    }
    let request = engine.resolve(url)?;

    match engine.handle_fetch(&request).await? {
        Interception::Bypass => println!("{} is not intercepted", request.url),
        Interception::Respond(response) => {
            let source = match response.age_minutes() {
                Some(minutes) => format!("cache, {}m old", minutes),
                None => "network".to_string(),
            };
            println!(
                "{} {} ({}, {} bytes)",
                response.status,
                request.url,
                source,
                response.body.len()
            );
        }
    }

    // Let background refreshes land before the process exits
    let pending = engine.pending_jobs();
    if pending > 0 {
        info!(pending, "Waiting for background refreshes");
    }
    engine.settle().await;
    Ok(())
}

async fn send(engine: &Engine, message: serde_json::Value) -> Result<()> {
    match engine.handle_message(&message, Some(&app_source(engine))).await {
        MessageOutcome::Handled => Ok(()),
        outcome => anyhow::bail!("Message not handled: {:?}", outcome),
    }
}

async fn list_stores(engine: &Engine) -> Result<()> {
    let generation = engine.generation();
    for name in engine.storage().names().await? {
        let entries = match engine.storage().lookup(&name).await? {
            Some(store) => store.len().await?,
            None => 0,
        };
        let marker = if generation.is_current(&name) {
            " (current)"
        } else if generation.is_stale(&name) {
            " (stale)"
        } else {
            ""
        };
        println!("{:<40} {:>5} entries{}", name, entries, marker);
    }
    Ok(())
}
