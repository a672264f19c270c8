use anyhow::{Context, Result};
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod console;
mod error;
mod models;
mod runner;
mod services;
mod status;
mod utils;

#[cfg(test)]
mod test_support;

use config::Config;
use runner::Runner;
use status::StatusSink;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging()?;

    let config = Config::load().context("failed to load configuration")?;

    println!("{}", console::banner());

    // 账号与问题列表缺失是启动级错误
    let credentials = utils::load_lines(&config.run.accounts_file)
        .with_context(|| format!("could not read {}", config.run.accounts_file))?;
    if credentials.is_empty() {
        anyhow::bail!("no accounts found in {}", config.run.accounts_file);
    }
    let questions = utils::load_questions(&config.run.questions_file)
        .with_context(|| format!("no questions loaded from {}", config.run.questions_file))?;

    let proxies = if config.proxy.enabled {
        match utils::load_lines(&config.proxy.file) {
            Ok(proxies) => {
                if proxies.is_empty() {
                    warn!("Proxy enabled but {} is empty, running without proxy", config.proxy.file);
                }
                proxies
            }
            Err(e) => {
                warn!("Could not read {} ({}), running without proxy", config.proxy.file, e);
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    info!(
        "Loaded {} accounts, {} questions, {} proxies",
        credentials.len(),
        questions.len(),
        proxies.len()
    );

    let (sink, rx) = StatusSink::channel();
    let printer = console::spawn_printer(rx);
    let mut runner = Runner::new(config, credentials, proxies, questions, sink)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!();
                println!("{}", "Interrupted, stopping...".red().bold());
                cancel.cancel();
            }
        }
    });

    runner.run(cancel).await;

    drop(runner);
    printer.await?;

    Ok(())
}

fn init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden_autopilot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
