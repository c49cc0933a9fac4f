use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mailsift::error::ServiceError;
use mailsift::pipeline::types::{MessageId, User};
use mailsift::{MessageLister, Pipeline, PipelineConfig, Services, SpamClassifier, UserResolver};

/// Deterministic in-process services for the demo runner.
///
/// Real deployments implement the three traits against their own user
/// directory, mailbox store, and spam filter.
struct DemoServices;

#[async_trait]
impl UserResolver for DemoServices {
    async fn resolve_user(&self, email: &str) -> Result<User, ServiceError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let local = email
            .split('@')
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ServiceError::UnknownUser(email.to_string()))?;
        let id = local.bytes().map(u64::from).sum::<u64>() % 1000;
        Ok(User {
            id,
            username: local.to_string(),
            email: email.to_string(),
        })
    }
}

#[async_trait]
impl MessageLister for DemoServices {
    async fn list_messages(&self, users: &[User]) -> Result<Vec<MessageId>, ServiceError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut ids = Vec::new();
        for user in users {
            ids.push(MessageId(user.id * 100 + 1));
            ids.push(MessageId(user.id * 100 + 2));
        }
        Ok(ids)
    }
}

#[async_trait]
impl SpamClassifier for DemoServices {
    async fn classify(&self, id: MessageId) -> Result<bool, ServiceError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(id.0 % 3 == 0)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    args.retain(|a| a != "--json");

    if args.is_empty() {
        eprintln!("Usage: mailsift [--json] <email> [email ...]");
        std::process::exit(2);
    }

    let config = PipelineConfig::from_env()?;
    eprintln!("mailsift v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Batch size: {}", config.batch_size);
    eprintln!("   Spam workers: {}", config.spam_workers);
    match config.max_concurrent_lookups {
        Some(cap) => eprintln!("   Lookup cap: {cap}"),
        None => eprintln!("   Lookup cap: none"),
    }
    eprintln!("   Inputs: {}\n", args.len());

    let shared = Arc::new(DemoServices);
    let services = Services::new(shared.clone(), shared.clone(), shared);
    let pipeline = Pipeline::new(config, services)?;

    // Ctrl-C triggers the shutdown token; the run winds down and still
    // returns whatever it had combined.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Shutdown signal received, cancelling run");
            signal_token.cancel();
        }
    });

    let report = pipeline.run(args, shutdown).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in &report.lines {
            println!("{line}");
        }
        for failure in &report.failures {
            eprintln!("error: {failure}");
        }
        if report.cancelled {
            eprintln!("run cancelled before completion");
        }
    }

    Ok(())
}
