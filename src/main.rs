//! upstream-resilience CLI
//!
//! # Commands
//! - `check-config <path>`: load, apply env overrides and validate a config file
//! - `request <method> <path>`: one shop API call through the retrying client,
//!   guarded by a circuit breaker
//! - `backoff-table`: print the sleep window before each retry

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

use upstream_resilience::config::{self, ResilienceConfig, ShopClientConfig};
use upstream_resilience::observability::{logging, metrics};
use upstream_resilience::resilience::backoff::backoff_floor;
use upstream_resilience::shop::{IdempotencyKey, ShopRequest};
use upstream_resilience::{CircuitBreaker, MetricsHook, RetryingClient};

#[derive(Parser)]
#[command(name = "upstream-resilience")]
#[command(about = "Circuit breaker and retrying shop API client", long_about = None)]
struct Cli {
    /// Config file (TOML). Environment variables are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file
    CheckConfig { path: PathBuf },
    /// Send one request to the shop API
    Request {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Makes a rate-limited POST/PUT/DELETE retriable
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Print backoff ranges for the configured retry policy
    BackoffTable,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::CheckConfig { path } = &cli.command {
        return check_config(path);
    }

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::loader::from_env()?,
    };

    logging::init_logging(&config.observability);

    match cli.command {
        Commands::CheckConfig { .. } => Ok(()),
        Commands::BackoffTable => {
            print_backoff_table(&config.shop);
            Ok(())
        }
        Commands::Request {
            method,
            path,
            body,
            idempotency_key,
        } => run_request(config, method, path, body, idempotency_key).await,
    }
}

fn check_config(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config(path)?;
    println!("{} is valid", path.display());
    println!(
        "breaker: threshold={} reset={}s call_timeout={}s single_trial={}",
        config.breaker.failure_threshold,
        config.breaker.reset_timeout_secs,
        config.breaker.call_timeout_secs,
        config.breaker.single_trial
    );
    println!(
        "shop: domain={:?} token_set={} max_retries={} backoff_base={}s",
        config.shop.shop_domain,
        !config.shop.access_token.is_empty(),
        config.shop.max_retries,
        config.shop.backoff_base_secs
    );
    Ok(())
}

async fn run_request(
    config: ResilienceConfig,
    method: String,
    path: String,
    body: Option<String>,
    idempotency_key: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let hook = if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
        metrics::prometheus_hook()
    } else {
        MetricsHook::noop()
    };

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
    let mut request = ShopRequest::new(method, path);
    if let Some(body) = body {
        request = request.json(serde_json::from_str::<Value>(&body)?);
    }
    if let Some(key) = idempotency_key {
        request = request.idempotency_key(IdempotencyKey::from(key));
    }

    let deadline = retry_budget(&config.shop);
    let client = RetryingClient::from_config(config.shop)?.with_hook(hook.clone());
    let breaker = CircuitBreaker::new("shopify", config.breaker).with_hook(hook);

    tracing::info!(
        method = %request.method,
        path = %request.path,
        deadline = ?deadline,
        "Sending shop request"
    );

    let response = breaker
        .execute(|| async { client.request(request).await.map(Some) }, Some(deadline))
        .await?;

    match response {
        Some(response) => {
            println!("{}", response.status);
            match response.json::<Value>() {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", response.text()),
            }
        }
        None => {
            let snapshot = breaker.snapshot();
            println!("circuit {} is {}; request not completed", snapshot.name, snapshot.state);
        }
    }

    Ok(())
}

/// Upper bound on one logical request: every attempt timing out plus the
/// longest possible backoff between them.
fn retry_budget(shop: &ShopClientConfig) -> Duration {
    let base = Duration::try_from_secs_f64(shop.backoff_base_secs).unwrap_or(Duration::ZERO);
    let attempts = shop.max_retries.max(1);
    let sleeps = (1..attempts)
        .map(|n| backoff_floor(n, base).saturating_mul(2))
        .fold(Duration::ZERO, Duration::saturating_add);
    shop.request_timeout()
        .saturating_mul(attempts)
        .saturating_add(sleeps)
}

fn print_backoff_table(shop: &ShopClientConfig) {
    let base = Duration::try_from_secs_f64(shop.backoff_base_secs).unwrap_or(Duration::ZERO);
    println!("{:<8} {:>12} {:>12}", "attempt", "min", "max");
    for attempt in 1..shop.max_retries.max(1) {
        let floor = backoff_floor(attempt, base);
        println!(
            "{:<8} {:>11.3}s {:>11.3}s",
            attempt,
            floor.as_secs_f64(),
            floor.saturating_mul(2).as_secs_f64()
        );
    }
    println!("retry budget: {:.3}s", retry_budget(shop).as_secs_f64());
}
