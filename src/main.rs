//! resilient-client: issue one breaker-protected, retrying call against a
//! service described in a config file.
//!
//! ```text
//! resilient-client --config services.toml --service inventory get /items/7
//! resilient-client --config services.toml --service inventory post /items --data '{"sku":"a1"}'
//! ```
//!
//! Ctrl-C cancels the in-flight call, including any backoff sleep.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

use resilient_client::config::load_config;
use resilient_client::http::{ResilientClient, Response};
use resilient_client::observability::init_logging;
use resilient_client::resilience::CallContext;

#[derive(Parser)]
#[command(name = "resilient-client")]
#[command(about = "Call a configured downstream service with retries and circuit breaking", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Service name from the config file.
    #[arg(short, long)]
    service: String,

    /// Request ID to propagate (generated when omitted).
    #[arg(long)]
    request_id: Option<String>,

    /// Correlation ID to propagate (defaults to the request ID).
    #[arg(long)]
    correlation_id: Option<String>,

    /// Overall deadline for the call, retries included.
    #[arg(long)]
    deadline_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a path
    Get { path: String },
    /// DELETE a path
    Delete { path: String },
    /// POST a JSON body
    Post {
        path: String,
        #[arg(short, long)]
        data: Option<String>,
    },
    /// PUT a JSON body
    Put {
        path: String,
        #[arg(short, long)]
        data: Option<String>,
    },
}

impl Commands {
    fn into_parts(self) -> (Method, String, Option<String>) {
        match self {
            Commands::Get { path } => (Method::GET, path, None),
            Commands::Delete { path } => (Method::DELETE, path, None),
            Commands::Post { path, data } => (Method::POST, path, data),
            Commands::Put { path, data } => (Method::PUT, path, data),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    let config = load_config(&cli.config)?;
    init_logging(&config.observability)?;

    let service = config
        .service(&cli.service)
        .ok_or_else(|| format!("service '{}' not found in {}", cli.service, cli.config.display()))?;

    tracing::info!(
        service = %service.service_name,
        base_url = %service.base_url,
        max_attempts = service.retry.max_attempts,
        "Configuration loaded"
    );

    let client = ResilientClient::new(service.clone())?;

    let request_id = cli.request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let correlation_id = cli.correlation_id.unwrap_or_else(|| request_id.clone());
    let mut ctx = CallContext::background()
        .with_request_id(request_id)
        .with_correlation_id(correlation_id);
    if let Some(ms) = cli.deadline_ms {
        ctx = ctx.with_timeout(Duration::from_millis(ms));
    }

    let canceller = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling call");
            canceller.cancel();
        }
    });

    let (method, path, data) = cli.command.into_parts();
    let response = match data {
        Some(data) => {
            // Reject malformed JSON before any attempt.
            let _: Value = serde_json::from_str(&data)?;
            client.execute_json(&ctx, method, &path, Bytes::from(data)).await?
        }
        None => client.execute(&ctx, method, &path, None).await?,
    };
    print_response(&response)
}

fn print_response(res: &Response) -> Result<bool, Box<dyn Error>> {
    if !res.is_success() {
        eprintln!("Error: service returned status {} after {} attempt(s)", res.status, res.attempts);
        eprintln!("Response: {}", res.text());
        return Ok(false);
    }

    match res.json::<Value>() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", res.text()),
    }
    Ok(true)
}
