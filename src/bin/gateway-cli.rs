//! Operator CLI for the login gateway.

use clap::{Parser, Subcommand};
use serde_json::{Map, Number, Value};

use login_gateway::queue::{OrderedQueueStore, RedisQueueStore};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the login gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a gateway's metrics endpoint and print its series as JSON
    Status {
        #[arg(short, long, default_value = "http://localhost:9100/metrics")]
        url: String,
    },
    /// Print the shared queue depth
    Queue {
        #[arg(short, long, default_value = "redis://127.0.0.1:6379/0")]
        redis_url: String,
        #[arg(short, long, default_value = "login_queue")]
        key: String,
    },
    /// Delete the shared queue, dropping every ticket in it
    Purge {
        #[arg(short, long, default_value = "redis://127.0.0.1:6379/0")]
        redis_url: String,
        #[arg(short, long, default_value = "login_queue")]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status { url } => {
            let res = reqwest::get(&url).await?;
            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: metrics endpoint returned status {}", status);
                return Ok(());
            }
            let body = res.text().await?;
            let series = gateway_series(&body);
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        Commands::Queue { redis_url, key } => {
            let store = RedisQueueStore::connect(&redis_url).await?;
            let depth = store.len(&key).await?;
            println!("{}", serde_json::json!({ "key": key, "depth": depth }));
        }
        Commands::Purge { redis_url, key } => {
            let store = RedisQueueStore::connect(&redis_url).await?;
            let depth = store.len(&key).await?;
            store.purge(&key).await?;
            println!("{}", serde_json::json!({ "key": key, "dropped": depth }));
        }
    }

    Ok(())
}

/// Pick the gateway's series out of a Prometheus text exposition.
/// Histogram buckets are skipped; their `_sum` and `_count` are kept.
fn gateway_series(exposition: &str) -> Value {
    let mut series = Map::new();
    for line in exposition.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.rsplit_once(' ') else {
            continue;
        };
        let base = name.split('{').next().unwrap_or(name);
        let ours = base.starts_with("login_") || base == "active_queue_size";
        if !ours || base.ends_with("_bucket") {
            continue;
        }
        if let Some(number) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            series.insert(name.to_string(), Value::Number(number));
        }
    }
    Value::Object(series)
}
