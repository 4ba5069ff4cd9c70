//! provider-conns: inspect and exercise a provider connection configuration.
//!
//! ```text
//! provider-conns --config provider.toml check
//! provider-conns --config provider.toml endpoints
//! provider-conns --config provider.toml probe --service sts --path /
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use provider_conns::config::{load_config, ProviderConfig};
use provider_conns::observability::logging;
use provider_conns::AwsClient;

#[derive(Parser)]
#[command(name = "provider-conns")]
#[command(about = "Validate and probe AWS provider connection settings", long_about = None)]
struct Cli {
    /// Provider configuration file (TOML).
    #[arg(short, long, default_value = "provider.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and load any TLS material
    Check,
    /// Print the resolved endpoint of every service
    Endpoints,
    /// Send a GET through a service client under the retry policy
    Probe {
        #[arg(short, long, default_value = "sts")]
        service: String,

        #[arg(short, long, default_value = "/")]
        path: String,

        /// Give up after this many seconds in total.
        #[arg(long, default_value_t = 60)]
        deadline_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init(&config.logging.filter, cli.json_logs || config.logging.json);

    tracing::info!(
        path = %cli.config.display(),
        region = config.region.as_deref().unwrap_or(""),
        "provider-conns v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    match cli.command {
        Commands::Check => print_json(&check(&config)?)?,
        Commands::Endpoints => {
            let client = AwsClient::from_config(&config)?;
            print_json(&serde_json::to_value(client.endpoints())?)?;
        }
        Commands::Probe {
            service,
            path,
            deadline_secs,
        } => {
            let client = AwsClient::from_config(&config)?;
            let service_client = client.service(&service)?;
            let response = service_client
                .get_with_deadline("Probe", &path, Duration::from_secs(deadline_secs))
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            print_json(&json!({
                "service": service,
                "url": service_client.endpoint().url,
                "status": status,
                "body": body,
            }))?;
        }
    }

    Ok(())
}

fn check(config: &ProviderConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let client = AwsClient::from_config(config)?;
    let tls = client.tls();

    Ok(json!({
        "region": client.region(),
        "partition": client.partition().id,
        "dns_suffix": client.dns_suffix(),
        "account_id": client.account_id(),
        "max_attempts": config.retries.max_attempts(),
        "max_retry_delay_ms": config.retries.max_retry_delay_ms,
        "client_certificate": tls.identity.is_some(),
        "custom_ca_bundle": tls.roots.as_ref().map(|roots| roots.len()),
    }))
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
