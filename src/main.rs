use anyhow::Context;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bundle_reconciler::bootstrap;
use bundle_reconciler::config::{Config, RunMode};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,bundle_reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting bundle reconciler");

    let config = Config::from_env().context("loading configuration")?;
    let client = bootstrap::initialize_bundle_data_client(&config).context("building bundle data client")?;

    let output = match config.mode {
        RunMode::Pending => {
            let pending = client
                .get_pending_refunds_from_valid_bundles(config.bundle_lookback)
                .await
                .context("loading pending refunds")?;
            json!({ "pending_refunds": pending })
        }
        RunMode::Next => {
            let next = client.get_next_bundle_refunds().await.context("loading next bundle refunds")?;
            json!({ "next_bundle_refunds": next })
        }
        RunMode::Load => {
            let result = client
                .load_data(&config.block_ranges, client.spoke_clients(), config.emit_diagnostics)
                .await
                .context("reconciling block ranges")?;
            serde_json::to_value(result)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    info!("✅ Reconciliation finished");

    Ok(())
}
