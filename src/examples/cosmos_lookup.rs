//! Cosmos Lookup Example
//!
//! Lists blogs linking to a URL, using a config file and a response cache.
//! A second run within the cache lifetime is answered without a request.
//!
//! Run with: cargo run --example cosmos_lookup -- config.json http://www.example.com
//!
//! Minimal config.json:
//! {"api_key": "...", "cache": {"enabled": true, "sqlite_path": "./technorati-cache.db"}}

use technorati_rs::{ClientConfig, OptionSet, TechnoratiClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("technorati_rs=info,technorati_core=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.json".to_string());
    let url = args
        .next()
        .unwrap_or_else(|| "http://www.example.com".to_string());

    let config = ClientConfig::load(&config_path)?;
    tracing::info!(?config, "Loaded configuration");

    let client = TechnoratiClient::from_config(config).await?;
    let options = OptionSet::new().with("limit", 20).with("type", "link");
    let cosmos = client.cosmos(&url, Some(options)).await?;

    println!(
        "{} inbound blogs for {}",
        cosmos.result_text("inboundblogs").unwrap_or("?"),
        cosmos.result_text("url").unwrap_or(&url)
    );
    for (i, item) in cosmos.items().enumerate() {
        let name = item.text_of(&["weblog", "name"]).unwrap_or("(unnamed)");
        let permalink = item.text_of(&["nearestpermalink"]).unwrap_or("");
        println!("  {}. {} {}", i + 1, name, permalink);
    }

    Ok(())
}
