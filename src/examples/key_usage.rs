//! Key Usage Example
//!
//! Prints how many queries the API key has used today.
//!
//! Run with: TECHNORATI_API_KEY=... cargo run --example key_usage

use technorati_rs::TechnoratiClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("technorati_rs=debug,technorati_core=debug")),
        )
        .with_target(false)
        .init();

    let api_key = std::env::var("TECHNORATI_API_KEY")?;
    let client = TechnoratiClient::new(api_key)?;

    let info = client.key_info_typed().await?;
    println!("Queries used today: {}", info.api_queries);
    println!("Daily allowance:    {}", info.max_queries);
    println!("Remaining:          {}", info.remaining());

    Ok(())
}
