//! Owner Console server binary.
//!
//! Usage: `owner-server [config.toml]`

use owner_server::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    owner_server::init_tracing(&config.server);

    owner_server::serve(config).await?;

    Ok(())
}
