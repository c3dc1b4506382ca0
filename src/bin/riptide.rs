use anyhow::Result;
use riptide::app::App;
use riptide::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    riptide::logging::init()?;

    let config = Config::load()?;
    config.validate()?;
    tracing::info!(model = %config.api.model, endpoint = %config.api.base_url, "starting");

    let mut app = App::new(config)?;
    app.run().await
}
