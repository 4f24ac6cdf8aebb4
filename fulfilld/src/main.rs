use clap::Parser;
use fulfilld::{config::Args, telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    telemetry::init_telemetry()?;

    let config = Config::load(&args)?;

    fulfilld::run(config).await
}
