use clap::Parser;

use sidecar_server::{Cli, Configuration, logging, run};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;

    let _logging_guard = logging::init_logging(&configuration.logging_config())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting consul sidecar"
    );

    run(configuration, Vec::new()).await
}
