use anyhow::Result;
use clap::Parser;
use investor_storm::cli::Args;
use investor_storm::launch;
use tracing_subscriber::EnvFilter;

/// 日志过滤环境变量，未设置时按 --verbose 选择级别
const LOG_ENV: &str = "STORM_LOG";

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "investor_storm=debug"
    } else {
        "investor_storm=info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.to_config()?;
    let command = args.command(&config)?;

    launch(&config, command).await
}
