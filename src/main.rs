mod cli;

use clap::Parser;
use cli::{Cli, Commands, ConfigArgs};
use convertbox::config::Config;
use convertbox::tools::ToolRunner;
use tracing_subscriber::EnvFilter;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let mut config = load_config(&args.config)?;
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            convertbox::api::run(config).await?;
        }
        Commands::CheckTools(args) => {
            let config = load_config(&args)?;
            check_tools(config);
        }
        Commands::ShowConfig(args) => {
            let config = load_config(&args)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<Config, AnyError> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };
    Ok(config)
}

fn check_tools(config: Config) {
    let runner = ToolRunner::new(config.tools);
    for status in runner.availability() {
        match status.resolved {
            Some(path) => println!("{:<14} ok       {}", status.tool.to_string(), path.display()),
            None => println!("{:<14} missing  {}", status.tool.to_string(), status.binary),
        }
    }
}
