use clap::{Parser, Subcommand};
use logship::cli::run::RunOverrides;
use logship::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logship")]
#[command(about = "Ship log lines to CloudWatch Logs", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read lines from stdin and ship each one at INFO
    Run {
        #[arg(long)]
        log_group: Option<String>,

        #[arg(long)]
        log_stream: Option<String>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr so stdout stays free for `config init --stdout`.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logship=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run {
            log_group,
            log_stream,
        }) => {
            let overrides = RunOverrides {
                log_group,
                log_stream,
            };
            logship::cli::run::run(config_path, overrides).await?;
            // A pending blocking stdin read would otherwise hold up runtime shutdown.
            std::process::exit(0);
        }
        None => {
            logship::cli::run::run(config_path, RunOverrides::default()).await?;
            std::process::exit(0);
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                logship::cli::config::init(stdout)?;
            }
        },
    }

    Ok(())
}
