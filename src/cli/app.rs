// ABOUTME: Main application orchestration for the taskseq CLI
// ABOUTME: Coordinates CLI arguments, configuration, logging setup, and command dispatch

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use super::commands::{self, RunOptions};
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize logging on stderr so stdout stays free for command output.
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let log_level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(!no_color)
            .with_target(false)
            .with_writer(std::io::stderr);

        let installed = match self.config.logging.format.as_str() {
            "compact" => builder.compact().try_init(),
            _ => builder.try_init(),
        };
        installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    pub async fn run(&mut self, args: Args) -> Result<()> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting taskseq v{}", env!("CARGO_PKG_VERSION"));
        debug!("Configuration loaded from: {:?}", args.config);

        match args.command {
            Commands::Run {
                file,
                parallel,
                max_parallelism,
                vars,
                format,
                output,
            } => {
                self.config.merge_variables(Args::parse_variables(&vars)?);

                let options = RunOptions {
                    parallel: parallel || self.config.parallel,
                    max_parallelism: max_parallelism.unwrap_or(self.config.max_parallelism),
                    variables: self.config.variables.clone(),
                    format,
                    output,
                };

                let cancel = CancellationToken::new();
                let on_interrupt = cancel.clone();
                let interrupt = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupt received; cancelling task sequence");
                        on_interrupt.cancel();
                    }
                });

                let outcome = commands::run_sequence(file, options, cancel).await;
                interrupt.abort();
                outcome.map(|_| ())
            }

            Commands::Validate { file, format } => commands::validate_sequence(file, format).await,

            Commands::Convert {
                file,
                to,
                format,
                output,
            } => commands::convert_sequence(file, to, format, output).await,

            Commands::Detect { file } => commands::detect_format(file).await.map(|_| ()),
        }
    }

    /// Create the application for already-parsed arguments.
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_app_creation() {
        let app = App::new(Config::default());
        assert_eq!(app.config().max_parallelism, 4);
    }

    #[test]
    fn test_app_from_args_with_config_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("taskseq.yaml");
        fs::write(
            &config_path,
            "max_parallelism: 8\nlogging:\n  level: debug\n  format: compact\n",
        )
        .unwrap();

        let args = Args::try_parse_from([
            "taskseq",
            "--config",
            config_path.to_str().unwrap(),
            "detect",
            "deploy.xml",
        ])
        .unwrap();

        let app = App::from_args(&args).unwrap();
        assert_eq!(app.config().max_parallelism, 8);
        assert_eq!(app.config().logging.level, "debug");
        assert_eq!(app.config().logging.format, "compact");
    }
}
