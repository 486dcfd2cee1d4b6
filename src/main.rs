use clap::Parser;
use tracing_subscriber::EnvFilter;
use vault_autofill::cli::commands::{cmd_replay, cmd_scan};
use vault_autofill::cli::config::{Cli, Commands, load_config, log_level};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    // RUST_LOG > -v count > config file
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(cli.verbose, &config)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scan { file, url, format } => {
            cmd_scan(
                file.as_deref(),
                url.as_deref(),
                &format,
                config.scanner.options(),
                cli.verbose,
            )?;
        }
        Commands::Replay { script, trace } => {
            let trace = trace.or(config.logging.trace_file.clone());
            cmd_replay(&script, trace.as_deref(), config.flows.save_policy(), cli.verbose)?;
        }
    }

    Ok(())
}
