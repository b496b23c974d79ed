mod api;
mod cli;
mod config;
mod logging;
mod model;
mod product;
mod receipt;
mod session;
#[cfg(feature = "tui")]
mod tui;
mod wizard;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let cfg = cli::build_config(&args)?;
    let is_non_tui = args.mode() != cli::Mode::Interactive;

    if is_non_tui {
        logging::init_stderr();
    } else if let Err(e) = logging::init_file(&cfg.log_file) {
        eprintln!("logging disabled: {e:#}");
    }

    match cli::run(args, cfg).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting");
            Err(e)
        }
    }
}
