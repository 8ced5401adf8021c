//! confstack CLI
//!
//! Resolves a layered configuration from flags, a config file and the
//! environment, then prints keys or the merged settings.

use anyhow::Result;
use clap::Parser;
use confstack::cli::{Cli, Command, DumpFormat};
use confstack::logging::{self, LogTarget};
use confstack::Config;
use tracing::{error, info};

fn print_settings(config: &Config, format: DumpFormat) -> Result<()> {
    let rendered = format.render(&config.all_settings())?;
    println!("{}", rendered.trim_end());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let config = cli.build_config()?;
    if let Some(path) = config.config_file_used() {
        info!(path = %path.display(), "Using config file");
    }

    match &cli.command {
        Command::Get { keys } => {
            for key in keys {
                match config.get(key) {
                    Some(value) if keys.len() == 1 => println!("{value}"),
                    Some(value) => println!("{key}={value}"),
                    None => {
                        error!(key = %key, "Key not set");
                        std::process::exit(1);
                    }
                }
            }
        }
        Command::Dump(args) => print_settings(&config, args.format)?,
        Command::Watch(args) => {
            if config.config_file_used().is_none() {
                anyhow::bail!("No config file to watch, pass --file or --name");
            }
            print_settings(&config, args.format)?;

            let format = args.format;
            let handle = config.clone();
            config.on_config_change(move || {
                if let Err(e) = print_settings(&handle, format) {
                    error!(error = %e, "Failed to render settings");
                }
            });
            config.watch_config()?;
            info!("Watching for changes, press Ctrl-C to stop");
            loop {
                std::thread::park();
            }
        }
    }

    Ok(())
}
