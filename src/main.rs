//! Clipstream CLI
//!
//! Command-line interface for rendering and inspecting clip tracks.

use clap::Parser;
use env_logger::Env;
use log::info;

use clipstream::cli::commands::{self, RenderOptions};
use clipstream::cli::{Cli, Commands};
use clipstream::Result;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    info!("Clipstream v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Clipstream v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Render {
            input,
            at,
            output,
            speed,
            reverse,
            block,
            bit_depth,
            config,
        } => {
            let options = RenderOptions {
                speed,
                reverse,
                block,
                bit_depth,
            };
            commands::render(&input, &at, &output, options, config.as_deref())
        }
        Commands::Layout {
            input,
            at,
            split,
            config,
        } => commands::layout(&input, &at, &split, config.as_deref()),
        Commands::DefaultConfig => commands::default_config(),
    }
}
