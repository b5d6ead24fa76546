//! animscript - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;

use animscript::demo::run_demo;
use animscript::runtime::backend::JsonLinesWriter;
use animscript::util::config::{load_or_default, render_config};
use animscript::util::logger::{self, LogLevel};
use animscript::{NAME, VERSION};

/// Runtime core of an animation scripting language
#[derive(Parser, Debug)]
#[command(name = "animscript")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bundled demo scene and print one JSON line per frame
    Demo {
        /// Override the end of the time range
        #[arg(long)]
        end: Option<f64>,

        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Print the effective configuration
    Config,

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.logging.level
    };
    logger::init_with_level(level);

    match args.command {
        Commands::Demo { end, frames } => {
            if let Some(end) = end {
                config.time.end = end;
            }
            if frames.is_some() {
                config.scheduler.max_frames = frames;
            }
            config.validate().context("Invalid configuration")?;

            let stdout = io::stdout();
            let mut writer = JsonLinesWriter::new(stdout.lock());
            let summary = run_demo(&config, &mut writer).context("Demo run failed")?;
            writer.into_inner().flush()?;
            eprintln!(
                "{} frames, {} passes, t = {}",
                summary.frames, summary.passes, summary.final_time
            );
        }
        Commands::Config => {
            print!("{}", render_config(&config)?);
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
