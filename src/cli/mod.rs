//! CLI Module
//!
//! Command-line front end: render a track built from a WAV file, or print
//! its persisted layout.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clipstream - render and inspect multi-clip audio tracks
#[derive(Parser, Debug)]
#[command(name = "clipstream")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Place a WAV file as clips on a track and render the track to a WAV file
    #[command(name = "render")]
    Render {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,

        /// Clip start times in seconds, one clip per value
        #[arg(long = "at", num_args = 1.., default_value = "0")]
        at: Vec<f64>,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,

        /// Playback speed applied while streaming
        #[arg(long)]
        speed: Option<f64>,

        /// Render from the end of the track back to its start
        #[arg(long)]
        reverse: bool,

        /// Samples pulled per streaming call
        #[arg(long, default_value_t = 4096)]
        block: usize,

        /// Output bit depth (16, 24 or 32)
        #[arg(long = "bit-depth", default_value_t = 24)]
        bit_depth: u16,

        /// Engine configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the persisted tag stream of a track as JSON
    #[command(name = "layout")]
    Layout {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,

        /// Clip start times in seconds, one clip per value
        #[arg(long = "at", num_args = 1.., default_value = "0")]
        at: Vec<f64>,

        /// Split the track at these times before printing
        #[arg(long, num_args = 1..)]
        split: Vec<f64>,

        /// Engine configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default engine configuration
    #[command(name = "default-config")]
    DefaultConfig,
}
