//! Command-line interface for cwdecode
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Streaming Morse code decoder
#[derive(Parser, Debug)]
#[command(name = "cwdecode", version, about = "Streaming Morse code (CW) decoder")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress the summary line
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Token output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Rendered dits and dahs: `... ___ ... : `
    #[default]
    Text,
    /// One JSON object per token
    Json,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode Morse code from a WAV file
    Decode {
        /// WAV file to decode ("-" or absent: read stdin)
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Output format
        #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Amplitudes per tone detector window
        #[arg(long, value_name = "N")]
        window: Option<usize>,

        /// Runs per unit-estimation group
        #[arg(long, value_name = "N")]
        group_size: Option<usize>,

        /// Samples per chunk
        #[arg(long, short = 'c', value_name = "N")]
        chunk_size: Option<usize>,

        /// Drop a partial window or group at end of input instead of classifying it
        #[arg(long)]
        discard_trailing: bool,

        /// Run all stages on the calling thread
        #[arg(long)]
        single_threaded: bool,
    },

    /// Decode Morse code live from an audio input device until Ctrl-C
    #[cfg(feature = "cpal-audio")]
    Listen {
        /// Input device name (see `devices`; default: PipeWire/Pulse or the system default)
        #[arg(long, short = 'd', value_name = "NAME")]
        device: Option<String>,

        /// Output format
        #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Amplitudes per tone detector window
        #[arg(long, value_name = "N")]
        window: Option<usize>,

        /// Runs per unit-estimation group
        #[arg(long, value_name = "N")]
        group_size: Option<usize>,

        /// Samples per chunk
        #[arg(long, short = 'c', value_name = "N")]
        chunk_size: Option<usize>,
    },

    /// List audio input devices
    #[cfg(feature = "cpal-audio")]
    Devices,

    /// Write a keyed Morse WAV file from a dit/dah pattern
    Synth {
        /// Pattern: "." dit, "-" dah, space letter gap, "/" word gap, "|" pause
        #[arg(long, short = 'p', value_name = "PATTERN")]
        pattern: String,

        /// Output WAV file
        #[arg(long, short = 'o', value_name = "FILE")]
        output: PathBuf,

        /// Length of one Morse unit in milliseconds
        #[arg(long, value_name = "MS")]
        unit_ms: Option<u32>,

        /// Tone frequency in Hz
        #[arg(long, value_name = "HZ")]
        tone_hz: Option<u32>,

        /// Sample rate in Hz
        #[arg(long, value_name = "HZ")]
        sample_rate: Option<u32>,
    },

    /// View and initialize configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
