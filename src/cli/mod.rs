//! CLI module for Podtekst.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Podtekst - podcast transcript refinement
///
/// Turns raw speech recognition output into clean, speaker-attributed
/// paragraphs with a summary, chapters and resolved speaker names.
#[derive(Parser, Debug)]
#[command(name = "podtekst")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add an episode and run the pipeline on it
    Add {
        /// Audio URL or internal storage reference
        url: String,

        /// Episode title
        #[arg(short, long)]
        title: String,

        /// Episode description, used as context for refinement
        #[arg(short, long)]
        description: Option<String>,

        /// Recognition backend (whisper, canary-qwen, whisperx, openai)
        #[arg(short, long)]
        backend: Option<String>,

        /// Minimum number of speakers (diarizing backends only)
        #[arg(long)]
        min_speakers: Option<u32>,

        /// Only create the episode; don't process it
        #[arg(long)]
        no_process: bool,
    },

    /// Run the full pipeline on a pending episode
    Process {
        /// Episode ID or slug
        id: String,

        /// Recognition backend (whisper, canary-qwen, whisperx, openai)
        #[arg(short, long)]
        backend: Option<String>,

        /// Minimum number of speakers (diarizing backends only)
        #[arg(long)]
        min_speakers: Option<u32>,
    },

    /// Refine an episode again from its stored raw transcript
    Reprocess {
        /// Episode ID or slug
        id: String,
    },

    /// Copy an episode and reprocess the copy
    Clone {
        /// Episode ID or slug
        id: String,

        /// Only create the copy; don't process it
        #[arg(long)]
        no_process: bool,
    },

    /// List episodes
    List,

    /// Show an episode's status, summary and chapters
    Show {
        /// Episode ID or slug
        id: String,
    },

    /// Export a processed transcript
    Export {
        /// Episode ID or slug
        id: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format (json, srt, vtt, markdown)
        #[arg(short, long, default_value = "markdown")]
        format: String,
    },

    /// Start HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check API keys and configuration
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let cli = Cli::parse_from([
            "podtekst",
            "add",
            "https://cdn.example/ep1.mp3",
            "--title",
            "Pilot",
            "--min-speakers",
            "2",
            "-vv",
        ]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Add {
                url,
                title,
                min_speakers,
                no_process,
                ..
            } => {
                assert_eq!(url, "https://cdn.example/ep1.mp3");
                assert_eq!(title, "Pilot");
                assert_eq!(min_speakers, Some(2));
                assert!(!no_process);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_export_defaults_to_markdown() {
        let cli = Cli::parse_from(["podtekst", "export", "abc"]);
        match cli.command {
            Commands::Export { format, output, .. } => {
                assert_eq!(format, "markdown");
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
