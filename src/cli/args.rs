//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::fallback::{Dimensions, FailurePolicy};

/// Resolve narration, images and text across fallback provider chains
#[derive(Parser, Debug)]
#[command(name = "shorts-relay")]
#[command(version, about = "Provider fallback relay for short-video pipelines", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Narrate a line with the first working TTS provider
    shorts-relay speak \"Which planet has the most moons?\" -o question.mp3

    # Force a provider order for one call
    shorts-relay speak \"Hello\" -o hello.mp3 --order gtts,espeak

    # Find a background image
    shorts-relay search \"neon city at night\" -o bg.jpg

    # Show which providers have usable credentials
    shorts-relay providers

    # Produce a full set of assets every 10 minutes until Ctrl+C
    shorts-relay run --every 600

ENVIRONMENT:
    Credentials are read from the environment (and .env), e.g.
    ELEVEN_API_KEY_1, OPENAI_API_KEY_1, PEXELS_API_KEY, GEMINI_API_KEY_1.
    RUST_LOG controls log verbosity (default: info).")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured failure policy
    #[arg(long, global = true)]
    pub policy: Option<FailurePolicy>,
}

/// Options shared by the single-request subcommands.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ResolveOpts {
    /// Provider order for this call, comma separated (overrides config)
    #[arg(long, value_delimiter = ',')]
    pub order: Option<Vec<String>>,

    /// Neither read from nor write to the artifact cache
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize speech
    #[command(after_help = "EXAMPLES:
    shorts-relay speak \"Hello there\" -o hello.mp3
    shorts-relay speak \"Bonjour\" -o fr.mp3 --language fr --order gtts")]
    Speak {
        /// Text to speak
        text: String,
        /// Where to write the audio
        #[arg(long, short)]
        output: PathBuf,
        /// Voice identifier
        #[arg(long)]
        voice: Option<String>,
        /// Language code
        #[arg(long)]
        language: Option<String>,
        #[command(flatten)]
        resolve: ResolveOpts,
    },

    /// Generate an image from a prompt
    Image {
        prompt: String,
        #[arg(long, short)]
        output: PathBuf,
        /// Output size as WIDTHxHEIGHT
        #[arg(long)]
        size: Option<Dimensions>,
        #[command(flatten)]
        resolve: ResolveOpts,
    },

    /// Search for an existing image
    Search {
        query: String,
        #[arg(long, short)]
        output: PathBuf,
        /// Preferred size as WIDTHxHEIGHT
        #[arg(long)]
        size: Option<Dimensions>,
        #[command(flatten)]
        resolve: ResolveOpts,
    },

    /// Generate text from a prompt
    Text {
        prompt: String,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[command(flatten)]
        resolve: ResolveOpts,
    },

    /// Show provider availability per capability
    Providers,

    /// Produce question, narration and background assets
    #[command(after_help = "EXAMPLES:
    shorts-relay run                 # One run
    shorts-relay run --every 600     # Every 10 minutes until Ctrl+C")]
    Run {
        /// Repeat every SECS seconds until Ctrl+C
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
        /// Stop after this many runs
        #[arg(long, requires = "every")]
        max_runs: Option<usize>,
    },

    /// Manage the artifact cache
    #[command(after_help = "EXAMPLES:
    shorts-relay cache list
    shorts-relay cache clear
    shorts-relay cache clear 3f2a...   # Remove one entry by hash")]
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// List cached entries
    List,
    /// Remove one entry, or all entries when no hash is given
    Clear { hash: Option<String> },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speak_requires_output() {
        assert!(Args::try_parse_from(["shorts-relay", "speak", "hi"]).is_err());
    }

    #[test]
    fn test_speak_with_options() {
        let args = Args::parse_from([
            "shorts-relay",
            "speak",
            "hello",
            "-o",
            "out.mp3",
            "--voice",
            "Adam",
            "--order",
            "gtts,espeak",
            "--no-cache",
        ]);
        match args.command {
            Command::Speak {
                text,
                output,
                voice,
                language,
                resolve,
            } => {
                assert_eq!(text, "hello");
                assert_eq!(output, PathBuf::from("out.mp3"));
                assert_eq!(voice.as_deref(), Some("Adam"));
                assert!(language.is_none());
                assert_eq!(
                    resolve.order,
                    Some(vec!["gtts".to_string(), "espeak".to_string()])
                );
                assert!(resolve.no_cache);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_image_size_parses() {
        let args = Args::parse_from(["shorts-relay", "image", "a cat", "-o", "cat.png", "--size", "1024x1792"]);
        match args.command {
            Command::Image { size, .. } => assert_eq!(size, Some(Dimensions::new(1024, 1792))),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Args::try_parse_from(["shorts-relay", "image", "x", "-o", "x", "--size", "big"]).is_err());
    }

    #[test]
    fn test_text_output_is_optional() {
        let args = Args::parse_from(["shorts-relay", "text", "ask"]);
        assert!(matches!(args.command, Command::Text { output: None, .. }));
    }

    #[test]
    fn test_global_options() {
        let args = Args::parse_from(["shorts-relay", "providers", "--policy", "strict", "-c", "/tmp/c.toml"]);
        assert_eq!(args.policy, Some(FailurePolicy::Strict));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(args.command, Command::Providers));
    }

    #[test]
    fn test_run_every() {
        let args = Args::parse_from(["shorts-relay", "run", "--every", "600"]);
        assert!(matches!(
            args.command,
            Command::Run {
                every: Some(600),
                max_runs: None
            }
        ));
        assert!(Args::try_parse_from(["shorts-relay", "run", "--max-runs", "2"]).is_err());
    }

    #[test]
    fn test_cache_clear_with_hash() {
        let args = Args::parse_from(["shorts-relay", "cache", "clear", "abc123"]);
        match args.command {
            Command::Cache {
                action: CacheAction::Clear { hash },
            } => assert_eq!(hash.as_deref(), Some("abc123")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_init_subcommand() {
        let args = Args::parse_from(["shorts-relay", "config", "init"]);
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Init
            }
        ));
    }
}
