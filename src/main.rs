use clap::Parser;

use shorts_relay::cli::{self, Args, Command};
use shorts_relay::fallback::FallbackRequest;

/// Load .env file without overriding existing environment variables.
///
/// Runs before logging is set up so RUST_LOG may come from .env too.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
}

fn run(args: Args) -> Result<(), String> {
    let config_path = args.config.as_deref();

    // Config actions work without a valid chain setup
    if let Command::Config { action } = args.command {
        return cli::handle_config_action(config_path, action);
    }

    let config = cli::load_config(config_path, args.policy)?;

    match args.command {
        Command::Speak {
            text,
            output,
            voice,
            language,
            resolve,
        } => {
            let mut request = FallbackRequest::speech(text)
                .with_language(language.unwrap_or_else(|| config.job.language.clone()));
            if let Some(voice) = voice.or_else(|| config.job.voice.clone()) {
                request = request.with_voice(voice);
            }
            cli::run_resolve(&config, request, &resolve, Some(&output))
        }
        Command::Image {
            prompt,
            output,
            size,
            resolve,
        } => {
            let request = FallbackRequest::image_generate(prompt)
                .with_dimensions(size.unwrap_or_else(|| config.job.dimensions()));
            cli::run_resolve(&config, request, &resolve, Some(&output))
        }
        Command::Search {
            query,
            output,
            size,
            resolve,
        } => {
            let request = FallbackRequest::image_search(query)
                .with_dimensions(size.unwrap_or_else(|| config.job.dimensions()));
            cli::run_resolve(&config, request, &resolve, Some(&output))
        }
        Command::Text {
            prompt,
            output,
            max_tokens,
            resolve,
        } => {
            let request = FallbackRequest::text(prompt)
                .with_max_tokens(max_tokens.unwrap_or(config.job.max_tokens));
            cli::run_resolve(&config, request, &resolve, output.as_deref())
        }
        Command::Providers => cli::show_providers(&config),
        Command::Run { every, max_runs } => cli::run_jobs(&config, every, max_runs),
        Command::Cache { action } => cli::handle_cache_action(&config, action),
        Command::Config { .. } => Ok(()),
    }
}

fn main() {
    // Load .env file before anything else
    load_env();
    init_logging();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_env_var_not_overridden() {
        std::env::set_var("SHORTS_RELAY_TEST_EXISTING", "original_value");

        // Default behavior doesn't override existing vars
        let _ = dotenv::dotenv();

        assert_eq!(
            std::env::var("SHORTS_RELAY_TEST_EXISTING").unwrap(),
            "original_value"
        );
        std::env::remove_var("SHORTS_RELAY_TEST_EXISTING");
    }
}
