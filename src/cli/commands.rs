//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::args::{CacheAction, ConfigAction, ResolveOpts};
use crate::config::{self, Config};
use crate::fallback::{Capability, FailurePolicy, FallbackRequest, Output, ProviderStatus};
use crate::job::{self, JobRunner};
use crate::providers;
use crate::relay::Relay;

/// Load, override and validate the configuration.
pub fn load_config(path: Option<&Path>, policy: Option<FailurePolicy>) -> Result<Config, String> {
    let mut config = Config::load(path).map_err(|e| e.to_string())?;
    if let Some(policy) = policy {
        config.resolver.policy = policy;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Build the relay from config and the process environment, warning about
/// chains that have nothing usable.
pub fn build_relay(config: &Config) -> Result<Relay, String> {
    let relay = Relay::from_config(config, |name| std::env::var(name).ok())
        .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

    for capability in Capability::ALL {
        let falls_through = capability == Capability::ImageGenerate
            && config.chains.image_generate.iter().any(|p| p == providers::SEARCH_STEP);
        let usable = falls_through
            || relay
            .report()
            .iter()
            .any(|s| s.capability == capability && s.has_adapter && s.availability.usable() > 0);
        if !usable {
            log::warn!(
                "No {} provider has credentials; {} requests will fail",
                capability,
                capability
            );
        }
    }
    Ok(relay)
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create async runtime: {}", e))
}

/// Resolve one request and write the result to `output`, or stdout for text.
pub fn run_resolve(
    config: &Config,
    request: FallbackRequest,
    opts: &ResolveOpts,
    output: Option<&Path>,
) -> Result<(), String> {
    let mut relay = build_relay(config)?;

    if let Some(order) = &opts.order {
        for name in order {
            let search_step =
                request.capability == Capability::ImageGenerate && name == providers::SEARCH_STEP;
            if !search_step && !relay.resolver().adapters().contains(request.capability, name) {
                log::warn!("'{}' cannot serve {}; it will be skipped", name, request.capability);
            }
        }
    }

    let rt = runtime()?;
    let fetched = rt
        .block_on(relay.fetch(&request, opts.order.as_deref(), !opts.no_cache))
        .map_err(|e| e.to_string())?;

    match (output, &fetched.output) {
        (None, Output::Text(text)) => println!("{}", text),
        (None, Output::Bytes(_)) => {
            return Err("An output file is required for binary results".to_string());
        }
        (Some(path), out) => {
            std::fs::write(path, out.as_bytes())
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            println!(
                "Wrote {} to {} (via {})",
                format_size(out.len() as u64),
                path.display(),
                fetched.source
            );
        }
    }
    Ok(())
}

/// Print the provider availability table.
pub fn show_providers(config: &Config) -> Result<(), String> {
    let relay = build_relay(config)?;
    let report = relay.report();

    for capability in Capability::ALL {
        println!("{}:", capability);
        for status in report.iter().filter(|s| s.capability == capability) {
            println!("  {}", format_status(status));
        }
    }
    Ok(())
}

fn format_status(status: &ProviderStatus) -> String {
    if status.capability == Capability::ImageGenerate && status.provider == providers::SEARCH_STEP {
        return format!("{:<12} {:<12} falls through to image-search", status.provider, "");
    }
    let a = status.availability;
    let mut keys = if !status.has_adapter {
        "no adapter".to_string()
    } else if providers::lookup(&status.provider).is_some_and(|info| info.is_keyless()) {
        "keyless".to_string()
    } else {
        format!("{}/{} keys set", a.available, a.configured)
    };
    if a.failed > 0 {
        keys.push_str(&format!(", {} failed", a.failed));
    }
    if a.cooling_down > 0 {
        keys.push_str(&format!(", {} cooling down", a.cooling_down));
    }
    let state = if status.has_adapter && a.usable() > 0 {
        "ready"
    } else {
        "unavailable"
    };
    format!("{:<12} {:<12} {}", status.provider, state, keys)
}

/// `run`: once, or on a fixed interval until Ctrl+C.
pub fn run_jobs(config: &Config, every: Option<u64>, max_runs: Option<usize>) -> Result<(), String> {
    let relay = build_relay(config)?;
    let mut runner = JobRunner::new(relay, config.job.clone());
    let rt = runtime()?;

    let Some(every) = every else {
        let artifacts = rt.block_on(runner.run_once()).map_err(|e| e.to_string())?;
        println!("Assets written to {}", artifacts.dir.display());
        return Ok(());
    };

    job::setup_ctrlc_handler().map_err(|e| format!("Failed to set Ctrl+C handler: {}", e))?;
    println!("Running every {}s. Press Ctrl+C to stop.", every);
    let summary = rt.block_on(runner.run_every(
        Duration::from_secs(every.max(1)),
        job::ctrlc_flag(),
        max_runs,
    ));
    println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
    if summary.succeeded == 0 && summary.failed > 0 {
        return Err("Every run failed".to_string());
    }
    Ok(())
}

pub fn handle_cache_action(config: &Config, action: CacheAction) -> Result<(), String> {
    let cache = crate::cache::ArtifactCache::new(
        config
            .cache
            .dir
            .clone()
            .unwrap_or_else(crate::cache::ArtifactCache::default_dir),
    );

    match action {
        CacheAction::List => {
            let entries = cache
                .list_entries()
                .map_err(|e| format!("Failed to list cache entries: {}", e))?;

            if entries.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }

            println!("Cached artifacts:\n");
            for entry in &entries {
                let capability = entry
                    .capability
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let payload = entry
                    .payload
                    .as_deref()
                    .map(|p| truncate(p, 50))
                    .unwrap_or_else(|| "(no metadata)".to_string());
                println!(
                    "  {} {:<14} {:>10} \"{}\"",
                    entry.hash,
                    capability,
                    format_size(entry.size_bytes),
                    payload
                );
            }

            let total_size = cache
                .total_size_bytes()
                .map_err(|e| format!("Failed to calculate total size: {}", e))?;
            println!("\nTotal: {} entries, {}", entries.len(), format_size(total_size));
            Ok(())
        }
        CacheAction::Clear { hash: Some(h) } => {
            let removed = cache
                .remove(&h)
                .map_err(|e| format!("Failed to remove cache entry: {}", e))?;
            if removed {
                println!("Removed cache entry: {}", h);
            } else {
                println!("No cache entry found with hash: {}", h);
            }
            Ok(())
        }
        CacheAction::Clear { hash: None } => {
            let count = cache
                .clear_all()
                .map_err(|e| format!("Failed to clear cache: {}", e))?;
            if count == 0 {
                println!("Cache is already empty.");
            } else {
                println!("Removed {} cache entr{}.", count, if count == 1 { "y" } else { "ies" });
            }
            Ok(())
        }
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(path: Option<&Path>, action: ConfigAction) -> Result<(), String> {
    let config_path: PathBuf = path.map(PathBuf::from).unwrap_or_else(config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load(path).map_err(|e| e.to_string())?;
            if config_path.exists() {
                println!("# Config file: {} (exists)", config_path.display());
            } else {
                println!("# Config file: {} (not found, showing defaults)", config_path.display());
            }
            print!("{}", config.to_toml().map_err(|e| e.to_string())?);
            Ok(())
        }
        ConfigAction::Init => {
            Config::write_default(&config_path).map_err(|e| e.to_string())?;
            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let one_line = s.replace('\n', " ");
    if one_line.chars().count() > max_chars {
        let cut: String = one_line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        one_line
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::Availability;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 50), "short");
        assert_eq!(truncate("éééééééééé", 6), "ééé...");
        assert_eq!(truncate("a\nb", 10), "a b");
    }

    #[test]
    fn test_format_status() {
        let status = ProviderStatus {
            capability: Capability::Tts,
            provider: "elevenlabs".to_string(),
            has_adapter: true,
            availability: Availability {
                configured: 3,
                available: 1,
                failed: 0,
                cooling_down: 0,
            },
        };
        let line = format_status(&status);
        assert!(line.starts_with("elevenlabs"));
        assert!(line.contains("ready"));
        assert!(line.ends_with("1/3 keys set"));
    }

    #[test]
    fn test_load_config_applies_policy_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[resolver]\npolicy = \"classified\"\n").unwrap();

        let config = load_config(Some(&path), Some(FailurePolicy::Strict)).unwrap();
        assert_eq!(config.resolver.policy, FailurePolicy::Strict);
    }

    #[test]
    fn test_load_config_rejects_invalid_chain() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chains]\ntts = []\n").unwrap();
        assert!(load_config(Some(&path), None).is_err());
    }
}
