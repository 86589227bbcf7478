//! Command-line interface definitions and subcommand handlers.

mod args;
mod commands;

pub use args::{Args, CacheAction, Command, ConfigAction, ResolveOpts};
pub use commands::{
    build_relay, format_size, handle_cache_action, handle_config_action, load_config, run_jobs,
    run_resolve, show_providers,
};
