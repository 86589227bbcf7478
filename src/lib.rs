//! shorts-relay library crate.
//!
//! Ordered provider fallback for text, speech and image capabilities, plus
//! the pipeline run that ties them together.

pub mod backdrop;
pub mod cache;
pub mod cli;
pub mod config;
pub mod fallback;
pub mod job;
pub mod providers;
pub mod relay;
