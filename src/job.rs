//! One pipeline run: question text, narration and background image.
//!
//! Text and image failures fall back to configured defaults, and a missing
//! background is finally generated as a gradient. Narration has no default,
//! so its exhaustion fails the run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::backdrop;
use crate::config::JobConfig;
use crate::fallback::{Capability, FallbackRequest, Output, ResolveError};
use crate::relay::{Fetched, Relay, Source};

pub const MANIFEST_FILE: &str = "manifest.txt";

/// Granularity at which the scheduler notices a stop request while waiting.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum JobError {
    #[error("narration failed: {0}")]
    Narration(#[source] ResolveError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> JobError + '_ {
    move |source| JobError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Files produced by one run.
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    pub dir: PathBuf,
    pub question: String,
    pub question_source: Source,
    pub narration: PathBuf,
    pub narration_source: Source,
    /// None only when the gradient could not be generated either
    pub background: Option<PathBuf>,
    pub background_source: Option<Source>,
}

/// Outcome counts of a scheduler loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct JobRunner {
    relay: Relay,
    config: JobConfig,
    /// Runs started so far; picks the default question
    runs: usize,
}

impl JobRunner {
    pub fn new(relay: Relay, config: JobConfig) -> Self {
        Self {
            relay,
            config,
            runs: 0,
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Produce one set of assets in a fresh run directory.
    pub async fn run_once(&mut self) -> Result<JobArtifacts, JobError> {
        let run = self.runs;
        self.runs += 1;

        let (question, question_source) = self.question(run).await;
        log::info!("Question ({}): {}", question_source, question);

        let mut speech = FallbackRequest::speech(question.clone()).with_language(&self.config.language);
        if let Some(voice) = &self.config.voice {
            speech = speech.with_voice(voice);
        }
        let narration = self
            .relay
            .fetch(&speech, None, true)
            .await
            .map_err(JobError::Narration)?;

        let background = self.background().await;

        let dir = create_run_dir(&self.config.output_dir())?;

        let question_path = dir.join("question.txt");
        std::fs::write(&question_path, &question).map_err(io_err(&question_path))?;

        let narration_path = dir.join(format!(
            "narration.{}",
            sniff_extension(Capability::Tts, narration.output.as_bytes())
        ));
        std::fs::write(&narration_path, narration.output.as_bytes()).map_err(io_err(&narration_path))?;

        let (background_path, background_source) = match background {
            Some(fetched) => {
                let path = dir.join(format!(
                    "background.{}",
                    sniff_extension(Capability::ImageSearch, fetched.output.as_bytes())
                ));
                std::fs::write(&path, fetched.output.as_bytes()).map_err(io_err(&path))?;
                (Some(path), Some(fetched.source))
            }
            None => (None, None),
        };

        let artifacts = JobArtifacts {
            dir,
            question,
            question_source,
            narration: narration_path,
            narration_source: narration.source,
            background: background_path,
            background_source,
        };
        write_manifest(&artifacts)?;
        log::info!("Run complete: {}", artifacts.dir.display());
        Ok(artifacts)
    }

    /// A freshly generated question, or the configured default. Questions are
    /// never served from cache so consecutive runs differ.
    async fn question(&mut self, run: usize) -> (String, Source) {
        let request = FallbackRequest::text(self.config.question_prompt.clone())
            .with_max_tokens(self.config.max_tokens);
        let default = self.config.default_question(run).to_string();
        match self.relay.fetch(&request, None, false).await {
            Ok(Fetched {
                output: Output::Text(text),
                source,
            }) => (text.trim().to_string(), source),
            Ok(_) => (default, Source::Default),
            Err(e) => {
                log::warn!("{}; using default question", e);
                (default, Source::Default)
            }
        }
    }

    async fn background(&mut self) -> Option<Fetched> {
        let request = FallbackRequest::image_search(self.config.background_query.clone())
            .with_dimensions(self.config.dimensions());
        match self.relay.fetch(&request, None, true).await {
            Ok(fetched) => return Some(fetched),
            Err(e) => log::warn!("{}; using a default background", e),
        }

        if let Some(fallback) = &self.config.fallback_background {
            match std::fs::read(fallback) {
                Ok(bytes) if !bytes.is_empty() => {
                    return Some(Fetched {
                        output: Output::Bytes(bytes),
                        source: Source::Default,
                    })
                }
                Ok(_) => log::warn!("Fallback background {} is empty", fallback.display()),
                Err(e) => log::warn!(
                    "Fallback background {} unreadable: {}",
                    fallback.display(),
                    e
                ),
            }
        }

        self.gradient()
    }

    fn gradient(&self) -> Option<Fetched> {
        let color = |value: &str| backdrop::parse_hex_color(value).unwrap_or([0, 0, 0]);
        let top = color(&self.config.background_color);
        let bottom = color(&self.config.secondary_color);
        match backdrop::gradient_png(self.config.dimensions(), top, bottom) {
            Ok(png) => Some(Fetched {
                output: Output::Bytes(png),
                source: Source::Generated,
            }),
            Err(e) => {
                log::error!("Failed to generate background: {}", e);
                None
            }
        }
    }

    /// Run jobs back to back, starting one every `every`, until `stop` is
    /// set or `max_runs` jobs have run. A failed job is logged and the next
    /// one still runs.
    pub async fn run_every(
        &mut self,
        every: Duration,
        stop: &AtomicBool,
        max_runs: Option<usize>,
    ) -> ScheduleSummary {
        let mut summary = ScheduleSummary::default();

        while !stop.load(Ordering::SeqCst) {
            let started = tokio::time::Instant::now();
            match self.run_once().await {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    log::error!("Run failed: {}", e);
                    summary.failed += 1;
                }
            }
            if max_runs.is_some_and(|max| summary.succeeded + summary.failed >= max) {
                break;
            }

            let next = started + every;
            while !stop.load(Ordering::SeqCst) {
                let now = tokio::time::Instant::now();
                if now >= next {
                    break;
                }
                tokio::time::sleep((next - now).min(STOP_POLL_INTERVAL)).await;
            }
        }

        log::info!(
            "Scheduler stopped: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        summary
    }
}

/// Create `<root>/run-<unix seconds>`, adding a suffix if that already exists.
fn create_run_dir(root: &Path) -> Result<PathBuf, JobError> {
    std::fs::create_dir_all(root).map_err(io_err(root))?;
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut dir = root.join(format!("run-{}", secs));
    let mut n = 1;
    loop {
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                dir = root.join(format!("run-{}-{}", secs, n));
                n += 1;
            }
            Err(e) => return Err(io_err(&dir)(e)),
        }
    }
}

/// File extension from magic bytes.
pub fn sniff_extension(capability: Capability, bytes: &[u8]) -> &'static str {
    match capability {
        Capability::TextGenerate => "txt",
        Capability::Tts => {
            if bytes.starts_with(b"RIFF") {
                "wav"
            } else {
                "mp3"
            }
        }
        Capability::ImageSearch | Capability::ImageGenerate => {
            if bytes.starts_with(b"\x89PNG") {
                "png"
            } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
                "webp"
            } else {
                "jpg"
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `key: value` lines describing the run.
fn write_manifest(artifacts: &JobArtifacts) -> Result<(), JobError> {
    let mut manifest = String::new();
    manifest.push_str(&format!("question: {}\n", artifacts.question.replace('\n', " ")));
    manifest.push_str(&format!("question_source: {}\n", artifacts.question_source));
    manifest.push_str(&format!("narration: {}\n", file_name(&artifacts.narration)));
    manifest.push_str(&format!("narration_source: {}\n", artifacts.narration_source));
    match (&artifacts.background, &artifacts.background_source) {
        (Some(path), Some(source)) => {
            manifest.push_str(&format!("background: {}\n", file_name(path)));
            manifest.push_str(&format!("background_source: {}\n", source));
        }
        _ => manifest.push_str("background: none\n"),
    }

    let path = artifacts.dir.join(MANIFEST_FILE);
    std::fs::write(&path, manifest).map_err(io_err(&path))
}

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

pub fn ctrlc_flag() -> &'static AtomicBool {
    &CTRLC_RECEIVED
}

/// Set up the Ctrl+C handler. Call once at startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, finishing current run...");
    })
}
