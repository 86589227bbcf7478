//! Capabilities a provider can offer.

use serde::{Deserialize, Serialize};

/// The abstract operation a caller needs, independent of the vendor serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Synthesize speech from text.
    Tts,
    /// Generate an image from a prompt.
    ImageGenerate,
    /// Find an existing image matching a query.
    ImageSearch,
    /// Generate text from a prompt.
    TextGenerate,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Tts,
        Capability::ImageGenerate,
        Capability::ImageSearch,
        Capability::TextGenerate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Tts => "tts",
            Capability::ImageGenerate => "image-generate",
            Capability::ImageSearch => "image-search",
            Capability::TextGenerate => "text-generate",
        }
    }

    /// Whether this capability produces text rather than bytes.
    pub fn produces_text(&self) -> bool {
        matches!(self, Capability::TextGenerate)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
