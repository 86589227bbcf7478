//! Built-in provider adapters and the catalog of known providers.
//!
//! Every adapter takes its base URL as a constructor argument so tests can
//! point it at a mock server.

mod http;
pub mod image;
pub mod speech;
pub mod text;

use std::path::PathBuf;

use crate::config::{Config, ProviderOverride};
use crate::fallback::{AdapterRegistry, Capability, CredentialStore, ProviderAdapter, ProviderError};

pub use http::{
    build_client, check_status, is_content_policy_error, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_TIMEOUT, MAX_DOWNLOAD_BYTES,
};

/// Static facts about a provider the crate knows how to call.
#[derive(Debug, Clone, Copy)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub capabilities: &'static [Capability],
    /// Default credential variables, in rotation order. Empty for keyless
    /// providers.
    pub env: &'static [&'static str],
}

impl ProviderInfo {
    pub fn is_keyless(&self) -> bool {
        self.env.is_empty()
    }

    pub fn serves(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

pub const KNOWN_PROVIDERS: &[ProviderInfo] = &[
    ProviderInfo {
        name: "elevenlabs",
        capabilities: &[Capability::Tts],
        env: &["ELEVEN_API_KEY_1", "ELEVEN_API_KEY_2", "ELEVEN_API_KEY_3"],
    },
    ProviderInfo {
        name: "groq",
        capabilities: &[Capability::Tts, Capability::TextGenerate],
        env: &["GROQ_API_KEY"],
    },
    ProviderInfo {
        name: "openai",
        capabilities: &[
            Capability::Tts,
            Capability::ImageGenerate,
            Capability::TextGenerate,
        ],
        env: &["OPENAI_API_KEY_1", "OPENAI_API_KEY_2"],
    },
    ProviderInfo {
        name: "gtts",
        capabilities: &[Capability::Tts],
        env: &[],
    },
    ProviderInfo {
        name: "espeak",
        capabilities: &[Capability::Tts],
        env: &[],
    },
    ProviderInfo {
        name: "pexels",
        capabilities: &[Capability::ImageSearch],
        env: &["PEXELS_API_KEY"],
    },
    ProviderInfo {
        name: "unsplash",
        capabilities: &[Capability::ImageSearch],
        env: &["UNSPLASH_ACCESS_KEY"],
    },
    ProviderInfo {
        name: "pixabay",
        capabilities: &[Capability::ImageSearch],
        env: &["PIXABAY_API_KEY"],
    },
    ProviderInfo {
        name: "local",
        capabilities: &[Capability::ImageSearch],
        env: &[],
    },
    ProviderInfo {
        name: "getimg",
        capabilities: &[Capability::ImageGenerate],
        env: &["GETIMG_API_KEY_1", "GETIMG_API_KEY_2"],
    },
    ProviderInfo {
        name: "gemini",
        capabilities: &[Capability::TextGenerate],
        env: &["GEMINI_API_KEY_1", "GEMINI_API_KEY_2"],
    },
    ProviderInfo {
        name: "openrouter",
        capabilities: &[Capability::TextGenerate],
        env: &["OPENROUTER_KEY"],
    },
];

/// Pseudo-provider in an image generation chain: search for the prompt
/// through the image search chain instead.
pub const SEARCH_STEP: &str = "search";

pub fn lookup(name: &str) -> Option<&'static ProviderInfo> {
    KNOWN_PROVIDERS.iter().find(|p| p.name == name)
}

/// Default directory the `local` provider serves backgrounds from.
pub fn default_backgrounds_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("shorts-relay")
        .join("backgrounds")
}

/// Credential variable names for a provider after applying overrides.
/// `None` for keyless providers.
pub fn credential_env(info: &ProviderInfo, overrides: Option<&ProviderOverride>) -> Option<Vec<String>> {
    if info.is_keyless() {
        return None;
    }
    let names = overrides
        .and_then(|o| o.env.clone())
        .unwrap_or_else(|| info.env.iter().map(|s| s.to_string()).collect());
    Some(names)
}

/// Build the credential store for every known provider.
pub fn credential_store<F>(config: &Config, lookup_var: F) -> CredentialStore
where
    F: Fn(&str) -> Option<String>,
{
    let mut store = CredentialStore::new();
    for info in KNOWN_PROVIDERS {
        match credential_env(info, config.providers.get(info.name)) {
            Some(names) => store.register(info.name, &names, &lookup_var),
            None => store.register_keyless(info.name),
        }
    }
    store
}

/// Construct adapters for every known provider and capability, applying
/// per-provider overrides from the config.
pub fn build_registry(config: &Config) -> Result<AdapterRegistry, ProviderError> {
    let http = build_client()?;
    let mut registry = AdapterRegistry::new();

    let o = |name: &str| config.providers.get(name).cloned().unwrap_or_default();
    let base = |ov: &ProviderOverride, default: &str| {
        ov.base_url.clone().unwrap_or_else(|| default.to_string())
    };

    // Speech
    let ov = o("elevenlabs");
    let mut eleven = speech::ElevenLabsSpeech::new(http.clone(), base(&ov, speech::ELEVENLABS_BASE_URL));
    if let Some(model) = &ov.speech_model {
        eleven = eleven.with_model(model);
    }
    if let Some(voice) = &ov.voice {
        eleven = eleven.with_voice(voice);
    }
    registry.register(Box::new(eleven));

    for mut adapter in [
        speech::OpenAiSpeech::openai(http.clone()),
        speech::OpenAiSpeech::groq(http.clone()),
    ] {
        let ov = o(adapter.name());
        if let Some(url) = &ov.base_url {
            adapter = adapter.with_base_url(url);
        }
        if let Some(model) = &ov.speech_model {
            adapter = adapter.with_model(model);
        }
        if let Some(voice) = &ov.voice {
            adapter = adapter.with_voice(voice);
        }
        registry.register(Box::new(adapter));
    }

    let ov = o("gtts");
    registry.register(Box::new(speech::GoogleTranslateSpeech::new(
        http.clone(),
        base(&ov, speech::GOOGLE_TRANSLATE_BASE_URL),
    )));

    let ov = o("espeak");
    registry.register(Box::new(speech::EspeakSpeech::new(
        ov.path.unwrap_or_else(|| PathBuf::from(speech::ESPEAK_PROGRAM)),
    )));

    // Image search
    let ov = o("pexels");
    registry.register(Box::new(image::PexelsSearch::new(
        http.clone(),
        base(&ov, image::PEXELS_BASE_URL),
    )));
    let ov = o("pixabay");
    registry.register(Box::new(image::PixabaySearch::new(
        http.clone(),
        base(&ov, image::PIXABAY_BASE_URL),
    )));
    let ov = o("unsplash");
    registry.register(Box::new(image::UnsplashSearch::new(
        http.clone(),
        base(&ov, image::UNSPLASH_BASE_URL),
    )));
    let ov = o("local");
    registry.register(Box::new(image::LocalImages::new(
        ov.path.unwrap_or_else(default_backgrounds_dir),
    )));

    // Image generation
    let ov = o("getimg");
    registry.register(Box::new(image::GetImgGenerate::new(
        http.clone(),
        base(&ov, image::GETIMG_BASE_URL),
    )));
    let ov = o("openai");
    registry.register(Box::new(image::OpenAiImageGenerate::new(
        http.clone(),
        base(&ov, image::OPENAI_BASE_URL),
        ov.image_model
            .clone()
            .unwrap_or_else(|| image::OPENAI_DEFAULT_IMAGE_MODEL.to_string()),
    )));

    // Text generation
    let ov = o("gemini");
    registry.register(Box::new(text::GeminiText::new(
        http.clone(),
        base(&ov, text::GEMINI_BASE_URL),
        ov.model.clone().unwrap_or_else(|| text::GEMINI_DEFAULT_MODEL.to_string()),
    )));
    for mut adapter in [
        text::OpenAiChat::openai(http.clone()),
        text::OpenAiChat::groq(http.clone()),
        text::OpenAiChat::openrouter(http.clone()),
    ] {
        let ov = o(adapter.name());
        if let Some(url) = &ov.base_url {
            adapter = adapter.with_base_url(url);
        }
        if let Some(model) = &ov.model {
            adapter = adapter.with_model(model);
        }
        registry.register(Box::new(adapter));
    }

    Ok(registry)
}
