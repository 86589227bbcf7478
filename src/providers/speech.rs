//! Text-to-speech adapters.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use super::http::{check_status, join_url, read_capped, require_secret, MAX_DOWNLOAD_BYTES};
use crate::fallback::{Capability, FallbackRequest, Output, ProviderAdapter, ProviderError, Secret};

pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
/// "Rachel"
pub const ELEVENLABS_DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
pub const ELEVENLABS_DEFAULT_MODEL: &str = "eleven_monolingual_v1";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

pub const GOOGLE_TRANSLATE_BASE_URL: &str = "https://translate.google.com";
/// The translate endpoint refuses longer inputs.
pub const GOOGLE_TRANSLATE_MAX_CHARS: usize = 200;

pub const ESPEAK_PROGRAM: &str = "espeak-ng";

fn validate_text(request: &FallbackRequest) -> Result<&str, ProviderError> {
    let text = request.payload.trim();
    if text.is_empty() {
        return Err(ProviderError::Unsupported("empty text".to_string()));
    }
    Ok(text)
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs text-to-speech.
pub struct ElevenLabsSpeech {
    http: reqwest::Client,
    base_url: String,
    model: String,
    voice: String,
}

impl ElevenLabsSpeech {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: ELEVENLABS_DEFAULT_MODEL.to_string(),
            voice: ELEVENLABS_DEFAULT_VOICE.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for ElevenLabsSpeech {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn capability(&self) -> Capability {
        Capability::Tts
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let text = validate_text(request)?;
        let voice = request.params.voice.as_deref().unwrap_or(&self.voice);
        let url = join_url(&self.base_url, &format!("v1/text-to-speech/{}", voice));

        let body = ElevenLabsRequest {
            text,
            model_id: &self.model,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.5,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(Output::Bytes(read_capped(response, MAX_DOWNLOAD_BYTES).await?))
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// OpenAI `/v1/audio/speech` and compatible endpoints (Groq).
pub struct OpenAiSpeech {
    name: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    pub fn new(
        name: impl Into<String>,
        http: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            http,
            base_url: base_url.into(),
            model: model.into(),
            voice: voice.into(),
        }
    }

    pub fn openai(http: reqwest::Client) -> Self {
        Self::new("openai", http, OPENAI_BASE_URL, "tts-1", "alloy")
    }

    pub fn groq(http: reqwest::Client) -> Self {
        Self::new("groq", http, GROQ_BASE_URL, "playai-tts", "Fritz-PlayAI")
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiSpeech {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> Capability {
        Capability::Tts
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let text = validate_text(request)?;
        let body = SpeechRequest {
            model: &self.model,
            voice: request.params.voice.as_deref().unwrap_or(&self.voice),
            input: text,
            response_format: "mp3",
        };

        let response = self
            .http
            .post(join_url(&self.base_url, "v1/audio/speech"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(Output::Bytes(read_capped(response, MAX_DOWNLOAD_BYTES).await?))
    }
}

/// Split text into chunks of at most `max_chars` characters, breaking on
/// whitespace where possible. A limit of zero is treated as one.
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        // Words longer than a whole chunk are cut hard.
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let cut = word
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            chunks.push(word[..cut].to_string());
            word = &word[cut..];
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Keyless speech through the Google Translate TTS endpoint.
pub struct GoogleTranslateSpeech {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleTranslateSpeech {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleTranslateSpeech {
    fn name(&self) -> &str {
        "gtts"
    }

    fn capability(&self) -> Capability {
        Capability::Tts
    }

    async fn invoke(
        &self,
        _secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let text = validate_text(request)?;
        let language = request.params.language.as_deref().unwrap_or("en");
        let url = join_url(&self.base_url, "translate_tts");

        let chunks = split_for_tts(text, GOOGLE_TRANSLATE_MAX_CHARS);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", language),
                    ("q", chunk.as_str()),
                    ("idx", idx.as_str()),
                    ("total", total.as_str()),
                ])
                .send()
                .await?;
            let response = check_status(response).await?;
            // MP3 frames concatenate cleanly.
            audio.extend(read_capped(response, MAX_DOWNLOAD_BYTES).await?);
        }
        Ok(Output::Bytes(audio))
    }
}

/// Offline speech through a local espeak-ng binary writing WAV to stdout.
pub struct EspeakSpeech {
    program: PathBuf,
}

impl EspeakSpeech {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for EspeakSpeech {
    fn default() -> Self {
        Self::new(ESPEAK_PROGRAM)
    }
}

#[async_trait]
impl ProviderAdapter for EspeakSpeech {
    fn name(&self) -> &str {
        "espeak"
    }

    fn capability(&self) -> Capability {
        Capability::Tts
    }

    async fn invoke(
        &self,
        _secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let text = validate_text(request)?;
        let voice = request
            .params
            .language
            .as_deref()
            .unwrap_or("en");

        let output = tokio::process::Command::new(&self.program)
            .arg("--stdout")
            .arg("-s")
            .arg("160")
            .arg("-v")
            .arg(voice)
            // Text starting with '-' must not be read as an option
            .arg("--")
            .arg(text)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProviderError::Api {
                status: 0,
                message: format!(
                    "{} exited with {:?}: {}",
                    self.program.display(),
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(Output::Bytes(output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_text_is_one_chunk() {
        assert_eq!(split_for_tts("hello world", 200), vec!["hello world"]);
    }

    #[test]
    fn test_split_breaks_on_whitespace() {
        let chunks = split_for_tts("aaa bbb ccc ddd", 7);
        assert_eq!(chunks, vec!["aaa bbb", "ccc ddd"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
    }

    #[test]
    fn test_split_cuts_overlong_words() {
        let chunks = split_for_tts("abcdefghij xy", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn test_split_counts_chars_not_bytes() {
        let chunks = split_for_tts("ééé ééé", 3);
        assert_eq!(chunks, vec!["ééé", "ééé"]);
    }

    #[test]
    fn test_split_zero_limit_terminates() {
        assert_eq!(split_for_tts("ab c", 0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_empty_text() {
        assert!(split_for_tts("   ", 10).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_espeak_text_after_end_of_options() {
        // echo prints its argv, so the output shows what espeak would see
        let adapter = EspeakSpeech::new("echo");
        let output = adapter
            .invoke(None, &FallbackRequest::speech("-5 degrees: is that cold?"))
            .await
            .unwrap();
        let argv = String::from_utf8(output.into_bytes()).unwrap();
        assert!(
            argv.trim_end().ends_with(" -- -5 degrees: is that cold?"),
            "{}",
            argv
        );
    }

    #[tokio::test]
    async fn test_espeak_missing_binary_is_permanent() {
        let adapter = EspeakSpeech::new("/nonexistent/espeak-binary");
        let result = adapter
            .invoke(None, &FallbackRequest::speech("hello"))
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), crate::fallback::ErrorKind::Permanent);
    }
}
