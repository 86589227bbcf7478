//! Request and result types passed through the resolver.

use super::capability::Capability;
use super::error::ErrorKind;

/// Output dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Dimensions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("Invalid dimensions '{}'. Use WIDTHxHEIGHT (e.g., 1080x1920)", s))?;
        let width: u32 = w
            .parse()
            .map_err(|_| format!("Invalid width '{}' in dimensions", w))?;
        let height: u32 = h
            .parse()
            .map_err(|_| format!("Invalid height '{}' in dimensions", h))?;
        if width == 0 || height == 0 {
            return Err("Width and height must be greater than 0".to_string());
        }
        Ok(Self { width, height })
    }
}

/// Optional per-capability parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RequestParams {
    /// Voice identifier (tts)
    pub voice: Option<String>,
    /// Language code such as "en" (tts)
    pub language: Option<String>,
    /// Desired output size (image capabilities)
    pub dimensions: Option<Dimensions>,
    /// Upper bound on generated tokens (text-generate)
    pub max_tokens: Option<u32>,
}

/// A capability request with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FallbackRequest {
    pub capability: Capability,
    /// Text to speak, prompt to generate from, or query to search for
    pub payload: String,
    pub params: RequestParams,
}

impl FallbackRequest {
    pub fn new(capability: Capability, payload: impl Into<String>) -> Self {
        Self {
            capability,
            payload: payload.into(),
            params: RequestParams::default(),
        }
    }

    pub fn speech(text: impl Into<String>) -> Self {
        Self::new(Capability::Tts, text)
    }

    pub fn image_search(query: impl Into<String>) -> Self {
        Self::new(Capability::ImageSearch, query)
    }

    pub fn image_generate(prompt: impl Into<String>) -> Self {
        Self::new(Capability::ImageGenerate, prompt)
    }

    pub fn text(prompt: impl Into<String>) -> Self {
        Self::new(Capability::TextGenerate, prompt)
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.params.voice = Some(voice.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.params.language = Some(language.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.params.dimensions = Some(dimensions);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = Some(max_tokens);
        self
    }

    /// Stable key covering everything that affects the output.
    pub fn cache_key(&self) -> String {
        let p = &self.params;
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.capability,
            self.payload,
            p.voice.as_deref().unwrap_or(""),
            p.language.as_deref().unwrap_or(""),
            p.dimensions.map(|d| d.to_string()).unwrap_or_default(),
            p.max_tokens.map(|t| t.to_string()).unwrap_or_default(),
        )
    }
}

/// What a provider produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Bytes(Vec<u8>),
    Text(String),
}

impl Output {
    /// Empty byte payloads and blank text count as no result.
    pub fn is_empty(&self) -> bool {
        match self {
            Output::Bytes(b) => b.is_empty(),
            Output::Text(t) => t.trim().is_empty(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Output::Bytes(b) => b,
            Output::Text(t) => t.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Output::Bytes(b) => b,
            Output::Text(t) => t.into_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Output::Text(t) => Some(t),
            Output::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }
}

/// One failed adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub provider: String,
    /// Name of the credential slot that was used
    pub credential: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.provider, self.credential, self.kind, self.message
        )
    }
}

/// Why a provider was passed over without being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No adapter serves this capability under that name.
    NoAdapter,
    /// No credential slot is set.
    NoCredentials,
    /// Every set slot has been blacklisted this run.
    AllFailed,
    /// Remaining slots are waiting out a transient failure.
    CoolingDown,
}

/// A provider that was not invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub provider: String,
    pub reason: SkipReason,
}

/// A successful resolve call.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub output: Output,
    /// Provider that produced the output
    pub provider: String,
    /// Credential slot that produced the output
    pub credential: String,
    /// Failed invocations before the successful one
    pub attempts: Vec<Attempt>,
    pub skipped: Vec<Skip>,
}

impl Resolved {
    pub fn attempted_providers(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_parse() {
        let d: Dimensions = "1080x1920".parse().unwrap();
        assert_eq!(d, Dimensions::new(1080, 1920));
        assert!(d.is_portrait());
        assert_eq!(d.to_string(), "1080x1920");
    }

    #[test]
    fn test_dimensions_parse_rejects_garbage() {
        assert!("1080".parse::<Dimensions>().is_err());
        assert!("0x100".parse::<Dimensions>().is_err());
        assert!("ax100".parse::<Dimensions>().is_err());
    }

    #[test]
    fn test_cache_key_depends_on_params() {
        let plain = FallbackRequest::speech("hello");
        let voiced = FallbackRequest::speech("hello").with_voice("Rachel");
        assert_ne!(plain.cache_key(), voiced.cache_key());
        assert_eq!(plain.cache_key(), FallbackRequest::speech("hello").cache_key());
    }

    #[test]
    fn test_cache_key_depends_on_capability() {
        let a = FallbackRequest::image_search("ocean");
        let b = FallbackRequest::image_generate("ocean");
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_output_emptiness() {
        assert!(Output::Bytes(Vec::new()).is_empty());
        assert!(Output::Text("  \n".to_string()).is_empty());
        assert!(!Output::Text("ok".to_string()).is_empty());
        assert_eq!(Output::Bytes(vec![1, 2, 3]).len(), 3);
    }
}
