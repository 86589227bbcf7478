//! Image search and image generation adapters.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::http::{check_status, download, join_url, require_secret};
use crate::fallback::{
    Capability, Dimensions, FallbackRequest, Output, ProviderAdapter, ProviderError, Secret,
};

pub const PEXELS_BASE_URL: &str = "https://api.pexels.com";
pub const PIXABAY_BASE_URL: &str = "https://pixabay.com";
pub const UNSPLASH_BASE_URL: &str = "https://api.unsplash.com";
pub const GETIMG_BASE_URL: &str = "https://api.getimg.ai";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Extensions the local adapter will serve.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

fn validate_query(request: &FallbackRequest) -> Result<&str, ProviderError> {
    let query = request.payload.trim();
    if query.is_empty() {
        return Err(ProviderError::Unsupported("empty query".to_string()));
    }
    Ok(query)
}

/// Portrait unless the caller asked for something wider than tall.
fn wants_portrait(request: &FallbackRequest) -> bool {
    request
        .params
        .dimensions
        .map(|d| d.is_portrait())
        .unwrap_or(true)
}

// === Pexels ===

#[derive(Debug, Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsSrc,
}

#[derive(Debug, Deserialize)]
struct PexelsSrc {
    #[serde(default)]
    large2x: Option<String>,
    #[serde(default)]
    large: Option<String>,
    original: String,
}

/// Pexels photo search.
pub struct PexelsSearch {
    http: reqwest::Client,
    base_url: String,
}

impl PexelsSearch {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for PexelsSearch {
    fn name(&self) -> &str {
        "pexels"
    }

    fn capability(&self) -> Capability {
        Capability::ImageSearch
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let query = validate_query(request)?;
        let orientation = if wants_portrait(request) {
            "portrait"
        } else {
            "landscape"
        };

        let response = self
            .http
            .get(join_url(&self.base_url, "v1/search"))
            .header("Authorization", key)
            .query(&[("query", query), ("per_page", "10"), ("orientation", orientation)])
            .send()
            .await?;
        let body: PexelsResponse = check_status(response).await?.json().await?;

        let photo = body.photos.into_iter().next().ok_or(ProviderError::EmptyResult)?;
        let url = photo.src.large2x.or(photo.src.large).unwrap_or(photo.src.original);
        Ok(Output::Bytes(download(&self.http, &url).await?))
    }
}

// === Pixabay ===

#[derive(Debug, Deserialize)]
struct PixabayResponse {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Debug, Deserialize)]
struct PixabayHit {
    #[serde(rename = "largeImageURL")]
    large_image_url: String,
}

/// Pixabay image search. The key travels as a query parameter.
pub struct PixabaySearch {
    http: reqwest::Client,
    base_url: String,
}

impl PixabaySearch {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for PixabaySearch {
    fn name(&self) -> &str {
        "pixabay"
    }

    fn capability(&self) -> Capability {
        Capability::ImageSearch
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let query = validate_query(request)?;
        let orientation = if wants_portrait(request) {
            "vertical"
        } else {
            "horizontal"
        };

        let response = self
            .http
            .get(join_url(&self.base_url, "api/"))
            .query(&[
                ("key", key),
                ("q", query),
                ("image_type", "photo"),
                ("orientation", orientation),
                ("per_page", "20"),
            ])
            .send()
            .await?;
        let body: PixabayResponse = check_status(response).await?.json().await?;

        let hit = body.hits.into_iter().next().ok_or(ProviderError::EmptyResult)?;
        Ok(Output::Bytes(download(&self.http, &hit.large_image_url).await?))
    }
}

// === Unsplash ===

#[derive(Debug, Deserialize)]
struct UnsplashResponse {
    #[serde(default)]
    results: Vec<UnsplashPhoto>,
}

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
}

#[derive(Debug, Deserialize)]
struct UnsplashUrls {
    regular: String,
}

/// Unsplash photo search.
pub struct UnsplashSearch {
    http: reqwest::Client,
    base_url: String,
}

impl UnsplashSearch {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for UnsplashSearch {
    fn name(&self) -> &str {
        "unsplash"
    }

    fn capability(&self) -> Capability {
        Capability::ImageSearch
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let query = validate_query(request)?;
        let orientation = if wants_portrait(request) {
            "portrait"
        } else {
            "landscape"
        };

        let response = self
            .http
            .get(join_url(&self.base_url, "search/photos"))
            .header("Authorization", format!("Client-ID {}", key))
            .query(&[("query", query), ("orientation", orientation), ("per_page", "10")])
            .send()
            .await?;
        let body: UnsplashResponse = check_status(response).await?.json().await?;

        let photo = body.results.into_iter().next().ok_or(ProviderError::EmptyResult)?;
        Ok(Output::Bytes(download(&self.http, &photo.urls.regular).await?))
    }
}

// === Local backgrounds ===

/// Images in `dir` with a known extension, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Index into a list of `len` items picked from the query, so the same query
/// always maps to the same image.
pub fn pick_index(query: &str, len: usize) -> usize {
    let digest = Sha256::digest(query.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % len as u64) as usize
}

/// Serves a background from a local directory of images.
pub struct LocalImages {
    dir: PathBuf,
}

impl LocalImages {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ProviderAdapter for LocalImages {
    fn name(&self) -> &str {
        "local"
    }

    fn capability(&self) -> Capability {
        Capability::ImageSearch
    }

    async fn invoke(
        &self,
        _secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let images = list_images(&self.dir)?;
        if images.is_empty() {
            return Err(ProviderError::EmptyResult);
        }
        let path = &images[pick_index(&request.payload, images.len())];
        log::debug!("Using local background {}", path.display());
        Ok(Output::Bytes(tokio::fs::read(path).await?))
    }
}

// === GetIMG ===

#[derive(Debug, Serialize)]
struct GetImgRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    guidance: f32,
    output_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GetImgResponse {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// GetIMG stable-diffusion text-to-image.
pub struct GetImgGenerate {
    http: reqwest::Client,
    base_url: String,
}

impl GetImgGenerate {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GetImgGenerate {
    fn name(&self) -> &str {
        "getimg"
    }

    fn capability(&self) -> Capability {
        Capability::ImageGenerate
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let prompt = validate_query(request)?;
        let dims = request
            .params
            .dimensions
            .unwrap_or(Dimensions::new(1080, 1920));

        let body = GetImgRequest {
            prompt,
            width: dims.width,
            height: dims.height,
            steps: 25,
            guidance: 7.5,
            output_format: "jpeg",
        };

        let response = self
            .http
            .post(join_url(&self.base_url, "v1/stable-diffusion/text-to-image"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let body: GetImgResponse = check_status(response).await?.json().await?;

        if let Some(encoded) = body.image {
            return decode_base64_image(&encoded);
        }
        match body.url {
            Some(url) => Ok(Output::Bytes(download(&self.http, &url).await?)),
            None => Err(ProviderError::EmptyResult),
        }
    }
}

fn decode_base64_image(encoded: &str) -> Result<Output, ProviderError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map(Output::Bytes)
        .map_err(|e| ProviderError::Malformed(format!("invalid base64 image: {}", e)))
}

// === OpenAI images ===

#[derive(Debug, Serialize)]
struct OpenAiImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u32,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    #[serde(default)]
    data: Vec<OpenAiImage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImage {
    #[serde(default)]
    b64_json: Option<String>,
}

/// Nearest size the images endpoint accepts for the requested shape.
pub fn openai_image_size(dimensions: Option<Dimensions>) -> &'static str {
    match dimensions {
        Some(d) if d.width == d.height => "1024x1024",
        Some(d) if d.width > d.height => "1792x1024",
        _ => "1024x1792",
    }
}

pub const OPENAI_DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// OpenAI `/v1/images/generations`.
pub struct OpenAiImageGenerate {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiImageGenerate {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiImageGenerate {
    fn name(&self) -> &str {
        "openai"
    }

    fn capability(&self) -> Capability {
        Capability::ImageGenerate
    }

    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError> {
        let key = require_secret(secret)?;
        let prompt = validate_query(request)?;
        let body = OpenAiImageRequest {
            model: &self.model,
            prompt,
            size: openai_image_size(request.params.dimensions),
            n: 1,
            response_format: "b64_json",
        };

        let response = self
            .http
            .post(join_url(&self.base_url, "v1/images/generations"))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let body: OpenAiImageResponse = check_status(response).await?.json().await?;

        let encoded = body
            .data
            .into_iter()
            .find_map(|img| img.b64_json)
            .ok_or(ProviderError::EmptyResult)?;
        decode_base64_image(&encoded)
    }
}
