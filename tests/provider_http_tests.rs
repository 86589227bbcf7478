//! Provider adapters against mock HTTP servers.

use base64::Engine;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shorts_relay::fallback::{
    Dimensions, ErrorKind, FallbackRequest, Output, ProviderAdapter, ProviderError, Secret,
};
use shorts_relay::providers::image::{
    GetImgGenerate, OpenAiImageGenerate, PexelsSearch, PixabaySearch, UnsplashSearch,
};
use shorts_relay::providers::speech::{ElevenLabsSpeech, GoogleTranslateSpeech, OpenAiSpeech};
use shorts_relay::providers::text::{GeminiText, OpenAiChat};
use shorts_relay::providers::build_client;

fn http() -> reqwest::Client {
    build_client().unwrap()
}

fn key() -> Secret {
    Secret::new("test-key")
}

// === Error classification ===

mod status_mapping {
    use super::*;

    async fn speak_against(template: ResponseTemplate) -> ProviderError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .respond_with(template)
            .mount(&server)
            .await;

        let adapter = OpenAiSpeech::new("openai", http(), server.uri(), "tts-1", "alloy");
        adapter
            .invoke(Some(&key()), &FallbackRequest::speech("hello"))
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_429_is_rate_limited_with_retry_after() {
        let err = speak_against(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "17")
                .set_body_string("quota exceeded"),
        )
        .await;
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after_secs(), Some(17));
    }

    #[tokio::test]
    async fn test_401_is_auth() {
        let err = speak_against(ResponseTemplate::new(401).set_body_string("bad key")).await;
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_5xx_is_transient() {
        let err = speak_against(ResponseTemplate::new(502)).await;
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_content_policy_is_rejected() {
        let err = speak_against(
            ResponseTemplate::new(400).set_body_string("input flagged by content policy"),
        )
        .await;
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_403_content_policy_is_rejected() {
        let err = speak_against(
            ResponseTemplate::new(403).set_body_string("prompt blocked by safety system"),
        )
        .await;
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_403_blocked_key_is_auth() {
        let err = speak_against(ResponseTemplate::new(403).set_body_string("API key blocked")).await;
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_other_4xx_is_permanent() {
        let err = speak_against(ResponseTemplate::new(404).set_body_string("no such model")).await;
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_missing_secret_is_auth() {
        let adapter = OpenAiSpeech::openai(http());
        let err = adapter
            .invoke(None, &FallbackRequest::speech("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}

// === Speech ===

mod speech {
    use super::*;

    #[tokio::test]
    async fn test_elevenlabs_sends_key_and_returns_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/custom-voice"))
            .and(header("xi-api-key", "test-key"))
            .and(body_partial_json(json!({"text": "hello there"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3mp3".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = ElevenLabsSpeech::new(http(), server.uri());
        let output = adapter
            .invoke(
                Some(&key()),
                &FallbackRequest::speech("hello there").with_voice("custom-voice"),
            )
            .await
            .unwrap();
        assert_eq!(output, Output::Bytes(b"ID3mp3".to_vec()));
    }

    #[tokio::test]
    async fn test_openai_speech_uses_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "playai-tts", "input": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenAiSpeech::new("groq", http(), server.uri(), "playai-tts", "Fritz-PlayAI");
        assert_eq!(adapter.name(), "groq");
        let output = adapter
            .invoke(Some(&key()), &FallbackRequest::speech("hi"))
            .await
            .unwrap();
        assert_eq!(output.len(), 3);
    }

    #[tokio::test]
    async fn test_gtts_chunks_long_text_and_concatenates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("client", "tw-ob"))
            .and(query_param("tl", "de"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ab".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let text = "wort ".repeat(60);
        let adapter = GoogleTranslateSpeech::new(http(), server.uri());
        let output = adapter
            .invoke(None, &FallbackRequest::speech(text).with_language("de"))
            .await
            .unwrap();
        assert_eq!(output, Output::Bytes(b"abab".to_vec()));
    }
}

// === Image search ===

mod image_search {
    use super::*;

    #[tokio::test]
    async fn test_pexels_downloads_best_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(header("Authorization", "test-key"))
            .and(query_param("query", "ocean"))
            .and(query_param("orientation", "portrait"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "photos": [{"src": {
                    "large2x": format!("{}/img/large2x.jpg", server.uri()),
                    "original": format!("{}/img/original.jpg", server.uri())
                }}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/large2x.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\xff\xd8jpeg".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = PexelsSearch::new(http(), server.uri());
        let request =
            FallbackRequest::image_search("ocean").with_dimensions(Dimensions::new(1080, 1920));
        let output = adapter.invoke(Some(&key()), &request).await.unwrap();
        assert_eq!(output, Output::Bytes(b"\xff\xd8jpeg".to_vec()));
    }

    #[tokio::test]
    async fn test_pexels_no_photos_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"photos": []})))
            .mount(&server)
            .await;

        let adapter = PexelsSearch::new(http(), server.uri());
        let err = adapter
            .invoke(Some(&key()), &FallbackRequest::image_search("nothing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Empty);
    }

    #[tokio::test]
    async fn test_pixabay_passes_key_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/"))
            .and(query_param("key", "test-key"))
            .and(query_param("q", "forest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [{"largeImageURL": format!("{}/full.jpg", server.uri())}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/full.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7; 16]))
            .mount(&server)
            .await;

        let adapter = PixabaySearch::new(http(), server.uri());
        let output = adapter
            .invoke(Some(&key()), &FallbackRequest::image_search("forest"))
            .await
            .unwrap();
        assert_eq!(output.len(), 16);
    }

    #[tokio::test]
    async fn test_unsplash_empty_download_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/photos"))
            .and(header("Authorization", "Client-ID test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"urls": {"regular": format!("{}/photo", server.uri())}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/photo"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let adapter = UnsplashSearch::new(http(), server.uri());
        let err = adapter
            .invoke(Some(&key()), &FallbackRequest::image_search("mountains"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResult));
    }
}

// === Image generation ===

mod image_generate {
    use super::*;

    #[tokio::test]
    async fn test_getimg_decodes_base64() {
        let server = MockServer::start().await;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"\x89PNGdata");
        Mock::given(method("POST"))
            .and(path("/v1/stable-diffusion/text-to-image"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"width": 1080, "height": 1920})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"image": encoded})))
            .mount(&server)
            .await;

        let adapter = GetImgGenerate::new(http(), server.uri());
        let output = adapter
            .invoke(Some(&key()), &FallbackRequest::image_generate("a red fox"))
            .await
            .unwrap();
        assert_eq!(output, Output::Bytes(b"\x89PNGdata".to_vec()));
    }

    #[tokio::test]
    async fn test_openai_image_requests_portrait_size() {
        let server = MockServer::start().await;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"img");
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(body_partial_json(json!({"size": "1024x1792", "response_format": "b64_json"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"b64_json": encoded}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenAiImageGenerate::new(http(), server.uri(), "dall-e-3");
        let request =
            FallbackRequest::image_generate("tower").with_dimensions(Dimensions::new(1080, 1920));
        let output = adapter.invoke(Some(&key()), &request).await.unwrap();
        assert_eq!(output.as_bytes(), b"img");
    }

    #[tokio::test]
    async fn test_openai_image_invalid_base64_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"b64_json": "%%% not base64 %%%"}]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiImageGenerate::new(http(), server.uri(), "dall-e-3");
        let err = adapter
            .invoke(Some(&key()), &FallbackRequest::image_generate("tower"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}

// === Text ===

mod text {
    use super::*;

    #[tokio::test]
    async fn test_gemini_joins_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 64}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Which planet "},
                    {"text": "is largest?\n"}
                ]}}]
            })))
            .mount(&server)
            .await;

        let adapter = GeminiText::new(http(), server.uri(), "gemini-1.5-flash");
        let output = adapter
            .invoke(Some(&key()), &FallbackRequest::text("ask").with_max_tokens(64))
            .await
            .unwrap();
        assert_eq!(output, Output::Text("Which planet is largest?".to_string()));
    }

    #[tokio::test]
    async fn test_chat_completion_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "gpt-3.5-turbo", "max_tokens": 150})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  Why is the sky blue? "}}]
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiChat::new("openai", http(), server.uri(), "gpt-3.5-turbo");
        let output = adapter
            .invoke(Some(&key()), &FallbackRequest::text("ask"))
            .await
            .unwrap();
        assert_eq!(output.as_text(), Some("Why is the sky blue?"));
    }

    #[tokio::test]
    async fn test_chat_without_choices_is_blank() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let adapter = OpenAiChat::new("openrouter", http(), server.uri(), "anthropic/claude-3-haiku");
        let output = adapter
            .invoke(Some(&key()), &FallbackRequest::text("ask"))
            .await
            .unwrap();
        // The resolver turns blank text into an empty result
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let adapter = OpenAiChat::new("groq", http(), server.uri(), "llama-3.1-8b-instant");
        let err = adapter
            .invoke(Some(&key()), &FallbackRequest::text("ask"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}
