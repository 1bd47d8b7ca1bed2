//! [`LlmProvider`] over an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use exponential_backoff::Backoff;
use pipeline::{ChatMessage, LlmError, LlmProvider, ModelSettings, RetryPolicy};
use reqwest::header::{HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::cache::ResponseCache;
use crate::OpenAiConfig;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extracts the first choice's text from a successful response body.
fn parse_completion(body: &str) -> Result<String, LlmError> {
    let response: CompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::MalformedResponse {
            message: e.to_string(),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::MalformedResponse {
            message: "response contained no message content".to_owned(),
        })
}

/// Maps a non-success status and body to an [`LlmError`].
fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> LlmError {
    if status == 429 {
        return LlmError::RateLimited { retry_after };
    }

    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_owned());

    LlmError::Api { status, message }
}

/// Reads a delay-seconds `Retry-After` header. HTTP-date values are ignored.
fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    value?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport {
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Chat completion client for OpenAI and API-compatible servers.
///
/// Cheap to share behind an `Arc`: the underlying `reqwest::Client` pools
/// connections and the response cache is internally synchronised.
#[derive(Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
    backoff: Backoff,
    cache: Option<ResponseCache>,
}

impl OpenAiProvider {
    /// Builds the HTTP client. Fails only if the TLS backend cannot be initialised.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let backoff = Backoff::new(
            config.max_retries,
            config.initial_backoff,
            Some(config.max_backoff),
        );
        let cache = config
            .settings
            .cache
            .then(|| ResponseCache::new(config.cache_capacity));

        tracing::debug!(
            model = %config.settings.model,
            base_url = %config.base_url,
            cache = config.settings.cache,
            "created OpenAI provider"
        );

        Ok(Self {
            client,
            config,
            backoff,
            cache,
        })
    }

    /// The configuration this provider was built from.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: self.config.settings.model.as_str(),
            messages,
            temperature: self.config.settings.temperature,
        };

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), retry_after, &body));
        }
        parse_completion(&body)
    }

    /// Delay before retry number `attempt` (zero-based), or `None` when the
    /// failure must be surfaced.
    ///
    /// A server-requested delay wins but is capped at `max_backoff`; otherwise
    /// the exponential back-off decides.
    fn retry_delay(&self, attempt: u32, policy: &RetryPolicy) -> Option<Duration> {
        let RetryPolicy::Retryable { after } = policy else {
            return None;
        };
        if attempt >= self.config.max_retries {
            return None;
        }
        let delay = self.backoff.next(attempt)?;
        Some((*after).map_or(delay, |after| after.min(self.config.max_backoff)))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn settings(&self) -> &ModelSettings {
        &self.config.settings
    }

    async fn predict(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        if let Some(hit) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(&self.config.settings, messages))
        {
            tracing::debug!("chat completion served from cache");
            return Ok(hit);
        }

        let mut attempt = 0;
        let text = loop {
            match self.send_once(messages).await {
                Ok(text) => break text,
                Err(err) => {
                    let Some(delay) = self.retry_delay(attempt, &err.retry_policy()) else {
                        tracing::warn!(attempt, error = %err, "chat completion failed");
                        return Err(err);
                    };
                    tracing::info!(attempt, ?delay, error = %err, "retrying chat completion");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        if let Some(cache) = &self.cache {
            cache.insert(&self.config.settings, messages, text.clone());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use pipeline::ModelName;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    fn provider_at(base_url: &str, cache: bool, max_retries: u32) -> OpenAiProvider {
        let settings =
            ModelSettings::new(ModelName::from_static("gpt-3.5-turbo")).with_cache(cache);
        let mut config = OpenAiConfig::new("sk-test", settings);
        config.base_url = base_url.to_owned();
        config.max_retries = max_retries;
        config.initial_backoff = Duration::from_millis(1);
        config.max_backoff = Duration::from_millis(20);
        OpenAiProvider::new(config).unwrap()
    }

    fn provider(cache: bool, max_retries: u32) -> OpenAiProvider {
        // Nothing listens on the discard port; any real request fails fast.
        provider_at("http://127.0.0.1:9/v1", cache, max_retries)
    }

    /// One HTTP response written back by [`CannedServer`].
    struct Canned {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    }

    impl Canned {
        fn completion(text: &str) -> Self {
            Self::status(
                200,
                json!({ "choices": [{ "message": { "role": "assistant", "content": text } }] })
                    .to_string(),
            )
        }

        fn status(status: u16, body: impl Into<String>) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: body.into(),
            }
        }

        fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
            self.headers.push((name, value.into()));
            self
        }

        fn to_http(&self) -> String {
            let mut head = format!(
                "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                self.status,
                self.body.len()
            );
            for (name, value) in &self.headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            format!("{head}\r\n{}", self.body)
        }
    }

    /// Local HTTP server answering one connection per canned response, in
    /// order. Connections are refused once the responses run out.
    struct CannedServer {
        base_url: String,
        requests: Arc<AtomicUsize>,
    }

    impl CannedServer {
        async fn start(responses: Vec<Canned>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(AtomicUsize::new(0));

            let counter = requests.clone();
            tokio::spawn(async move {
                for canned in responses {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        return;
                    };
                    read_request(&mut stream).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = stream.write_all(canned.to_http().as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });

            Self {
                base_url: format!("http://{addr}/v1"),
                requests,
            }
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    /// Reads one request: headers, then `content-length` bytes of body.
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }

    #[test]
    fn test_request_body_shape() {
        let messages = [ChatMessage::system("sys"), ChatMessage::user("hi")];
        let request = CompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.0,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "hi" }
                ],
                "temperature": 0.0
            })
        );
    }

    #[test]
    fn test_parse_completion_takes_first_choice() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "Hello!" } },
                { "index": 1, "message": { "role": "assistant", "content": "Other" } }
            ]
        })
        .to_string();

        assert_eq!(parse_completion(&body).unwrap(), "Hello!");
    }

    #[test]
    fn test_parse_completion_rejects_empty_or_garbled_bodies() {
        assert!(matches!(
            parse_completion(r#"{"choices": []}"#),
            Err(LlmError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_completion(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(LlmError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_completion("<html>gateway</html>"),
            Err(LlmError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(429, Some(Duration::from_secs(2)), ""),
            LlmError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert_eq!(
            classify_status(401, None, r#"{"error": {"message": "Incorrect API key"}}"#),
            LlmError::Api {
                status: 401,
                message: "Incorrect API key".into()
            }
        );
        assert_eq!(
            classify_status(502, None, " bad gateway \n"),
            LlmError::Api {
                status: 502,
                message: "bad gateway".into()
            }
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            parse_retry_after(Some(&HeaderValue::from_static("7"))),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            parse_retry_after(Some(&HeaderValue::from_static(
                "Wed, 21 Oct 2015 07:28:00 GMT"
            ))),
            None
        );
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let provider = provider(false, 3);
        let max = provider.config.max_backoff;
        let retry = RetryPolicy::Retryable { after: None };

        for attempt in 0..3 {
            let delay = provider.retry_delay(attempt, &retry).unwrap();
            assert!(delay <= max, "attempt {attempt}: {delay:?}");
        }
        assert_eq!(provider.retry_delay(3, &retry), None);
        assert_eq!(provider.retry_delay(0, &RetryPolicy::NonRetryable), None);
    }

    #[test]
    fn test_server_retry_after_is_capped_at_max_backoff() {
        let provider = provider(false, 3);
        let day = RetryPolicy::Retryable {
            after: Some(Duration::from_secs(86_400)),
        };
        let brief = RetryPolicy::Retryable {
            after: Some(Duration::from_millis(5)),
        };

        assert_eq!(provider.retry_delay(0, &day), Some(provider.config.max_backoff));
        assert_eq!(provider.retry_delay(0, &brief), Some(Duration::from_millis(5)));
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried_until_success() {
        let server = CannedServer::start(vec![
            Canned::status(503, r#"{"error": {"message": "overloaded"}}"#),
            Canned::status(429, ""),
            Canned::completion("hello"),
        ])
        .await;
        let provider = provider_at(&server.base_url, false, 2);

        let text = provider.predict(&[ChatMessage::user("hi")]).await.unwrap();

        assert_eq!(text, "hello");
        assert_eq!(server.requests(), 3);
    }

    #[tokio::test]
    async fn test_long_retry_after_does_not_stall_the_call() {
        let server = CannedServer::start(vec![
            Canned::status(429, "").header("retry-after", "86400"),
            Canned::completion("hello"),
        ])
        .await;
        let provider = provider_at(&server.base_url, false, 1);

        let text = tokio::time::timeout(
            Duration::from_secs(5),
            provider.predict(&[ChatMessage::user("hi")]),
        )
        .await
        .expect("retry delay was not capped")
        .unwrap();

        assert_eq!(text, "hello");
        assert_eq!(server.requests(), 2);
    }

    #[tokio::test]
    async fn test_retries_stop_after_max_retries() {
        let server = CannedServer::start(vec![
            Canned::status(503, "busy"),
            Canned::status(503, "busy"),
            Canned::status(503, "busy"),
            Canned::completion("too late"),
        ])
        .await;
        let provider = provider_at(&server.base_url, false, 2);

        let err = provider.predict(&[ChatMessage::user("hi")]).await.unwrap_err();

        assert_eq!(
            err,
            LlmError::Api {
                status: 503,
                message: "busy".into()
            }
        );
        assert_eq!(server.requests(), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = CannedServer::start(vec![
            Canned::status(400, r#"{"error": {"message": "bad model"}}"#),
            Canned::completion("unreachable"),
        ])
        .await;
        let provider = provider_at(&server.base_url, false, 3);

        let err = provider.predict(&[ChatMessage::user("hi")]).await.unwrap_err();

        assert_eq!(
            err,
            LlmError::Api {
                status: 400,
                message: "bad model".into()
            }
        );
        assert_eq!(server.requests(), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let server = CannedServer::start(vec![
            Canned::status(200, "<html>gateway</html>"),
            Canned::completion("unreachable"),
        ])
        .await;
        let provider = provider_at(&server.base_url, false, 3);

        let err = provider.predict(&[ChatMessage::user("hi")]).await.unwrap_err();

        assert!(matches!(err, LlmError::MalformedResponse { .. }), "{err:?}");
        assert_eq!(server.requests(), 1);
    }

    #[tokio::test]
    async fn test_success_fills_the_cache() {
        let server = CannedServer::start(vec![Canned::completion("hello")]).await;
        let provider = provider_at(&server.base_url, true, 0);
        let prompt = [ChatMessage::user("hi")];

        assert_eq!(provider.predict(&prompt).await.unwrap(), "hello");
        assert_eq!(provider.predict(&prompt).await.unwrap(), "hello");

        assert_eq!(server.requests(), 1);
        assert_eq!(provider.cache.as_ref().map(ResponseCache::len), Some(1));
    }

    #[tokio::test]
    async fn test_cached_prompt_skips_the_network() {
        let provider = provider(true, 0);
        let prompt = [ChatMessage::user("hi")];
        provider
            .cache
            .as_ref()
            .unwrap()
            .insert(&provider.config.settings, &prompt, "cached hello".into());

        assert_eq!(provider.predict(&prompt).await.unwrap(), "cached hello");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_transport_failure() {
        let provider = provider(false, 0);
        assert!(provider.cache.is_none());

        let err = provider.predict(&[ChatMessage::user("hi")]).await.unwrap_err();

        assert!(err.retry_policy().is_retryable(), "{err:?}");
    }
}
