use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use uuid::Uuid;

use super::error::TransportError;
use super::types::{Attachment, FeedbackInput, JobInput, PollSource, RawResponse};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// One network round trip per call, no retries. Implementations return
/// whatever response they received; interpreting it is the mapper's job.
pub trait Transport: Send + Sync + 'static {
    fn submit(
        &self,
        input: &JobInput,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;

    fn poll(
        &self,
        job_id: &str,
        source: PollSource,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;

    fn feedback(
        &self,
        input: &FeedbackInput,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// Supplies the bearer credential for each outgoing request.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn bearer_token(&self) -> Option<String> {
        self()
    }
}

/// A fixed token; an empty string means "send no credential".
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.clone())
    }
}

/// Endpoint root and per-call deadlines for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Deadline for a single poll.
    pub poll_timeout: Duration,
    /// Deadline for submissions and feedback, which upload files.
    pub submit_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(60),
        }
    }
}

/// [`Transport`] over HTTP using `reqwest`.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
    poll_timeout: Duration,
    submit_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        options: HttpOptions,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, TransportError> {
        let base_url = Url::parse(&options.base_url).map_err(|e| {
            TransportError::Encode(format!("invalid base url {}: {e}", options.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Encode(format!(
                "base url {} cannot carry a path",
                options.base_url
            )));
        }
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url,
            tokens,
            poll_timeout: options.poll_timeout,
            submit_timeout: options.submit_timeout,
        })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn tokens(&self) -> Arc<dyn TokenProvider> {
        Arc::clone(&self.tokens)
    }

    /// Resolve `segments` below the base URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                TransportError::Encode(format!("base url {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<RawResponse, TransportError> {
        let request_id = Uuid::new_v4().to_string();
        let mut request = request.header("x-request-id", &request_id);
        if let Some(token) = self.tokens.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(operation, %request_id, error = %e, "Request to backend failed");
                return Err(e.into());
            }
        };
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(operation, %request_id, status, "Backend responded");
        Ok(RawResponse { status, body })
    }
}

impl Transport for HttpTransport {
    async fn submit(&self, input: &JobInput) -> Result<RawResponse, TransportError> {
        let settings = serde_json::to_string(&input.settings)
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        let mut form = Form::new()
            .text("question", input.content.clone())
            .text("settings", settings);
        if let Some(user_id) = &input.user_id {
            form = form.text("user_id", user_id.clone());
        }
        let form = attach_images(form, &input.attachments)?;

        let request = self
            .client
            .post(self.endpoint(&["process"])?)
            .multipart(form)
            .timeout(self.submit_timeout);
        self.execute("submit", request).await
    }

    async fn poll(&self, job_id: &str, source: PollSource) -> Result<RawResponse, TransportError> {
        let url = match source {
            PollSource::ProcessResult => self.endpoint(&["process", "result", job_id])?,
            PollSource::ThreadState => self.endpoint(&["state", job_id])?,
        };
        let request = self.client.get(url).timeout(self.poll_timeout);
        self.execute("poll", request).await
    }

    async fn feedback(&self, input: &FeedbackInput) -> Result<RawResponse, TransportError> {
        let mut form = Form::new()
            .text("thread_id", input.job_id.clone())
            .text("message", input.message.clone())
            .text("question", input.content.clone());
        if let Some(user_id) = &input.user_id {
            form = form.text("user_id", user_id.clone());
        }
        let form = attach_images(form, &input.attachments)?;

        let request = self
            .client
            .post(self.endpoint(&["process"])?)
            .multipart(form)
            .timeout(self.submit_timeout);
        self.execute("feedback", request).await
    }
}

fn attach_images(form: Form, attachments: &[Attachment]) -> Result<Form, TransportError> {
    attachments.iter().try_fold(form, |form, attachment| -> Result<Form, TransportError> {
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)?;
        Ok(form.part("images", part))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::GenerationSettings;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer, token: &str) -> HttpTransport {
        let options = HttpOptions {
            base_url: format!("{}/api", server.uri()),
            poll_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        HttpTransport::new(options, Arc::new(StaticToken(token.into()))).unwrap()
    }

    #[tokio::test]
    async fn submit_posts_multipart_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/process"))
            .and(header("authorization", "Bearer tok-1"))
            .and(header_exists("x-request-id"))
            .and(body_string_contains("name=\"question\""))
            .and(body_string_contains("Explain X"))
            .and(body_string_contains("enableHITL"))
            .and(body_string_contains("name=\"user_id\""))
            .respond_with(ResponseTemplate::new(202).set_body_string(r#"{"thread_id":"abc"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server, "tok-1");
        let input = JobInput::new("Explain X", GenerationSettings::default()).with_user("u-7");
        let raw = transport.submit(&input).await.unwrap();
        assert_eq!(raw.status, 202);
        assert_eq!(raw.body, r#"{"thread_id":"abc"}"#);
    }

    #[tokio::test]
    async fn feedback_sends_thread_and_images() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/process"))
            .and(body_string_contains("name=\"thread_id\""))
            .and(body_string_contains("confirmed"))
            .and(body_string_contains("filename=\"sketch.png\""))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server, "");
        let feedback = FeedbackInput {
            job_id: "abc".into(),
            message: "confirmed".into(),
            content: "Explain X".into(),
            user_id: None,
            attachments: vec![Attachment::new("sketch.png", "image/png", vec![1, 2, 3])],
        };
        let raw = transport.feedback(&feedback).await.unwrap();
        assert_eq!(raw.status, 202);
        assert!(raw.body.is_empty());
    }

    #[tokio::test]
    async fn poll_targets_endpoint_per_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/process/result/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"pending"}"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/state/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"running"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server, "");
        let raw = transport.poll("abc", PollSource::ProcessResult).await.unwrap();
        assert_eq!(raw.body, r#"{"status":"pending"}"#);
        let raw = transport.poll("abc", PollSource::ThreadState).await.unwrap();
        assert_eq!(raw.body, r#"{"status":"running"}"#);
    }

    #[tokio::test]
    async fn error_statuses_pass_through_raw() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/process/result/abc"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let transport = transport_for(&server, "");
        let raw = transport.poll("abc", PollSource::ProcessResult).await.unwrap();
        assert_eq!(raw, RawResponse::new(500, "boom"));
    }

    #[tokio::test]
    async fn slow_poll_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let transport = transport_for(&server, "");
        let err = transport
            .poll("abc", PollSource::ProcessResult)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        let options = HttpOptions {
            base_url: "http://127.0.0.1:9/api".into(),
            ..Default::default()
        };
        let transport = HttpTransport::new(options, Arc::new(StaticToken::default())).unwrap();
        let err = transport
            .poll("abc", PollSource::ProcessResult)
            .await
            .unwrap_err();
        assert!(
            matches!(err, TransportError::Network(_) | TransportError::Timeout),
            "{err:?}"
        );
    }

    #[test]
    fn endpoint_encodes_segments() {
        let transport = HttpTransport::new(
            HttpOptions {
                base_url: "http://example.test/api/".into(),
                ..Default::default()
            },
            Arc::new(StaticToken::default()),
        )
        .unwrap();
        let url = transport.endpoint(&["state", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://example.test/api/state/a%20b%2Fc");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = HttpTransport::new(
            HttpOptions {
                base_url: "not a url".into(),
                ..Default::default()
            },
            Arc::new(StaticToken::default()),
        );
        assert!(matches!(result, Err(TransportError::Encode(_))));
    }

    #[test]
    fn closures_are_token_providers() {
        let provider = || Some("from-closure".to_string());
        assert_eq!(provider.bearer_token().as_deref(), Some("from-closure"));
        assert_eq!(StaticToken(String::new()).bearer_token(), None);
    }
}
