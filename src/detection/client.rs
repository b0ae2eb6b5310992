use super::multipart;
use super::outcome::{DetectionOutcome, DetectionResponse, ErrorBody};
use super::request::DetectionRequest;
use crate::config::DetectionServiceConfig;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;
use tracing::instrument;
use url::Url;

pub const DETECT_PATH: &str = "/detect-license-plate/";
pub const IMAGE_FIELD: &str = "image_input";

/// Slack on top of the HTTP timeout before the caller stops waiting on the
/// blocking call.
const TIMEOUT_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid detection service url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Turns an image into an outcome. Implementations never fail: every error
/// path is folded into a failed [`DetectionOutcome`].
#[async_trait]
pub trait Detector: Send + Sync + 'static {
    async fn detect(&self, request: DetectionRequest) -> DetectionOutcome;
}

#[derive(Debug, Clone)]
pub struct DetectionClient {
    agent: ureq::Agent,
    endpoint: Url,
    timeout: Duration,
}

impl DetectionClient {
    pub fn new(config: &DetectionServiceConfig) -> Result<Self, ClientError> {
        let endpoint = endpoint_for(&config.base_url)?;
        let agent = ureq::AgentBuilder::new()
            .timeout(config.get_timeout())
            .build();

        Ok(Self {
            agent,
            endpoint,
            timeout: config.get_timeout(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issues exactly one POST. No retries.
    #[instrument(
        skip(self, request),
        fields(file_name = request.file_name(), bytes = request.payload().len())
    )]
    pub async fn send(&self, request: DetectionRequest) -> DetectionOutcome {
        let started = Instant::now();
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();

        let call = tokio::task::spawn_blocking(move || post_image(&agent, &endpoint, &request));

        let outcome = match timeout(self.timeout + TIMEOUT_GRACE, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!("Detection call aborted: {:?}", e);
                DetectionOutcome::failure(String::new())
            }
            Err(_) => DetectionOutcome::failure(format!(
                "timeout of {}ms exceeded",
                self.timeout.as_millis()
            )),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome.error_message() {
            None => tracing::info!(
                elapsed_ms,
                violations = outcome.violations().len(),
                "Detection succeeded"
            ),
            Some(message) => tracing::warn!(elapsed_ms, "Detection failed: {}", message),
        }

        outcome
    }
}

#[async_trait]
impl Detector for DetectionClient {
    async fn detect(&self, request: DetectionRequest) -> DetectionOutcome {
        self.send(request).await
    }
}

fn endpoint_for(base_url: &str) -> Result<Url, ClientError> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), DETECT_PATH);
    Url::parse(&joined).map_err(|source| ClientError::InvalidBaseUrl {
        url: base_url.to_string(),
        source,
    })
}

fn post_image(agent: &ureq::Agent, endpoint: &Url, request: &DetectionRequest) -> DetectionOutcome {
    let form = multipart::encode_file_field(
        IMAGE_FIELD,
        request.file_name(),
        request.media_type(),
        request.payload(),
    );

    let response = agent
        .post(endpoint.as_str())
        .set("Content-Type", &form.content_type())
        .send_bytes(form.body());

    match response {
        Ok(response) => match response.into_string() {
            Ok(body) => decode_success_body(&body),
            Err(e) => DetectionOutcome::failure(e.to_string()),
        },
        Err(ureq::Error::Status(code, response)) => {
            let server_message = response
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
                .and_then(ErrorBody::message);

            DetectionOutcome::failure(
                server_message.unwrap_or_else(|| format!("Request failed with status code {code}")),
            )
        }
        Err(ureq::Error::Transport(transport)) => DetectionOutcome::failure(transport.to_string()),
    }
}

fn decode_success_body(body: &str) -> DetectionOutcome {
    match serde_json::from_str::<DetectionResponse>(body) {
        Ok(response) => response.into(),
        Err(e) => {
            tracing::debug!("Undecodable detection response: {}", body);
            DetectionOutcome::failure(format!("Invalid response from detection service: {e}"))
        }
    }
}
