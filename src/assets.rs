use crate::config::AssetConfig;
use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt, io::Read, time::Duration};
use thiserror::Error;
use tracing::instrument;

/// Candidates tried per locator: the asset itself, then the probe.
pub const MAX_ATTEMPTS: usize = 2;

pub const DEFAULT_PROBE_PATH: &str = "/static/test.txt";

const MAX_ASSET_BYTES: u64 = 32 * 1024 * 1024;

/// Maps a service-supplied locator to the URL to try on a given attempt.
/// Pure: it never touches the network.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    base_url: String,
    probe_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Asset,
    Probe,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Asset => write!(f, "asset"),
            CandidateKind::Probe => write!(f, "probe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub kind: CandidateKind,
}

impl AssetResolver {
    pub fn new(config: &AssetConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            probe_path: config.probe_path.clone(),
        }
    }

    pub fn next_candidate(&self, locator: &str, attempt_index: usize) -> Option<Candidate> {
        if locator.is_empty() || is_exhausted(attempt_index) {
            return None;
        }

        match attempt_index {
            0 => {
                let url = if is_absolute(locator) {
                    locator.to_string()
                } else {
                    join(&self.base_url, locator)
                };
                Some(Candidate {
                    url,
                    kind: CandidateKind::Asset,
                })
            }
            _ => Some(Candidate {
                url: join(&self.base_url, &self.probe_path),
                kind: CandidateKind::Probe,
            }),
        }
    }
}

pub fn next_candidate(locator: &str, base_url: &str, attempt_index: usize) -> Option<String> {
    AssetResolver {
        base_url: base_url.to_string(),
        probe_path: DEFAULT_PROBE_PATH.to_string(),
    }
    .next_candidate(locator, attempt_index)
    .map(|candidate| candidate.url)
}

pub fn is_exhausted(attempt_index: usize) -> bool {
    attempt_index >= MAX_ATTEMPTS
}

fn is_absolute(locator: &str) -> bool {
    let lower = locator.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn join(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetLoadError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("not an image (content type {content_type})")]
    NotAnImage { content_type: String },
    #[error("diagnostic probe answered; it does not stand in for the asset")]
    ProbeOnly,
    #[error("asset exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub url: String,
    pub kind: CandidateKind,
    pub error: AssetLoadError,
}

/// Per-outcome resolution progress, advanced only on load failures.
#[derive(Debug, Clone)]
pub struct AssetResolution {
    resolver: AssetResolver,
    locator: String,
    attempt_index: usize,
    failures: Vec<FailedAttempt>,
}

impl AssetResolution {
    pub fn new(resolver: AssetResolver, locator: impl Into<String>) -> Self {
        Self {
            resolver,
            locator: locator.into(),
            attempt_index: 0,
            failures: Vec::new(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn attempt_index(&self) -> usize {
        self.attempt_index
    }

    pub fn current(&self) -> Option<Candidate> {
        self.resolver
            .next_candidate(&self.locator, self.attempt_index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current().is_none()
    }

    pub fn failures(&self) -> &[FailedAttempt] {
        &self.failures
    }

    /// Records the current candidate as failed and moves on. Returns the next
    /// candidate, if any.
    pub fn record_failure(&mut self, error: AssetLoadError) -> Option<Candidate> {
        if let Some(candidate) = self.current() {
            self.failures.push(FailedAttempt {
                url: candidate.url,
                kind: candidate.kind,
                error,
            });
            self.attempt_index += 1;
        }
        self.current()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    /// The probe could not be fetched at all.
    HostUnreachable,
    /// The host answered, so the asset itself is missing or broken.
    AssetMissing,
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::HostUnreachable => write!(f, "asset host unreachable"),
            Diagnosis::AssetMissing => write!(f, "asset host reachable, asset missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhaustion {
    pub locator: String,
    pub attempts: Vec<FailedAttempt>,
}

impl Exhaustion {
    pub fn diagnosis(&self) -> Diagnosis {
        let deciding = self
            .attempts
            .iter()
            .find(|attempt| attempt.kind == CandidateKind::Probe)
            .or_else(|| self.attempts.last());

        match deciding.map(|attempt| &attempt.error) {
            Some(AssetLoadError::Transport(_)) | None => Diagnosis::HostUnreachable,
            Some(_) => Diagnosis::AssetMissing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAsset {
    pub url: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    /// The outcome carried no locator.
    NoAsset,
    Loaded(LoadedAsset),
    Exhausted(Exhaustion),
}

/// Transport half of asset display: fetch one candidate as an image.
#[async_trait]
pub trait AssetLoader: Send + Sync + 'static {
    async fn load(&self, url: &str) -> Result<LoadedAsset, AssetLoadError>;
}

#[derive(Debug, Clone)]
pub struct HttpAssetLoader {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpAssetLoader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            max_bytes: MAX_ASSET_BYTES,
        }
    }

    /// Bodies longer than `max_bytes` are refused rather than truncated.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl AssetLoader for HttpAssetLoader {
    async fn load(&self, url: &str) -> Result<LoadedAsset, AssetLoadError> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let max_bytes = self.max_bytes;

        tokio::task::spawn_blocking(move || fetch_image(&agent, &url, max_bytes))
            .await
            .map_err(|e| AssetLoadError::Transport(e.to_string()))?
    }
}

fn fetch_image(
    agent: &ureq::Agent,
    url: &str,
    max_bytes: u64,
) -> Result<LoadedAsset, AssetLoadError> {
    let response = agent.get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => AssetLoadError::Status(code),
        ureq::Error::Transport(transport) => AssetLoadError::Transport(transport.to_string()),
    })?;

    let content_type = response.content_type().to_string();
    if !content_type.starts_with("image/") {
        return Err(AssetLoadError::NotAnImage { content_type });
    }

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| AssetLoadError::Transport(e.to_string()))?;
    if bytes.len() as u64 > max_bytes {
        return Err(AssetLoadError::TooLarge { limit: max_bytes });
    }

    Ok(LoadedAsset {
        url: url.to_string(),
        content_type,
        bytes: Bytes::from(bytes),
    })
}

/// Walks the candidates for `locator` until one loads or all have failed.
/// A probe that answers is still a failure for display purposes; it only
/// feeds the diagnosis.
#[instrument(skip(loader, resolver))]
pub async fn resolve(
    loader: &dyn AssetLoader,
    resolver: &AssetResolver,
    locator: &str,
) -> AssetStatus {
    let mut resolution = AssetResolution::new(resolver.clone(), locator);
    if resolution.is_exhausted() {
        return AssetStatus::NoAsset;
    }

    while let Some(candidate) = resolution.current() {
        let error = match (loader.load(&candidate.url).await, candidate.kind) {
            (Ok(asset), CandidateKind::Asset) => return AssetStatus::Loaded(asset),
            (Ok(_), CandidateKind::Probe) => AssetLoadError::ProbeOnly,
            (Err(e), _) => e,
        };
        tracing::warn!(
            "Image load attempt {} ({}) failed for {}: {}",
            resolution.attempt_index() + 1,
            candidate.kind,
            candidate.url,
            error
        );
        resolution.record_failure(error);
    }

    let exhaustion = Exhaustion {
        locator: locator.to_string(),
        attempts: resolution.failures().to_vec(),
    };
    tracing::warn!("Image unavailable for {}: {}", locator, exhaustion.diagnosis());

    AssetStatus::Exhausted(exhaustion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, routing::get, Router};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    const BASE: &str = "http://localhost:8000";

    fn resolver() -> AssetResolver {
        AssetResolver::new(&AssetConfig {
            base_url: BASE.to_string(),
            probe_path: "/static/test.txt".to_string(),
            timeout_ms: 1000,
        })
    }

    struct ScriptedLoader {
        responses: HashMap<String, Result<LoadedAsset, AssetLoadError>>,
        requested: Mutex<Vec<String>>,
    }

    impl ScriptedLoader {
        fn new(responses: Vec<(&str, Result<LoadedAsset, AssetLoadError>)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(url, result)| (url.to_string(), result))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AssetLoader for ScriptedLoader {
        async fn load(&self, url: &str) -> Result<LoadedAsset, AssetLoadError> {
            self.requested.lock().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .unwrap_or(Err(AssetLoadError::Status(404)))
        }
    }

    fn jpeg(url: &str) -> LoadedAsset {
        LoadedAsset {
            url: url.to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: Bytes::from_static(b"\xff\xd8"),
        }
    }

    #[test]
    fn relative_locator_is_prefixed_with_base() {
        assert_eq!(
            next_candidate("/media/out.jpg", BASE, 0).as_deref(),
            Some("http://localhost:8000/media/out.jpg")
        );
        assert_eq!(
            next_candidate("media/out.jpg", "http://localhost:8000/", 0).as_deref(),
            Some("http://localhost:8000/media/out.jpg")
        );
    }

    #[test]
    fn absolute_locator_is_returned_unchanged() {
        let locator = "https://cdn.example.com/out.jpg?v=2";
        assert_eq!(next_candidate(locator, BASE, 0).as_deref(), Some(locator));
        let locator = "HTTP://cdn.example.com/out.jpg";
        assert_eq!(next_candidate(locator, BASE, 0).as_deref(), Some(locator));
    }

    #[test]
    fn second_attempt_is_the_probe() {
        let candidate = resolver().next_candidate("/media/out.jpg", 1).unwrap();
        assert_eq!(candidate.url, "http://localhost:8000/static/test.txt");
        assert_eq!(candidate.kind, CandidateKind::Probe);
    }

    #[test]
    fn attempts_past_the_probe_are_exhausted() {
        for attempt in [2, 3, 10, usize::MAX] {
            assert!(is_exhausted(attempt));
            assert_eq!(next_candidate("/media/out.jpg", BASE, attempt), None);
        }
        assert!(!is_exhausted(0));
        assert!(!is_exhausted(1));
    }

    #[test]
    fn empty_locator_has_no_candidates() {
        assert_eq!(next_candidate("", BASE, 0), None);
        let resolution = AssetResolution::new(resolver(), "");
        assert!(resolution.is_exhausted());
        assert_eq!(resolution.attempt_index(), 0);
    }

    #[test]
    fn resolution_advances_only_on_recorded_failures() {
        let mut resolution = AssetResolution::new(resolver(), "/media/out.jpg");
        assert_eq!(resolution.current().unwrap().kind, CandidateKind::Asset);

        let next = resolution.record_failure(AssetLoadError::Status(404)).unwrap();
        assert_eq!(next.kind, CandidateKind::Probe);
        assert_eq!(resolution.attempt_index(), 1);

        assert_eq!(
            resolution.record_failure(AssetLoadError::Transport("refused".into())),
            None
        );
        assert!(resolution.is_exhausted());
        assert_eq!(resolution.failures().len(), 2);

        // Further failures are ignored once exhausted.
        resolution.record_failure(AssetLoadError::Status(500));
        assert_eq!(resolution.attempt_index(), 2);
        assert_eq!(resolution.failures().len(), 2);
    }

    #[tokio::test]
    async fn first_candidate_loads() {
        let url = "http://localhost:8000/media/out.jpg";
        let loader = ScriptedLoader::new(vec![(url, Ok(jpeg(url)))]);

        let status = resolve(&loader, &resolver(), "/media/out.jpg").await;

        assert_eq!(status, AssetStatus::Loaded(jpeg(url)));
        assert_eq!(loader.requested.lock().len(), 1);
    }

    #[tokio::test]
    async fn empty_locator_never_touches_the_loader() {
        let loader = ScriptedLoader::new(vec![]);

        let status = resolve(&loader, &resolver(), "").await;

        assert_eq!(status, AssetStatus::NoAsset);
        assert!(loader.requested.lock().is_empty());
    }

    #[tokio::test]
    async fn both_failures_exhaust_after_two_attempts() {
        let loader = ScriptedLoader::new(vec![(
            "http://localhost:8000/static/test.txt",
            Err(AssetLoadError::Transport("connection refused".into())),
        )]);

        let status = resolve(&loader, &resolver(), "bad/path.jpg").await;

        let AssetStatus::Exhausted(exhaustion) = status else {
            panic!("expected exhaustion");
        };
        let urls: Vec<_> = exhaustion.attempts.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "http://localhost:8000/bad/path.jpg",
                "http://localhost:8000/static/test.txt"
            ]
        );
        assert_eq!(exhaustion.diagnosis(), Diagnosis::HostUnreachable);
        assert_eq!(*loader.requested.lock(), urls);
    }

    #[tokio::test]
    async fn answering_probe_is_not_treated_as_the_asset() {
        let probe = "http://localhost:8000/static/test.txt";
        let loader = ScriptedLoader::new(vec![(probe, Ok(jpeg(probe)))]);

        let status = resolve(&loader, &resolver(), "/media/gone.jpg").await;

        let AssetStatus::Exhausted(exhaustion) = status else {
            panic!("expected exhaustion");
        };
        assert_eq!(exhaustion.attempts[1].error, AssetLoadError::ProbeOnly);
        assert_eq!(exhaustion.diagnosis(), Diagnosis::AssetMissing);
    }

    #[tokio::test]
    async fn http_loader_accepts_images_only() {
        let router = Router::new()
            .route(
                "/media/out.jpg",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xff_u8, 0xd8]) }),
            )
            .route("/static/test.txt", get(|| async { "static ok" }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let loader = HttpAssetLoader::new(Duration::from_secs(2));

        let asset = loader.load(&format!("{base}/media/out.jpg")).await.unwrap();
        assert_eq!(asset.content_type, "image/jpeg");
        assert_eq!(asset.bytes, Bytes::from_static(&[0xff, 0xd8]));

        assert!(matches!(
            loader.load(&format!("{base}/static/test.txt")).await,
            Err(AssetLoadError::NotAnImage { .. })
        ));
        assert_eq!(
            loader.load(&format!("{base}/media/missing.jpg")).await,
            Err(AssetLoadError::Status(404))
        );
    }

    #[tokio::test]
    async fn http_loader_refuses_oversized_images() {
        let router = Router::new()
            .route(
                "/media/big.jpg",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xab_u8; 64]) }),
            )
            .route(
                "/media/exact.jpg",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xab_u8; 16]) }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let loader = HttpAssetLoader::new(Duration::from_secs(2)).with_max_bytes(16);

        assert_eq!(
            loader.load(&format!("{base}/media/big.jpg")).await,
            Err(AssetLoadError::TooLarge { limit: 16 })
        );
        let exact = loader.load(&format!("{base}/media/exact.jpg")).await.unwrap();
        assert_eq!(exact.bytes.len(), 16);
    }

    #[tokio::test]
    async fn oversized_asset_moves_on_to_the_probe() {
        let probe = "http://localhost:8000/static/test.txt";
        let loader = ScriptedLoader::new(vec![
            (
                "http://localhost:8000/media/big.jpg",
                Err(AssetLoadError::TooLarge { limit: 16 }),
            ),
            (probe, Ok(jpeg(probe))),
        ]);

        let status = resolve(&loader, &resolver(), "/media/big.jpg").await;

        let AssetStatus::Exhausted(exhaustion) = status else {
            panic!("expected exhaustion");
        };
        assert_eq!(exhaustion.attempts[0].error, AssetLoadError::TooLarge { limit: 16 });
        assert_eq!(exhaustion.diagnosis(), Diagnosis::AssetMissing);
        assert_eq!(loader.requested.lock().len(), 2);
    }
}
