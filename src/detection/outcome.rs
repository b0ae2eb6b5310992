use serde::{Deserialize, Serialize};
use std::fmt;

pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to analyze image";

/// Normalized result of one detection attempt.
///
/// A failed outcome always carries a non-empty error message and a
/// successful one never does; the constructors are the only way to build
/// one, so the pairing cannot drift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionOutcome {
    succeeded: bool,
    asset_locator: String,
    raw_detections: String,
    violations: Vec<String>,
    processing_time_ms: Option<u64>,
    error_message: Option<String>,
}

impl DetectionOutcome {
    pub fn success(
        asset_locator: impl Into<String>,
        raw_detections: impl Into<String>,
        violations: Vec<String>,
        processing_time_ms: Option<u64>,
    ) -> Self {
        Self {
            succeeded: true,
            asset_locator: asset_locator.into(),
            raw_detections: raw_detections.into(),
            violations,
            processing_time_ms,
            error_message: None,
        }
    }

    /// Blank messages are replaced by [`GENERIC_FAILURE_MESSAGE`].
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message
        };

        Self {
            succeeded: false,
            asset_locator: String::new(),
            raw_detections: String::new(),
            violations: Vec::new(),
            processing_time_ms: None,
            error_message: Some(message),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn asset_locator(&self) -> &str {
        &self.asset_locator
    }

    pub fn raw_detections(&self) -> &str {
        &self.raw_detections
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn processing_time_ms(&self) -> Option<u64> {
        self.processing_time_ms
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// `None` for failed outcomes: there is nothing to judge.
    pub fn verdict(&self) -> Option<Verdict> {
        if !self.succeeded {
            return None;
        }
        match self.violations.len() {
            0 => Some(Verdict::AllClear),
            count => Some(Verdict::ViolationsDetected { count }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AllClear,
    ViolationsDetected { count: usize },
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::AllClear => write!(f, "All Clear"),
            Verdict::ViolationsDetected { .. } => write!(f, "Violations Detected"),
        }
    }
}

/// Body of `POST /detect-license-plate/`.
#[derive(Debug, Deserialize)]
pub(crate) struct DetectionResponse {
    success: bool,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    detections: Option<String>,
    #[serde(default)]
    riders_without_helmets: Option<Vec<String>>,
    #[serde(default)]
    processing_time: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl From<DetectionResponse> for DetectionOutcome {
    fn from(response: DetectionResponse) -> Self {
        if !response.success {
            return DetectionOutcome::failure(response.error.unwrap_or_default());
        }

        let processing_time_ms = response
            .processing_time
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms.round() as u64);

        DetectionOutcome::success(
            response.image_url.unwrap_or_default(),
            response.detections.unwrap_or_default(),
            response.riders_without_helmets.unwrap_or_default(),
            processing_time_ms,
        )
    }
}

/// Error bodies: `error` from the detection service itself, `detail` from
/// framework-level rejections.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub(crate) fn message(self) -> Option<String> {
        let detail = self.detail.and_then(|detail| match detail {
            serde_json::Value::String(text) => Some(text),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });

        self.error
            .filter(|msg| !msg.trim().is_empty())
            .or(detail.filter(|msg| !msg.trim().is_empty()))
    }
}
