use crate::assets::AssetStatus;
use crate::detection::{DetectionOutcome, Verdict};
use std::fmt;

/// Text rendering of one analysis. The detection result and the image
/// status are reported independently; a missing image never hides the text
/// results and vice versa.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub outcome: DetectionOutcome,
    pub asset: AssetStatus,
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = &self.outcome;

        match (outcome.verdict(), outcome.error_message()) {
            (Some(Verdict::AllClear), _) => {
                writeln!(f, "Status: All Clear")?;
                writeln!(f, "All riders are wearing helmets")?;
            }
            (Some(Verdict::ViolationsDetected { count }), _) => {
                writeln!(f, "Status: Violations Detected")?;
                writeln!(f, "{count} rider(s) without helmet detected")?;
            }
            (None, message) => {
                writeln!(f, "Status: Analysis failed")?;
                writeln!(f, "Error: {}", message.unwrap_or_default())?;
            }
        }

        if outcome.succeeded() {
            let raw = if outcome.raw_detections().is_empty() {
                "No specific detections reported"
            } else {
                outcome.raw_detections()
            };
            writeln!(f, "Raw detections: {raw}")?;

            if !outcome.violations().is_empty() {
                writeln!(f, "Helmet violations:")?;
                for rider in outcome.violations() {
                    writeln!(f, "  - {rider}")?;
                }
            }

            // The service reports 0 when it did not time the request.
            if let Some(ms) = outcome.processing_time_ms().filter(|&ms| ms > 0) {
                writeln!(f, "Processing time: {ms}ms")?;
            }
        }

        match &self.asset {
            AssetStatus::NoAsset => writeln!(f, "Image: No image available"),
            AssetStatus::Loaded(asset) => writeln!(
                f,
                "Image: {} ({}, {} bytes)",
                asset.url,
                asset.content_type,
                asset.bytes.len()
            ),
            AssetStatus::Exhausted(exhaustion) => {
                writeln!(f, "Image: Failed to load image ({})", exhaustion.diagnosis())?;
                writeln!(f, "  Original URL: {}", exhaustion.locator)?;
                for attempt in &exhaustion.attempts {
                    writeln!(f, "  Tried {} ({}): {}", attempt.url, attempt.kind, attempt.error)?;
                }
                Ok(())
            }
        }
    }
}
