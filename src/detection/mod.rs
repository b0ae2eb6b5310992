mod client;
mod multipart;
mod outcome;
mod request;

pub use client::{ClientError, DetectionClient, Detector, DETECT_PATH, IMAGE_FIELD};
pub use outcome::{DetectionOutcome, Verdict, GENERIC_FAILURE_MESSAGE};
pub use request::{media_type_for, DetectionRequest, RequestError};
