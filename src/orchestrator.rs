use crate::config::OverlapPolicy;
use crate::detection::{DetectionOutcome, DetectionRequest, Detector, GENERIC_FAILURE_MESSAGE};
use serde::Serialize;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    InFlight,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What observers see: the current status, the session it belongs to, and
/// the stored outcome once settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub status: SessionStatus,
    pub session: Option<SessionId>,
    pub outcome: Option<DetectionOutcome>,
}

impl Snapshot {
    fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            session: None,
            outcome: None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Upload {0} is still in flight")]
    Busy(SessionId),
    #[error("Cannot reset while upload {0} is in flight")]
    ResetWhileInFlight(SessionId),
}

/// Handle on an accepted upload.
#[derive(Debug)]
pub struct PendingUpload {
    session: SessionId,
    task: JoinHandle<bool>,
}

impl PendingUpload {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// `true` if this upload's outcome became the stored one, `false` if it
    /// was discarded because a newer upload superseded it.
    pub async fn wait(self) -> bool {
        self.task.await.unwrap_or(false)
    }
}

/// Owns the "current request" and guarantees that only the latest accepted
/// upload can settle, whatever order the responses come back in.
pub struct UploadOrchestrator {
    detector: Arc<dyn Detector>,
    policy: OverlapPolicy,
    state: Arc<watch::Sender<Snapshot>>,
    next_session: AtomicU64,
}

impl UploadOrchestrator {
    pub fn new(detector: Arc<dyn Detector>, policy: OverlapPolicy) -> Self {
        let (state, _) = watch::channel(Snapshot::idle());
        Self {
            detector,
            policy,
            state: Arc::new(state),
            next_session: AtomicU64::new(1),
        }
    }

    /// Starts one detection call for `request`. Must be called from within a
    /// tokio runtime.
    pub fn begin_upload(
        &self,
        request: DetectionRequest,
    ) -> Result<PendingUpload, OrchestratorError> {
        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let mut refused_by = None;

        self.state.send_if_modified(|snapshot| {
            if snapshot.status == SessionStatus::InFlight {
                if let Some(current) = snapshot.session {
                    match self.policy {
                        OverlapPolicy::Reject => {
                            refused_by = Some(current);
                            return false;
                        }
                        OverlapPolicy::Supersede => {
                            tracing::info!("Upload {} supersedes {}", session, current);
                        }
                    }
                }
            }

            *snapshot = Snapshot {
                status: SessionStatus::InFlight,
                session: Some(session),
                outcome: None,
            };
            true
        });

        if let Some(current) = refused_by {
            tracing::warn!("Upload refused, {} is still in flight", current);
            return Err(OrchestratorError::Busy(current));
        }

        tracing::info!(
            "Upload {} started for {} ({} bytes)",
            session,
            request.file_name(),
            request.payload().len()
        );

        let detector = self.detector.clone();
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            // The detector runs in its own task so a panic still settles the session.
            let detection = tokio::spawn(async move { detector.detect(request).await });
            let outcome = match detection.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Detection for upload {} aborted: {}", session, e);
                    DetectionOutcome::failure(GENERIC_FAILURE_MESSAGE)
                }
            };
            settle(&state, session, outcome)
        });

        Ok(PendingUpload { session, task })
    }

    pub fn reset(&self) -> Result<(), OrchestratorError> {
        let mut in_flight = None;

        self.state.send_if_modified(|snapshot| match snapshot.status {
            SessionStatus::InFlight => {
                in_flight = snapshot.session;
                false
            }
            SessionStatus::Settled => {
                *snapshot = Snapshot::idle();
                true
            }
            SessionStatus::Idle => false,
        });

        match in_flight {
            Some(session) => Err(OrchestratorError::ResetWhileInFlight(session)),
            None => Ok(()),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().status == SessionStatus::InFlight
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }
}

/// Stores `outcome` if `session` is still the tracked in-flight one.
fn settle(state: &watch::Sender<Snapshot>, session: SessionId, outcome: DetectionOutcome) -> bool {
    state.send_if_modified(|snapshot| {
        if snapshot.status != SessionStatus::InFlight || snapshot.session != Some(session) {
            tracing::debug!("Discarding stale result of upload {}", session);
            return false;
        }

        tracing::info!(
            "Upload {} settled (succeeded: {})",
            session,
            outcome.succeeded()
        );
        snapshot.status = SessionStatus::Settled;
        snapshot.outcome = Some(outcome);
        true
    })
}
