//! Bounded polling of asynchronous provider jobs

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{MediaError, Result};

/// Default delay between status requests
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of status requests before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;

/// Polling cadence for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Normalized job status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Map a provider status word onto the normalized set
    ///
    /// Unrecognized words count as in progress, so the attempt budget
    /// still bounds the wait.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");

        match normalized.as_str() {
            "queued" | "pending" | "in_queue" | "submitted" | "waiting" => Self::Queued,
            "completed" | "complete" | "ready" | "succeeded" | "success" | "done" => Self::Completed,
            "failed" | "error" | "failure" | "canceled" | "cancelled" | "request_moderated"
            | "content_moderated" | "task_not_found" => Self::Failed,
            _ => Self::InProgress,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Tracking record for one submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub job_id: String,
    /// Status URL returned at submission, polled verbatim
    pub polling_url: Option<Url>,
    /// Result URL returned at submission, for providers that split status and result
    pub response_url: Option<Url>,
    pub status: JobStatus,
    /// Status requests made so far
    pub attempts: u32,
}

impl PollState {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            polling_url: None,
            response_url: None,
            status,
            attempts: 0,
        }
    }
}

/// One status observation
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Full status payload, handed back on completion
    pub payload: Value,
    /// Provider's failure detail, when it gave one
    pub failure: Option<String>,
}

/// Where status observations come from
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_status(&self, state: &PollState) -> Result<JobSnapshot>;
}

/// Completed job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub state: PollState,
    /// Payload of the status request that reported completion
    pub payload: Value,
}

/// Poll until the job completes, fails, or the attempt budget runs out
///
/// Sleeps `interval` before every status request. A request error ends
/// polling immediately.
pub async fn run(config: &PollConfig, mut state: PollState, source: &dyn JobSource) -> Result<JobOutcome> {
    if state.status == JobStatus::Failed {
        return Err(MediaError::PollFailed {
            reason: format!("job {} failed at submission", state.job_id),
        });
    }

    loop {
        if state.attempts >= config.max_attempts {
            tracing::warn!(job_id = %state.job_id, attempts = state.attempts, "job polling timed out");
            return Err(MediaError::PollTimeout {
                attempts: state.attempts,
            });
        }

        tokio::time::sleep(config.interval).await;
        state.attempts += 1;

        let snapshot = source.fetch_status(&state).await?;
        state.status = snapshot.status;

        tracing::debug!(
            job_id = %state.job_id,
            attempt = state.attempts,
            status = ?state.status,
            "polled job status"
        );

        match snapshot.status {
            JobStatus::Queued | JobStatus::InProgress => {}
            JobStatus::Completed => {
                return Ok(JobOutcome {
                    state,
                    payload: snapshot.payload,
                });
            }
            JobStatus::Failed => {
                let reason = snapshot
                    .failure
                    .unwrap_or_else(|| format!("job {} reported failure", state.job_id));
                return Err(MediaError::PollFailed { reason });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct Scripted {
        statuses: Mutex<Vec<JobStatus>>,
        seen: Mutex<Vec<u32>>,
    }

    impl Scripted {
        fn new(mut statuses: Vec<JobStatus>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<u32> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobSource for Scripted {
        async fn fetch_status(&self, state: &PollState) -> Result<JobSnapshot> {
            self.seen.lock().unwrap().push(state.attempts);
            let status = self.statuses.lock().unwrap().pop().unwrap_or(JobStatus::InProgress);

            Ok(JobSnapshot {
                status,
                payload: json!({ "attempt": state.attempts }),
                failure: (status == JobStatus::Failed).then(|| "moderated".to_string()),
            })
        }
    }

    fn fast(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn completes_after_progress() {
        let source = Scripted::new(vec![JobStatus::Queued, JobStatus::InProgress, JobStatus::Completed]);

        let outcome = run(&fast(10), PollState::new("abc", JobStatus::Queued), &source)
            .await
            .unwrap();

        assert_eq!(outcome.state.attempts, 3);
        assert_eq!(outcome.state.status, JobStatus::Completed);
        assert_eq!(outcome.payload["attempt"], 3);
        assert_eq!(source.calls(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failure_stops_polling() {
        let source = Scripted::new(vec![JobStatus::Failed, JobStatus::Completed]);

        let err = run(&fast(10), PollState::new("abc", JobStatus::Queued), &source)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::PollFailed { ref reason } if reason == "moderated"));
        assert_eq!(source.calls(), vec![1]);
    }

    #[tokio::test]
    async fn times_out_after_budget() {
        let source = Scripted::new(Vec::new());

        let err = run(&fast(3), PollState::new("abc", JobStatus::Queued), &source)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::PollTimeout { attempts: 3 }));
        assert_eq!(source.calls(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_submission_never_polls() {
        let source = Scripted::new(vec![JobStatus::Completed]);

        let err = run(&fast(3), PollState::new("abc", JobStatus::Failed), &source)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::PollFailed { .. }));
        assert!(source.calls().is_empty());
    }

    #[test]
    fn status_vocabulary() {
        assert_eq!(JobStatus::parse("IN_QUEUE"), JobStatus::Queued);
        assert_eq!(JobStatus::parse("Pending"), JobStatus::Queued);
        assert_eq!(JobStatus::parse("IN_PROGRESS"), JobStatus::InProgress);
        assert_eq!(JobStatus::parse("in-progress"), JobStatus::InProgress);
        assert_eq!(JobStatus::parse("Ready"), JobStatus::Completed);
        assert_eq!(JobStatus::parse("COMPLETED"), JobStatus::Completed);
        assert_eq!(JobStatus::parse("Request Moderated"), JobStatus::Failed);
        assert_eq!(JobStatus::parse("Task not found"), JobStatus::Failed);
        assert_eq!(JobStatus::parse("warming up"), JobStatus::InProgress);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
