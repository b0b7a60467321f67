//! Email ports: job enqueueing (saga side) and sending (worker side).

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::email::EmailJob;
use crate::error::SagaError;

/// Enqueues a transactional email job for asynchronous delivery.
#[async_trait]
pub trait EmailEnqueuer: Send + Sync {
    /// Enqueues a job.
    async fn enqueue(&self, job: EmailJob) -> Result<(), SagaError>;
}

/// Sends a rendered email through the external mail provider.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends a job.
    async fn send(&self, job: &EmailJob) -> Result<(), SagaError>;
}

/// In-memory enqueuer recording jobs for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailEnqueuer {
    jobs: Arc<RwLock<Vec<EmailJob>>>,
}

impl RecordingEmailEnqueuer {
    /// Creates a new empty enqueuer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every enqueued job.
    pub fn jobs(&self) -> Vec<EmailJob> {
        self.jobs.read().unwrap().clone()
    }
}

#[async_trait]
impl EmailEnqueuer for RecordingEmailEnqueuer {
    async fn enqueue(&self, job: EmailJob) -> Result<(), SagaError> {
        self.jobs.write().unwrap().push(job);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingSenderState {
    sent: Vec<EmailJob>,
    fail_on_send: bool,
}

/// In-memory sender recording sends, with failure injection for retry tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailSender {
    state: Arc<RwLock<RecordingSenderState>>,
}

impl RecordingEmailSender {
    /// Creates a new empty sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sender to fail, simulating a provider outage.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns every sent job.
    pub fn sent(&self) -> Vec<EmailJob> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, job: &EmailJob) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(SagaError::Port("mail provider unavailable".to_string()));
        }
        state.sent.push(job.clone());
        Ok(())
    }
}
