//! Cancellation and deadline checks shared by every wait in a job.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mmw_core::JobFailure;

/// Stops a job early when its token is cancelled or its deadline passes.
#[derive(Debug, Clone)]
pub struct Interrupt {
    cancel: CancellationToken,
    deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Interrupt {
    /// `budget` starts counting now.
    pub fn new(cancel: CancellationToken, budget: Option<Duration>) -> Self {
        Self {
            cancel,
            deadline: budget.map(|budget| Deadline {
                at: Instant::now() + budget,
                budget,
            }),
        }
    }

    /// Never fires.
    pub fn none() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn check(&self) -> Result<(), JobFailure> {
        if self.cancel.is_cancelled() {
            return Err(JobFailure::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline.at => Err(deadline.failure()),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<(), JobFailure> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Drive `fut` to completion unless the job is interrupted first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, JobFailure> {
        self.check()?;
        // Interrupts win ties with the wrapped future.
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(JobFailure::Cancelled),
            failure = expire(self.deadline) => Err(failure),
            output = fut => Ok(output),
        }
    }
}

impl Deadline {
    fn failure(&self) -> JobFailure {
        JobFailure::DeadlineExceeded {
            deadline_secs: self.budget.as_secs(),
        }
    }
}

async fn expire(deadline: Option<Deadline>) -> JobFailure {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(deadline.at).await;
            deadline.failure()
        }
        None => std::future::pending().await,
    }
}
