//! Failure policy of the collection pipeline.
//!
//! Each step of a run has a fixed policy. `Fatal` steps abort the run,
//! `Recoverable` steps are logged and the run goes on, and the `Deferred`
//! archive step is acted on only after the snapshot cleanup was attempted.

use crate::error::CollectorError;
use std::fmt;
use tracing::{error, warn};

/// How a failing step affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Fatal,
    Recoverable,
    Deferred,
}

/// Steps of one collection run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    CreateSnapshot,
    Lighten,
    Archive,
    CleanupSnapshot,
    Retrieve,
    CleanupResource,
    Finalize,
}

impl Step {
    pub fn policy(self) -> Policy {
        match self {
            Step::Connect => Policy::Fatal,
            Step::CreateSnapshot => Policy::Fatal,
            Step::Lighten => Policy::Recoverable,
            Step::Archive => Policy::Deferred,
            Step::CleanupSnapshot => Policy::Recoverable,
            Step::Retrieve => Policy::Recoverable,
            Step::CleanupResource => Policy::Fatal,
            Step::Finalize => Policy::Recoverable,
        }
    }

    /// Classifies the result of this step according to its policy.
    ///
    /// Failures are logged here, at `warn` for recovered ones and `error`
    /// otherwise.
    pub fn settle<T>(self, result: Result<T, CollectorError>) -> StepOutcome<T> {
        match result {
            Ok(value) => StepOutcome::Completed(value),
            Err(e) => match self.policy() {
                Policy::Recoverable => {
                    warn!("{} failed: {}", self, e);
                    StepOutcome::Recovered(e)
                }
                Policy::Fatal | Policy::Deferred => {
                    error!("{} failed: {}", self, e);
                    StepOutcome::Fatal(e)
                }
            },
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Connect => "Connecting",
            Step::CreateSnapshot => "Creating snapshot",
            Step::Lighten => "Lightening snapshot",
            Step::Archive => "Creating snapshot tarball",
            Step::CleanupSnapshot => "Cleanup snapshot",
            Step::Retrieve => "Downloading snapshot",
            Step::CleanupResource => "Cleanup transfer resource",
            Step::Finalize => "Finalizing local copy",
        };
        f.write_str(name)
    }
}

/// Result of one step after its policy was applied.
#[derive(Debug)]
pub enum StepOutcome<T> {
    Completed(T),
    /// Failed, logged, and the run continues.
    Recovered(CollectorError),
    /// Failed; the run must end with this error (for `Deferred`, after cleanup).
    Fatal(CollectorError),
}
