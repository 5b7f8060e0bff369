//! Result type for composite operations.
//!
//! Every session and pipeline operation reports an [`Outcome`]: either
//! success, or the first step that failed together with a reason. Outcomes
//! are combined with [`Outcome::and`], which keeps the earliest failure so a
//! composite operation can run all of its sub-steps and still report which
//! one broke.

use std::fmt;

use crate::gateway::CommandOutcome;

/// A named step of a session or pipeline operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Open,
    Connect,
    ReadSvt,
    ReadFa,
    Authenticate,
    Disconnect,
    StopServer,
    WriteBindings,
    ImportPdx,
    FlashPdx,
    ReadDataSets,
    Convert,
    Sign,
    FlashDataSets,
    CertRequest,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Open => "open",
            Step::Connect => "connect",
            Step::ReadSvt => "read-svt",
            Step::ReadFa => "read-fa",
            Step::Authenticate => "authenticate",
            Step::Disconnect => "disconnect",
            Step::StopServer => "stop-server",
            Step::WriteBindings => "write-bindings",
            Step::ImportPdx => "import-pdx",
            Step::FlashPdx => "flash-pdx",
            Step::ReadDataSets => "read-data-sets",
            Step::Convert => "convert",
            Step::Sign => "sign",
            Step::FlashDataSets => "flash-data-sets",
            Step::CertRequest => "cert-request",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first failing step of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: Step,
    pub reason: String,
}

/// Success, or the first failure of a chain of steps
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    failure: Option<StepFailure>,
}

impl Outcome {
    pub fn success() -> Self {
        Self { failure: None }
    }

    pub fn failed(step: Step, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(StepFailure {
                step,
                reason: reason.into(),
            }),
        }
    }

    /// Translate a gateway result into an outcome for `step`
    pub fn from_command(step: Step, result: &CommandOutcome) -> Self {
        if result.success {
            Self::success()
        } else {
            Self::failed(step, result.describe())
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    /// Combine two outcomes, keeping the earliest failure
    pub fn and(self, other: Outcome) -> Outcome {
        if self.failure.is_some() {
            self
        } else {
            other
        }
    }

    /// Combine in place, keeping the earliest failure
    pub fn merge(&mut self, other: Outcome) {
        if self.failure.is_none() {
            self.failure = other.failure;
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => f.write_str("success"),
            Some(failure) => write!(f, "{} failed: {}", failure.step, failure.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_success() {
        let outcome = Outcome::success().and(Outcome::success());
        assert!(outcome.is_success());
        assert_eq!(outcome.to_string(), "success");
    }

    #[test]
    fn test_first_failure_wins() {
        let outcome = Outcome::success()
            .and(Outcome::failed(Step::Authenticate, "denied"))
            .and(Outcome::failed(Step::Connect, "no bus"));

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.step, Step::Authenticate);
        assert_eq!(failure.reason, "denied");
        assert_eq!(outcome.to_string(), "authenticate failed: denied");
    }

    #[test]
    fn test_merge_keeps_earliest() {
        let mut outcome = Outcome::success();
        outcome.merge(Outcome::failed(Step::Convert, "first"));
        outcome.merge(Outcome::failed(Step::Sign, "second"));
        assert_eq!(outcome.failure().unwrap().step, Step::Convert);
    }

    #[test]
    fn test_from_command() {
        let ok = CommandOutcome::succeeded();
        assert!(Outcome::from_command(Step::Sign, &ok).is_success());

        let bad = CommandOutcome::exited(Some(2));
        let outcome = Outcome::from_command(Step::Sign, &bad);
        assert_eq!(outcome.failure().unwrap().reason, "exit code 2");
    }
}
