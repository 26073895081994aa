//! Result types returned by the decomposition pipeline.

use crate::error::{OutputError, PageSplitError};
use serde::{Deserialize, Serialize};

/// Which kind of output an operation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// The designated page rendered to an image.
    Raster,
    /// One page copied into a standalone PDF.
    Extract,
}

/// The record of one output: what was attempted and how it ended.
///
/// Each page task yields exactly one of these; it is never updated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub kind: OutputKind,
    /// Zero-based source page index.
    pub page_index: usize,
    /// Storage key the output was (or would have been) written to.
    pub key: String,
    /// Bytes written on success.
    pub result: Result<usize, OutputError>,
}

impl OperationOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&OutputError> {
        self.result.as_ref().err()
    }
}

/// Lifecycle of one invocation.
///
/// ```text
/// Pending → Loading ─┬─▶ Failed(MalformedDocument)
///                    └─▶ Processing ─┬─▶ Succeeded
///                                    └─▶ Failed(cause)
/// ```
#[derive(Debug)]
pub enum InvocationState {
    Pending,
    Loading,
    Processing,
    Succeeded,
    Failed(PageSplitError),
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Succeeded | InvocationState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            InvocationState::Pending => "pending",
            InvocationState::Loading => "loading",
            InvocationState::Processing => "processing",
            InvocationState::Succeeded => "succeeded",
            InvocationState::Failed(_) => "failed",
        }
    }
}

/// Aggregate statistics for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationStats {
    /// Pages in the source document (0 if it never loaded).
    pub page_count: usize,
    /// Outputs attempted (raster + extracts).
    pub total_outputs: usize,
    /// Outputs durably written.
    pub written_outputs: usize,
    /// Outputs that failed.
    pub failed_outputs: usize,
    /// Bytes written across all outputs.
    pub bytes_written: u64,
    /// Time spent parsing the source.
    pub load_duration_ms: u64,
    /// Wall-clock time for the whole invocation.
    pub total_duration_ms: u64,
}

/// Everything an invocation produced.
#[derive(Debug)]
pub struct InvocationResult {
    /// Terminal state: `Succeeded` or `Failed`.
    pub state: InvocationState,
    /// One entry per attempted output; raster first, then extracts by page.
    pub outcomes: Vec<OperationOutcome>,
    pub stats: InvocationStats,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self.state, InvocationState::Succeeded)
    }

    /// Keys that were durably written.
    pub fn written_keys(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_ok())
            .map(|o| o.key.as_str())
    }

    /// Convert into `Ok(self)` on success or the failure cause, for callers
    /// that prefer `?`.
    pub fn into_result(self) -> Result<InvocationResult, PageSplitError> {
        match self.state {
            InvocationState::Failed(e) => Err(e),
            InvocationState::Succeeded => Ok(InvocationResult {
                state: InvocationState::Succeeded,
                outcomes: self.outcomes,
                stats: self.stats,
            }),
            other => Err(PageSplitError::Internal(format!(
                "invocation ended in non-terminal state '{}'",
                other.name()
            ))),
        }
    }
}

/// The response returned to the invoker.
///
/// ```json
/// {"statusCode": 200, "message": "Success"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
}

impl InvocationResponse {
    pub fn success() -> Self {
        Self {
            status_code: 200,
            message: "Success".to_string(),
        }
    }

    pub fn failure() -> Self {
        Self {
            status_code: 400,
            message: "Failed".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl From<&InvocationResult> for InvocationResponse {
    fn from(result: &InvocationResult) -> Self {
        if result.is_success() {
            Self::success()
        } else {
            Self::failure()
        }
    }
}
