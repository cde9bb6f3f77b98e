use std::fmt::Display;

use qc_infra::{Failure, Outcome};
use serde::Serialize;

/// JSON document printed on stdout at the end of a run.
#[derive(Debug, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Report {
    pub fn success(outcome: Outcome) -> Self {
        Self {
            failed: false,
            msg: None,
            outcome,
        }
    }

    /// Parameters were rejected before anything was sent to the controller.
    pub fn invalid(err: impl Display) -> Self {
        Self {
            failed: true,
            msg: Some(err.to_string()),
            outcome: Outcome::default(),
        }
    }

    pub fn failure(failure: Failure) -> Self {
        Self {
            failed: true,
            msg: Some(format!("QController operation failed: {}", failure.error)),
            outcome: failure.outcome,
        }
    }
}
