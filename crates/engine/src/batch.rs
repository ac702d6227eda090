//! 批量操作结果。
//!
//! 每个目标独立执行，单个失败不会中断其余目标。

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsErrorKind, Result};

/// 批量操作中单个目标的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Succeeded { target: String },
    Failed {
        target: String,
        kind: FsErrorKind,
        reason: String,
    },
}

impl BatchOutcome {
    pub fn target(&self) -> &str {
        match self {
            Self::Succeeded { target } | Self::Failed { target, .. } => target,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn failure_kind(&self) -> Option<FsErrorKind> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// 每个输入目标对应一个结果，顺序与输入一致。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchResult {
    /// 对每个目标执行 `op`，失败只记录不中断。
    pub fn run<T, F>(targets: &[String], mut op: F) -> Self
    where
        F: FnMut(&str) -> Result<T>,
    {
        let outcomes = targets
            .iter()
            .map(|target| match op(target) {
                Ok(_) => BatchOutcome::Succeeded {
                    target: target.clone(),
                },
                Err(err) => Self::failed(target, &err),
            })
            .collect();
        Self { outcomes }
    }

    fn failed(target: &str, err: &FsError) -> BatchOutcome {
        BatchOutcome::Failed {
            target: target.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(BatchOutcome::is_success)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_failures_do_not_abort_batch() {
        let targets = vec!["a".to_string(), "locked".to_string(), "c".to_string()];
        let mut seen = Vec::new();

        let result = BatchResult::run(&targets, |target| {
            seen.push(target.to_string());
            if target == "locked" {
                Err(FsError::Protected(PathBuf::from(target)))
            } else {
                Ok(())
            }
        });

        assert_eq!(seen, targets);
        assert_eq!(result.len(), 3);
        assert_eq!(result.succeeded(), 2);
        assert!(!result.all_succeeded());
        assert_eq!(result.outcomes[1].target(), "locked");
        assert_eq!(result.outcomes[1].failure_kind(), Some(FsErrorKind::Protected));
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = BatchOutcome::Failed {
            target: "x".to_string(),
            kind: FsErrorKind::NotFound,
            reason: "missing".to_string(),
        };
        let json = serde_json::to_value(&outcome).expect("serialize outcome");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "NOT_FOUND");
    }
}
