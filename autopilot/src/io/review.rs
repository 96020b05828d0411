//! Optional static-analysis signal.
//!
//! A reviewer scores a step's files. It never blocks a step on its own: low
//! scores only add error-severity issues to the validator's findings.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::types::FileMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub file: String,
    pub line: Option<u32>,
    pub severity: Severity,
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub issues: Vec<ReviewIssue>,
    /// 0 to 100, higher is better.
    pub score: u8,
}

pub trait Reviewer {
    fn review(&self, files: &FileMap) -> Result<ReviewReport>;
}

/// Error-severity issues as validation errors, when the score is below `min_score`.
pub fn review_findings(report: &ReviewReport, min_score: u8) -> Vec<String> {
    if report.score >= min_score {
        return Vec::new();
    }
    report
        .issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .map(|issue| match issue.line {
            Some(line) => format!("Review: {}:{}: {}", issue.file, line, issue.message),
            None => format!("Review: {}: {}", issue.file, issue.message),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity, line: Option<u32>) -> ReviewIssue {
        ReviewIssue {
            file: "app.js".to_string(),
            line,
            severity,
            rule: "no-eval".to_string(),
            message: "eval is not allowed".to_string(),
        }
    }

    #[test]
    fn passing_score_adds_nothing() {
        let report = ReviewReport {
            issues: vec![issue(Severity::Error, Some(3))],
            score: 70,
        };
        assert!(review_findings(&report, 70).is_empty());
    }

    #[test]
    fn low_score_surfaces_only_errors() {
        let report = ReviewReport {
            issues: vec![
                issue(Severity::Error, Some(3)),
                issue(Severity::Warning, None),
                issue(Severity::Error, None),
            ],
            score: 40,
        };
        assert_eq!(
            review_findings(&report, 70),
            vec![
                "Review: app.js:3: eval is not allowed".to_string(),
                "Review: app.js: eval is not allowed".to_string(),
            ]
        );
    }
}
