//! Task and step domain entities.
//!
//! A task owns its ordered steps. It does not store a cursor: the position of
//! the step in flight lives in the control context and is projected onto the
//! task by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::StepStatus;

/// One step definition produced by decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub title: String,
    pub description: String,
    pub files_affected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    pub id: String,
    /// 0-based position, fixed at creation.
    pub index: usize,
    pub title: String,
    pub description: String,
    pub files_affected: Vec<String>,
    pub status: StepStatus,
    pub files_modified: Vec<String>,
    pub git_snapshot_id: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl TaskStep {
    pub fn from_spec(task_id: &str, index: usize, spec: StepSpec) -> Self {
        Self {
            id: format!("{task_id}-step-{index}"),
            index,
            title: spec.title,
            description: spec.description,
            files_affected: spec.files_affected,
            status: StepStatus::Pending,
            files_modified: Vec::new(),
            git_snapshot_id: None,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
        }
    }
}

/// Result of an earlier completed step, summarized for later prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviousResult {
    pub index: usize,
    pub title: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutonomousTask {
    pub id: String,
    pub user_prompt: String,
    pub steps: Vec<TaskStep>,
    pub total_tokens_used: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Rollback anchor captured before the first step runs.
    pub pre_execution_commit_id: Option<String>,
}

impl AutonomousTask {
    pub fn new(id: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_prompt: user_prompt.into(),
            steps: Vec::new(),
            total_tokens_used: 0,
            started_at: Utc::now(),
            completed_at: None,
            pre_execution_commit_id: None,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&TaskStep> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut TaskStep> {
        self.steps.iter_mut().find(|step| step.id == step_id)
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count()
    }

    /// Results of completed steps positioned before `index`. Failed and
    /// skipped steps are left out.
    pub fn previous_results(&self, index: usize) -> Vec<PreviousResult> {
        self.steps
            .iter()
            .take(index)
            .filter(|step| step.status == StepStatus::Completed)
            .map(|step| PreviousResult {
                index: step.index,
                title: step.title.clone(),
                result: step.result.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::step_spec;

    fn task_with_steps(n: usize) -> AutonomousTask {
        let mut task = AutonomousTask::new("task-1", "build a todo app");
        task.steps = (0..n)
            .map(|i| TaskStep::from_spec("task-1", i, step_spec(&format!("step {i}"))))
            .collect();
        task
    }

    #[test]
    fn step_ids_derive_from_task_and_index() {
        let task = task_with_steps(2);
        assert_eq!(task.steps[1].id, "task-1-step-1");
        assert_eq!(task.steps[1].index, 1);
        assert_eq!(task.steps[1].status, StepStatus::Pending);
    }

    #[test]
    fn previous_results_only_include_completed_steps() {
        let mut task = task_with_steps(4);
        task.steps[0].status = StepStatus::Completed;
        task.steps[0].result = Some("scaffolded".to_string());
        task.steps[1].status = StepStatus::Failed;
        task.steps[2].status = StepStatus::Skipped;

        let previous = task.previous_results(3);
        assert_eq!(
            previous,
            vec![PreviousResult {
                index: 0,
                title: "step 0".to_string(),
                result: "scaffolded".to_string(),
            }]
        );
    }

    #[test]
    fn task_serializes_camel_case() {
        let task = task_with_steps(1);
        let json = serde_json::to_value(&task).expect("serialize");
        assert!(json.get("userPrompt").is_some());
        assert!(json.get("preExecutionCommitId").is_some());
        assert_eq!(json["steps"][0]["filesAffected"], serde_json::json!([]));
    }
}
