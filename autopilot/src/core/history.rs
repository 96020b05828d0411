//! Bounded archive of finished tasks.

use std::collections::VecDeque;

use crate::core::task::AutonomousTask;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Append-only ring buffer: the oldest task is evicted once `limit` is reached.
#[derive(Debug, Clone)]
pub struct TaskHistory {
    limit: usize,
    tasks: VecDeque<AutonomousTask>,
}

impl TaskHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            tasks: VecDeque::with_capacity(limit),
        }
    }

    /// Archive a task, returning the evicted one if the buffer was full.
    pub fn push(&mut self, task: AutonomousTask) -> Option<AutonomousTask> {
        if self.limit == 0 {
            return Some(task);
        }
        let evicted = if self.tasks.len() >= self.limit {
            self.tasks.pop_front()
        } else {
            None
        };
        self.tasks.push_back(task);
        evicted
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Most recently archived task.
    pub fn latest(&self) -> Option<&AutonomousTask> {
        self.tasks.back()
    }

    /// Archived tasks, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &AutonomousTask> {
        self.tasks.iter()
    }
}

impl Default for TaskHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_beyond_limit() {
        let mut history = TaskHistory::default();
        for i in 1..=12 {
            history.push(AutonomousTask::new(format!("task-{i}"), "prompt"));
        }

        assert_eq!(history.len(), DEFAULT_HISTORY_LIMIT);
        let ids: Vec<&str> = history.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"task-3"));
        assert_eq!(history.latest().map(|task| task.id.as_str()), Some("task-12"));
    }

    #[test]
    fn newest_first_iteration() {
        let mut history = TaskHistory::new(3);
        assert!(history.is_empty());
        for id in ["a", "b", "c"] {
            history.push(AutonomousTask::new(id, "prompt"));
        }

        assert!(!history.is_empty());
        let newest_first: Vec<&str> = history.iter().rev().map(|task| task.id.as_str()).collect();
        assert_eq!(newest_first, vec!["c", "b", "a"]);
    }

    #[test]
    fn push_reports_evicted_task() {
        let mut history = TaskHistory::new(1);
        assert!(history.push(AutonomousTask::new("a", "p")).is_none());
        let evicted = history.push(AutonomousTask::new("b", "p")).expect("evicted");
        assert_eq!(evicted.id, "a");
    }
}
