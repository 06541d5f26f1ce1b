use crate::models::TaskStatus;
use std::collections::VecDeque;

/// Maximum number of decoders running at once.
///
/// **IMPORTANT:** This is fixed at 1. Decoder processes and the merge step both write into
/// destination trees that may overlap, and the collision check in the merge relies on being
/// the only writer. Extraction therefore runs on a single worker, strictly one file at a time.
///
/// # See Also
///
/// - [`crate::services::TaskRunner`] - Runs every task on one worker
/// - [`crate::services::ExtractionOrchestrator`] - Never decodes sibling archives in parallel
pub const MAX_CONCURRENT_DECODERS: usize = 1;

/// Number of log lines kept in memory for late subscribers.
pub const LOG_BUFFER_CAPACITY: usize = 1000;

/// Snapshot of an extraction run, as seen by the UI layer.
///
/// # Thread Safety
///
/// `RunState` is wrapped in `Arc<RwLock<RunState>>` by [`crate::state::StateManager`].
/// Never mutate it directly - go through [`StateManager`](crate::state::StateManager) so
/// change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    // Runtime state
    pub is_running: bool,
    pub cancel_requested: bool,

    // Progress state
    pub progress_label: String,
    pub progress_percent: u8,

    // Per-task status, indexed like the submitted task list
    pub task_statuses: Vec<TaskStatus>,

    // Results
    pub succeeded_files: usize,
    pub failed_files: usize,
    pub final_success_count: Option<usize>,

    // Most recent log lines, oldest first
    pub log: VecDeque<String>,
}

impl RunState {
    /// Get the current tally.
    ///
    /// Returns a tuple of (succeeded, failed).
    pub fn tally(&self) -> (usize, usize) {
        (self.succeeded_files, self.failed_files)
    }

    /// Reset everything but keep the log.
    pub fn reset_run_state(&mut self, task_count: usize) {
        self.is_running = false;
        self.cancel_requested = false;
        self.progress_label.clear();
        self.progress_percent = 0;
        self.task_statuses = vec![TaskStatus::Pending; task_count];
        self.succeeded_files = 0;
        self.failed_files = 0;
        self.final_success_count = None;
    }

    /// Append a log line, dropping the oldest once the buffer is full.
    pub fn push_log(&mut self, line: String) {
        if self.log.len() == LOG_BUFFER_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Set the status of one task, growing the list if needed.
    pub fn set_task_status(&mut self, index: usize, status: TaskStatus) {
        if index >= self.task_statuses.len() {
            self.task_statuses.resize(index + 1, TaskStatus::Pending);
        }
        self.task_statuses[index] = status;
    }

    /// Count tasks currently in `status`.
    pub fn count_tasks(&self, status: TaskStatus) -> usize {
        self.task_statuses.iter().filter(|s| **s == status).count()
    }

    /// Human-readable summary, e.g. `succeeded: 3, failed: 1`.
    pub fn summary(&self) -> String {
        format!(
            "succeeded: {}, failed: {}",
            self.succeeded_files, self.failed_files
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = RunState::default();
        assert!(!state.is_running);
        assert_eq!(state.tally(), (0, 0));
        assert_eq!(MAX_CONCURRENT_DECODERS, 1);
    }

    #[test]
    fn test_reset_run_state_keeps_log() {
        let mut state = RunState::default();
        state.is_running = true;
        state.succeeded_files = 4;
        state.push_log("hello".to_string());

        state.reset_run_state(3);

        assert!(!state.is_running);
        assert_eq!(state.succeeded_files, 0);
        assert_eq!(state.task_statuses, vec![TaskStatus::Pending; 3]);
        assert_eq!(state.log.len(), 1);
    }

    #[test]
    fn test_log_buffer_is_bounded() {
        let mut state = RunState::default();
        for i in 0..LOG_BUFFER_CAPACITY + 5 {
            state.push_log(format!("line {}", i));
        }
        assert_eq!(state.log.len(), LOG_BUFFER_CAPACITY);
        assert_eq!(state.log.front().map(String::as_str), Some("line 5"));
    }

    #[test]
    fn test_set_task_status_grows() {
        let mut state = RunState::default();
        state.set_task_status(2, TaskStatus::Success);
        assert_eq!(state.task_statuses.len(), 3);
        assert_eq!(state.count_tasks(TaskStatus::Pending), 2);
        assert_eq!(state.count_tasks(TaskStatus::Success), 1);
    }

    #[test]
    fn test_summary() {
        let mut state = RunState::default();
        state.succeeded_files = 2;
        state.failed_files = 1;
        assert_eq!(state.summary(), "succeeded: 2, failed: 1");
    }
}
