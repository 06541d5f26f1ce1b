// State management module
//
// This module provides the StateManager which wraps RunState with thread-safe access
// using Arc<RwLock<T>> and emits change events for whatever front end is listening.

use crate::models::{RunState, TaskStatus};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Callbacks through which an extraction run reports to the surrounding application.
///
/// Every method has a no-op default so observers only implement what they consume.
/// Calls arrive on the extraction worker; implementations must not block for long.
pub trait RunObserver: Send + Sync {
    /// Progress for the file currently being processed, `percent` in `0..=100`
    fn on_progress(&self, _label: &str, _percent: u8) {}

    /// One human-readable log line
    fn on_log(&self, _message: &str) {}

    /// Status change of the task at `task_index`
    fn on_task_status(&self, _task_index: usize, _status: TaskStatus) {}

    /// Outcome of one top-level file
    fn on_file_result(&self, _file: &str, _success: bool) {}

    /// The run ended (normally or by cancellation)
    fn on_finished(&self, _success_count: usize) {}
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Change events emitted when state is modified
///
/// These events are emitted to notify interested parties (CLI printer, GUI)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A run has started
    RunStarted { total_tasks: usize },

    /// Progress has been updated
    ProgressUpdated { label: String, percent: u8 },

    /// A log line was produced
    LogMessage { message: String },

    /// A task changed status
    TaskStatusChanged { index: usize, status: TaskStatus },

    /// A top-level file finished
    FileProcessed { file: String, success: bool },

    /// Cancellation was requested
    CancelRequested,

    /// The run has finished
    RunFinished { success_count: usize },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`RunState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Implements [`RunObserver`] so it can be handed straight to a
///   [`TaskRunner`](crate::services::TaskRunner)
///
/// # Usage
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    /// The run state protected by RwLock for thread-safe access
    state: Arc<RwLock<RunState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 256 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    // A panic while holding the lock must not take the observer down with it.
    fn read_guard(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a clone of the current state
    pub fn snapshot(&self) -> RunState {
        self.read_guard().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let running = state_manager.read(|state| state.is_running);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        let state = self.read_guard();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let mut state = self.write_guard();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &RunState, new: &RunState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_running != new.is_running && new.is_running {
            changes.push(StateChange::RunStarted {
                total_tasks: new.task_statuses.len(),
            });
        }

        if !old.cancel_requested && new.cancel_requested {
            changes.push(StateChange::CancelRequested);
        }

        if old.progress_label != new.progress_label
            || old.progress_percent != new.progress_percent
        {
            changes.push(StateChange::ProgressUpdated {
                label: new.progress_label.clone(),
                percent: new.progress_percent,
            });
        }

        for (index, status) in new.task_statuses.iter().enumerate() {
            if old.task_statuses.get(index) != Some(status) {
                changes.push(StateChange::TaskStatusChanged {
                    index,
                    status: *status,
                });
            }
        }

        if old.final_success_count != new.final_success_count {
            if let Some(success_count) = new.final_success_count {
                changes.push(StateChange::RunFinished { success_count });
            }
        }

        changes
    }

    fn emit(&self, event: StateChange) -> StateChange {
        let _ = self.state_tx.send(event.clone());
        event
    }

    // Convenience methods for common state updates

    /// Start a run over `task_count` tasks, all pending
    pub fn start_run(&self, task_count: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_run_state(task_count);
            state.is_running = true;
        })
    }

    /// Flag that the user asked to stop
    pub fn request_cancel(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.cancel_requested = true;
        })
    }

    /// Record a log line
    ///
    /// Written straight through the lock; the log buffer is never diffed.
    pub fn add_log(&self, message: &str) -> Vec<StateChange> {
        self.write_guard().push_log(message.to_string());
        vec![self.emit(StateChange::LogMessage {
            message: message.to_string(),
        })]
    }

    /// Set the progress label and percent (clamped to 100)
    pub fn set_progress(&self, label: &str, percent: u8) -> Vec<StateChange> {
        let percent = percent.min(100);
        {
            let mut state = self.write_guard();
            if state.progress_label == label && state.progress_percent == percent {
                return Vec::new();
            }
            state.progress_label = label.to_string();
            state.progress_percent = percent;
        }
        vec![self.emit(StateChange::ProgressUpdated {
            label: label.to_string(),
            percent,
        })]
    }

    /// Record the outcome of one top-level file
    pub fn add_file_result(&self, file: &str, success: bool) -> Vec<StateChange> {
        {
            let mut state = self.write_guard();
            if success {
                state.succeeded_files += 1;
            } else {
                state.failed_files += 1;
            }
        }
        vec![self.emit(StateChange::FileProcessed {
            file: file.to_string(),
            success,
        })]
    }

    /// Mark the run as finished
    pub fn finish_run(&self, success_count: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.is_running = false;
            state.final_success_count = Some(success_count);
        })
    }

    /// Reset all run-related state
    pub fn reset_run_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_run_state(0));
        changes.push(self.emit(StateChange::StateReset));
        changes
    }

    /// Get an Arc reference to the state for use in worker threads
    pub fn state_arc(&self) -> Arc<RwLock<RunState>> {
        Arc::clone(&self.state)
    }
}

impl RunObserver for StateManager {
    fn on_progress(&self, label: &str, percent: u8) {
        self.set_progress(label, percent);
    }

    fn on_log(&self, message: &str) {
        self.add_log(message);
    }

    fn on_task_status(&self, task_index: usize, status: TaskStatus) {
        self.update(|state| state.set_task_status(task_index, status));
    }

    fn on_file_result(&self, file: &str, success: bool) {
        self.add_file_result(file, success);
    }

    fn on_finished(&self, success_count: usize) {
        self.finish_run(success_count);
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
