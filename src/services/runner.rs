use crate::models::{ArchiveTask, TaskStatus};
use crate::services::decoder::ExternalDecoder;
use crate::services::orchestrator::ExtractionOrchestrator;
use crate::services::{log_error, log_info, log_warn};
use crate::state::RunObserver;
use camino::Utf8Path;
use std::sync::Arc;

/// Outcome of one [`TaskRunner::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Top-level files whose outer archive was decoded
    pub succeeded: usize,
    /// Top-level files that were attempted and failed
    pub failed: usize,
    /// Final status per task, in input order
    pub task_statuses: Vec<TaskStatus>,
    /// The run stopped early on request
    pub cancelled: bool,
}

impl RunSummary {
    pub fn tally_line(&self) -> String {
        format!("succeeded: {}, failed: {}", self.succeeded, self.failed)
    }
}

/// Runs a list of tasks on the current worker, one file at a time.
///
/// Cancellation is checked before every file; a file already handed to the decoder always
/// runs to completion.
pub struct TaskRunner<D> {
    orchestrator: ExtractionOrchestrator<D>,
}

impl<D: ExternalDecoder> TaskRunner<D> {
    pub fn new(orchestrator: ExtractionOrchestrator<D>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &ExtractionOrchestrator<D> {
        &self.orchestrator
    }

    pub async fn run(&self, tasks: &[ArchiveTask]) -> RunSummary {
        let observer: Arc<dyn RunObserver> = self.orchestrator.observer();
        let observer = observer.as_ref();

        let total_files: usize = tasks.iter().map(|t| t.files.len()).sum();
        let mut statuses = vec![TaskStatus::Pending; tasks.len()];
        for index in 0..tasks.len() {
            observer.on_task_status(index, TaskStatus::Pending);
        }

        log_info(
            observer,
            format!("Starting run: {} task(s), {} file(s)", tasks.len(), total_files),
        );

        let mut file_index = 0;
        let mut succeeded = 0;
        let mut failed = 0;
        let mut cancelled = false;

        for (task_index, task) in tasks.iter().enumerate() {
            if self.orchestrator.is_cancelled() {
                cancelled = true;
                break;
            }

            if let Err(reason) = task.validate() {
                log_error(observer, format!("Task {}: {}", task_index + 1, reason));
                statuses[task_index] = TaskStatus::Error;
                observer.on_task_status(task_index, TaskStatus::Error);
                file_index += task.files.len();
                continue;
            }

            let destination = task.output_dir.as_deref().unwrap_or(Utf8Path::new("."));
            if !task.extract_to_source {
                if let Err(e) = std::fs::create_dir_all(destination) {
                    log_error(
                        observer,
                        format!("Task {}: cannot create {}: {}", task_index + 1, destination, e),
                    );
                    statuses[task_index] = TaskStatus::Error;
                    observer.on_task_status(task_index, TaskStatus::Error);
                    file_index += task.files.len();
                    continue;
                }
            }

            statuses[task_index] = TaskStatus::Processing;
            observer.on_task_status(task_index, TaskStatus::Processing);
            log_info(
                observer,
                format!(
                    "Task {}/{}: {} file(s) -> {}",
                    task_index + 1,
                    tasks.len(),
                    task.files.len(),
                    if task.extract_to_source { "source folders" } else { destination.as_str() }
                ),
            );

            let mut task_succeeded = 0;
            let mut attempted = 0;

            for file in &task.files {
                if self.orchestrator.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let name = file.file_name().unwrap_or(file.as_str());
                observer.on_progress(name, (file_index * 100 / total_files.max(1)) as u8);
                file_index += 1;
                log_info(
                    observer,
                    format!("Processing ({}/{}): {}", file_index, total_files, name),
                );

                attempted += 1;
                if self
                    .orchestrator
                    .extract_top_level(file, destination, task.password(), task.extract_to_source)
                    .await
                {
                    task_succeeded += 1;
                    succeeded += 1;
                } else {
                    failed += 1;
                }
            }

            let status = if cancelled && attempted == 0 {
                TaskStatus::Pending
            } else {
                TaskStatus::from_counts(task_succeeded, task.files.len())
            };
            statuses[task_index] = status;
            observer.on_task_status(task_index, status);

            if cancelled {
                break;
            }
        }

        let summary = RunSummary {
            succeeded,
            failed,
            task_statuses: statuses,
            cancelled,
        };

        if cancelled {
            log_warn(observer, "Run cancelled".to_string());
        }
        observer.on_progress("done", 100);
        log_info(observer, summary.tally_line());
        self.orchestrator.metrics().log_summary();
        observer.on_finished(succeeded);

        summary
    }
}
