use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of work: an ordered file list, where to put the result, and an optional password.
///
/// Tasks are built by the caller before a run (from the command line or a YAML task file)
/// and are never mutated while the run is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTask {
    /// Source archives, processed in order
    #[serde(default)]
    pub files: Vec<Utf8PathBuf>,

    /// Shared destination directory (ignored when `extract_to_source` is set)
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,

    /// Extract each file next to itself instead of into `output_dir`
    #[serde(default)]
    pub extract_to_source: bool,

    /// Password used for the archive and every archive nested inside it
    #[serde(default)]
    pub password: Option<String>,
}

impl ArchiveTask {
    /// Create a task extracting `files` into a shared directory.
    pub fn new(files: Vec<Utf8PathBuf>, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            files,
            output_dir: Some(output_dir.into()),
            extract_to_source: false,
            password: None,
        }
    }

    /// Create a task extracting every file alongside its source.
    pub fn alongside_source(files: Vec<Utf8PathBuf>) -> Self {
        Self {
            files,
            output_dir: None,
            extract_to_source: true,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = if password.is_empty() { None } else { Some(password) };
        self
    }

    /// Password as handed to the decoder (`None` when absent or empty).
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Check that the task can run at all.
    ///
    /// Returns a human-readable reason when it cannot.
    pub fn validate(&self) -> Result<(), String> {
        if self.files.is_empty() {
            return Err("task has no files".to_string());
        }
        if !self.extract_to_source && self.output_dir.is_none() {
            return Err("task has no output directory and is not extracting to source".to_string());
        }
        Ok(())
    }

    /// Add a file unless it is already in the list.
    pub fn add_file(&mut self, path: impl Into<Utf8PathBuf>) -> bool {
        let path = path.into();
        if self.files.contains(&path) {
            return false;
        }
        self.files.push(path);
        true
    }

    pub fn remove_file(&mut self, path: &Utf8Path) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f != path);
        self.files.len() != before
    }
}

/// Per-task status reported through the task-status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Partial,
    Failed,
    Error,
}

impl TaskStatus {
    /// Roll up a finished task from its per-file tally.
    pub fn from_counts(succeeded: usize, attempted: usize) -> Self {
        if attempted == 0 || succeeded == 0 {
            TaskStatus::Failed
        } else if succeeded == attempted {
            TaskStatus::Success
        } else {
            TaskStatus::Partial
        }
    }

    /// True once the task will not change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Partial | TaskStatus::Failed | TaskStatus::Error
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Success => "success",
            TaskStatus::Partial => "partial",
            TaskStatus::Failed => "failed",
            TaskStatus::Error => "error",
        };
        f.write_str(s)
    }
}
