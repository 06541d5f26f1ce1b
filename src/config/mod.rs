use crate::models::{ArchiveTask, UserConfig};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

/// File name of the user configuration inside the config directory.
pub const USER_CONFIG_FILE: &str = "unnest.yaml";

/// Prefix of environment variables that override file settings
/// (`UNNEST__EXTRACTOR__MAX_DEPTH=5`).
pub const ENV_PREFIX: &str = "UNNEST";

/// Separator between sections in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// On-disk layout of a task file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub tasks: Vec<ArchiveTask>,
}

/// Configuration manager for loading and saving YAML configuration files.
///
/// Manages:
/// - User config (`unnest.yaml`): extractor settings and the saved password list
/// - Task files: YAML lists of [`ArchiveTask`] handed to `unnest run`
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join(USER_CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the user configuration.
    ///
    /// Layers, lowest priority first: built-in defaults, `unnest.yaml` (optional),
    /// `UNNEST__SECTION__KEY` environment variables.
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::new(self.user_config_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        tracing::info!("Loaded user config from {}", self.user_config_path);
        Ok(config)
    }

    /// Save the user configuration.
    ///
    /// The last used password is written only when `remember_password` is set.
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let mut config = config.clone();
        if !config.extractor.remember_password {
            config.extractor.password.clear();
        }

        let yaml_string =
            serde_yaml_ng::to_string(&config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Load a task file.
    ///
    /// Accepts either a bare YAML list of tasks or a mapping with a `tasks` key.
    pub fn load_tasks(&self, path: &Utf8Path) -> Result<Vec<ArchiveTask>> {
        let file_contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file: {}", path))?;

        let tasks = match serde_yaml_ng::from_str::<Vec<ArchiveTask>>(&file_contents) {
            Ok(tasks) => tasks,
            Err(_) => {
                serde_yaml_ng::from_str::<TaskFile>(&file_contents)
                    .with_context(|| format!("Failed to parse task file: {}", path))?
                    .tasks
            }
        };

        tracing::info!("Loaded {} task(s) from {}", tasks.len(), path);
        Ok(tasks)
    }

    /// Save tasks in the `tasks:` mapping layout.
    pub fn save_tasks(&self, path: &Utf8Path, tasks: &[ArchiveTask]) -> Result<()> {
        let file = TaskFile {
            tasks: tasks.to_vec(),
        };
        let yaml_string =
            serde_yaml_ng::to_string(&file).context("Failed to serialize tasks to YAML")?;

        fs::write(path, yaml_string)
            .with_context(|| format!("Failed to write task file: {}", path))?;

        tracing::info!("Saved {} task(s) to {}", tasks.len(), path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }
}
