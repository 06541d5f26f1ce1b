//! Shared fixtures for integration tests.
//!
//! Synthetic archives are a real magic number followed by `id:<name>`. [`FakeDecoder`] looks
//! the id up in its table and writes the registered entries, so nesting, passwords and
//! decoder failures can be scripted without any real archive tool.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;
use unnest::models::TaskStatus;
use unnest::services::{DecodeError, ExternalDecoder, TEMP_DIR_PREFIX};
use unnest::state::RunObserver;
use walkdir::WalkDir;

pub const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
pub const RAR_MAGIC: &[u8] = b"Rar!\x1A\x07\x00";
pub const SEVEN_ZIP_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";

pub fn synthetic(magic: &[u8], id: &str) -> Vec<u8> {
    let mut bytes = magic.to_vec();
    bytes.extend_from_slice(format!("id:{}\n", id).as_bytes());
    bytes
}

pub fn zip(id: &str) -> Vec<u8> {
    synthetic(ZIP_MAGIC, id)
}

pub fn rar(id: &str) -> Vec<u8> {
    synthetic(RAR_MAGIC, id)
}

pub fn seven_zip(id: &str) -> Vec<u8> {
    synthetic(SEVEN_ZIP_MAGIC, id)
}

fn archive_id(bytes: &[u8]) -> Option<String> {
    let start = bytes.windows(3).position(|w| w == b"id:")? + 3;
    let rest = &bytes[start..];
    let end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
    String::from_utf8(rest[..end].to_vec()).ok()
}

/// Contents of one scripted archive.
#[derive(Debug, Clone, Default)]
pub struct FakeArchive {
    pub password: Option<String>,
    pub entries: Vec<(String, Vec<u8>)>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protected(password: &str) -> Self {
        Self {
            password: Some(password.to_string()),
            entries: Vec::new(),
        }
    }

    pub fn entry(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.push((path.to_string(), bytes.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeCall {
    pub archive: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub password: Option<String>,
}

/// Scripted [`ExternalDecoder`] that records every call.
#[derive(Debug, Default)]
pub struct FakeDecoder {
    archives: Mutex<HashMap<String, FakeArchive>>,
    calls: Mutex<Vec<DecodeCall>>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, id: &str, archive: FakeArchive) -> Self {
        self.archives.lock().unwrap().insert(id.to_string(), archive);
        self
    }

    pub fn calls(&self) -> Vec<DecodeCall> {
        self.calls.lock().unwrap().clone()
    }

    fn decode_sync(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        password: Option<&str>,
    ) -> Result<(), DecodeError> {
        self.calls.lock().unwrap().push(DecodeCall {
            archive: archive.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            password: password.map(str::to_string),
        });

        let bytes = fs::read(archive)?;
        let id = archive_id(&bytes).ok_or_else(|| DecodeError::ExitStatus {
            code: 2,
            detail: ": not a scripted archive".to_string(),
        })?;
        let script = self
            .archives
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DecodeError::ExitStatus {
                code: 2,
                detail: format!(": unknown archive id {}", id),
            })?;

        if let Some(expected) = &script.password {
            if password != Some(expected.as_str()) {
                return Err(DecodeError::WrongPassword { code: 11 });
            }
        }

        fs::create_dir_all(output_dir)?;
        for (path, contents) in &script.entries {
            let target = output_dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, contents)?;
        }
        Ok(())
    }
}

impl ExternalDecoder for FakeDecoder {
    async fn decode(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        password: Option<&str>,
    ) -> Result<(), DecodeError> {
        self.decode_sync(archive, output_dir, password)
    }
}

/// Observer that keeps everything it is told.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub logs: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<(String, u8)>>,
    pub statuses: Mutex<Vec<(usize, TaskStatus)>>,
    pub files: Mutex<Vec<(String, bool)>>,
    pub finished: Mutex<Option<usize>>,
}

impl RecordingObserver {
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn logs_containing(&self, needle: &str) -> Vec<String> {
        self.logs().into_iter().filter(|l| l.contains(needle)).collect()
    }

    pub fn statuses(&self) -> Vec<(usize, TaskStatus)> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(String, u8)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Option<usize> {
        *self.finished.lock().unwrap()
    }
}

impl RunObserver for RecordingObserver {
    fn on_progress(&self, label: &str, percent: u8) {
        self.progress.lock().unwrap().push((label.to_string(), percent));
    }

    fn on_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }

    fn on_task_status(&self, task_index: usize, status: TaskStatus) {
        self.statuses.lock().unwrap().push((task_index, status));
    }

    fn on_file_result(&self, file: &str, success: bool) {
        self.files.lock().unwrap().push((file.to_string(), success));
    }

    fn on_finished(&self, success_count: usize) {
        *self.finished.lock().unwrap() = Some(success_count);
    }
}

pub fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

pub fn write_file(dir: &Utf8Path, name: &str, bytes: impl AsRef<[u8]>) -> Utf8PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}

/// Relative paths of every file under `root`, sorted, with `/` separators.
pub fn files_under(root: &Utf8Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// Scratch directories left anywhere under `root`.
pub fn leftover_scratch_dirs(root: &Utf8Path) -> Vec<String> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_DIR_PREFIX))
        .map(|e| e.path().display().to_string())
        .collect()
}
