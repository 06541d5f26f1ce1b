use crate::metrics::Metrics;
use crate::models::DEFAULT_MAX_DEPTH;
use crate::services::decoder::{DecodeError, ExternalDecoder};
use crate::services::merge;
use crate::services::sniffer::{FormatSniffer, SniffKind};
use crate::services::{log_debug, log_error, log_info, log_warn};
use crate::state::{NoopObserver, RunObserver};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::watch;
use walkdir::WalkDir;

/// Prefix of every scratch directory the orchestrator creates.
pub const TEMP_DIR_PREFIX: &str = ".unnest-tmp-";

/// Prefix of the working directory nested archives of one frame are decoded under.
const NESTED_DIR_PREFIX: &str = ".nested-";

/// Why extracting one archive failed.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("file not found: {0}")]
    NotFound(Utf8PathBuf),

    #[error("empty or truncated file: {0}")]
    EmptyOrTruncated(String),

    #[error("not an archive: {0}")]
    UnrecognizedFormat(String),

    #[error("decoder failed: {0}")]
    DecodeFailure(#[from] DecodeError),

    #[error("decoder produced no files from {0}")]
    NoOutputProduced(Utf8PathBuf),

    #[error("nesting depth {depth} exceeds the limit of {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    fn filesystem(path: &Utf8Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| ExtractError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

type ExtractFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExtractError>> + Send + 'a>>;

/// Settings shared by every frame under one top-level archive.
#[derive(Clone, Copy)]
struct Subtree<'a> {
    final_output_dir: &'a Utf8Path,
    password: Option<&'a str>,
}

/// Scratch directory owned by one extraction frame, removed on drop.
struct ScratchDir {
    dir: Option<TempDir>,
    path: Utf8PathBuf,
}

impl ScratchDir {
    fn create(parent: &Utf8Path, depth: u32) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{}-", TEMP_DIR_PREFIX, depth))
            .tempdir_in(parent)?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|p| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("non UTF-8 scratch path: {}", p.display()),
            )
        })?;
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::warn!("Failed to remove scratch directory {}: {}", self.path, e);
            }
        }
    }
}

/// Recursive archive flattener.
///
/// Decodes an archive, decodes every archive found inside it (up to `max_depth` levels
/// counting the outermost one) and moves every other file into one final output directory.
/// Scratch space lives beside the output and is always removed.
pub struct ExtractionOrchestrator<D> {
    decoder: D,
    sniffer: FormatSniffer,
    max_depth: u32,
    observer: Arc<dyn RunObserver>,
    metrics: Arc<Metrics>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl<D: ExternalDecoder> ExtractionOrchestrator<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            sniffer: FormatSniffer::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            observer: Arc::new(NoopObserver),
            metrics: Arc::new(Metrics::new()),
            cancel_rx: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_sniffer(mut self, sniffer: FormatSniffer) -> Self {
        self.sniffer = sniffer;
        self
    }

    /// Stop between files once `true` is sent on the channel.
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn observer(&self) -> Arc<dyn RunObserver> {
        Arc::clone(&self.observer)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Extract several top-level files in order and return how many succeeded.
    ///
    /// Cancellation is checked between files; the file in progress always finishes.
    pub async fn extract(
        &self,
        files: &[Utf8PathBuf],
        destination: &Utf8Path,
        password: Option<&str>,
        extract_to_source: bool,
    ) -> usize {
        let total = files.len();
        let mut succeeded = 0;

        for (index, file) in files.iter().enumerate() {
            if self.is_cancelled() {
                log_warn(self.observer.as_ref(), "Extraction cancelled".to_string());
                break;
            }

            let name = file.file_name().unwrap_or(file.as_str());
            self.observer
                .on_progress(name, (index * 100 / total.max(1)) as u8);
            log_info(
                self.observer.as_ref(),
                format!("Processing ({}/{}): {}", index + 1, total, name),
            );

            if self
                .extract_top_level(file, destination, password, extract_to_source)
                .await
            {
                succeeded += 1;
            }
        }

        self.observer.on_progress("done", 100);
        succeeded
    }

    /// Extract one user-selected file.
    ///
    /// The final output directory is `destination`, or the file's own directory when
    /// `extract_to_source` is set. Returns true if the outer archive was decoded; failures
    /// of nested archives below it are logged but do not change the result.
    pub async fn extract_top_level(
        &self,
        file: &Utf8Path,
        destination: &Utf8Path,
        password: Option<&str>,
        extract_to_source: bool,
    ) -> bool {
        let observer = self.observer.as_ref();
        let name = file.file_name().unwrap_or(file.as_str()).to_string();

        let final_output_dir = if extract_to_source {
            match file.parent() {
                Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
                _ => Utf8PathBuf::from("."),
            }
        } else {
            destination.to_path_buf()
        };

        let result = match fs::create_dir_all(&final_output_dir) {
            Ok(()) => {
                let subtree = Subtree {
                    final_output_dir: &final_output_dir,
                    password: password.filter(|p| !p.is_empty()),
                };
                self.extract_one(file, &final_output_dir, 1, subtree).await
            }
            Err(e) => Err(ExtractError::filesystem(&final_output_dir)(e)),
        };

        let success = result.is_ok();
        match result {
            Ok(()) => log_info(observer, format!("[ok] {} -> {}", name, final_output_dir)),
            Err(e) => log_error(observer, format!("[failed] {}: {}", name, e)),
        }

        self.metrics.record_archive(success);
        observer.on_file_result(&name, success);
        success
    }

    /// One extraction frame.
    ///
    /// Scratch space is created in `working_dir`. Nested archives recurse at `depth + 1`
    /// under a child of this frame's scratch directory, so the whole frame is removed
    /// together when it returns.
    fn extract_one<'a>(
        &'a self,
        file: &'a Utf8Path,
        working_dir: &'a Utf8Path,
        depth: u32,
        subtree: Subtree<'a>,
    ) -> ExtractFuture<'a> {
        Box::pin(async move {
            let observer = self.observer.as_ref();
            let name = file.file_name().unwrap_or(file.as_str());

            if depth > self.max_depth {
                log_warn(
                    observer,
                    format!("  [depth] {} is nested too deep ({} > {})", name, depth, self.max_depth),
                );
                return Err(ExtractError::DepthExceeded {
                    depth,
                    max: self.max_depth,
                });
            }

            let sniff = self.sniffer.identify(file);
            if !sniff.is_archive {
                return Err(match sniff.kind {
                    SniffKind::Missing => ExtractError::NotFound(file.to_path_buf()),
                    SniffKind::Empty | SniffKind::TooShort | SniffKind::Unreadable => {
                        ExtractError::EmptyOrTruncated(sniff.reason)
                    }
                    _ => ExtractError::UnrecognizedFormat(sniff.reason),
                });
            }

            fs::create_dir_all(working_dir).map_err(ExtractError::filesystem(working_dir))?;
            let scratch =
                ScratchDir::create(working_dir, depth).map_err(ExtractError::filesystem(working_dir))?;

            let archive = self.sniffer.fix_extension(file, observer);
            if archive.as_path() != file {
                self.metrics.record_extension_fixed();
            }

            log_info(
                observer,
                format!(
                    "{}decoding {} ({}, depth {})",
                    indent(depth),
                    archive.file_name().unwrap_or(archive.as_str()),
                    sniff.format_name,
                    depth
                ),
            );

            let start = Instant::now();
            let decoded = self
                .decoder
                .decode(&archive, scratch.path(), subtree.password)
                .await;
            self.metrics.record_decode_time(start.elapsed());
            decoded?;

            let entries = self.collect_entries(scratch.path())?;
            if entries.is_empty() {
                return Err(ExtractError::NoOutputProduced(archive));
            }

            let mut nested = Vec::new();
            let mut plain = Vec::new();
            for entry in entries {
                let result = self.sniffer.identify(&entry);
                let rel = entry.strip_prefix(scratch.path()).unwrap_or(entry.as_path()).to_string();
                if result.is_archive {
                    log_debug(
                        observer,
                        format!("{}archive: {} ({}; {})", indent(depth), rel, result.format_name, result.reason),
                    );
                    nested.push(entry);
                } else {
                    log_debug(observer, format!("{}file: {} ({})", indent(depth), rel, result.reason));
                    plain.push(entry);
                }
            }

            if !nested.is_empty() {
                let stem = archive.file_stem().unwrap_or("archive");
                let nested_dir = scratch.path().join(format!("{}{}", NESTED_DIR_PREFIX, stem));

                for child in nested {
                    let fixed = self.sniffer.fix_extension(&child, observer);
                    if fixed != child {
                        self.metrics.record_extension_fixed();
                    }
                    let child_name = fixed.file_name().unwrap_or(fixed.as_str()).to_string();

                    let outcome = self.extract_one(&fixed, &nested_dir, depth + 1, subtree).await;
                    match outcome {
                        Ok(()) => {
                            self.metrics.record_nested(true);
                            log_info(observer, format!("{}[ok] nested {}", indent(depth), child_name));
                        }
                        Err(e) => {
                            self.metrics.record_nested(false);
                            log_warn(
                                observer,
                                format!("{}[failed] nested {}: {}, keeping it as a file", indent(depth), child_name, e),
                            );
                            if fixed.symlink_metadata().is_ok() {
                                plain.push(fixed);
                            }
                        }
                    }
                }
            }

            for entry in plain {
                self.merge_entry(&entry, scratch.path(), subtree.final_output_dir, depth);
            }

            Ok(())
        })
    }

    /// Every non-directory entry under `root`, in a stable order.
    fn collect_entries(&self, root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ExtractError> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| ExtractError::Filesystem {
                path: e
                    .path()
                    .and_then(|p| Utf8Path::from_path(p))
                    .unwrap_or(root)
                    .to_path_buf(),
                source: e.into(),
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => entries.push(path),
                Err(path) => log_error(
                    self.observer.as_ref(),
                    format!("  [skipped] non UTF-8 file name: {}", path.display()),
                ),
            }
        }

        Ok(entries)
    }

    fn merge_entry(&self, entry: &Utf8Path, scratch: &Utf8Path, final_output_dir: &Utf8Path, depth: u32) {
        let observer = self.observer.as_ref();
        let Ok(relative) = entry.strip_prefix(scratch) else {
            log_error(observer, format!("  [failed] {} is outside the scratch directory", entry));
            return;
        };

        match merge::move_into(entry, relative, final_output_dir) {
            Ok(outcome) => {
                self.metrics.record_merge(outcome.renamed);
                if outcome.renamed {
                    let new_name = outcome
                        .destination
                        .strip_prefix(final_output_dir)
                        .unwrap_or(outcome.destination.as_path());
                    log_info(
                        observer,
                        format!("{}[renamed] {} -> {}", indent(depth), relative, new_name),
                    );
                }
            }
            Err(e) => log_error(
                observer,
                format!("{}[failed] could not move {}: {}", indent(depth), relative, e),
            ),
        }
    }
}

fn indent(depth: u32) -> String {
    "  ".repeat(depth.saturating_sub(1) as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let parent = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();

        let scratch = ScratchDir::create(&parent, 1).unwrap();
        let path = scratch.path().to_path_buf();
        fs::write(path.join("leftover.bin"), b"x").unwrap();
        assert!(path.file_name().unwrap().starts_with(TEMP_DIR_PREFIX));

        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_indent_grows_with_depth() {
        assert_eq!(indent(1), "  ");
        assert_eq!(indent(3), "      ");
    }
}
