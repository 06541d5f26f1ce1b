//! Collision-resolving moves into a final output directory.
//!
//! Nothing already present at the destination is ever overwritten. A file that would land on
//! an existing entry becomes `stem_1.ext`, `stem_2.ext`, ...; a path that would land on an
//! existing directory becomes `name_1`, `name_2`, ....

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Where a merged entry ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub destination: Utf8PathBuf,
    /// True if a collision forced a suffixed name
    pub renamed: bool,
}

/// First free `stem_N.ext` next to `target` (N starts at 1).
pub fn next_free_file_name(target: &Utf8Path) -> Utf8PathBuf {
    let parent = target.parent().unwrap_or(Utf8Path::new(""));
    let stem = target.file_stem().unwrap_or_default();
    let ext = target.extension();

    (1u64..)
        .map(|n| match ext {
            Some(ext) => parent.join(format!("{}_{}.{}", stem, n, ext)),
            None => parent.join(format!("{}_{}", stem, n)),
        })
        .find(|candidate| !exists(candidate))
        .unwrap_or_else(|| target.to_path_buf())
}

/// First free `name_N` next to `target` (N starts at 1).
pub fn next_free_dir_name(target: &Utf8Path) -> Utf8PathBuf {
    let parent = target.parent().unwrap_or(Utf8Path::new(""));
    let name = target.file_name().unwrap_or_default();

    (1u64..)
        .map(|n| parent.join(format!("{}_{}", name, n)))
        .find(|candidate| !exists(candidate))
        .unwrap_or_else(|| target.to_path_buf())
}

// Dangling symlinks count as occupied.
fn exists(path: &Utf8Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Move `source` to `final_output_dir/relative`, resolving collisions.
///
/// Missing parent directories are created. A parent component blocked by a plain file is
/// redirected to the first `name_N` that is free or already a directory, so entries sharing
/// that parent stay together. The source is consumed on success.
pub fn move_into(
    source: &Utf8Path,
    relative: &Utf8Path,
    final_output_dir: &Utf8Path,
) -> io::Result<MergeOutcome> {
    let mut parent = final_output_dir.to_path_buf();
    let mut renamed = false;
    if let Some(dirs) = relative.parent() {
        for component in dirs.iter() {
            let candidate = parent.join(component);
            parent = if exists(&candidate) && !candidate.is_dir() {
                renamed = true;
                redirect_blocked_dir(&candidate)
            } else {
                candidate
            };
        }
    }
    ensure_dir(&parent)?;

    let target = match relative.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    };
    let destination = if target.is_dir() {
        renamed = true;
        next_free_dir_name(&target)
    } else if exists(&target) {
        renamed = true;
        next_free_file_name(&target)
    } else {
        target
    };

    move_path(source, &destination)?;

    Ok(MergeOutcome {
        destination,
        renamed,
    })
}

/// First `name_N` next to `blocked` that is free or an existing directory.
fn redirect_blocked_dir(blocked: &Utf8Path) -> Utf8PathBuf {
    let parent = blocked.parent().unwrap_or(Utf8Path::new(""));
    let name = blocked.file_name().unwrap_or_default();

    (1u64..)
        .map(|n| parent.join(format!("{}_{}", name, n)))
        .find(|candidate| candidate.is_dir() || !exists(candidate))
        .unwrap_or_else(|| blocked.to_path_buf())
}

/// Create `dir` and its parents.
fn ensure_dir(dir: &Utf8Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)
}

fn move_path(source: &Utf8Path, destination: &Utf8Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("Cross-device move, copying {} -> {}", source, destination);
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
        Err(e) => Err(e),
    }
}
