//! Archive format detection by content, with extension fallback.
//!
//! Classification order for [`FormatSniffer::identify`]:
//! 1. Missing, empty, unreadable or shorter-than-4-byte files are rejected with distinct kinds
//! 2. The first 16 bytes are matched against [`SIGNATURES`], in table order
//! 3. Without a signature match, the extension is checked against archive, volume and
//!    known non-archive tables
//! 4. Anything else is reported as an unknown format
//!
//! Content always wins over the extension: a ZIP named `report.txt` is an archive.

use crate::services::{log_info, log_warn};
use crate::state::RunObserver;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{self, Read};

/// Number of header bytes read for signature matching.
pub const HEADER_LEN: usize = 16;

/// Minimum number of header bytes needed before any classification is attempted.
pub const MIN_HEADER_LEN: usize = 4;

/// One entry of the magic-number table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Bytes the file must start with
    pub magic: &'static [u8],
    /// Extra bytes required at a fixed offset (e.g. the `ftyp` box of MP4)
    pub marker: Option<(usize, &'static [u8])>,
    pub format: &'static str,
    /// Canonical extension, without the dot
    pub extension: &'static str,
    pub is_archive: bool,
}

impl Signature {
    const fn archive(magic: &'static [u8], format: &'static str, extension: &'static str) -> Self {
        Self {
            magic,
            marker: None,
            format,
            extension,
            is_archive: true,
        }
    }

    const fn other(magic: &'static [u8], format: &'static str, extension: &'static str) -> Self {
        Self {
            magic,
            marker: None,
            format,
            extension,
            is_archive: false,
        }
    }

    pub fn matches(&self, header: &[u8]) -> bool {
        if !header.starts_with(self.magic) {
            return false;
        }
        match self.marker {
            Some((offset, bytes)) => header
                .get(offset..offset + bytes.len())
                .is_some_and(|window| window == bytes),
            None => true,
        }
    }
}

/// Known signatures, checked in order. Longer prefixes sharing a stem come first.
pub const SIGNATURES: &[Signature] = &[
    Signature::archive(b"PK\x03\x04", "ZIP", "zip"),
    Signature::archive(b"PK\x05\x06", "ZIP", "zip"),
    Signature::archive(b"PK\x07\x08", "ZIP", "zip"),
    Signature::archive(b"Rar!\x1A\x07\x01\x00", "RAR v5", "rar"),
    Signature::archive(b"Rar!\x1A\x07\x00", "RAR", "rar"),
    Signature::archive(b"Rar!", "RAR", "rar"),
    Signature::archive(b"7z\xBC\xAF\x27\x1C", "7Z", "7z"),
    Signature::archive(b"\x1F\x8B", "GZIP", "gz"),
    Signature::archive(b"BZh", "BZIP2", "bz2"),
    Signature::archive(b"\xFD7zXZ\x00", "XZ", "xz"),
    Signature::other(b"%PDF", "PDF", "pdf"),
    Signature::other(b"ID3", "MP3", "mp3"),
    Signature::other(b"P3R3", "MP3", "mp3"),
    // A zero run alone is ambiguous; only an ISO-BMFF `ftyp` box makes it MP4.
    Signature {
        magic: b"\x00\x00\x00",
        marker: Some((4, b"ftyp".as_slice())),
        format: "MP4",
        extension: "mp4",
        is_archive: false,
    },
    Signature::other(b"\xFF\xD8\xFF", "JPEG", "jpg"),
    Signature::other(b"\x89PNG\r\n\x1A\n", "PNG", "png"),
    Signature::other(b"GIF8", "GIF", "gif"),
];

/// Archive extensions, with the format they imply when content is not recognized.
pub const ARCHIVE_EXTENSIONS: &[(&str, &str)] = &[
    ("zip", "ZIP"),
    ("rar", "RAR"),
    ("7z", "7Z"),
    ("tar", "TAR"),
    ("gz", "GZIP"),
    ("bz2", "BZIP2"),
    ("xz", "XZ"),
];

/// Common extensions that positively rule out archive status.
pub const NON_ARCHIVE_EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "Text"),
    ("doc", "Word"),
    ("docx", "Word"),
    ("xls", "Excel"),
    ("xlsx", "Excel"),
    ("ppt", "PowerPoint"),
    ("pdf", "PDF"),
    ("jpg", "JPEG"),
    ("jpeg", "JPEG"),
    ("png", "PNG"),
    ("gif", "GIF"),
    ("bmp", "BMP"),
    ("mp3", "MP3"),
    ("mp4", "MP4"),
    ("avi", "AVI"),
    ("mkv", "MKV"),
    ("flv", "FLV"),
    ("wmv", "WMV"),
    ("exe", "Executable"),
    ("dll", "Dynamic library"),
    ("iso", "ISO image"),
    ("img", "IMG image"),
];

/// Format name used for multi-volume members recognized by extension only.
pub const VOLUME_FORMAT: &str = "Multi-volume";

/// How a [`SniffResult`] was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffKind {
    Missing,
    Empty,
    TooShort,
    Unreadable,
    /// Matched a magic number
    Content,
    /// Recognized archive extension, content not recognized
    Extension,
    /// Numeric multi-volume extension
    Volume,
    /// Known non-archive extension
    NonArchiveExtension,
    Unknown,
}

/// Classification of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffResult {
    pub is_archive: bool,
    pub format_name: String,
    pub reason: String,
    pub kind: SniffKind,
    /// Extension the content calls for, when a signature matched
    pub canonical_extension: Option<&'static str>,
    /// Content and extension disagree
    pub extension_mismatch: bool,
}

impl SniffResult {
    fn rejected(kind: SniffKind, reason: String) -> Self {
        Self {
            is_archive: false,
            format_name: String::new(),
            reason,
            kind,
            canonical_extension: None,
            extension_mismatch: false,
        }
    }
}

/// Lowercased extension of `path`, without the dot.
fn extension_of(path: &Utf8Path) -> String {
    path.extension().map(str::to_ascii_lowercase).unwrap_or_default()
}

fn display_extension(ext: &str) -> String {
    if ext.is_empty() {
        "(none)".to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Three-digit numeric extensions such as `.001` mark one part of a split archive.
pub fn is_volume_extension(ext: &str) -> bool {
    ext.len() == 3 && ext.bytes().all(|b| b.is_ascii_digit())
}

/// Extensions that are already good enough to hand to the decoder.
pub fn is_recognized_archive_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS.iter().any(|(e, _)| *e == ext) || is_volume_extension(&ext)
}

/// Read up to [`HEADER_LEN`] bytes from the start of `path`.
pub fn read_header(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    File::open(path)?
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

/// Content-based archive detection and extension repair.
///
/// Stateless apart from its signature table; every call reads the file afresh.
#[derive(Debug, Clone)]
pub struct FormatSniffer {
    signatures: &'static [Signature],
}

impl FormatSniffer {
    pub fn new() -> Self {
        Self {
            signatures: SIGNATURES,
        }
    }

    /// Use a custom signature table instead of [`SIGNATURES`].
    pub fn with_signatures(signatures: &'static [Signature]) -> Self {
        Self { signatures }
    }

    /// First signature matching `header`, in table order.
    pub fn match_signature(&self, header: &[u8]) -> Option<&'static Signature> {
        self.signatures.iter().find(|sig| sig.matches(header))
    }

    /// Classify `path` as archive or non-archive.
    ///
    /// Never fails: I/O problems are reported through [`SniffKind`] and the reason string.
    pub fn identify(&self, path: &Utf8Path) -> SniffResult {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return SniffResult::rejected(SniffKind::Missing, "file does not exist".to_string());
            }
            Err(e) => {
                return SniffResult::rejected(
                    SniffKind::Unreadable,
                    format!("cannot stat file: {}", e),
                );
            }
        };

        if size == 0 {
            return SniffResult::rejected(SniffKind::Empty, "file is 0 bytes".to_string());
        }

        let header = match read_header(path) {
            Ok(header) => header,
            Err(e) => {
                return SniffResult::rejected(
                    SniffKind::Unreadable,
                    format!("cannot read file header: {}", e),
                );
            }
        };

        if header.len() < MIN_HEADER_LEN {
            return SniffResult::rejected(
                SniffKind::TooShort,
                format!("file header too short ({} bytes)", header.len()),
            );
        }

        let current_ext = extension_of(path);

        // 1. Content
        if let Some(sig) = self.match_signature(&header) {
            let mismatch = sig.is_archive && current_ext != sig.extension;
            let reason = if !sig.is_archive {
                format!("content identifies {}, not an archive", sig.format)
            } else if mismatch {
                format!(
                    "content identifies {}, but extension is {}",
                    sig.format,
                    display_extension(&current_ext)
                )
            } else {
                format!("content identifies {}", sig.format)
            };
            return SniffResult {
                is_archive: sig.is_archive,
                format_name: sig.format.to_string(),
                reason,
                kind: SniffKind::Content,
                canonical_extension: Some(sig.extension),
                extension_mismatch: mismatch,
            };
        }

        // 2. Archive extension without a recognizable header
        if let Some((_, format)) = ARCHIVE_EXTENSIONS.iter().find(|(e, _)| *e == current_ext) {
            return SniffResult {
                is_archive: true,
                format_name: format.to_string(),
                reason: format!(
                    "extension is .{} but the header is not recognized (damaged or encrypted archive?)",
                    current_ext
                ),
                kind: SniffKind::Extension,
                canonical_extension: None,
                extension_mismatch: false,
            };
        }

        // 3. Split archive member
        if is_volume_extension(&current_ext) {
            return SniffResult {
                is_archive: true,
                format_name: VOLUME_FORMAT.to_string(),
                reason: format!("extension is .{}, likely one volume of a split archive", current_ext),
                kind: SniffKind::Volume,
                canonical_extension: None,
                extension_mismatch: false,
            };
        }

        // 4. Known non-archive
        if let Some((_, format)) = NON_ARCHIVE_EXTENSIONS.iter().find(|(e, _)| *e == current_ext) {
            return SniffResult {
                is_archive: false,
                format_name: format.to_string(),
                reason: format!("extension is .{}, identified as {}", current_ext, format),
                kind: SniffKind::NonArchiveExtension,
                canonical_extension: None,
                extension_mismatch: false,
            };
        }

        SniffResult {
            is_archive: false,
            format_name: "unknown format".to_string(),
            reason: format!(
                "unrecognized format (extension: {}, size: {} bytes)",
                display_extension(&current_ext),
                size
            ),
            kind: SniffKind::Unknown,
            canonical_extension: None,
            extension_mismatch: false,
        }
    }

    /// Give a confirmed archive the extension its content calls for.
    ///
    /// Files that [`identify`](Self::identify) does not confirm as archives are never
    /// renamed. Rename failures are logged and the original path is returned.
    pub fn fix_extension(&self, path: &Utf8Path, observer: &dyn RunObserver) -> Utf8PathBuf {
        let name = path.file_name().unwrap_or(path.as_str());
        let result = self.identify(path);

        if !result.is_archive {
            log_info(
                observer,
                format!("  [keep name] not an archive: {} ({})", name, result.reason),
            );
            return path.to_path_buf();
        }

        if is_recognized_archive_extension(&extension_of(path)) {
            return path.to_path_buf();
        }

        let header = match read_header(path) {
            Ok(header) => header,
            Err(e) => {
                log_warn(observer, format!("  [warning] cannot read header of {}: {}", name, e));
                return path.to_path_buf();
            }
        };

        let Some(sig) = self.match_signature(&header).filter(|sig| sig.is_archive) else {
            log_info(
                observer,
                format!("  [keep name] {}: header not recognized, extension left as is", name),
            );
            return path.to_path_buf();
        };

        let new_path = path.with_extension(sig.extension);
        if new_path.exists() {
            log_warn(
                observer,
                format!(
                    "  [warning] cannot rename {} to .{}: {} already exists",
                    name, sig.extension, new_path
                ),
            );
            return path.to_path_buf();
        }

        match fs::rename(path, &new_path) {
            Ok(()) => {
                log_info(
                    observer,
                    format!("  fixed extension: {} -> .{} ({})", name, sig.extension, sig.format),
                );
                new_path
            }
            Err(e) => {
                log_warn(observer, format!("  [warning] rename of {} failed: {}", name, e));
                path.to_path_buf()
            }
        }
    }
}

impl Default for FormatSniffer {
    fn default() -> Self {
        Self::new()
    }
}
