use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;

/// Exit codes both tool families use for success (1 = success with warnings).
pub const SUCCESS_EXIT_CODES: &[i32] = &[0, 1];

/// RAR tools report a bad password with this exit code.
pub const RAR_BAD_PASSWORD_EXIT_CODE: i32 = 11;

/// Executables searched on `PATH`, in order of preference.
pub const DECODER_CANDIDATES: &[&str] = &["winrar", "unrar", "rar", "7z", "7zz", "7za"];

/// Usual WinRAR install locations.
pub const COMMON_WINRAR_PATHS: &[&str] = &[
    r"C:\Program Files\WinRAR\WinRAR.exe",
    r"C:\Program Files (x86)\WinRAR\WinRAR.exe",
    r"C:\WinRAR\WinRAR.exe",
    r"D:\Program Files\WinRAR\WinRAR.exe",
    r"D:\Program Files (x86)\WinRAR\WinRAR.exe",
    r"D:\WinRAR\WinRAR.exe",
];

/// Errors reported by an [`ExternalDecoder`]
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no archive decoder found (looked for {0})")]
    MissingBinary(String),

    #[error("failed to start decoder {program}: {source}")]
    Spawn {
        program: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("decoder exited with code {code}{detail}")]
    ExitStatus { code: i32, detail: String },

    #[error("wrong or missing password (decoder exit code {code})")]
    WrongPassword { code: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The tool that turns an archive into files.
///
/// Implementations extract `archive` completely into `output_dir`, creating it if needed.
/// Any error is final for that attempt: callers do not retry with another password or tool.
pub trait ExternalDecoder: Send + Sync {
    fn decode(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        password: Option<&str>,
    ) -> impl Future<Output = Result<(), DecodeError>> + Send;
}

/// Command-line family of a decoder executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    /// WinRAR, unrar, rar
    Rar,
    /// 7z, 7za, 7zz
    SevenZip,
}

impl DecoderKind {
    /// Guess the family from the executable name.
    pub fn from_program(program: &Utf8Path) -> Self {
        let stem = program.file_stem().unwrap_or_default().to_ascii_lowercase();
        if stem.starts_with("7z") {
            DecoderKind::SevenZip
        } else {
            DecoderKind::Rar
        }
    }
}

/// [`ExternalDecoder`] backed by a WinRAR/unrar or 7-Zip subprocess.
///
/// The process runs to completion; no timeout is applied.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: Utf8PathBuf,
    kind: DecoderKind,

    /// Matches tool output that indicates a bad password
    wrong_password_pattern: Regex,
}

impl CommandDecoder {
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        let program = program.into();
        let kind = DecoderKind::from_program(&program);
        Self {
            program,
            kind,
            wrong_password_pattern: Regex::new(
                r"(?i)wrong password|password is incorrect|incorrect password|encrypted file.*(corrupt|wrong)",
            )
            .expect("Invalid wrong-password regex"),
        }
    }

    /// Find a decoder executable.
    ///
    /// An explicitly configured path that exists wins. Otherwise `PATH` is searched for
    /// [`DECODER_CANDIDATES`], then the usual WinRAR install locations.
    pub fn locate(configured: Option<&Utf8Path>) -> Result<Self, DecodeError> {
        if let Some(path) = configured.filter(|p| !p.as_str().is_empty()) {
            if path.exists() {
                tracing::info!("Using configured decoder: {}", path);
                return Ok(Self::new(path));
            }
            tracing::warn!("Configured decoder not found: {}, searching", path);
        }

        for name in DECODER_CANDIDATES {
            if let Ok(found) = which::which(name) {
                match Utf8PathBuf::from_path_buf(found) {
                    Ok(path) => {
                        tracing::info!("Found decoder on PATH: {}", path);
                        return Ok(Self::new(path));
                    }
                    Err(path) => {
                        tracing::debug!("Skipping non-UTF-8 decoder path: {}", path.display());
                    }
                }
            }
        }

        let mut install_paths: Vec<Utf8PathBuf> =
            COMMON_WINRAR_PATHS.iter().map(|p| Utf8PathBuf::from(*p)).collect();
        for var in ["ProgramFiles", "ProgramFiles(x86)"] {
            if let Ok(root) = std::env::var(var) {
                install_paths.push(Utf8PathBuf::from(root).join("WinRAR").join("WinRAR.exe"));
            }
        }

        if let Some(path) = install_paths.into_iter().find(|p| p.exists()) {
            tracing::info!("Found decoder at install location: {}", path);
            return Ok(Self::new(path));
        }

        Err(DecodeError::MissingBinary(DECODER_CANDIDATES.join(", ")))
    }

    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    pub fn kind(&self) -> DecoderKind {
        self.kind
    }

    /// Build the argument list for one extraction.
    ///
    /// A password switch is always passed so the tool never stops to prompt for one.
    pub fn build_args(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        password: Option<&str>,
    ) -> Vec<String> {
        match self.kind {
            DecoderKind::Rar => {
                let mut args = vec![
                    "x".to_string(),
                    "-y".to_string(),
                    "-o+".to_string(),
                    "-inul".to_string(),
                ];
                match password {
                    Some(pw) => args.push(format!("-p{}", pw)),
                    None => args.push("-p-".to_string()),
                }
                args.push(archive.to_string());
                // Trailing separator marks the target as a directory
                args.push(format!("{}{}", output_dir, std::path::MAIN_SEPARATOR));
                args
            }
            DecoderKind::SevenZip => vec![
                "x".to_string(),
                "-y".to_string(),
                format!("-p{}", password.unwrap_or_default()),
                format!("-o{}", output_dir),
                archive.to_string(),
            ],
        }
    }

    /// Map a finished process to a result.
    pub fn interpret_exit(&self, code: i32, output: &str) -> Result<(), DecodeError> {
        if SUCCESS_EXIT_CODES.contains(&code) {
            return Ok(());
        }

        if (self.kind == DecoderKind::Rar && code == RAR_BAD_PASSWORD_EXIT_CODE)
            || self.wrong_password_pattern.is_match(output)
        {
            return Err(DecodeError::WrongPassword { code });
        }

        let detail = output.trim();
        let detail = if detail.is_empty() {
            String::new()
        } else {
            format!(": {}", detail)
        };
        Err(DecodeError::ExitStatus { code, detail })
    }
}

fn redact(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.starts_with("-p") && a != "-p-" && a.len() > 2 {
                "-p***".to_string()
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl ExternalDecoder for CommandDecoder {
    async fn decode(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        password: Option<&str>,
    ) -> Result<(), DecodeError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let args = self.build_args(archive, output_dir, password);
        tracing::debug!("Executing: {} {}", self.program, redact(&args));

        let start = Instant::now();

        let mut cmd = Command::new(self.program.as_std_path());
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW
            cmd.creation_flags(0x0800_0000);
        }

        let output = cmd.output().await.map_err(|source| DecodeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        tracing::info!(
            "Decoder finished {} in {:.2}s with exit code {}",
            archive,
            start.elapsed().as_secs_f32(),
            exit_code
        );

        let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stdout));

        self.interpret_exit(exit_code, &text)
    }
}
