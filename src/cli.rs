use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Recursively extract archives and flatten nested archives into one folder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding unnest.yaml and the logs folder
    #[arg(long, global = true, default_value = "unnest-data")]
    pub config_dir: Utf8PathBuf,

    /// Debug-level logging
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    /// Path to WinRAR/unrar/7-Zip (overrides the configured and discovered decoder)
    #[arg(long, global = true)]
    pub decoder: Option<Utf8PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract archives, including archives nested inside them
    Extract(ExtractArgs),

    /// Run every task in a YAML task file
    Run {
        /// Task file (list of tasks, or a mapping with a `tasks` key)
        tasks: Utf8PathBuf,

        /// Maximum nesting depth, counting the outermost archive
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Show how each file is classified, without touching it
    Identify {
        #[arg(required = true)]
        files: Vec<Utf8PathBuf>,
    },

    /// Manage saved passwords
    Passwords {
        #[command(subcommand)]
        action: PasswordAction,
    },
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Archives to extract, in order
    #[arg(required = true)]
    pub files: Vec<Utf8PathBuf>,

    /// Destination directory (defaults to the configured output_dir)
    #[arg(short, long, conflicts_with = "to_source")]
    pub output: Option<Utf8PathBuf>,

    /// Extract every archive next to itself
    #[arg(long, default_value_t = false)]
    pub to_source: bool,

    /// Password for the archives and everything nested in them
    #[arg(short, long)]
    pub password: Option<String>,

    /// Maximum nesting depth, counting the outermost archive
    #[arg(long)]
    pub max_depth: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum PasswordAction {
    /// Print saved passwords in order
    List,
    /// Save a password
    Add { password: String },
    /// Forget a password
    Remove { password: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "unnest", "extract", "a.zip", "b.rar", "-o", "out", "-p", "pw", "--max-depth", "3",
        ])
        .unwrap();

        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.output.as_deref().map(|p| p.as_str()), Some("out"));
        assert_eq!(args.password.as_deref(), Some("pw"));
        assert_eq!(args.max_depth, Some(3));
        assert_eq!(cli.config_dir, "unnest-data");
    }

    #[test]
    fn test_output_conflicts_with_to_source() {
        let result =
            Cli::try_parse_from(["unnest", "extract", "a.zip", "-o", "out", "--to-source"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "unnest", "identify", "x.bin", "--debug", "--decoder", "/usr/bin/7z",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.decoder.unwrap(), "/usr/bin/7z");
    }

    #[test]
    fn test_passwords_subcommand() {
        let cli = Cli::try_parse_from(["unnest", "passwords", "add", "hunter2"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Passwords { action: PasswordAction::Add { ref password } } if password == "hunter2"
        ));
    }
}
