use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Environment variable carrying the project config path to a forked child.
pub const CONFIG_ENV: &str = "FPACK_CONFIG";
/// Environment variable carrying the boot timeout to a forked child.
pub const BOOT_TIMEOUT_ENV: &str = "FPACK_BOOT_TIMEOUT_SECS";

#[derive(Parser)]
#[command(name = "fpack")]
#[command(version)]
#[command(about = "Generate server configurations and diff them back as features", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project config file (default: ./fpack.toml when present)
    #[arg(long, global = true, env = CONFIG_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate configurations by replaying a plan in an embedded server
    Generate(GenerateArgs),

    /// Read configuration files as features and diff them against a baseline
    Diff(DiffArgs),

    /// Replay a script in an embedded server (used by forked generation)
    #[command(hide = true)]
    ExecScript {
        /// Server installation root
        home: PathBuf,

        /// Script file to replay
        script: PathBuf,

        /// Seconds to wait for boot; 0 does not wait
        #[arg(long, env = BOOT_TIMEOUT_ENV, value_name = "SECS")]
        boot_timeout: Option<u64>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by commands that start an embedded server.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Server installation root (overrides [installation] home)
    #[arg(long, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Seconds to wait for boot; 0 does not wait (default: wait forever)
    #[arg(long, env = BOOT_TIMEOUT_ENV, value_name = "SECS")]
    pub boot_timeout: Option<u64>,

    /// System properties file; each entry becomes a -Dkey=value startup argument.
    /// Values may not contain ',' with --forked or --dry-run
    #[arg(long = "properties", value_name = "FILE")]
    pub properties: Vec<PathBuf>,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Generation plan (JSON)
    #[arg(long, value_name = "FILE")]
    pub plan: PathBuf,

    #[command(flatten)]
    pub server: ServerArgs,

    /// Run the embedded server in a forked child process
    #[arg(long)]
    pub forked: bool,

    /// Print the script a forked child would replay, without starting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Configuration files to read (standalone, domain or host XML)
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Feature-pack layout directory holding spec.json files
    #[arg(long, value_name = "DIR")]
    pub specs: PathBuf,

    /// Previously provisioned state (JSON); missing means empty
    #[arg(long, value_name = "FILE")]
    pub baseline: Option<PathBuf>,

    /// Write the diff as JSON
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Store the read configs in the baseline file
    #[arg(long, requires = "baseline")]
    pub update_baseline: bool,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_script_takes_two_positionals() {
        let cli = Cli::try_parse_from(["fpack", "exec-script", "/opt/server", "/tmp/script.txt"]).unwrap();
        match cli.command {
            Command::ExecScript { home, script, .. } => {
                assert_eq!(home, PathBuf::from("/opt/server"));
                assert_eq!(script, PathBuf::from("/tmp/script.txt"));
            }
            _ => panic!("expected exec-script"),
        }
        assert!(Cli::try_parse_from(["fpack", "exec-script", "/opt/server"]).is_err());
        assert!(Cli::try_parse_from(["fpack", "exec-script", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_generate_args() {
        let cli = Cli::try_parse_from([
            "fpack",
            "-vv",
            "generate",
            "--plan",
            "plan.json",
            "--boot-timeout",
            "0",
            "--properties",
            "a.properties",
            "--properties",
            "b.properties",
            "--forked",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.server.boot_timeout, Some(0));
                assert_eq!(args.server.properties.len(), 2);
                assert!(args.forked);
                assert!(!args.dry_run);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_diff_requires_files_and_baseline_for_update() {
        assert!(Cli::try_parse_from(["fpack", "diff", "--specs", "layout"]).is_err());
        assert!(Cli::try_parse_from(["fpack", "diff", "standalone.xml", "--specs", "layout", "--update-baseline"]).is_err());
        let cli = Cli::try_parse_from([
            "fpack",
            "diff",
            "standalone.xml",
            "host.xml",
            "--specs",
            "layout",
            "--baseline",
            "state.json",
            "--update-baseline",
        ])
        .unwrap();
        match cli.command {
            Command::Diff(args) => assert_eq!(args.files.len(), 2),
            _ => panic!("expected diff"),
        }
    }
}
