use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prcov::cli::{self, CheckOptions, Style};
use prcov::detect::Format;
use prcov::diff::{PullRequestChangeSource, UnifiedDiff};
use prcov::github::{Context, PullRequestComment, PullRequestFiles};
use prcov::normalize::Normalizer;
use prcov::report::{MarkdownFormatter, ReportSink, StdoutSink};

/// prcov — test coverage of the lines changed in a pull request.
#[derive(Parser)]
#[command(name = "prcov", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute diff coverage and fail when it is below the threshold.
    Check {
        /// Path to the coverage file (lcov `.info` or Istanbul `.json`).
        coverage: PathBuf,

        /// Override format detection (lcov, istanbul).
        #[arg(long)]
        format: Option<Format>,

        /// Directory stripped from absolute Istanbul paths
        /// (default: current directory).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Minimum diff coverage percentage required to pass.
        #[arg(long, env = "PRCOV_THRESHOLD", default_value_t = 80.0)]
        threshold: f64,

        /// Path prefix to prepend to diff paths for matching against
        /// coverage data paths.
        #[arg(long)]
        path_prefix: Option<String>,

        #[command(flatten)]
        diff: DiffArgs,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,

        /// Post (or update) the report as a pull request comment. Requires
        /// the GitHub Actions environment.
        #[arg(long)]
        comment: bool,
    },

    /// Print the changed lines of each file in a diff.
    Changed {
        #[command(flatten)]
        diff: DiffArgs,
    },
}

/// Where the changed files come from. Reads a unified diff from stdin
/// when none is given.
#[derive(Args)]
#[group(multiple = false)]
struct DiffArgs {
    /// Read a unified diff from this file.
    #[arg(long)]
    diff_file: Option<PathBuf>,

    /// Git diff arguments, e.g. "origin/main...HEAD".
    #[arg(long)]
    git_diff: Option<String>,

    /// Fetch the pull request's files from the GitHub API
    /// (GITHUB_TOKEN, GITHUB_REPOSITORY, GITHUB_REF).
    #[arg(long)]
    github: bool,
}

impl DiffArgs {
    fn source(&self) -> Result<Box<dyn PullRequestChangeSource>> {
        if self.github {
            return Ok(Box::new(PullRequestFiles::from_env()?));
        }
        let diff = match (&self.diff_file, &self.git_diff) {
            (Some(path), _) => UnifiedDiff::from_file(path)?,
            (None, Some(args)) => UnifiedDiff::from_git(args)?,
            (None, None) => UnifiedDiff::from_stdin()?,
        };
        Ok(Box::new(diff))
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Check {
            coverage,
            format,
            root,
            threshold,
            path_prefix,
            diff,
            style,
            comment,
        } => {
            let normalizer = Normalizer::default().with_format(format).with_root(root);
            let source = diff.source()?;
            let options = CheckOptions {
                threshold,
                path_prefix,
                style,
            };

            let outcome = cli::cmd_check(&normalizer, &coverage, source.as_ref(), &options)?;
            StdoutSink.publish(&outcome.output)?;

            if comment {
                // Comments are always Markdown, whatever the stdout style.
                let sink = PullRequestComment {
                    context: Context::from_env()?,
                };
                sink.publish(&outcome.report.format(&MarkdownFormatter))?;
            }

            Ok(if outcome.report.verdict().passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Changed { diff } => {
            let source = diff.source()?;
            StdoutSink.publish(&cli::cmd_changed(source.as_ref())?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
