use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing_subscriber::EnvFilter;

use stagedrift_core::{DriftConfig, OutputFormat, Reference};
use stagedrift_engine::{report, Comparator, Comparison, ComparisonSummary};

#[derive(Parser)]
#[command(
    name = "stagedrift",
    version,
    about = "Data drift risk between two points of a pipeline's git history",
    long_about = "stagedrift compares the files every stage of a data pipeline declares\n\
                   (dvc.yaml deps and outs) between two commits or branches, scores how\n\
                   far each dataset drifted and how much each script changed, and writes\n\
                   a JSON report per comparison.\n\n\
                   Examples:\n  \
                     stagedrift branches main            Compare main (old) with HEAD (new)\n  \
                     stagedrift branches feature main    Compare main (old) with feature (new)\n  \
                     stagedrift commits a1b2c3 d4e5f6    Compare d4e5f6 (old) with a1b2c3 (new)\n  \
                     stagedrift history --count 5        Compare each of the last 5 commits\n  \
                     stagedrift show output/a1b2c3.json  Summarize a saved report"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .stagedrift.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable tables and summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Repository to analyze (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Compare the heads of two branches
    #[command(long_about = "Compare the heads of two branches.\n\n\
        BASE is the baseline (old side), SOURCE the compared branch (new side,\n\
        default HEAD). The report is named after SOURCE's head commit.\n\n\
        Examples:\n  stagedrift branches main\n  stagedrift branches feature/dedupe main --output reports")]
    Branches {
        /// [SOURCE] BASE: compared branch (new side, default HEAD), then baseline branch
        #[arg(required = true, num_args = 1..=2, value_names = ["SOURCE", "BASE"])]
        branches: Vec<String>,
        /// Report directory (default: [output] dir from config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compare two commits
    #[command(long_about = "Compare two commits.\n\n\
        BASE is the baseline (old side), SOURCE the compared commit (new side).\n\
        The report is written to <output>/<SOURCE>.json.\n\n\
        Example:\n  stagedrift commits 4f1c2e9 9ab03d1")]
    Commits {
        /// Compared commit (new side)
        source: String,
        /// Baseline commit (old side)
        base: String,
        /// Report directory (default: [output] dir from config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compare each consecutive pair of recent commits
    #[command(long_about = "Compare each consecutive pair of recent commits.\n\n\
        Walks the last COUNT commits oldest to newest and writes one report per\n\
        newer commit. A pair that fails is reported and skipped.\n\n\
        Example:\n  stagedrift history --count 10")]
    History {
        /// Number of recent commits to walk
        #[arg(long, default_value = "5")]
        count: usize,
        /// Report directory (default: [output] dir from config)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Summarize a saved report
    Show {
        /// Report file written by a previous comparison
        report: PathBuf,
    },
    /// Create a default .stagedrift.toml configuration file
    #[command(long_about = "Create a default .stagedrift.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .stagedrift.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# stagedrift configuration

[pipeline]
# spec_file = "dvc.yaml"
# code_suffix = ".py"

# Drift risk weights, must sum to 1
[risk]
# rows = 0.2
# columns = 0.2
# duplicates = 0.4
# nulls = 0.2

[cache]
# enabled = true
# command = ["dvc", "pull"]

[tools]
# git = "git"
# timeout_secs = 600

[output]
# dir = "output"
"#;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<DriftConfig> {
    match path {
        Some(path) => DriftConfig::from_file(path)
            .wrap_err_with(|| format!("Failed to load {}", path.display())),
        None => {
            let default_path = Path::new(".stagedrift.toml");
            if default_path.exists() {
                Ok(DriftConfig::from_file(default_path)?)
            } else {
                Ok(DriftConfig::default())
            }
        }
    }
}

fn ensure_git_repo(path: &Path) -> Result<()> {
    if !path.join(".git").exists() && git2::Repository::discover(path).is_err() {
        miette::bail!(miette::miette!(
            help = "Run stagedrift from inside a git repository, or specify --repo to one",
            "Not a git repository: {}",
            path.display()
        ));
    }
    Ok(())
}

fn spinner(message: &str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

fn print_summary(summary: &ComparisonSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", summary.to_markdown()),
        OutputFormat::Text => print!("{summary}"),
    }
    Ok(())
}

fn print_comparison(comparison: &Comparison, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "old": comparison.old,
                "new": comparison.new,
                "reportPath": comparison.report_path,
                "summary": comparison.summary,
                "result": comparison.result,
            });
            println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!(
                "_{} → {}_\n",
                comparison.old.short(),
                comparison.new.short()
            );
            print!("{}", comparison.summary.to_markdown());
            println!("\nReport: `{}`", comparison.report_path.display());
        }
        OutputFormat::Text => {
            println!(
                "Comparing {} (old) with {} (new)\n",
                comparison.old.short(),
                comparison.new.short()
            );
            print!("{}", comparison.summary);
            println!("Report: {}", comparison.report_path.display());
        }
    }
    Ok(())
}

fn run_with_spinner<T>(message: &str, job: impl FnOnce() -> Result<T>) -> Result<T> {
    let pb = spinner(message);
    let outcome = job();
    if let Some(pb) = pb {
        match &outcome {
            Ok(_) => pb.finish_and_clear(),
            Err(_) => pb.finish_with_message("Failed"),
        }
    }
    outcome
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(format = %cli.format, repo = %cli.repo.display(), "starting");

    match cli.command {
        Command::Branches {
            ref branches,
            ref output,
        } => {
            let (source, base) = match branches.as_slice() {
                [base] => ("HEAD", base.as_str()),
                [source, base] => (source.as_str(), base.as_str()),
                _ => miette::bail!("Expected [SOURCE] BASE"),
            };
            ensure_git_repo(&cli.repo)?;
            let output = output.clone().unwrap_or_else(|| config.output.dir.clone());
            let comparator = Comparator::from_config(config);
            let comparison = run_with_spinner(&format!("Comparing {base} with {source}..."), || {
                Ok(comparator.compare_branches(&cli.repo, base, source, &output)?)
            })?;
            print_comparison(&comparison, cli.format)?;
        }
        Command::Commits {
            ref source,
            ref base,
            ref output,
        } => {
            ensure_git_repo(&cli.repo)?;
            let output = output.clone().unwrap_or_else(|| config.output.dir.clone());
            let comparator = Comparator::from_config(config);
            let (old, new) = (Reference::from(base.as_str()), Reference::from(source.as_str()));
            let comparison = run_with_spinner(
                &format!("Comparing {} with {}...", old.short(), new.short()),
                || Ok(comparator.compare_references(&cli.repo, &old, &new, &output)?),
            )?;
            print_comparison(&comparison, cli.format)?;
        }
        Command::History { count, ref output } => {
            ensure_git_repo(&cli.repo)?;
            if count < 2 {
                miette::bail!(miette::miette!(
                    help = "Pass --count 2 or more; each comparison needs a commit and its parent",
                    "Nothing to compare with --count {count}"
                ));
            }
            let output = output.clone().unwrap_or_else(|| config.output.dir.clone());
            let comparator = Comparator::from_config(config);
            let comparisons = run_with_spinner(
                &format!("Comparing the last {count} commits..."),
                || Ok(comparator.compare_history(&cli.repo, count, &output)?),
            )?;

            if cli.format == OutputFormat::Json {
                let values: Vec<_> = comparisons
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "old": c.old,
                            "new": c.new,
                            "reportPath": c.report_path,
                            "summary": c.summary,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&values).into_diagnostic()?);
            } else {
                for comparison in &comparisons {
                    print_comparison(comparison, cli.format)?;
                    println!();
                }
            }
            eprintln!("{} reports written to {}", comparisons.len(), output.display());
        }
        Command::Show { ref report } => {
            let result = report::load(report)
                .wrap_err_with(|| format!("Failed to read report {}", report.display()))?;
            print_summary(&ComparisonSummary::from_result(&result), cli.format)?;
        }
        Command::Init => {
            let path = Path::new(".stagedrift.toml");
            if path.exists() {
                miette::bail!(".stagedrift.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .stagedrift.toml with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stagedrift", &mut std::io::stdout());
        }
    }

    Ok(())
}
