use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use safe_patch::config::{self, SafePatchConfig};
use safe_patch::edit::atomic_write;
use safe_patch::{
    guard, patch, ContentHash, Decision, EditOutcome, EditRequest, FailureLogger, PatchRequest,
    PreviewPayload, Session, ToolResult, WriteRequest,
};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "safe-patch")]
#[command(about = "Hash-guarded fuzzy unified-diff application", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $SAFE_PATCH_CONFIG, then ~/.config/safe-patch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Restrict edits to this directory
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Save the source and diff of every diff that fails to apply here
    #[arg(long, global = true)]
    failure_log_dir: Option<PathBuf>,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Apply without asking for confirmation
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a file and print its stamped snapshot as JSON
    Read { path: PathBuf },

    /// Print a file's content hash (the empty-content hash if it does not exist)
    Hash { path: PathBuf },

    /// Apply a unified diff to a file whose hash you know
    Patch {
        path: PathBuf,

        /// Diff file, or '-' for stdin
        #[arg(short, long)]
        diff: PathBuf,

        /// Hash of the content the diff was written against
        #[arg(long)]
        expected_hash: String,
    },

    /// Replace a file's content
    Write {
        path: PathBuf,

        /// New content, or '-' for stdin
        #[arg(short, long)]
        content: PathBuf,

        /// Hash of the current content; required unless the file does not exist
        #[arg(long)]
        expected_hash: Option<String>,
    },

    /// Apply a diff with no hash precondition ('--- /dev/null' creates the file)
    ApplyDiff { target: PathBuf, diff_file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let mut session = Session::new(config).context("failed to set up workspace guard")?;

    let succeeded = match cli.command {
        Commands::Read { path } => {
            let snapshot = session.read(&path)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            true
        }

        Commands::Hash { path } => {
            let path = confine(&session, &path)?;
            let (content, _) = guard::read_current(&path)?;
            println!("{}", ContentHash::of(&content));
            true
        }

        Commands::Patch {
            path,
            diff,
            expected_hash,
        } => {
            let diff = read_input(&diff)?;
            let request = PatchRequest::new(path, diff, ContentHash::from_hex(expected_hash));
            run_gated(&mut session, request.into(), cli.yes)?
        }

        Commands::Write {
            path,
            content,
            expected_hash,
        } => {
            let content = read_input(&content)?;
            let request = WriteRequest::new(path, content, expected_hash.map(ContentHash::from_hex));
            run_gated(&mut session, request.into(), cli.yes)?
        }

        Commands::ApplyDiff { target, diff_file } => cmd_apply_diff(&session, &target, &diff_file)?,
    };

    if !succeeded {
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Resolve config from file, then let command-line flags override it.
fn load_config(cli: &Cli) -> Result<SafePatchConfig> {
    let (mut config, source) = config::discover(cli.config.as_deref())?;
    if let Some(source) = source {
        debug!(path = %source.display(), "loaded config");
    }

    if let Some(workspace) = &cli.workspace {
        config.workspace.root = Some(workspace.clone());
    }
    if let Some(dir) = &cli.failure_log_dir {
        config.failure_log.dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("failed to read stdin")?;
        return Ok(input);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Ask for confirmation when needed, run the edit, and print the result.
fn run_gated(session: &mut Session, request: EditRequest, yes: bool) -> Result<bool> {
    let outcome = if yes {
        session.execute(&request)?
    } else {
        match session.should_confirm(&request)? {
            None => session.execute(&request)?,
            Some(ticket) => {
                display_diff(&ticket.preview);
                let decision = prompt_decision(ticket.request().path())?;
                match session.commit(ticket, decision)? {
                    Some(outcome) => outcome,
                    None => {
                        let rejected = ToolResult {
                            success: false,
                            message: format!(
                                "Edit rejected; {} was not modified.",
                                request.path().display()
                            ),
                            latest_file_state: None,
                        };
                        print_result(&rejected)?;
                        return Ok(false);
                    }
                }
            }
        }
    };

    report(outcome)
}

fn report(outcome: EditOutcome) -> Result<bool> {
    if let EditOutcome::InvalidDiff {
        line: Some(line), ..
    } = &outcome
    {
        eprintln!("{} {}", "✗ first unmatched line:".red(), line);
    }

    let result = outcome.into_tool_result();
    print_result(&result)?;
    Ok(result.success)
}

fn print_result(result: &ToolResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

fn prompt_decision(path: &Path) -> Result<Decision> {
    eprint!(
        "Apply this change to {}? [y]es / [a]lways / [N]o: ",
        path.display()
    );
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::ProceedOnce,
        "a" | "always" => Decision::ProceedAlways,
        _ => Decision::Reject,
    })
}

/// Show the pending change on stderr, keeping stdout for the JSON result.
fn display_diff(preview: &PreviewPayload) {
    let PreviewPayload::Edit {
        file_name,
        original_content,
        new_content,
        ..
    } = preview;

    eprintln!("\n{}", format!("--- {file_name} (current)").dimmed());
    eprintln!("{}", format!("+++ {file_name} (proposed)").dimmed());

    let diff = TextDiff::from_lines(original_content, new_content);
    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        eprint!("{}", line);
        if change.missing_newline() {
            eprintln!();
        }
    }
    eprintln!();
}

/// Standalone mode: fuzzy-apply `diff_file` to `target` without a hash check.
/// Resolve `path` against the configured workspace, if any.
fn confine(session: &Session, path: &Path) -> Result<PathBuf> {
    Ok(match session.workspace() {
        Some(guard) => guard.validate_path(path)?,
        None => path.to_path_buf(),
    })
}

fn cmd_apply_diff(session: &Session, target: &Path, diff_file: &Path) -> Result<bool> {
    let config = session.config();
    let target = confine(session, target)?;

    let diff = read_input(diff_file)?;
    if diff.len() > config.patch.max_diff_bytes {
        let error = patch::PatchError::TooLarge {
            size: diff.len(),
            limit: config.patch.max_diff_bytes,
        };
        eprintln!("{} {}", "✗".red(), error);
        return Ok(false);
    }

    let parsed = match patch::parse(&diff) {
        Ok(parsed) => parsed,
        Err(error) => {
            eprintln!("{} {}", "✗".red(), error);
            return Ok(false);
        }
    };
    if parsed.is_empty() {
        eprintln!("{}", "Diff contains no hunks; nothing to do".yellow());
        return Ok(true);
    }

    let original = if parsed.is_new_file() {
        String::new()
    } else {
        fs::read_to_string(&target).with_context(|| {
            format!(
                "failed to read {} (the diff does not create a new file)",
                target.display()
            )
        })?
    };

    match patch::apply_parsed(&original, &parsed, &config.apply_options()) {
        Ok(outcome) => {
            atomic_write(&target, outcome.content.as_bytes())?;
            eprintln!(
                "{} Applied {} hunk(s) to {}",
                "✓".green(),
                outcome.placements.len(),
                target.display()
            );
            Ok(true)
        }
        Err(error) => {
            FailureLogger::new(config.failure_log.dir.clone()).log_failure(&original, &diff);
            eprintln!("{} {}", "✗".red(), error);
            Ok(false)
        }
    }
}
