use anyhow::{bail, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use text_patcher::config::loader::discover_manifests;
use text_patcher::config::{
    apply_manifest, apply_target, check_manifest, check_target, load_from_path, ApplyOptions,
    PatchTarget, TargetError, TargetReport,
};
use text_patcher::{LinePredicate, TextEncoding, TransformOutcome, Transformation};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "text-patcher")]
#[command(about = "Targeted text patching: fix a line, replace a literal", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch manifests
    Apply {
        /// Manifest to apply (repeatable; otherwise every .toml in patches/)
        #[arg(short, long)]
        manifest: Vec<PathBuf>,

        /// Root for root-relative target paths (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Save <file>.bak before overwriting
        #[arg(long)]
        backup: bool,

        /// Fail a target when any of its transformations does not match
        #[arg(long)]
        strict: bool,
    },

    /// Report what manifests would change without modifying files
    Check {
        #[arg(short, long)]
        manifest: Vec<PathBuf>,

        #[arg(short, long)]
        root: Option<PathBuf>,

        #[arg(short, long)]
        diff: bool,

        #[arg(long)]
        strict: bool,
    },

    /// Replace literal text in every given file
    Replace {
        /// Source text (repeatable, paired with --to in order)
        #[arg(long = "from", required = true)]
        from: Vec<String>,

        /// Replacement text
        #[arg(long = "to", required = true)]
        to: Vec<String>,

        /// Also replace the all-lowercase form of each pair
        #[arg(long)]
        lowercase_variant: bool,

        #[command(flatten)]
        write: WriteArgs,

        /// Files to patch
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Overwrite one line, chosen by 0-based index
    FixLine {
        /// 0-based line index
        #[arg(long)]
        index: usize,

        /// Only replace when the line contains this text
        #[arg(long)]
        contains: Option<String>,

        /// Replacement line, written verbatim
        #[arg(long = "with")]
        replacement: String,

        /// Name shown in progress output
        #[arg(long)]
        label: Option<String>,

        /// Reuse the original line's terminator
        #[arg(long)]
        keep_terminator: bool,

        #[command(flatten)]
        write: WriteArgs,

        file: PathBuf,
    },
}

#[derive(Args)]
struct WriteArgs {
    /// Text encoding of the target files
    #[arg(short, long, default_value = "utf-8")]
    encoding: TextEncoding,

    #[arg(short = 'n', long)]
    dry_run: bool,

    #[arg(short, long)]
    diff: bool,

    #[arg(long)]
    backup: bool,

    #[arg(long)]
    strict: bool,
}

impl WriteArgs {
    fn options(&self) -> ApplyOptions {
        ApplyOptions {
            backup: self.backup,
            strict: self.strict,
            dry_run: self.dry_run,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            manifest,
            root,
            dry_run,
            diff,
            backup,
            strict,
        } => cmd_apply(
            manifest,
            root,
            ApplyOptions {
                backup,
                strict,
                dry_run,
            },
            diff,
        ),

        Commands::Check {
            manifest,
            root,
            diff,
            strict,
        } => cmd_check(manifest, root, strict, diff),

        Commands::Replace {
            from,
            to,
            lowercase_variant,
            write,
            files,
        } => cmd_replace(from, to, lowercase_variant, write, files),

        Commands::FixLine {
            index,
            contains,
            replacement,
            label,
            keep_terminator,
            write,
            file,
        } => {
            let transformation = Transformation::ReplaceLine {
                index,
                predicate: contains.map_or(LinePredicate::Any, LinePredicate::Contains),
                replacement,
                label,
                keep_terminator,
            };
            let target = PatchTarget::new(file, write.encoding).with(transformation);
            run_targets(vec![target], write.options(), write.diff)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Running tally printed in the summary.
#[derive(Default)]
struct Tally {
    updated: usize,
    unchanged: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, result: &Result<TargetReport, TargetError>) {
        match result {
            Ok(report) if report.modified => self.updated += 1,
            Ok(_) => self.unchanged += 1,
            Err(_) => self.failed += 1,
        }
    }

    fn print(&self, dry_run: bool) {
        println!("{}", "Summary:".bold());
        let verb = if dry_run { "would update" } else { "updated" };
        println!("  {} {}", format!("{}", self.updated).green(), verb);
        println!("  {} unchanged", format!("{}", self.unchanged).yellow());
        println!("  {} failed", format!("{}", self.failed).red());
    }
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(path) => Ok(path.canonicalize()?),
        None => Ok(env::current_dir()?),
    }
}

fn manifest_paths(explicit: Vec<PathBuf>, root: &Path) -> Result<Vec<PathBuf>> {
    if explicit.is_empty() {
        Ok(discover_manifests(root)?)
    } else {
        Ok(explicit)
    }
}

fn cmd_apply(
    manifests: Vec<PathBuf>,
    root: Option<PathBuf>,
    options: ApplyOptions,
    show_diff: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    let mut tally = Tally::default();

    if options.dry_run {
        println!("{}", "[DRY RUN - no files will be modified]".cyan());
    }

    for manifest_path in manifest_paths(manifests, &root)? {
        println!("Loading manifest {}...", manifest_path.display());

        let manifest = match load_from_path(&manifest_path) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                tally.failed += 1;
                continue;
            }
        };

        for warning in manifest.warnings() {
            eprintln!("{}", format!("Warning: {warning}").yellow());
        }

        for (_, result) in apply_manifest(&manifest, &root, options) {
            report_target(&result, options.dry_run, show_diff);
            tally.record(&result);
        }

        println!();
    }

    tally.print(options.dry_run);
    println!("Done!");

    if tally.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(
    manifests: Vec<PathBuf>,
    root: Option<PathBuf>,
    strict: bool,
    show_diff: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    let options = ApplyOptions {
        strict,
        ..Default::default()
    };
    let mut tally = Tally::default();

    println!("{}", "Patch Status Report".bold());
    println!("Root: {}", root.display());
    println!();

    for manifest_path in manifest_paths(manifests, &root)? {
        let manifest = match load_from_path(&manifest_path) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("{} {}", "✗".red(), e);
                tally.failed += 1;
                continue;
            }
        };

        for (_, result) in check_manifest(&manifest, &root, options) {
            report_target(&result, true, show_diff);
            tally.record(&result);
        }
    }

    println!();
    tally.print(true);

    if tally.failed > 0 || tally.updated > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_replace(
    from: Vec<String>,
    to: Vec<String>,
    lowercase_variant: bool,
    write: WriteArgs,
    files: Vec<PathBuf>,
) -> Result<()> {
    if from.len() != to.len() {
        bail!(
            "--from and --to must be given the same number of times ({} vs {})",
            from.len(),
            to.len()
        );
    }
    if from.iter().any(String::is_empty) {
        bail!("--from must not be empty");
    }

    let transformations: Vec<Transformation> = from
        .iter()
        .zip(&to)
        .flat_map(|(from, to)| {
            if lowercase_variant {
                Transformation::substitute_with_lowercase(from, to)
            } else {
                vec![Transformation::substitute(from.as_str(), to.as_str())]
            }
        })
        .collect();

    let targets = files
        .into_iter()
        .map(|path| PatchTarget {
            path,
            encoding: write.encoding,
            transformations: transformations.clone(),
        })
        .collect();

    run_targets(targets, write.options(), write.diff)
}

/// Shared driver for the ad-hoc subcommands: one report line per file, keep
/// going on errors, summary at the end.
fn run_targets(targets: Vec<PatchTarget>, options: ApplyOptions, show_diff: bool) -> Result<()> {
    let mut tally = Tally::default();

    for target in &targets {
        let result = if options.dry_run {
            check_target(target, options)
        } else {
            apply_target(target, options)
        };
        report_target(&result, options.dry_run, show_diff);
        tally.record(&result);
    }

    println!();
    tally.print(options.dry_run);
    println!("Done!");

    if tally.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn report_target(result: &Result<TargetReport, TargetError>, dry_run: bool, show_diff: bool) {
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} Error updating {}", "✗".red(), e);
            if let TargetError::Decode { .. } = e {
                eprintln!("  Check that the declared --encoding matches the file");
            }
            return;
        }
    };

    for t in &report.transforms {
        match (&t.transformation, &t.outcome) {
            (
                Transformation::ReplaceLine {
                    index,
                    label,
                    predicate,
                    ..
                },
                TransformOutcome::Replaced { .. },
            ) => {
                let name = label.clone().unwrap_or_else(|| predicate.to_string());
                println!("  {} Fixed line {}: {}", "✓".green(), index + 1, name);
            }
            (
                Transformation::Substitute { .. } | Transformation::Pattern { .. },
                TransformOutcome::Replaced { .. },
            ) => {
                println!("  {} {}: {}", "✓".green(), t.label, t.outcome);
            }
            (_, TransformOutcome::AlreadyApplied) => {
                println!("  {} {}: {}", "⊙".yellow(), t.label, t.outcome);
            }
            (_, outcome) => {
                println!("  {} {}: {}", "⊘".cyan(), t.label, outcome);
            }
        }
    }

    if report.modified {
        let verb = if dry_run { "Would update" } else { "Updated" };
        println!("{} {}: {}", "✓".green(), verb, report.path.display());
        if let Some(backup) = &report.backup {
            println!("  {}", format!("Backup: {}", backup.display()).dimmed());
        }
        if show_diff {
            display_diff(&report.path, &report.original, &report.patched);
        }
    } else {
        println!("{} Unchanged: {}", "⊙".yellow(), report.path.display());
    }
}

/// Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, patched: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, patched);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}
