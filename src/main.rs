use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use il_patcher::config::{
    apply_patches, check_patches, discover_patch_files, load_bundled, load_from_path,
    ApplicationError, PatchConfig, PatchReport, PatchResult,
};
use il_patcher::diagnostic::Severity;
use il_patcher::host::{read_listing, ListingDirectory, ListingWriter, MemoryHost, MethodSource};
use il_patcher::il::format_fingerprint;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "il-patcher")]
#[command(about = "Rewrite compiled method bodies from declarative patch files", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches to method listings and write the rewritten listings
    Apply {
        /// Directory of JSON method listings
        #[arg(short, long)]
        listings: PathBuf,

        /// Patch file or directory (default: ./patches, else the bundled set)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Where rewritten listings are written
        #[arg(short, long, default_value = "patched")]
        out: PathBuf,

        /// Host version checked against each file's host_version_range
        #[arg(long)]
        host_version: Option<String>,

        /// Show a diff of every rewritten listing
        #[arg(short, long)]
        diff: bool,
    },

    /// Run patches without writing anything
    Check {
        /// Directory of JSON method listings
        #[arg(short, long)]
        listings: PathBuf,

        /// Patch file or directory (default: ./patches, else the bundled set)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Host version checked against each file's host_version_range
        #[arg(long)]
        host_version: Option<String>,

        /// Show a diff of every rewritten listing
        #[arg(short, long)]
        diff: bool,
    },

    /// Print a listing with labels and region markers
    Show {
        /// JSON method listing
        listing: PathBuf,
    },

    /// Print the fingerprint a patch would pin for this listing
    Fingerprint {
        /// JSON method listing
        listing: PathBuf,
    },

    /// List patches and their targets
    List {
        /// Patch file or directory (default: ./patches, else the bundled set)
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            listings,
            patches,
            out,
            host_version,
            diff,
        } => cmd_run(&listings, patches, Some(out), host_version, diff),

        Commands::Check {
            listings,
            patches,
            host_version,
            diff,
        } => cmd_run(&listings, patches, None, host_version, diff),

        Commands::Show { listing } => cmd_show(&listing),

        Commands::Fingerprint { listing } => cmd_fingerprint(&listing),

        Commands::List { patches } => cmd_list(patches),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "il_patcher=warn",
        1 => "il_patcher=info",
        _ => "il_patcher=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Patch files to load, each with the label it is reported under.
///
/// Resolution order:
/// 1. `--patches` (a file, or a directory searched recursively).
/// 2. `./patches` relative to the current working directory.
/// 3. The patch set compiled into the binary.
fn load_patch_sets(patches: Option<PathBuf>) -> Result<Vec<(String, PatchConfig)>> {
    let files = match patches {
        Some(path) if path.is_dir() => {
            let files = discover_patch_files(&path);
            if files.is_empty() {
                anyhow::bail!("No .toml patch files found in {}", path.display());
            }
            files
        }
        Some(path) => vec![path],
        None => {
            let default_dir = Path::new("patches");
            let files = if default_dir.is_dir() {
                discover_patch_files(default_dir)
            } else {
                Vec::new()
            };
            if files.is_empty() {
                return Ok(vec![("<bundled>".to_string(), load_bundled()?)]);
            }
            files
        }
    };

    files
        .into_iter()
        .map(|path| {
            let config = load_from_path(&path)?;
            Ok((path.display().to_string(), config))
        })
        .collect()
}

fn display_diff(name: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {} (original)", name).dimmed());
    println!("{}", format!("+++ {} (patched)", name).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

#[derive(Default)]
struct Totals {
    applied: usize,
    skipped: usize,
    failed: usize,
}

fn cmd_run(
    listings: &Path,
    patches: Option<PathBuf>,
    out: Option<PathBuf>,
    host_version: Option<String>,
    show_diff: bool,
) -> Result<()> {
    let source = ListingDirectory::open(listings)
        .with_context(|| format!("cannot index listings in {}", listings.display()))?;
    let patch_sets = load_patch_sets(patches)?;

    println!("Listings: {}", source);
    if let Some(version) = &host_version {
        println!("Host version: {}", version);
    }
    if out.is_none() {
        println!("{}", "[CHECK - nothing will be written]".cyan());
    }
    println!();

    let mut totals = Totals::default();
    // Later files patch the bodies earlier files produced.
    let mut current = seed_host(&source);
    let mut writer = out.as_ref().map(ListingWriter::new);

    for (name, config) in patch_sets {
        println!("Loading patches from {}...", name);

        let report = match writer.as_mut() {
            Some(writer) => {
                let already = writer.written().len();
                let report = apply_patches(&config, &current, writer, host_version.as_deref());
                for path in &writer.written()[already..] {
                    println!("  {} {}", "wrote".dimmed(), path.display());
                }
                report
            }
            None => check_patches(&config, &current, host_version.as_deref()),
        };

        print_report(&report, out.is_none(), &mut totals);

        for rendered in &report.bodies {
            if show_diff {
                if let Ok(before) = current.load(&rendered.body.target) {
                    display_diff(
                        &rendered.body.target.to_string(),
                        &before.listing(),
                        &rendered.body.listing(),
                    );
                }
            }
            current.add(rendered.body.clone());
        }
        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", totals.applied).green());
    println!("  {} skipped", format!("{}", totals.skipped).cyan());
    println!("  {} failed", format!("{}", totals.failed).red());

    if totals.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Every indexed listing, loaded into memory.
fn seed_host(source: &ListingDirectory) -> MemoryHost {
    let mut host = MemoryHost::new();
    for target in source.targets() {
        match source.load(target) {
            Ok(body) => host.add(body),
            Err(err) => warn!("skipping {target}: {err}"),
        }
    }
    host
}

fn print_report(report: &PatchReport, checking: bool, totals: &mut Totals) {
    for (patch_id, result) in &report.results {
        match result {
            Ok(PatchResult::Applied { target, summary }) => {
                let verb = if checking { "Would apply to" } else { "Applied to" };
                println!(
                    "{} {}: {} {} ({})",
                    "✓".green(),
                    patch_id,
                    verb,
                    target,
                    summary
                );
                totals.applied += 1;
            }
            Ok(PatchResult::SkippedVersion { reason }) => {
                println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                totals.skipped += 1;
            }
            Ok(PatchResult::SkippedMissing { target }) => {
                println!(
                    "{} {}: Skipped (optional target {} not present)",
                    "⊙".yellow(),
                    patch_id,
                    target
                );
                totals.skipped += 1;
            }
            Err(e) => {
                eprintln!(
                    "{} {}: {} - {}",
                    "✗".red(),
                    patch_id,
                    e.severity(),
                    e
                );
                totals.failed += 1;

                match e {
                    ApplicationError::Script { .. } if e.severity() == Severity::Recoverable => {
                        let conflict = "CONFLICT: landmark not where the patch expects it";
                        eprintln!("  {}", conflict.red());
                        eprintln!("  Possible causes:");
                        eprintln!("    - The host method changed in this version");
                        eprintln!("    - Another patch already rewrote this region");
                    }
                    ApplicationError::Script { .. } => {
                        eprintln!("  {}", "The patch script itself is broken".red());
                        eprintln!("  Action: fix the patch file; the host method is not at fault");
                    }
                    ApplicationError::Fingerprint { .. } => {
                        eprintln!(
                            "  Action: re-check the patch against the new body, \
                             then update the fingerprint"
                        );
                    }
                    ApplicationError::Render { .. } => {
                        eprintln!("  {}", "The patch would leave the method malformed".red());
                    }
                    _ => {}
                }
            }
        }
    }
}

fn cmd_show(listing: &Path) -> Result<()> {
    let body = read_listing(listing)?;
    println!("{}", body.target.to_string().bold());
    if !body.params.is_empty() {
        let params: Vec<String> = body.params.iter().map(ToString::to_string).collect();
        println!("  params: {}", params.join(", "));
    }
    for (slot, ty) in body.locals.iter().enumerate() {
        println!("  {} {}", format!("V_{slot}").dimmed(), ty);
    }
    print!("{}", body.listing());
    Ok(())
}

fn cmd_fingerprint(listing: &Path) -> Result<()> {
    let body = read_listing(listing)?;
    println!("{}  {}", format_fingerprint(body.fingerprint()), body.target);
    Ok(())
}

fn cmd_list(patches: Option<PathBuf>) -> Result<()> {
    for (name, config) in load_patch_sets(patches)? {
        let title = if config.meta.name.is_empty() {
            name.clone()
        } else {
            format!("{} ({})", config.meta.name, name)
        };
        println!("{}", title.bold());
        if let Some(range) = &config.meta.host_version_range {
            println!("  host version: {}", range);
        }
        for patch in &config.patches {
            let optional = if patch.optional { " [optional]" } else { "" };
            println!(
                "  - {}: {} ({} step(s)){}",
                patch.id,
                patch.target,
                patch.steps.len(),
                optional.dimmed()
            );
        }
        println!();
    }
    Ok(())
}
