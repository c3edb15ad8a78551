use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};

use bibsync::codec::{BibtexCodec, RecordCodec};
use bibsync::config::BibsyncConfig;
use bibsync::merge::{self, MergeResult, Strategy};
use bibsync::{SyncEngine, telemetry};
use bibsync_git::{GitRepo, GixRepo};

/// Semantic sync for shared BibTeX files
///
/// bibsync merges concurrent edits to a .bib file record by record and field
/// by field, using git purely as transport and history. Two people editing
/// different fields of the same entry, or reordering entries, never conflict.
///
/// Only the same field changed to different values on both sides is a
/// conflict. Conflicts are settled by --strategy, or written out with
/// --conflicts-json for an external tool.
///
/// QUICK START:
///
///   bibsync sync refs.bib
///
/// CONFIGURATION:
///
///   .bibsync.toml at the repository root sets the branch, remote, record
///   identity (`citation-key` or `field:doi`) and commit message.
#[derive(Parser)]
#[command(name = "bibsync")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'bibsync <command> --help' for more information on a specific command.")]
struct Cli {
    /// Repository to operate on (default: discovered from the current directory)
    #[arg(long, global = true, env = "BIBSYNC_REPO")]
    repo: Option<PathBuf>,

    /// How to settle conflicts: abandon, local or remote
    #[arg(long, global = true, default_value_t = Strategy::Abandon)]
    strategy: Strategy,

    /// Write unresolved conflicts as JSON to this file
    #[arg(long, global = true)]
    conflicts_json: Option<PathBuf>,

    /// Print the sync result as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, merge, commit and push a bibliography
    Sync {
        /// The .bib file, relative to the current directory
        file: PathBuf,
    },

    /// Fetch, merge and commit, without pushing
    Fetch {
        /// The .bib file, relative to the current directory
        file: PathBuf,
    },

    /// Push the local branch (fails if the remote has unmerged commits)
    Push {
        /// The .bib file, relative to the current directory
        file: PathBuf,
    },

    /// Three-way merge of three files, outside any repository
    ///
    /// Prints the merged file, or the conflicts as JSON.
    Merge {
        base: PathBuf,
        local: PathBuf,
        remote: PathBuf,

        /// Write the merged file here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy)]
enum Action {
    Sync,
    Fetch,
    Push,
}

fn main() -> Result<()> {
    let _telemetry = telemetry::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Sync { file } => run_engine(&cli, file, Action::Sync),
        Commands::Fetch { file } => run_engine(&cli, file, Action::Fetch),
        Commands::Push { file } => run_engine(&cli, file, Action::Push),
        Commands::Merge {
            base,
            local,
            remote,
            output,
        } => run_merge(&cli, [base, local, remote], output.as_deref()),
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "bibsync", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn run_engine(cli: &Cli, file: &Path, action: Action) -> Result<()> {
    let start = match &cli.repo {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let repo = GixRepo::open(&start)?;
    let workdir = repo
        .workdir()
        .context("bibsync needs a repository with a working tree")?
        .to_path_buf();
    let path = repo_relative(&workdir, file)?;
    let config = BibsyncConfig::load_from_root(&workdir)?;
    let _lock = lock_document(repo.git_dir(), &path)?;

    let engine = SyncEngine::new(repo, config)?;
    let mut resolver = cli.strategy.resolver();
    let result = match action {
        Action::Sync => engine.sync(&path, resolver.as_mut()),
        Action::Fetch => engine.fetch_and_merge(&path, resolver.as_mut()),
        Action::Push => engine.push(&path),
    };
    report(cli, &path, result)
}

fn run_merge(cli: &Cli, [base, local, remote]: [&PathBuf; 3], output: Option<&Path>) -> Result<()> {
    let root = match &cli.repo {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let config = BibsyncConfig::load_from_root(&root)?;
    let codec = BibtexCodec::new(config.sync.identity);
    let decode = |path: &PathBuf| -> Result<_> {
        let bytes =
            std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        codec
            .decode(&bytes)
            .with_context(|| format!("cannot parse {}", path.display()))
    };
    let (base, local, remote) = (decode(base)?, decode(local)?, decode(remote)?);

    let mut resolver = cli.strategy.resolver();
    let result = merge::merge_collections(&base, &local, &remote, resolver.as_mut());
    if let Some(merged) = result.merged() {
        let bytes = codec.encode(merged);
        match output {
            Some(path) => std::fs::write(path, bytes)
                .with_context(|| format!("cannot write {}", path.display()))?,
            None => {
                use std::io::Write as _;
                std::io::stdout().write_all(&bytes)?;
            }
        }
        return Ok(());
    }

    if cli.conflicts_json.is_none() {
        println!("{}", serde_json::to_string_pretty(result.conflicts())?);
    }
    report(cli, "merge", result)
}

fn report(cli: &Cli, path: &str, result: MergeResult) -> Result<()> {
    for note in result.notes() {
        eprintln!("{path}: {note}");
    }
    if let Some(out) = &cli.conflicts_json
        && !result.conflicts().is_empty()
    {
        let json = serde_json::to_vec_pretty(result.conflicts())?;
        std::fs::write(out, json).with_context(|| format!("cannot write {}", out.display()))?;
        eprintln!(
            "{path}: {} conflict(s) written to {}",
            result.conflicts().len(),
            out.display()
        );
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
        return result
            .into_result()
            .map(drop)
            .with_context(|| format!("{path}: sync failed"));
    }

    let commit = result.commit();
    let merged = result
        .into_result()
        .with_context(|| format!("{path}: sync failed"))?;
    match commit {
        Some(oid) => println!("{path}: {} records, now at {}", merged.len(), oid.short()),
        None => println!("{path}: {} records, up to date", merged.len()),
    }
    Ok(())
}

/// `file` as a slash-separated path relative to `workdir`.
fn repo_relative(workdir: &Path, file: &Path) -> Result<String> {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()?.join(file)
    };
    let name = absolute
        .file_name()
        .with_context(|| format!("{} is not a file path", file.display()))?;
    let parent = absolute
        .parent()
        .with_context(|| format!("{} is not a file path", file.display()))?
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", file.display()))?;
    let root = workdir.canonicalize()?;
    let relative = parent.join(name);
    let relative = relative
        .strip_prefix(&root)
        .with_context(|| format!("{} is outside {}", file.display(), root.display()))?;

    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .with_context(|| format!("{} is not valid UTF-8", file.display()))?;
    if parts.is_empty() {
        bail!("{} is not a file path", file.display());
    }
    Ok(parts.join("/"))
}

/// Hold an exclusive lock on `.git/bibsync-<file>.lock` until dropped.
fn lock_document(git_dir: &Path, path: &str) -> Result<File> {
    let lock_path = git_dir.join(format!("bibsync-{}.lock", path.replace('/', "_")));
    let file = File::options()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("cannot open {}", lock_path.display()))?;
    fs4::fs_std::FileExt::lock_exclusive(&file)
        .with_context(|| format!("cannot lock {}", lock_path.display()))?;
    tracing::debug!(lock = %lock_path.display(), "holding document lock");
    Ok(file)
}
