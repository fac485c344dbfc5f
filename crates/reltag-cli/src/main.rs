//! reltag - release tag state machine CLI
//!
//! Pipeline steps call `reltag` to record what was released, where it runs
//! and how it fared, using tags in the repository.
//!
//! ## Commands
//!
//! - `assign`: create a version or state tag, or create/move an environment tag
//! - `rollback-target`: pick the version an environment should fall back to
//! - `current`: show the version deployed to an environment
//! - `list`: list released versions with their state markers
//!
//! Results go to stdout as `key=value` lines and, when `--output-file` (or
//! `GITHUB_OUTPUT`) is set, are appended there too. Logs go to stderr.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use reltag_core::{
    run_cancellable, AssignOutcome, AssignRequest, CancellationToken, EnvironmentAllowList,
    ExecutionModeConfig, GitReferenceStore, ReferenceStore, ReltagError, RollbackPolicy,
    RollbackResolver, SubprojectPath, TagAssignmentOrchestrator, TagKind, TagRepository,
    DEFAULT_OPERATION,
};
use reltag_store::DEFAULT_GIT_TIMEOUT;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn, Level};

#[derive(Parser)]
#[command(name = "reltag")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release tag state machine: version, environment and state tags", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    repo: RepoArgs,

    /// Append key=value results to this file
    #[arg(long, global = true, env = "GITHUB_OUTPUT")]
    output_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct RepoArgs {
    /// Repository working directory
    #[arg(long, global = true, env = "RELTAG_REPO", default_value = ".")]
    repo: PathBuf,

    /// Remote that tags are pushed to
    #[arg(long, global = true, env = "RELTAG_REMOTE", default_value = "origin")]
    remote: String,

    /// Time budget for each git invocation
    #[arg(long, global = true, env = "RELTAG_GIT_TIMEOUT_SECS", default_value_t = DEFAULT_GIT_TIMEOUT.as_secs())]
    git_timeout_secs: u64,

    /// Comma-separated environment allow-list
    #[arg(long, global = true, env = "RELTAG_ENVIRONMENTS")]
    environments: Option<String>,
}

impl RepoArgs {
    fn store(&self) -> GitReferenceStore {
        GitReferenceStore::new(&self.repo, &self.remote)
            .with_timeout(Duration::from_secs(self.git_timeout_secs))
    }

    fn allow_list(&self) -> EnvironmentAllowList {
        match self.environments.as_deref() {
            Some(csv) if !csv.trim().is_empty() => EnvironmentAllowList::from_csv(csv),
            _ => EnvironmentAllowList::default(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or move a tag
    Assign(AssignArgs),

    /// Print the version an environment should roll back to
    RollbackTarget {
        /// Environment to roll back
        #[arg(long)]
        environment: String,

        /// Subproject path for monorepos
        #[arg(long)]
        subproject: Option<String>,

        /// Consider deprecated versions as candidates
        #[arg(long)]
        allow_deprecated: bool,

        /// Pick the newest candidate even if an older one is stable
        #[arg(long)]
        no_prefer_stable: bool,
    },

    /// Print the version deployed to an environment
    Current {
        /// Environment to inspect
        #[arg(long)]
        environment: String,

        /// Subproject path for monorepos
        #[arg(long)]
        subproject: Option<String>,
    },

    /// List released versions, newest first
    List {
        /// Subproject path for monorepos
        #[arg(long)]
        subproject: Option<String>,
    },
}

#[derive(Args, Debug)]
struct AssignArgs {
    /// Kind of tag to assign
    #[arg(long, value_enum)]
    tag_type: TagTypeArg,

    /// Semantic version (version and state tags)
    #[arg(long)]
    version: Option<String>,

    /// Environment name (environment tags)
    #[arg(long)]
    environment: Option<String>,

    /// State marker: stable, unstable or deprecated (state tags)
    #[arg(long)]
    state: Option<String>,

    /// Subproject path for monorepos
    #[arg(long)]
    subproject: Option<String>,

    /// Commit to tag (default: HEAD)
    #[arg(long)]
    commit: Option<String>,

    /// Allow moving an environment tag that points elsewhere
    #[arg(long)]
    force_move: bool,

    /// Operation name used for execution mode lookup
    #[arg(long, env = "RELTAG_OPERATION", default_value = DEFAULT_OPERATION)]
    operation: String,

    /// Run identifier for run-scoped execution modes
    #[arg(long, env = "RELTAG_RUN_ID")]
    run_id: Option<String>,

    /// Do not push the tag to the remote
    #[arg(long)]
    no_sync: bool,

    /// Print the result as JSON instead of key=value lines
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TagTypeArg {
    Version,
    Environment,
    State,
}

impl From<TagTypeArg> for TagKind {
    fn from(arg: TagTypeArg) -> Self {
        match arg {
            TagTypeArg::Version => TagKind::Version,
            TagTypeArg::Environment => TagKind::Environment,
            TagTypeArg::State => TagKind::State,
        }
    }
}

impl AssignArgs {
    fn request(&self) -> AssignRequest {
        AssignRequest {
            kind: self.tag_type.into(),
            version: self.version.clone(),
            environment: self.environment.clone(),
            state: self.state.clone(),
            subproject: self.subproject.clone(),
            commit: self.commit.clone(),
            force_move: self.force_move,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print().ok();
            return ExitCode::from(usage_exit_code(&err));
        }
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reltag_core::init_tracing(cli.json_logs, level);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "reltag failed");
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let store = cli.repo.store();
    let environments = cli.repo.allow_list();
    let sink = OutputSink::new(cli.output_file);
    debug!(repo = %cli.repo.repo.display(), remote = %cli.repo.remote, "using git repository");

    match cli.command {
        Commands::Assign(args) => cmd_assign(store, environments, &args, &sink, cancel).await,
        Commands::RollbackTarget {
            environment,
            subproject,
            allow_deprecated,
            no_prefer_stable,
        } => {
            let policy = RollbackPolicy {
                prefer_stable: !no_prefer_stable,
                exclude_deprecated: !allow_deprecated,
            };
            cmd_rollback_target(
                store,
                &environments,
                &environment,
                subproject.as_deref(),
                policy,
                &sink,
                cancel,
            )
            .await
        }
        Commands::Current {
            environment,
            subproject,
        } => {
            cmd_current(
                store,
                &environments,
                &environment,
                subproject.as_deref(),
                &sink,
                cancel,
            )
            .await
        }
        Commands::List { subproject } => cmd_list(store, subproject.as_deref(), cancel).await,
    }
}

/// Exit status for an argument parsing outcome. Usage errors are validation
/// errors (1); clap's own status 2 would read as an immutability conflict.
fn usage_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Map a failure to the process exit status.
fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<ReltagError>()
        .map(ReltagError::exit_code)
        .unwrap_or(1);
    u8::try_from(code).unwrap_or(1)
}

/// Where `key=value` results go besides stdout.
struct OutputSink {
    file: Option<PathBuf>,
}

impl OutputSink {
    fn new(file: Option<PathBuf>) -> Self {
        Self {
            file: file.filter(|path| !path.as_os_str().is_empty()),
        }
    }

    fn append(&self, lines: &str) -> Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        append_lines(path, lines)
    }
}

fn append_lines(path: &Path, lines: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open output file {}", path.display()))?;
    file.write_all(lines.as_bytes())
        .with_context(|| format!("Failed to write output file {}", path.display()))?;
    Ok(())
}

fn render(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect()
}

fn parse_subproject(subproject: Option<&str>) -> Result<Option<SubprojectPath>> {
    Ok(subproject
        .filter(|path| !path.trim().is_empty())
        .map(SubprojectPath::parse)
        .transpose()?)
}

/// Assign a tag through the orchestrator
async fn cmd_assign<S: ReferenceStore>(
    store: S,
    environments: EnvironmentAllowList,
    args: &AssignArgs,
    sink: &OutputSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let modes = ExecutionModeConfig::from_env(args.run_id.as_deref());
    let mut orchestrator = TagAssignmentOrchestrator::new(store, modes)
        .with_environments(environments)
        .with_operation(&args.operation);
    if args.no_sync {
        orchestrator = orchestrator.without_remote_sync();
    }

    let result = match orchestrator.assign(&args.request(), cancel).await? {
        AssignOutcome::Completed(result) => result,
        AssignOutcome::Skipped => {
            info!(operation = %args.operation, "execution mode is SKIP, nothing to do");
            return Ok(());
        }
    };

    let lines = result.to_output_lines();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{lines}");
    }
    sink.append(&lines)
}

/// Print the rollback target for an environment
async fn cmd_rollback_target<S: ReferenceStore>(
    store: S,
    environments: &EnvironmentAllowList,
    environment: &str,
    subproject: Option<&str>,
    policy: RollbackPolicy,
    sink: &OutputSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let environment = environments.check(environment)?;
    let subproject = parse_subproject(subproject)?;
    let repository = TagRepository::new(store);

    let target = run_cancellable(
        cancel,
        RollbackResolver::new(&repository).resolve_target(
            &environment,
            subproject.as_ref(),
            policy,
        ),
    )
    .await?;

    let lines = render(&[
        ("rollback_version", target.version.to_string()),
        ("rollback_tag", target.tag_name),
        ("rollback_commit", target.commit.to_string()),
    ]);
    print!("{lines}");
    sink.append(&lines)
}

/// Print the version deployed to an environment
async fn cmd_current<S: ReferenceStore>(
    store: S,
    environments: &EnvironmentAllowList,
    environment: &str,
    subproject: Option<&str>,
    sink: &OutputSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let environment = environments.check(environment)?;
    let subproject = parse_subproject(subproject)?;
    let repository = TagRepository::new(store);

    let binding = run_cancellable(
        cancel,
        repository.current_version_of(&environment, subproject.as_ref()),
    )
    .await?;

    let lines = render(&[
        ("environment", environment.to_string()),
        ("version", binding.version.to_string()),
        ("commit", binding.commit.to_string()),
    ]);
    print!("{lines}");
    sink.append(&lines)
}

/// List released versions with their preferred state marker
async fn cmd_list<S: ReferenceStore>(
    store: S,
    subproject: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let subproject = parse_subproject(subproject)?;
    let repository = TagRepository::new(store);
    let rows = run_cancellable(cancel, list_rows(&repository, subproject.as_ref())).await?;

    if rows.is_empty() {
        info!("no version tags found");
    }
    for row in rows {
        println!("{row}");
    }
    Ok(())
}

async fn list_rows<S: ReferenceStore>(
    repository: &TagRepository<S>,
    subproject: Option<&SubprojectPath>,
) -> reltag_core::Result<Vec<String>> {
    let mut rows = Vec::new();
    for binding in repository.list_version_bindings(subproject).await? {
        let state = repository.state_of(&binding.version, subproject).await?;
        rows.push(format!(
            "{} {} {}",
            binding.version,
            state.map(|s| s.as_str()).unwrap_or("-"),
            binding.commit.short()
        ));
    }
    Ok(rows)
}
