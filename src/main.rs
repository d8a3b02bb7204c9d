// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use docglot::app_config::{Config, LogLevel};
use docglot::app_controller::{CreateOutcome, CreateTaskRequest, Controller, PipelineSettings};
use docglot::clock::{Clock, SystemClock};
use docglot::database::models::{NewRepository, TaskKind, TaskStatus};
use docglot::database::{DatabaseConnection, Store};
use docglot::detection::change_detector::DEFAULT_MAX_DEPTH;
use docglot::github::models::RepoRef;
use docglot::github::{AppTokenIssuer, CredentialManager, GitHubConnector, KeySource, MemoryTokenCache};
use docglot::providers::ConfiguredProviders;
use docglot::providers::catalog::ProviderKind;
use docglot::publish::CommitOptions;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for ProviderKind to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProvider {
    OpenRouter,
    DeepSeek,
    Doubao,
    Qwen,
    Custom,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::OpenRouter => ProviderKind::OpenRouter,
            CliProvider::DeepSeek => ProviderKind::DeepSeek,
            CliProvider::Doubao => ProviderKind::Doubao,
            CliProvider::Qwen => ProviderKind::Qwen,
            CliProvider::Custom => ProviderKind::Custom,
        }
    }
}

/// docglot - keeps translated documentation in sync with its repository
#[derive(Parser, Debug)]
#[command(name = "docglot")]
#[command(version)]
#[command(about = "Translate a repository's Markdown documentation with an LLM and propose it as a pull request")]
#[command(long_about = "docglot detects changed Markdown files in registered GitHub repositories,
translates them into each target language and commits the result to a new branch
with a pull request.

EXAMPLES:
    docglot repo add acme/docs --installation 123 --base en --targets fr,ja
    docglot translate acme/docs                 # Incremental run, then wait
    docglot translate acme/docs --full --commit # Translate everything and open a PR
    docglot status 7                            # Progress and failures of task 7
    docglot commit 7 --no-pr                    # Push task 7 without a pull request
    docglot watch                               # Poll all repositories
    docglot completions bash > docglot.bash

CONFIGURATION:
    Configuration is stored in docglot.json by default. A default file is created
    when missing. GITHUB_APP_ID, GITHUB_APP_PRIVATE_KEY_PATH, GITHUB_API_URL and
    DOCGLOT_AI_API_KEY override the file.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = docglot::app_config::DEFAULT_CONFIG_FILE)]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Translation provider to use
    #[arg(short, long, global = true, value_enum)]
    provider: Option<CliProvider>,

    /// Model name to use for translation
    #[arg(short, long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage registered repositories
    #[command(subcommand)]
    Repo(RepoCommand),

    /// Start a translation task and wait for it
    Translate(TranslateArgs),

    /// Show a task, or the most recent tasks
    Status {
        task_id: Option<i64>,
    },

    /// Commit a completed task's translations
    Commit(CommitArgs),

    /// Poll every repository on an interval
    Watch {
        /// Seconds between polls; defaults to the configured interval
        #[arg(long)]
        interval: Option<u64>,
    },

    /// List installations of the GitHub App
    Installations,

    /// Generate shell completions for docglot
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum RepoCommand {
    /// Register a repository
    Add(RepoAddArgs),
    /// List registered repositories
    List,
}

#[derive(Args, Debug)]
struct RepoAddArgs {
    /// Repository as owner/name
    repository: RepoRef,

    /// Installation id of the GitHub App on this repository
    #[arg(long)]
    installation: u64,

    /// Language the documentation is written in
    #[arg(long, default_value = "en")]
    base: String,

    /// Target languages, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    targets: Vec<String>,

    /// Default branch; looked up on GitHub when omitted
    #[arg(long)]
    branch: Option<String>,

    /// File with ignore rules, one glob per line
    #[arg(long)]
    ignore_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// Repository as owner/name
    repository: RepoRef,

    /// Translate every file instead of the changes since the last commit
    #[arg(long)]
    full: bool,

    /// Override target languages, comma separated
    #[arg(long, value_delimiter = ',')]
    languages: Option<Vec<String>>,

    /// Translate only these paths, comma separated
    #[arg(long, value_delimiter = ',')]
    files: Option<Vec<String>>,

    /// Commit the result when the task completes
    #[arg(long)]
    commit: bool,

    #[command(flatten)]
    commit_options: CommitFlags,
}

#[derive(Args, Debug)]
struct CommitArgs {
    task_id: i64,

    #[command(flatten)]
    commit_options: CommitFlags,
}

#[derive(Args, Debug, Clone)]
struct CommitFlags {
    /// Branch name instead of the generated one
    #[arg(long)]
    branch: Option<String>,

    /// Do not open a pull request
    #[arg(long)]
    no_pr: bool,

    /// Document that receives the translation table
    #[arg(long)]
    index_document: Option<String>,

    /// Skip the translation table update
    #[arg(long, conflicts_with = "index_document")]
    no_index: bool,
}

impl CommitFlags {
    fn apply(&self, mut options: CommitOptions) -> CommitOptions {
        if self.branch.is_some() {
            options.branch_name = self.branch.clone();
        }
        if self.no_pr {
            options.create_pull_request = false;
        }
        if let Some(path) = &self.index_document {
            options.index_document = Some(path.clone());
        }
        if self.no_index {
            options.index_document = None;
        }
        options
    }
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    fn tag_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    fn colour_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::colour_for_level(record.level()),
                now,
                Self::tag_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set via set_max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "docglot", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.into());

    if let Err(e) = run(cli.command, config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Config file, then environment, then command line
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(&cli.config_path)?;
    config.apply_env_overrides();

    if let Some(provider) = cli.provider {
        config.ai = config.ai.switched_to(provider.into());
    }
    if let Some(model) = &cli.model {
        config.ai.set_model(model.clone());
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }

    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn open_store(config: &Config, clock: Arc<dyn Clock>) -> Result<Store> {
    let path = match &config.database_path {
        Some(path) => path.clone(),
        None => DatabaseConnection::default_database_path()?,
    };
    Ok(Store::new(DatabaseConnection::new(&path)?, clock))
}

fn token_issuer(config: &Config, clock: Arc<dyn Clock>) -> Result<AppTokenIssuer> {
    config.validate_github()?;
    Ok(AppTokenIssuer::new(
        config.github.app_id.clone(),
        KeySource::File(config.github.private_key_path.clone()),
        config.github.api_url.clone(),
        clock,
    ))
}

async fn build_controller(config: &Config, store: Store, clock: Arc<dyn Clock>) -> Result<Controller> {
    let issuer = Arc::new(token_issuer(config, clock.clone())?);
    let credentials = Arc::new(CredentialManager::new(
        issuer,
        Arc::new(MemoryTokenCache::default()),
        clock.clone(),
    ));
    let connector = Arc::new(GitHubConnector::new(config.github.api_url.clone(), credentials));
    let providers = Arc::new(ConfiguredProviders::new(
        config.ai.clone(),
        config.translation.clone(),
    ));
    let settings = PipelineSettings {
        max_chunk_chars: config.translation.max_chunk_chars,
        max_depth: DEFAULT_MAX_DEPTH,
        commit: config.commit.clone(),
        ..PipelineSettings::default()
    };

    Controller::start(store, connector, providers, clock, settings).await
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match command {
        Commands::Repo(RepoCommand::List) => {
            let store = open_store(&config, clock)?;
            let repositories = store.list_repositories().await?;
            if repositories.is_empty() {
                println!("No repositories registered");
            }
            for repository in repositories {
                println!(
                    "{:>4}  {}/{}  branch={}  base={}  targets={}  baseline={}",
                    repository.id,
                    repository.owner,
                    repository.name,
                    repository.default_branch,
                    repository.base_language,
                    repository.target_languages.join(","),
                    repository.baseline_sha.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }

        Commands::Repo(RepoCommand::Add(args)) => {
            let store = open_store(&config, clock.clone())?;
            let controller = build_controller(&config, store, clock).await?;
            let ignore_rules = match &args.ignore_file {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read ignore file: {}", path.display()))?,
                ),
                None => None,
            };
            let record = controller
                .register_repository(
                    NewRepository {
                        owner: args.repository.owner.clone(),
                        name: args.repository.name.clone(),
                        installation_id: args.installation,
                        default_branch: String::new(),
                        base_language: args.base,
                        target_languages: args.targets,
                        ignore_rules,
                    },
                    args.branch,
                )
                .await?;
            println!("Registered {}/{} as repository {}", record.owner, record.name, record.id);
            Ok(())
        }

        Commands::Translate(args) => {
            let store = open_store(&config, clock.clone())?;
            let controller = build_controller(&config, store.clone(), clock).await?;
            let repository = store
                .find_repository(&args.repository.owner, &args.repository.name)
                .await?
                .ok_or_else(|| anyhow!("{} is not registered, run `docglot repo add` first", args.repository))?;

            let created = controller
                .create_task(CreateTaskRequest {
                    repository_id: repository.id,
                    kind: if args.full { TaskKind::Full } else { TaskKind::Incremental },
                    target_languages: args.languages,
                    selected_files: args.files,
                })
                .await?;

            let created = match created {
                CreateOutcome::Started(created) => created,
                CreateOutcome::NoChanges { latest_sha } => {
                    println!("No changes since the last translation (head {})", latest_sha);
                    return Ok(());
                }
                CreateOutcome::Failed { task_id, message } => {
                    bail!("Task {} failed: {}", task_id, message);
                }
            };
            info!(
                "Task {} started: {} file(s) x {} language(s) ({})",
                created.task_id,
                created.file_count,
                created.target_languages.len(),
                created.kind
            );

            controller.wait(created.task_id).await?;
            print_status(&controller, created.task_id).await?;

            if args.commit {
                let options = args.commit_options.apply(controller.default_commit_options());
                let outcome = controller.commit_task(created.task_id, options).await?;
                println!(
                    "Committed {} file(s) to {}{}",
                    outcome.files_committed,
                    outcome.branch_name,
                    outcome.pr_url.map(|url| format!(" ({})", url)).unwrap_or_default()
                );
            }
            Ok(())
        }

        Commands::Status { task_id } => {
            let store = open_store(&config, clock)?;
            match task_id {
                Some(task_id) => {
                    // Status is read-only; no credentials are needed
                    let task = store
                        .get_task(task_id)
                        .await?
                        .ok_or_else(|| anyhow!("Task {} not found", task_id))?;
                    print_task_line(&task);
                    let results = store.list_results(task_id).await?;
                    for result in results.iter().filter(|r| r.error_message.is_some()) {
                        println!(
                            "  failed  {} [{}]: {}",
                            result.original_path,
                            result.language,
                            result.error_message.as_deref().unwrap_or_default()
                        );
                    }
                }
                None => {
                    for task in store.list_tasks(None, 20).await? {
                        print_task_line(&task);
                    }
                    let database = store.database();
                    println!("{} ({})", database.stats()?, database.path().display());
                }
            }
            Ok(())
        }

        Commands::Commit(args) => {
            let store = open_store(&config, clock.clone())?;
            let controller = build_controller(&config, store, clock).await?;
            let options = args.commit_options.apply(controller.default_commit_options());
            let outcome = controller.commit_task(args.task_id, options).await?;
            println!(
                "Committed {} file(s) to {}{}",
                outcome.files_committed,
                outcome.branch_name,
                outcome.pr_url.map(|url| format!(" ({})", url)).unwrap_or_default()
            );
            Ok(())
        }

        Commands::Watch { interval } => {
            let store = open_store(&config, clock.clone())?;
            let controller = build_controller(&config, store, clock).await?;
            let seconds = interval.unwrap_or(config.poll_interval_secs).max(1);
            info!("Polling every {}s, press Ctrl-C to stop", seconds);

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
            };
            let polls = controller.watch(Duration::from_secs(seconds), shutdown).await;
            info!("Stopped after {} poll(s)", polls);
            Ok(())
        }

        Commands::Installations => {
            let issuer = token_issuer(&config, clock)?;
            let installations = issuer.list_installations().await?;
            if installations.is_empty() {
                println!("The App has no installations");
            }
            for installation in installations {
                println!("{:>10}  {}", installation.id, installation.account.login);
            }
            Ok(())
        }

        Commands::Completions { .. } => Ok(()),
    }
}

fn print_task_line(task: &docglot::database::models::TaskRecord) {
    println!(
        "Task {:>4}  repo={}  {}  {}  processed={}  failed={}  total={}{}",
        task.id,
        task.repository_id,
        task.kind,
        task.status,
        task.processed_files,
        task.failed_files,
        task.total_files,
        task.branch_name
            .as_deref()
            .map(|b| format!("  branch={}", b))
            .unwrap_or_default()
    );
    if let Some(message) = &task.error_message {
        println!("  {}", message);
    }
}

async fn print_status(controller: &Controller, task_id: i64) -> Result<()> {
    let view = controller.task_status(task_id).await?;
    print_task_line(&view.task);
    for language in &view.languages {
        println!(
            "  {}: {} translated, {} failed",
            language.language, language.completed, language.failed
        );
    }
    for failure in &view.failures {
        println!("  failed  {} [{}]: {}", failure.path, failure.language, failure.message);
    }
    if view.task.status == TaskStatus::Failed {
        warn!("Task {} failed", task_id);
    }
    Ok(())
}
