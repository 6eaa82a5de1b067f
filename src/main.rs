//! edgesite CLI entrypoint.
//!
//! This is the main entrypoint for the edgesite command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use edgesite::cli::{Cli, Commands, OutputFormatter, StateCommands};
use edgesite::config::{
    ConfigHasher, ConfigParser, ConfigValidator, DeployConfig, StateBackend, find_config_file,
};
use edgesite::content::{ContentScanner, normalize};
use edgesite::descriptor::{Descriptor, SiteDescriptorBuilder};
use edgesite::engine::{ApplyEngine, TerraformEngine};
use edgesite::error::{ConfigError, EdgesiteError, Result};
use edgesite::planner::{DeploymentPlan, DiffEngine, PlanExecutor, check_stack};
use edgesite::state::{
    DeploymentState, LocalStateStore, S3StateStore, STATE_DIR, StateLock, StateStore,
    generate_holder_id,
};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_TEMPLATE: &str = include_str!("../templates/edgesite.deploy.yaml");
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const ERROR_TEMPLATE: &str = include_str!("../templates/error.html");

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Synth { out } => cmd_synth(config_path, out.as_deref()).await,
        Commands::Graph => cmd_graph(config_path, &formatter).await,
        Commands::Plan { detailed } => cmd_plan(config_path, detailed, &formatter).await,
        Commands::Apply { yes, skip_engine } => {
            cmd_apply(config_path, yes, skip_engine, &formatter).await
        }
        Commands::Outputs => cmd_outputs(config_path, &formatter).await,
        Commands::Drift => cmd_drift(config_path, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config_path, yes, &formatter).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Initialize a new site project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new edgesite project in: {}", path.display());

    let config_path = path.join("edgesite.deploy.yaml");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    let content_dir = path.join("www");
    std::fs::create_dir_all(&content_dir)?;

    std::fs::write(&config_path, CONFIG_TEMPLATE)?;
    eprintln!("Created: {}", config_path.display());

    for (name, body) in [("index.html", INDEX_TEMPLATE), ("error.html", ERROR_TEMPLATE)] {
        let page = content_dir.join(name);
        if force || !page.exists() {
            std::fs::write(&page, body)?;
            eprintln!("Created: {}", page.display());
        }
    }

    let ignored = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.lines().any(|l| l.trim() == ignored || l.trim() == STATE_DIR) {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# edgesite\n{ignored}\n.env")?;
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!("{ignored}\n.env\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Set site.domain and site.subdomain in edgesite.deploy.yaml");
    eprintln!("  2. Run 'edgesite validate' to check your configuration");
    eprintln!("  3. Run 'edgesite plan' to see what will be deployed");
    eprintln!("  4. Run 'edgesite apply' to deploy your site");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let base_dir = config_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config, &base_dir)?;
    eprintln!("{}", formatter.format_validation(&result, show_warnings));

    if !formatter.is_json() {
        eprintln!("Configuration summary:");
        eprintln!("  Stack: {}", config.qualified_name());
        eprintln!("  Region: {}", config.project.region);
        if let (Some(domain), Some(subdomain)) = (&config.site.domain, &config.site.subdomain) {
            eprintln!("  Domain: {subdomain}.{domain}");
        }
    }

    Ok(())
}

/// Render the descriptor.
async fn cmd_synth(config_path: Option<&PathBuf>, out: Option<&Path>) -> Result<()> {
    let ctx = Context::load(config_path).await?;
    let json = ctx.descriptor.to_json_pretty()?;

    match out {
        Some(path) => {
            tokio::fs::write(path, format!("{json}\n")).await?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }

    Ok(())
}

/// Show resources in dependency order.
async fn cmd_graph(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let ctx = Context::load(config_path).await?;
    let graph = ctx.descriptor.graph()?;
    let order = graph.resolve_order()?;

    eprintln!("{}", formatter.format_graph(&order, &graph));
    Ok(())
}

/// Show deployment plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = Context::load(config_path).await?;
    let state = ctx.state_store.load().await?;
    if let Some(state) = &state {
        check_stack(state, &ctx.config.project)?;
    }

    let plan = ctx.plan(state.as_ref())?;
    eprintln!("{}", formatter.format_plan(&plan, detailed));

    Ok(())
}

/// Apply deployment plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    skip_engine: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = Context::load(config_path).await?;

    let lock = StateLock::acquire(&ctx.state_store, &generate_holder_id()).await?;
    let outcome = apply_locked(&ctx, auto_approve, skip_engine, formatter).await;
    let released = lock.release().await;

    outcome?;
    released
}

async fn apply_locked(
    ctx: &Context,
    auto_approve: bool,
    skip_engine: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut state = ctx.load_state().await?;
    let plan = ctx.plan(Some(&state))?;

    if plan.is_empty() {
        eprintln!("{}", formatter.success("No changes to apply."));
        return Ok(());
    }

    eprintln!("{}", formatter.format_plan(&plan, false));

    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let engine = ctx.engine();
    let executor = PlanExecutor::new(&engine, engine.workdir()).with_skip_engine(skip_engine);
    let result = executor.execute(&plan, &ctx.descriptor, &mut state).await?;

    ctx.state_store.save(&state).await?;
    eprintln!("{}", formatter.format_execution(&result));

    match result.error {
        Some(message) if !result.success => Err(EdgesiteError::internal(format!(
            "Apply failed: {message}"
        ))),
        _ => Ok(()),
    }
}

/// Show outputs of the last apply.
async fn cmd_outputs(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, state_store, _) = load_config_and_state(config_path).await?;
    let outputs = match state_store.load().await? {
        Some(state) => {
            check_stack(&state, &config.project)?;
            state.outputs
        }
        None => std::collections::BTreeMap::new(),
    };

    eprintln!("{}", formatter.format_outputs(&outputs));
    Ok(())
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let ctx = Context::load(config_path).await?;
    let engine = ctx.engine();

    PlanExecutor::new(&engine, engine.workdir())
        .write_descriptor(&ctx.descriptor)
        .await?;
    engine.init().await?;
    let drifted = engine.has_drift().await?;

    eprintln!("{}", formatter.format_drift(drifted));
    Ok(())
}

/// Destroy deployment.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = Context::load(config_path).await?;

    let lock = StateLock::acquire(&ctx.state_store, &generate_holder_id()).await?;
    let outcome = destroy_locked(&ctx, auto_approve, formatter).await;
    let released = lock.release().await;

    outcome?;
    released
}

async fn destroy_locked(ctx: &Context, auto_approve: bool, formatter: &OutputFormatter) -> Result<()> {
    let mut state = ctx.load_state().await?;

    if state.resources.is_empty() {
        eprintln!("{}", formatter.warning("No recorded resources; destroying whatever the engine manages."));
    } else {
        eprintln!("The following resources will be destroyed:");
        for address in state.resource_addresses() {
            eprintln!("  - {address}");
        }
    }

    if !auto_approve
        && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let engine = ctx.engine();
    let executor = PlanExecutor::new(&engine, engine.workdir());
    let result = executor.destroy(&ctx.descriptor, &mut state).await?;

    ctx.state_store.save(&state).await?;
    eprintln!("{}", formatter.format_execution(&result));

    match result.error {
        Some(message) if !result.success => Err(EdgesiteError::internal(format!(
            "Destroy failed: {message}"
        ))),
        _ => Ok(()),
    }
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store, _) = load_config_and_state(config_path).await?;

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load().await? {
                let lock = state_store.get_lock_info().await?;
                eprintln!("{}", formatter.format_state(&state, lock.as_ref()));
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = state_store.acquire_lock(&holder).await?;
            eprintln!("{}", formatter.success(&format!("State locked: {}", lock.lock_id)));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock_info) = state_store.get_lock_info().await? {
                    warn!("Force-releasing lock held by {}", lock_info.holder);
                    state_store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("{}", formatter.success("State forcefully unlocked."));
                } else {
                    eprintln!("State is not locked.");
                }
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                eprintln!("{}", formatter.success("State unlocked."));
            } else {
                eprintln!("{}", formatter.error("Please provide --lock-id or use --force"));
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Everything a descriptor-driven command needs.
struct Context {
    config: DeployConfig,
    state_store: Box<dyn StateStore>,
    base_dir: PathBuf,
    descriptor: Descriptor,
}

impl Context {
    async fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let (config, state_store, base_dir) = load_config_and_state(config_path).await?;
        let descriptor = build_descriptor(&config, &base_dir)?;
        Ok(Self {
            config,
            state_store,
            base_dir,
            descriptor,
        })
    }

    async fn load_state(&self) -> Result<DeploymentState> {
        match self.state_store.load().await? {
            Some(state) => {
                check_stack(&state, &self.config.project)?;
                Ok(state)
            }
            None => Ok(DeploymentState::new(
                &self.config.project.name,
                &self.config.project.environment,
            )),
        }
    }

    fn plan(&self, state: Option<&DeploymentState>) -> Result<DeploymentPlan> {
        let config_hash = ConfigHasher::new().hash_config(&self.config);
        let diff = DiffEngine::new().compute_diff(&self.descriptor, state);
        DeploymentPlan::from_diff(&diff, &self.descriptor, &config_hash)
    }

    fn engine(&self) -> TerraformEngine {
        TerraformEngine::new(
            &self.config.engine.binary,
            engine_workdir(&self.config, &self.base_dir),
        )
    }
}

/// Scans the content root and builds the site descriptor.
fn build_descriptor(config: &DeployConfig, base_dir: &Path) -> Result<Descriptor> {
    let mut inputs = config.site_inputs(base_dir)?;
    if let Ok(root) = inputs.content_root.canonicalize() {
        inputs.content_root = root;
    }

    let files = ContentScanner::new(&inputs.content_root).scan()?;
    debug!("Found {} content files", files.len());

    let workdir = engine_workdir(config, base_dir);
    let mut descriptor = SiteDescriptorBuilder::new(&inputs, &files)
        .with_bucket_prefix(&config.project.name)
        .with_source_dir(&workdir)
        .build()?;

    if let Some(backend) = config.engine_backend()? {
        debug!("Engine state at s3://{}/{}", backend.bucket, backend.key);
        descriptor.set_backend(backend);
    }
    Ok(descriptor)
}

/// The engine's working directory; object sources are written relative to it.
fn engine_workdir(config: &DeployConfig, base_dir: &Path) -> PathBuf {
    normalize(&resolve_path(base_dir, &config.engine.workdir))
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Absolute directory containing the configuration file.
fn config_dir(config_file: &Path) -> PathBuf {
    let dir = match config_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    dir.canonicalize().unwrap_or(dir)
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Asks for confirmation on stderr; true if the answer matches `expected`.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Loads configuration and creates the appropriate state store.
async fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(DeployConfig, Box<dyn StateStore>, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base_dir = config_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config, &base_dir)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    let project = &config.project;
    let state_store: Box<dyn StateStore> = match config.state.backend {
        StateBackend::Local => {
            let dir = config.state.path.as_deref().map_or_else(
                || base_dir.join(STATE_DIR),
                |p| resolve_path(&base_dir, p),
            );
            Box::new(LocalStateStore::new(dir, &project.name, &project.environment))
        }
        StateBackend::S3 => {
            let bucket = config
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| ConfigError::missing("state.bucket"))?;
            Box::new(
                S3StateStore::new(
                    bucket,
                    config.state.prefix.as_deref(),
                    config.state.region.as_deref(),
                    &project.name,
                    &project.environment,
                )
                .await?,
            )
        }
    };
    debug!("Using {} state backend", state_store.backend_type());

    Ok((config, state_store, base_dir))
}
