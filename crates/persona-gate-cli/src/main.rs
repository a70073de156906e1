#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only output and panic-based assertions are permitted."
    )
)]
// persona-gate-cli/src/main.rs
// ============================================================================
// Module: Persona Gate CLI Entry Point
// Description: Command dispatcher for the tool server and cron workflows.
// Purpose: Serve the tool plane and run the scheduled evaluation jobs.
// Dependencies: clap, persona-gate-control, persona-gate-tools, tokio
// ============================================================================

//! ## Overview
//! The Persona Gate CLI serves the tool plane and runs the cron-driven
//! jobs: alert evaluation with persistence and the feedback overdue scan.
//! Exit codes follow the cron contract: 0 on success, 1 on error; clap
//! returns 2 on usage errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use persona_gate_cache::CacheKeyBuilder;
use persona_gate_cache::InMemoryTtlCache;
use persona_gate_cache::MemoryLimits;
use persona_gate_cache::SessionMemory;
use persona_gate_config::PersonaGateConfig;
use persona_gate_control::AlertEvaluator;
use persona_gate_control::ExperimentService;
use persona_gate_control::FeedbackService;
use persona_gate_control::HttpWebhookNotifier;
use persona_gate_control::PolicyLoader;
use persona_gate_control::PolicyService;
use persona_gate_control::RoutingLoader;
use persona_gate_control::RuntimeConfigService;
use persona_gate_control::load_rule_set;
use persona_gate_core::AlertRuleSet;
use persona_gate_core::FeedbackStore;
use persona_gate_core::IntentClassifier;
use persona_gate_core::MetricSource;
use persona_gate_core::NpcId;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use persona_gate_core::SiteId;
use persona_gate_core::TenantId;
use persona_gate_core::Timestamp;
use persona_gate_core::TraceId;
use persona_gate_core::UserId;
use persona_gate_core::WebhookNotifier;
use persona_gate_orchestrator::CachedRuntimeConfig;
use persona_gate_orchestrator::ChatRequest;
use persona_gate_orchestrator::Orchestrator;
use persona_gate_orchestrator::OrchestratorDials;
use persona_gate_orchestrator::OrchestratorParts;
use persona_gate_providers::LlmIntentClassifier;
use persona_gate_providers::OpenAiEmbeddingProvider;
use persona_gate_providers::QdrantRetriever;
use persona_gate_providers::RuleIntentClassifier;
use persona_gate_providers::build_llm_provider;
use persona_gate_providers::build_retrieval_provider;
use persona_gate_store_sqlite::SqliteStore;
use persona_gate_store_sqlite::SqliteStoreConfig;
use persona_gate_tools::CircuitBreaker;
use persona_gate_tools::LocalToolInvoker;
use persona_gate_tools::ResilientToolClient;
use persona_gate_tools::StderrToolAuditSink;
use persona_gate_tools::ToolHandlers;
use persona_gate_tools::ToolRegistry;
use persona_gate_tools::ToolServer;
use persona_gate_tools::ToolServerState;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "persona-gate",
    disable_help_subcommand = true,
    disable_version_flag = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Persona Gate tool server.
    Serve(ServeCommand),
    /// Alert evaluation jobs.
    Alerts {
        /// Selected alerts subcommand.
        #[command(subcommand)]
        command: AlertsCommand,
    },
    /// Feedback workflow jobs.
    Feedback {
        /// Selected feedback subcommand.
        #[command(subcommand)]
        command: FeedbackCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to persona-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Alerts subcommands.
#[derive(Subcommand, Debug)]
enum AlertsCommand {
    /// Evaluate every rule and persist firings (cron entry point).
    Run(AlertsRunCommand),
}

/// Arguments for the alerts evaluation job.
#[derive(Args, Debug)]
struct AlertsRunCommand {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Tenant to evaluate.
    #[arg(long, value_name = "TENANT")]
    tenant_id: String,
    /// Restrict evaluation to one site.
    #[arg(long, value_name = "SITE")]
    site_id: Option<String>,
    /// Evaluate without webhook notifications.
    #[arg(long, action = ArgAction::SetTrue)]
    no_webhook: bool,
    /// Report rule values without persisting or notifying.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

/// Feedback subcommands.
#[derive(Subcommand, Debug)]
enum FeedbackCommand {
    /// Flag open tickets past their SLA deadline (cron entry point).
    ScanOverdue(ScanOverdueCommand),
}

/// Arguments for the overdue scan job.
#[derive(Args, Debug)]
struct ScanOverdueCommand {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Report candidates without flagging them.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("persona-gate {version}"))
            .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
        return Ok(ExitCode::SUCCESS);
    }

    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Alerts {
            command: AlertsCommand::Run(command),
        } => command_alerts_run(command).await,
        Commands::Feedback {
            command: FeedbackCommand::ScanOverdue(command),
        } => command_feedback_scan(command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config)?;
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .map_err(|err| CliError::new(format!("bind address invalid: {err}")))?;

    let store = open_store(&config)?;
    if let Some(seed) = &config.policy.seed_path {
        let policies =
            PolicyService::new(Arc::clone(&store) as _, Arc::clone(&store) as _);
        let seeded = policies
            .seed_from_file(
                &Scope::new("system", "system"),
                &config.policy.name,
                seed,
                now_timestamp(),
            )
            .map_err(|err| CliError::new(format!("policy seed failed: {err}")))?;
        if let Some(policy) = seeded {
            write_stderr_line(&format!("seeded policy {} {}", policy.name, policy.version))
                .map_err(|err| CliError::new(format!("stderr write failed: {err}")))?;
        }
    }
    let cache = Arc::new(InMemoryTtlCache::new());
    let keys = CacheKeyBuilder::new(config.cache.prefix.clone());

    let embedder = Arc::new(
        OpenAiEmbeddingProvider::new(
            config.llm.openai.api_base.clone(),
            config.llm.openai.api_key.clone(),
            config.llm.embedding.model.clone(),
            config.llm.embedding.dimension,
            Duration::from_millis(config.llm.timeout_ms),
        )
        .map_err(|err| CliError::new(format!("embedding client init failed: {err}")))?,
    );
    let qdrant = Arc::new(
        QdrantRetriever::new(
            config.retrieval.qdrant.url.clone(),
            config.retrieval.qdrant.collection.clone(),
            config.retrieval.qdrant.api_key.clone(),
            embedder,
            Duration::from_millis(config.llm.timeout_ms),
        )
        .map_err(|err| CliError::new(format!("qdrant client init failed: {err}")))?,
    );
    let retrieval = build_retrieval_provider(
        config.retrieval.strategy,
        Arc::clone(&store) as _,
        qdrant,
        config.retrieval.candidate_limit,
        config.retrieval.trgm_weight,
        config.retrieval.qdrant_weight,
    );

    let registry = Arc::new(ToolRegistry::new());
    let handlers = Arc::new(ToolHandlers::new(
        Arc::clone(&store) as _,
        retrieval,
        Arc::clone(&cache) as _,
        keys.clone(),
    ));
    let state = Arc::new(ToolServerState {
        registry: Arc::clone(&registry),
        handlers: Arc::clone(&handlers),
        internal_api_key: config.server.internal_api_key.clone(),
    });

    let orchestrator = build_orchestrator(&config, &store, cache, keys, registry, handlers)?;
    let router = Router::new()
        .route("/chat", post(chat_handler))
        .with_state(Arc::new(orchestrator))
        .merge(ToolServer::new(state).router());

    write_stderr_line(&format!("persona-gate listening on {addr}"))
        .map_err(|err| CliError::new(format!("stderr write failed: {err}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| CliError::new(format!("bind failed: {err}")))?;
    axum::serve(listener, router)
        .await
        .map_err(|err| CliError::new(format!("serve failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Wires the turn pipeline from configuration.
fn build_orchestrator(
    config: &PersonaGateConfig,
    store: &Arc<SqliteStore>,
    cache: Arc<InMemoryTtlCache>,
    keys: CacheKeyBuilder,
    registry: Arc<ToolRegistry>,
    handlers: Arc<ToolHandlers>,
) -> CliResult<Orchestrator> {
    let llm = build_llm_provider(&config.llm)
        .map_err(|err| CliError::new(format!("llm provider init failed: {err}")))?;
    let intent: Arc<dyn IntentClassifier> = if config.intent.use_llm {
        Arc::new(LlmIntentClassifier::new(
            Arc::clone(&llm),
            Duration::from_secs(config.intent.cache_ttl_seconds),
            Duration::from_millis(config.intent.timeout_ms),
        ))
    } else {
        Arc::new(RuleIntentClassifier::new())
    };

    let invoker = Arc::new(LocalToolInvoker::new(registry, handlers));
    let breaker_policy = config.tools.default_policy.clone();
    let tools = Arc::new(ResilientToolClient::new(
        invoker,
        config.tools.clone(),
        Arc::new(CircuitBreaker::new(
            breaker_policy.circuit_breaker_threshold,
            Duration::from_millis(breaker_policy.breaker_cooldown_ms),
        )),
        Arc::new(StderrToolAuditSink),
        Some(Arc::clone(store) as _),
    ));
    let runtime = Arc::new(CachedRuntimeConfig::new(
        Arc::new(RuntimeConfigService::new(
            Arc::clone(store) as _,
            Arc::clone(store) as _,
            config.policy.name.clone(),
        )),
        Duration::from_secs(config.policy.cache_ttl_seconds),
    ));
    let policy = Arc::new(PolicyLoader::new(
        Arc::clone(store) as _,
        config.policy.name.clone(),
        Duration::from_secs(config.policy.cache_ttl_seconds),
    ));
    let memory = Arc::new(SessionMemory::new(
        cache,
        keys,
        MemoryLimits {
            max_messages: config.memory.max_messages,
            max_chars: config.memory.max_chars,
            ttl: Duration::from_secs(config.memory.ttl_seconds),
        },
    ));

    Ok(Orchestrator::new(OrchestratorParts {
        tools,
        runtime,
        policy,
        experiments: Arc::new(ExperimentService::new(Arc::clone(store) as _)),
        intent,
        llm,
        memory,
        traces: Arc::clone(store) as _,
        dials: OrchestratorDials {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            llm_max_attempts: config.llm.max_attempts,
            turn_deadline: Duration::from_millis(config.llm.timeout_ms),
            memory_enabled: config.memory.enabled,
            memory_messages: config.memory.max_messages,
            memory_chars: config.memory.max_chars,
        },
    }))
}

// ============================================================================
// SECTION: Chat Endpoint
// ============================================================================

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
struct ChatBody {
    /// NPC to answer.
    npc_id: String,
    /// User message.
    message: String,
    /// Session grouping multi-turn context.
    #[serde(default)]
    session_id: Option<String>,
    /// End user, when known.
    #[serde(default)]
    user_id: Option<String>,
}

/// `POST /chat` handler: one turn through the pipeline.
async fn chat_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Response {
    let tenant = headers.get("X-Tenant-ID").and_then(|value| value.to_str().ok());
    let site = headers.get("X-Site-ID").and_then(|value| value.to_str().ok());
    let (Some(tenant), Some(site)) = (tenant, site) else {
        let payload = serde_json::json!({
            "code": "validation",
            "message": "X-Tenant-ID and X-Site-ID headers are required",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
    };
    let trace_id = headers
        .get("X-Trace-ID")
        .and_then(|value| value.to_str().ok())
        .map(TraceId::new);

    let request = ChatRequest {
        scope: Scope::new(tenant, site),
        npc_id: NpcId::new(body.npc_id),
        query: body.message,
        session_id: body.session_id.map(SessionId::new),
        user_id: body.user_id.map(UserId::new),
        trace_id,
    };
    match orchestrator.chat(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            let kind = err.error_kind();
            let status = StatusCode::from_u16(kind.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let payload = serde_json::json!({
                "code": kind.as_str(),
                "message": err.to_string(),
            });
            (status, Json(payload)).into_response()
        }
    }
}

// ============================================================================
// SECTION: Alerts Command
// ============================================================================

/// Executes the alerts evaluation job.
async fn command_alerts_run(command: AlertsRunCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config)?;
    let store = open_store(&config)?;

    let rules: AlertRuleSet = match &config.alerts.rules_path {
        Some(path) => load_rule_set(path)
            .map_err(|err| CliError::new(format!("alert rules load failed: {err}")))?,
        None => AlertRuleSet::default(),
    };

    let tenant = TenantId::new(command.tenant_id.clone());
    let site = command.site_id.clone().map(SiteId::new);
    if command.dry_run {
        for rule in &rules.rules {
            let value = store
                .current_value(&tenant, site.as_ref().map(SiteId::as_str), &rule.expr, &rule.window)
                .unwrap_or(f64::NAN);
            let firing = rule.condition.holds(value, rule.threshold);
            write_stdout_line(&format!(
                "[{}] {} = {value} (threshold {} {}, firing={firing})",
                rule.severity, rule.code, rule.condition, rule.threshold
            ))
            .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let notifier: Option<Arc<dyn WebhookNotifier>> =
        match (&config.alerts.webhook_url, command.no_webhook) {
            (Some(url), false) => Some(Arc::new(
                HttpWebhookNotifier::new(url.clone())
                    .map_err(|err| CliError::new(format!("webhook init failed: {err}")))?,
            )),
            _ => None,
        };

    let evaluator = AlertEvaluator::new(
        rules,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        notifier,
    );
    let summary = evaluator
        .evaluate(&tenant, site.as_ref(), now_timestamp())
        .await
        .map_err(|err| CliError::new(format!("alert evaluation failed: {err}")))?;

    let rendered = serde_json::to_string(&summary)
        .map_err(|err| CliError::new(format!("summary encode failed: {err}")))?;
    write_stdout_line(&rendered)
        .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Feedback Command
// ============================================================================

/// Executes the feedback overdue scan job.
fn command_feedback_scan(command: ScanOverdueCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config)?;
    let store = open_store(&config)?;
    let now = now_timestamp();

    if command.dry_run {
        let candidates = store
            .overdue_candidates(now)
            .map_err(|err| CliError::new(format!("overdue scan failed: {err}")))?;
        write_stdout_line(&format!("overdue_candidates={}", candidates.len()))
            .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
        return Ok(ExitCode::SUCCESS);
    }

    let routing = RoutingLoader::new(
        config.feedback.routing_rules_path.clone(),
        Duration::from_secs(config.feedback.routing_cache_ttl_seconds),
        &config.feedback.default_group,
        config.feedback.default_sla_hours,
    );
    let service =
        FeedbackService::new(Arc::clone(&store) as _, routing, Arc::clone(&store) as _);
    let marked = service
        .scan_overdue(now)
        .map_err(|err| CliError::new(format!("overdue scan failed: {err}")))?;
    write_stdout_line(&format!("overdue_marked={marked}"))
        .map_err(|err| CliError::new(format!("stdout write failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Loads and validates the configuration.
fn load_config(path: Option<PathBuf>) -> CliResult<PersonaGateConfig> {
    PersonaGateConfig::load(path.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Opens the durable store from configuration.
fn open_store(config: &PersonaGateConfig) -> CliResult<Arc<SqliteStore>> {
    let store = SqliteStore::new(&SqliteStoreConfig {
        path: config.store.path.clone(),
        busy_timeout_ms: config.store.busy_timeout_ms,
    })
    .map_err(|err| CliError::new(format!("store open failed: {err}")))?;
    Ok(Arc::new(store))
}

/// Current wall-clock time as a platform timestamp.
fn now_timestamp() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(0))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
