//! `helm-cli` – the `helm` binary.
//!
//! Drives a remote robot toward a natural-language instruction:
//!
//! 1. Loads `~/.helm/config.toml` (with `HELM_*` env overrides) and the
//!    command-line flags.
//! 2. Fetches the executor's manifest, classifies command semantics
//!    (cached), and resolves the capability mapping.
//! 3. Runs the attempt loop: reset → rollout → judge → adapt.
//! 4. Intercepts **Ctrl-C** to abort between steps; the loop always sends
//!    a final stop to the executor on the way out.
//!
//! Exit codes: `0` success verdict, `1` fatal error, `2` attempt budget
//! exhausted, `130` operator abort.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use colored::Colorize;
use tracing::{error, info, warn};
use uuid::Uuid;

use helm_hal::{Camera, SyntheticCamera};
use helm_kernel::infer_capabilities;
use helm_memory::{JudgeStore, SemanticsStore, load_task_state};
use helm_middleware::OrchestratorClient;
use helm_runtime::{
    AttemptLoop, ClassificationService, LlmClassifier, LlmClient, LlmJudge, LlmPlanner,
    LlmVision, LoopConfig, RunOutcome, resolve_semantics,
};
use helm_types::{Manifest, TaskState};

/// Closed-loop autonomy engine: sense, shield, plan, execute, judge, adapt.
#[derive(Parser, Debug)]
#[command(name = "helm", version, about)]
struct Args {
    /// Orchestrator HTTP base URL (overrides config).
    #[arg(long)]
    orchestrator: Option<String>,

    /// Task instruction text (overrides the task file).
    #[arg(long)]
    instruction: Option<String>,

    /// Path to the task-state JSON file (updated when patches apply).
    #[arg(long)]
    task: Option<PathBuf>,

    /// Max attempts (execute → judge → patch cycles).
    #[arg(long, default_value_t = 8)]
    attempts: u32,

    /// Max steps per attempt.
    #[arg(long = "max-steps", default_value_t = 8)]
    max_steps: u32,

    /// Best-effort reset-to-home timeout, in seconds.
    #[arg(long = "reset-timeout-s", default_value_t = 6.0)]
    reset_timeout_s: f64,

    /// Directory for episode artifacts (frames/steps).
    #[arg(long = "out-dir", default_value = ".helm/episodes")]
    out_dir: PathBuf,

    /// Directory for the semantics and judge caches.
    #[arg(long = "cache-dir", default_value = ".helm")]
    cache_dir: PathBuf,

    /// Model for planner/judge/vision (overrides config).
    #[arg(long)]
    model: Option<String>,

    /// Refine manifest semantics with the LLM (cached per manifest).
    #[arg(long = "refine-semantics")]
    refine_semantics: bool,

    /// Disable parameter exploration when the judge provides no patch.
    #[arg(long = "no-auto-explore")]
    no_auto_explore: bool,

    /// Correlation id (default: random).
    #[arg(long = "run-id")]
    run_id: Option<String>,

    /// Capture width of the built-in synthetic camera. Hardware cameras
    /// are provided by drivers implementing the HAL camera trait.
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Capture height of the built-in synthetic camera.
    #[arg(long, default_value_t = 240)]
    height: u32,
}

fn main() {
    let args = Args::parse();

    // Structured logging first: RUST_LOG filter, HELM_LOG_FORMAT=json for
    // aggregators, OTEL_EXPORTER_OTLP_ENDPOINT for span export. The guard
    // must outlive the runtime so pending spans flush on exit.
    let _guard = helm_runtime::telemetry::init_tracing("helm");

    println!("{}", "  helm – closed-loop autonomy engine".bold().cyan());

    if args.instruction.is_none() && args.task.is_none() {
        eprintln!("{}", "error: --instruction or --task is required".red());
        std::process::exit(1);
    }

    // First run: materialize a default config so the user has a file to
    // edit (API key, orchestrator URL).
    if !config::config_path().exists() {
        match config::save(&config::Config::default()) {
            Ok(()) => println!(
                "  Wrote default config to {}",
                config::config_path().display().to_string().bold()
            ),
            Err(e) => warn!(error = %e, "could not write default config"),
        }
    }

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            eprintln!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Ctrl-C: abort between steps, never mid-call ───────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current step …".yellow().bold());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful abort unavailable");
    }

    // The runtime is created only after tracing init (the OTLP exporter is
    // synchronous and must not require a running runtime).
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Runtime error".red(), e);
            std::process::exit(1);
        }
    };
    let code = runtime.block_on(run(args, cfg, shutdown));
    std::process::exit(code);
}

async fn run(args: Args, cfg: config::Config, shutdown: Arc<AtomicBool>) -> i32 {
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| format!("auto-{}", &Uuid::new_v4().simple().to_string()[..10]));
    let orchestrator_url = args
        .orchestrator
        .clone()
        .unwrap_or_else(|| cfg.orchestrator_url.clone());
    let model = args.model.clone().unwrap_or_else(|| cfg.model.clone());

    // ── Executor status + manifest ────────────────────────────────────────
    print!("  Probing orchestrator at {} … ", orchestrator_url.dimmed());
    let orchestrator = OrchestratorClient::new(&orchestrator_url);
    let manifest_value = match orchestrator.status().await {
        Ok(v) => {
            println!("{}", "online".green());
            v
        }
        Err(e) => {
            println!("{}", "offline".red());
            error!(error = %e, "orchestrator status failed");
            return 1;
        }
    };
    let manifest = Manifest::from_value(&manifest_value);
    if manifest.nodes.is_empty() {
        warn!("manifest carries no usable nodes; most capabilities will be unavailable");
    }

    // ── Semantics + capabilities ──────────────────────────────────────────
    let api_key = if cfg.api_key.is_empty() {
        None
    } else {
        Some(cfg.api_key.clone())
    };
    let llm = Arc::new(LlmClient::new(cfg.llm_base_url.clone(), model, api_key));

    let semantics_store = SemanticsStore::new(args.cache_dir.join("semantics_cache.json"));
    let classifier = args
        .refine_semantics
        .then(|| LlmClassifier::new(llm.clone()));
    let semantics = match resolve_semantics(
        &manifest,
        &semantics_store,
        classifier.as_ref().map(|c| c as &dyn ClassificationService),
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "semantics resolution failed");
            return 1;
        }
    };
    let caps = infer_capabilities(&manifest, &semantics);
    info!(?caps, commands = semantics.len(), "capabilities resolved");

    // ── Task state ────────────────────────────────────────────────────────
    let mut task = match &args.task {
        Some(path) if path.exists() => match load_task_state(path) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "task file unusable");
                return 1;
            }
        },
        _ => TaskState::default(),
    };
    if let Some(instruction) = &args.instruction {
        task.instruction = instruction.clone();
    }

    // ── Wire the loop ─────────────────────────────────────────────────────
    let camera: Box<dyn Camera> = Box::new(SyntheticCamera::new(args.width, args.height));
    let loop_config = LoopConfig {
        run_id: run_id.clone(),
        attempts: args.attempts,
        max_steps: args.max_steps,
        reset_timeout_s: args.reset_timeout_s,
        out_dir: args.out_dir.clone(),
        auto_explore: !args.no_auto_explore,
        ..LoopConfig::default()
    };
    let mut attempt_loop = match AttemptLoop::new(
        loop_config,
        camera,
        Arc::new(LlmVision::new(llm.clone())),
        Arc::new(LlmPlanner::new(llm.clone())),
        Arc::new(LlmJudge::new(llm.clone())),
        JudgeStore::new(args.cache_dir.join("judge_cache.json")),
        Arc::new(orchestrator),
        manifest,
        semantics,
        caps,
        task,
        args.task.clone(),
        shutdown,
    ) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{}: {}", "error".red(), e);
            return 1;
        }
    };

    // ── Run ───────────────────────────────────────────────────────────────
    match attempt_loop.run().await {
        Ok(RunOutcome::Success { attempt }) => {
            println!(
                "  {} (attempt {})",
                "✓ instruction accomplished".green().bold(),
                attempt
            );
            0
        }
        Ok(RunOutcome::Exhausted { attempts }) => {
            println!(
                "  {} after {} attempt(s)",
                "✗ no success verdict".yellow().bold(),
                attempts
            );
            2
        }
        Ok(RunOutcome::Aborted) => {
            println!("  {}", "∎ aborted by operator".yellow());
            130
        }
        Err(e) => {
            eprintln!("{}: {}", "run failed".red().bold(), e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_with_instruction() {
        let args = Args::parse_from([
            "helm",
            "--instruction",
            "drive a square",
            "--attempts",
            "3",
            "--max-steps",
            "5",
        ]);
        assert_eq!(args.instruction.as_deref(), Some("drive a square"));
        assert_eq!(args.attempts, 3);
        assert_eq!(args.max_steps, 5);
        assert!(!args.refine_semantics);
        assert!(!args.no_auto_explore);
    }

    #[test]
    fn args_defaults_match_the_documented_surface() {
        let args = Args::parse_from(["helm", "--instruction", "x"]);
        assert_eq!(args.attempts, 8);
        assert_eq!(args.max_steps, 8);
        assert_eq!(args.reset_timeout_s, 6.0);
        assert_eq!(args.out_dir, PathBuf::from(".helm/episodes"));
        assert_eq!(args.cache_dir, PathBuf::from(".helm"));
        assert_eq!(args.width, 320);
        assert_eq!(args.height, 240);
    }

    #[test]
    fn flags_toggle_semantics_and_exploration() {
        let args = Args::parse_from([
            "helm",
            "--instruction",
            "x",
            "--refine-semantics",
            "--no-auto-explore",
        ]);
        assert!(args.refine_semantics);
        assert!(args.no_auto_explore);
    }
}
