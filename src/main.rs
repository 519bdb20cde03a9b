use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use agent_harness::config;
use agent_harness::environment::EnvironmentReporter;
use agent_harness::harness::{SuiteConfig, run_suite};
use agent_harness::report::AllureSink;
use agent_harness::runtime::{AdbProbe, ProcessRuntime, ProcessRuntimeConfig, RuntimeInfo};
use agent_harness::session::{DeviceContext, SessionContext};
use agent_harness::validator::TaskValidator;

/// Agent Harness - natural-language task validation for LLM agents
#[derive(Parser, Debug)]
#[command(
    name = "agent-harness",
    about = "Run natural-language test suites against an LLM agent and write Allure results",
    after_help = "ENVIRONMENT VARIABLES:\n\
        AGENT_HARNESS_BASE_URL         Target location prefixed to instructions\n\
        AGENT_HARNESS_DEVICE_ID        Pinned device id\n\
        AGENT_HARNESS_HEADLESS         Headless browser flag (legacy: HEADLESS)\n\
        AGENT_HARNESS_MODEL            Model identifier reported in the environment\n\
        AGENT_HARNESS_TASK_TIMEOUT     Per-dispatch timeout (seconds)\n\
        AGENT_HARNESS_RESULTS_DIR      Allure results directory\n\
        RUST_LOG                       Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a JSON task suite against an agent process
    Run {
        /// Path to the suite file
        #[arg(short, long)]
        suite: PathBuf,

        /// Agent program speaking the JSON-lines bridge protocol
        #[arg(short, long)]
        agent: PathBuf,

        /// Arguments to pass to the agent (comma-separated)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        agent_args: Vec<String>,

        /// Allure results directory
        #[arg(short, long, env = "AGENT_HARNESS_RESULTS_DIR")]
        results_dir: Option<PathBuf>,

        /// Target location (overrides the suite's base_url)
        #[arg(long)]
        base_url: Option<String>,

        /// Pinned device id
        #[arg(long)]
        device_id: Option<String>,

        /// Per-dispatch timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Capture screenshots and accessibility trees through adb
        #[arg(long)]
        adb: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write environment.properties for the current host and exit
    Env {
        /// Allure results directory
        #[arg(short, long, env = "AGENT_HARNESS_RESULTS_DIR")]
        results_dir: Option<PathBuf>,

        /// Runtime name to report
        #[arg(long, default_value = "external")]
        runtime: String,
    },

    /// List the cases of a suite without running them
    List {
        /// Path to the suite file
        #[arg(short, long)]
        suite: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Run {
            suite,
            agent,
            agent_args,
            results_dir,
            base_url,
            device_id,
            timeout,
            adb,
            json,
        }) => {
            let suite = SuiteConfig::load(&suite)?;

            let mut config = config::get().clone();
            if let Some(url) = base_url.or_else(|| suite.base_url.clone()) {
                config = config.with_base_url(url);
            }
            if let Some(id) = device_id {
                config = config.with_device_id(id);
            }
            if let Some(secs) = timeout {
                config = config.with_task_timeout(secs);
            }
            if let Some(dir) = results_dir {
                config = config.with_results_dir(dir);
            }

            let platform = if adb { "Android" } else { "Web" };
            let runtime = Arc::new(ProcessRuntime::new(
                ProcessRuntimeConfig::new(&agent)
                    .args(agent_args)
                    .info(RuntimeInfo::new(agent_name(&agent)).platform(platform)),
            ));
            let sink = Arc::new(AllureSink::new(&config.report.results_dir)?);
            let session = SessionContext::initialize(config, runtime.as_ref()).await;

            let mut validator = TaskValidator::new(runtime, sink.clone(), session.clone());
            if adb {
                let serial = session.device().device_id.clone();
                validator = validator.with_probe(Arc::new(AdbProbe::new(serial)));
            }

            let result = run_suite(&suite, &validator).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "Suite '{}' completed: {} passed, {} failed, {} broken",
                    suite.name,
                    result.passed(),
                    result.failed(),
                    result.broken()
                );
                for case in &result.cases {
                    let secs = Duration::from_millis(case.duration_ms).as_secs_f64();
                    println!("  [{:?}] {} ({:.1}s)", case.status, case.name, secs);
                    if let Some(err) = &case.error {
                        let preview: String = err.chars().take(200).collect();
                        println!("    {}", preview);
                    }
                }
                println!("\nResults: {}", sink.results_dir().display());
            }

            if !result.success {
                std::process::exit(1);
            }
        }

        Some(Commands::Env {
            results_dir,
            runtime,
        }) => {
            let mut config = config::get().clone();
            if let Some(dir) = results_dir {
                config = config.with_results_dir(dir);
            }
            let sink = AllureSink::new(&config.report.results_dir)?;
            let device = DeviceContext::new(
                config.target.device_id.clone(),
                config.target.device_server.clone(),
            );
            let session = SessionContext::new(config, RuntimeInfo::new(runtime), device);

            if !EnvironmentReporter::report(&session, &sink) {
                return Err("failed to write environment properties".into());
            }
            for (key, value) in session.environment().properties() {
                println!("{}={}", key, value);
            }
        }

        Some(Commands::List { suite }) => {
            let suite = SuiteConfig::load(&suite)?;
            println!("Suite '{}': {} cases", suite.name, suite.cases.len());
            for case in &suite.cases {
                let expected = case
                    .expected_substring
                    .as_ref()
                    .map(|s| format!(" (expects: {})", s))
                    .unwrap_or_default();
                println!("  {}{}", case.name, expected);
                for precondition in &case.preconditions {
                    println!("    before: {}", precondition);
                }
            }
        }

        None => {
            println!("Agent Harness - natural-language task validation for LLM agents");
            println!();
            println!("Usage: agent-harness <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run   Run a task suite against an agent process");
            println!("  env   Write environment.properties and exit");
            println!("  list  List the cases of a suite");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

fn agent_name(agent: &std::path::Path) -> String {
    agent
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "agent".to_string())
}
