//! `relgate` command-line runner

mod scenario;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use relgate_audit::{read_jsonl, summarize, verify_chain, JsonlAuditLog, MemoryAuditLog};
use relgate_core::{AuditRecord, AuditSink, PipelineConfig};
use relgate_pipeline::{abort_pair, run_simulator, Pipeline, RunReport, SimulatorConfig};
use scenario::Scenario;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("relgate")
        .version(relgate_core::VERSION)
        .about("Reliability Gate: execute/escalate decisions for proposed remediation actions")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run the incidents of a scenario file through the pipeline")
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Scenario JSON file"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Pipeline configuration TOML"),
                )
                .arg(
                    Arg::new("audit-log")
                        .long("audit-log")
                        .value_parser(value_parser!(PathBuf))
                        .help("Append the audit trail to this JSON-lines file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print run reports as JSON"),
                ),
        )
        .subcommand(
            Command::new("verify-log")
                .about("Verify the hash chain of an audit log")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Audit log file"),
                ),
        )
        .subcommand(
            Command::new("summarize")
                .about("Compute KPIs from an audit log")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Audit log file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Check gate properties on seeded random inputs")
                .arg(
                    Arg::new("cases")
                        .long("cases")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of cases to generate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop at the first violation"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Pipeline configuration TOML"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<PipelineConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path).context("loading configuration"),
        None => Ok(PipelineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let passed = match matches.subcommand() {
        Some(("run", args)) => run(args).await?,
        Some(("verify-log", args)) => verify_log(args).await?,
        Some(("summarize", args)) => summarize_log(args).await?,
        Some(("simulate", args)) => simulate(args)?,
        _ => unreachable!("subcommand_required"),
    };
    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(args)?;
    let scenario_path = args
        .get_one::<PathBuf>("scenario")
        .context("--scenario is required")?;
    let scenario = Scenario::load(scenario_path)?;
    let json = args.get_flag("json");

    let memory = Arc::new(MemoryAuditLog::new());
    let audit: Arc<dyn AuditSink> = match args.get_one::<PathBuf>("audit-log") {
        Some(path) => Arc::new(
            JsonlAuditLog::open(path.clone())
                .await
                .with_context(|| format!("opening audit log {}", path.display()))?,
        ),
        None => memory.clone(),
    };

    let (incidents, collaborators) = scenario.into_parts(audit);
    let pipeline = Pipeline::new(config, collaborators)?;

    let (handle, abort) = abort_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, aborting pending approval waits");
            handle.abort();
        }
    });

    let results = pipeline.run_many(incidents, &abort).await;
    let mut reports = Vec::with_capacity(results.len());
    let mut failures = 0usize;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                failures += 1;
                tracing::error!(error = %e, fatal = e.is_fatal(), "run failed");
                if !json {
                    println!("run failed: {e}");
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
        let records: Vec<AuditRecord> = match args.get_one::<PathBuf>("audit-log") {
            Some(path) => read_jsonl(path)
                .await?
                .into_iter()
                .map(|e| e.record)
                .collect(),
            None => memory.records(),
        };
        println!("{}", summarize(&records));
    }
    Ok(failures == 0)
}

fn print_report(report: &RunReport) {
    println!("=== {} (run {}) ===", report.incident_id, report.run_id);
    println!(
        "Decision: {} [{}]",
        report.gate.decision,
        report.gate.reason_texts().join("; ")
    );
    println!(
        "Confidence: {:.1} -> {:.1} (delta {:+.1})",
        report.plan.confidence_initial(),
        report.stress.confidence_post_stress,
        report.gate.confidence_delta
    );
    println!(
        "Evidence coverage: {:.2}, contradicted claims: {}, policy conflicts: {}",
        report.stress.evidence_coverage,
        report.stress.contradicted_count(),
        report.stress.policy_conflicts.len()
    );
    println!(
        "Context: {}, risk: {}, signals: {}",
        report.compress.mode.as_str(),
        report.risk_level.as_str(),
        report.signals_source
    );
    println!(
        "Disagreement: {}, adaptability: {:.4}",
        report.adaptability.disagreement_detected, report.adaptability.adaptability_score
    );
    if let Some(escalation) = &report.escalation {
        println!("Escalation: {escalation:?}");
    }
    if let Some(execution) = &report.execution {
        println!(
            "Execution: {} mode, {:?}, {} step(s): {}",
            execution.mode.as_str(),
            execution.outcome,
            execution.steps.len(),
            execution.details
        );
    }
    if let Some(learn) = &report.learn {
        println!("Learn: {learn:?}");
    }
    for alert in &report.alerts {
        println!("OPERATIONAL ALERT: {} record lost: {}", alert.record_kind, alert.message);
    }
    println!("Final state: {}\n", report.final_state);
}

async fn verify_log(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = args.get_one::<PathBuf>("path").context("--path is required")?;
    let entries = read_jsonl(path).await?;
    match verify_chain(&entries) {
        Ok(()) => {
            let head = entries
                .last()
                .map_or(relgate_audit::GENESIS_HASH, |e| e.hash.as_str());
            println!("OK: {} entries, head {head}", entries.len());
            Ok(true)
        }
        Err(e) => {
            println!("FAILED: {e}");
            Ok(false)
        }
    }
}

async fn summarize_log(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = args.get_one::<PathBuf>("path").context("--path is required")?;
    let entries = read_jsonl(path).await?;
    let summary = summarize(entries.iter().map(|e| &e.record));
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(true)
}

fn simulate(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(args)?;
    let sim = SimulatorConfig {
        seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
        cases: args.get_one::<u64>("cases").copied().unwrap_or(1000),
        stop_on_first_violation: args.get_flag("stop-on-violation"),
    };
    let report = run_simulator(sim, config.gate, &config.scoring);
    println!("{}", report.generate_text());
    Ok(report.passed())
}
