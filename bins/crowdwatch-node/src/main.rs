//! Crowdwatch node binary.
//!
//! Loads configuration, wires the trust pipeline over the configured store,
//! and replays a JSON-lines action script through the report lifecycle
//! coordinator, printing one JSON outcome per action on stdout.
//!
//! Each script line is an object tagged by `action`:
//!
//! ```text
//! {"action":"submit","author":"alice","text":"...","location_text":"Láng Hạ"}
//! {"action":"vote","report":"<id>","voter":"bob","vote":"up"}
//! {"action":"official_source","report":"<id>","reference":"bulletin-7"}
//! {"action":"fake_alarm","report":"<id>"}
//! {"action":"stats","user":"alice"}
//! {"action":"stats","report":"<id>"}
//! {"action":"reward","user":"alice"}
//! {"action":"penalty","user":"alice"}
//! {"action":"reevaluate","report":"<id>"}
//! {"action":"sweep"}
//! {"action":"advance","secs":604800}
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crowdwatch_core::error::{ReportError, StoreError};
use crowdwatch_core::time::{Clock, ManualClock, SystemClock};
use crowdwatch_core::types::{ReportId, VoteKind};
use crowdwatch_node_lib::coordinator::{SubmissionOutcome, VoteOutcome};
use crowdwatch_node_lib::{Node, NodeConfig, StorageBackend};

/// Crowdwatch node: replays report actions through the trust pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "crowdwatch-node",
    version,
    about = "Crowdwatch node replaying a JSON-lines action script"
)]
struct Args {
    /// Configuration file (TOML, JSON, or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for the report database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage backend ("memory" or "rocksdb")
    #[arg(long, value_parser = ["memory", "rocksdb"])]
    storage: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,

    /// Run on a simulated clock starting at this unix time.
    ///
    /// Enables the `advance` action.
    #[arg(long)]
    start_at: Option<i64>,

    /// Action script; reads stdin when omitted
    script: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        match self.storage.as_deref() {
            Some("memory") => config.storage = StorageBackend::Memory,
            Some("rocksdb") => config.storage = StorageBackend::Rocksdb,
            _ => {}
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Script actions
// ---------------------------------------------------------------------------

/// One line of an action script.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    Submit(crowdwatch_node_lib::SubmissionRequest),
    Vote {
        report: ReportId,
        voter: String,
        vote: VoteKind,
    },
    OfficialSource {
        report: ReportId,
        reference: String,
    },
    FakeAlarm {
        report: ReportId,
    },
    /// Credibility of a report, or reputation and activity of a user.
    Stats {
        #[serde(default)]
        report: Option<ReportId>,
        #[serde(default)]
        user: Option<String>,
    },
    Reward {
        user: String,
    },
    Penalty {
        user: String,
    },
    Reevaluate {
        report: ReportId,
    },
    /// Removal check over `reports`, or every report accepted so far.
    Sweep {
        #[serde(default)]
        reports: Vec<ReportId>,
    },
    /// Move the simulated clock forward.
    Advance {
        secs: i64,
    },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::Submit(_) => "submit",
            Self::Vote { .. } => "vote",
            Self::OfficialSource { .. } => "official_source",
            Self::FakeAlarm { .. } => "fake_alarm",
            Self::Stats { .. } => "stats",
            Self::Reward { .. } => "reward",
            Self::Penalty { .. } => "penalty",
            Self::Reevaluate { .. } => "reevaluate",
            Self::Sweep { .. } => "sweep",
            Self::Advance { .. } => "advance",
        }
    }
}

fn report_error_code(e: &ReportError) -> &'static str {
    match e {
        ReportError::NotFound(_) => "REPORT_NOT_FOUND",
        ReportError::InvalidOperation(_) => "INVALID_OPERATION",
        ReportError::Suspended { .. } => "USER_SUSPENDED",
        ReportError::Store(_) => "STORAGE_ERROR",
    }
}

fn failure(code: &str, message: impl std::fmt::Display) -> Value {
    json!({ "code": code, "message": message.to_string() })
}

fn report_failure(e: &ReportError) -> Value {
    failure(report_error_code(e), e)
}

fn store_failure(e: &StoreError) -> Value {
    failure("STORAGE_ERROR", e)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
    node: Node,
    manual_clock: Option<ManualClock>,
    /// Reports accepted during this run, in submission order.
    accepted: Vec<ReportId>,
}

impl Session {
    fn open(config: &NodeConfig, start_at: Option<i64>) -> Result<Self> {
        let manual_clock = start_at.map(ManualClock::new);
        let clock: Arc<dyn Clock> = match &manual_clock {
            Some(clock) => Arc::new(clock.clone()),
            None => Arc::new(SystemClock),
        };
        if config.storage == StorageBackend::Rocksdb {
            std::fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
        }
        let node = Node::open(config, clock).context("failed to open node")?;

        Ok(Self {
            node,
            manual_clock,
            accepted: Vec::new(),
        })
    }

    async fn run(&mut self, action: Action) -> Value {
        let name = action.name();
        let mut outcome = self.dispatch(action).await;
        if let Value::Object(map) = &mut outcome {
            map.insert("action".to_string(), Value::from(name));
        }
        outcome
    }

    async fn dispatch(&mut self, action: Action) -> Value {
        let coordinator = &self.node.coordinator;
        match action {
            Action::Submit(request) => match coordinator.submit(request).await {
                Ok(outcome) => {
                    let mut value = json!({
                        "code": outcome.code(),
                        "message": outcome.message(),
                    });
                    match &outcome {
                        SubmissionOutcome::Accepted { report, related_to } => {
                            self.accepted.push(report.id.clone());
                            value["report"] = json!(report);
                            value["related_to"] = json!(related_to);
                        }
                        SubmissionOutcome::Duplicate {
                            existing,
                            similarity,
                        } => {
                            value["existing"] = json!(existing);
                            value["similarity"] = json!(similarity);
                        }
                        SubmissionOutcome::Rejected(_) => {}
                    }
                    value
                }
                Err(e) => report_failure(&e),
            },
            Action::Vote {
                report,
                voter,
                vote,
            } => match coordinator.cast_vote(&report, &voter, vote).await {
                Ok(VoteOutcome::Recorded(update)) => json!({
                    "code": "SUCCESS",
                    "message": format!("{voter} voted {vote} on {report}"),
                    "report": update.report,
                    "transition": update.transition,
                }),
                Ok(VoteOutcome::Unchanged(current)) => json!({
                    "code": "VOTE_UNCHANGED",
                    "message": format!("{voter} already voted {vote} on {report}"),
                    "report": current,
                }),
                Err(e) => report_failure(&e),
            },
            Action::OfficialSource { report, reference } => {
                match coordinator.attach_official_source(&report, &reference).await {
                    Ok(update) => json!({
                        "code": "SUCCESS",
                        "message": format!("official source {reference} attached to {report}"),
                        "report": update.report,
                        "transition": update.transition,
                    }),
                    Err(e) => report_failure(&e),
                }
            }
            Action::FakeAlarm { report } => match coordinator.flag_fake_alarm(&report).await {
                Ok(outcome) => json!({
                    "code": "SUCCESS",
                    "message": format!(
                        "report {report} flagged as fake alarm; author has {} fake alarms ({})",
                        outcome.fake_alarms, outcome.penalty.ban
                    ),
                    "fake_alarms": outcome.fake_alarms,
                    "penalty": outcome.penalty,
                    "report": outcome.update.report,
                }),
                Err(e) => report_failure(&e),
            },
            Action::Stats { report, user } => self.stats(report, user).await,
            Action::Reward { user } => match coordinator.reward_for(&user).await {
                Ok(decision) => json!({
                    "code": "SUCCESS",
                    "message": decision.reason(),
                    "eligible": decision.is_eligible(),
                    "amount": decision.amount(),
                }),
                Err(e) => store_failure(&e),
            },
            Action::Penalty { user } => match coordinator.penalty_for(&user).await {
                Ok(decision) => json!({
                    "code": "SUCCESS",
                    "message": decision
                        .reason
                        .clone()
                        .unwrap_or_else(|| "no penalty".to_string()),
                    "penalty": decision,
                }),
                Err(e) => store_failure(&e),
            },
            Action::Reevaluate { report } => match coordinator.reevaluate(&report).await {
                Ok(update) => json!({
                    "code": "SUCCESS",
                    "message": format!("report {report} is {}", update.report.status),
                    "report": update.report,
                    "transition": update.transition,
                }),
                Err(e) => report_failure(&e),
            },
            Action::Sweep { reports } => {
                let targets = if reports.is_empty() {
                    self.accepted.clone()
                } else {
                    reports
                };
                self.sweep(&targets).await
            }
            Action::Advance { secs } => match &self.manual_clock {
                Some(clock) if secs >= 0 => {
                    clock.advance_secs(secs);
                    json!({
                        "code": "SUCCESS",
                        "message": format!("clock advanced by {secs}s"),
                        "now": clock.now(),
                    })
                }
                Some(_) => failure("INVALID_OPERATION", "clock cannot move backwards"),
                None => failure(
                    "INVALID_OPERATION",
                    "advance needs a simulated clock (--start-at)",
                ),
            },
        }
    }

    async fn stats(&self, report: Option<ReportId>, user: Option<String>) -> Value {
        let coordinator = &self.node.coordinator;
        if let Some(report) = report {
            return match coordinator.credibility_of(&report).await {
                Ok(credibility) => json!({
                    "code": "SUCCESS",
                    "message": credibility
                        .breakdown
                        .as_ref()
                        .map(|b| b.formula.clone())
                        .unwrap_or_else(|| "verified by official source".to_string()),
                    "credibility": credibility,
                }),
                Err(e) => report_failure(&e),
            };
        }
        let Some(user) = user else {
            return failure("INVALID_ACTION", "stats needs a report or a user");
        };
        match coordinator.user_activity(&user).await {
            Ok(activity) => json!({
                "code": "SUCCESS",
                "message": format!("statistics for {user}"),
                "reputation": coordinator.reputation().get_user_stats(&user),
                "activity": activity,
            }),
            Err(e) => store_failure(&e),
        }
    }

    async fn sweep(&self, targets: &[ReportId]) -> Value {
        let mut removed = Vec::new();
        for id in targets {
            match self.node.coordinator.enforce_removal(id).await {
                Ok(Some(update)) => removed.push(update.report.id),
                Ok(None) => {}
                // Reports that expired or were never stored are not an error here.
                Err(ReportError::NotFound(_)) => {}
                Err(e) => return report_failure(&e),
            }
        }
        json!({
            "code": "SUCCESS",
            "message": format!("removed {} of {} reports", removed.len(), targets.len()),
            "removed": removed,
        })
    }

    /// Purge expired records and flush to disk.
    fn close(&self) -> Result<()> {
        let purged = self.node.close()?;
        info!("node: purged {} expired records", purged);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

async fn replay(session: &mut Session, input: Box<dyn AsyncBufRead + Unpin + Send>) -> Result<usize> {
    let mut lines = input.lines();
    let mut count = 0usize;
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("failed to read script")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let outcome = match serde_json::from_str::<Action>(line) {
            Ok(action) => {
                count += 1;
                session.run(action).await
            }
            Err(e) => {
                warn!("node: line {} is not a valid action: {}", line_no, e);
                let mut value = failure("INVALID_ACTION", e);
                value["line"] = json!(line_no);
                value
            }
        };
        println!("{}", serde_json::to_string(&outcome)?);
    }
    Ok(count)
}

async fn open_script(path: Option<&PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    Ok(match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open script {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match NodeConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            process::exit(1);
        }
    };
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        process::exit(1);
    }

    init_logging(&config.log_level, &config.log_format);

    info!("Crowdwatch Node v{}", env!("CARGO_PKG_VERSION"));
    info!("storage: {:?}", config.storage);
    info!("data_dir: {:?}", config.data_dir);

    if let Err(e) = run(&args, &config).await {
        error!("node: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: &Args, config: &NodeConfig) -> Result<()> {
    if args.start_at.is_some_and(|t| t < 0) {
        bail!("--start-at must be a non-negative unix time");
    }
    let mut session = Session::open(config, args.start_at)?;
    info!("node: coordinator ready");

    let input = open_script(args.script.as_ref()).await?;
    tokio::select! {
        result = replay(&mut session, input) => {
            let count = result?;
            info!("node: replayed {} actions", count);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("node: interrupted, shutting down");
        }
    }

    session.close()?;
    info!("node: shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so stdout carries only action outcomes. `RUST_LOG`
/// overrides `level_str`.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
