use crate::agent::{AgentClient, AgentConfig, HttpTransport};
use crate::date_range::{self, DatePreset};
use crate::model::{HarvestInput, HarvestResult, LifecycleEvent, LifecycleState};
use crate::orchestrator::{self, ControllerCommand, Roster};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "contact-harvester",
    version,
    about = "Request a contact harvest from the email agent and merge it into your company lists"
)]
pub struct Cli {
    /// Agent gateway endpoint
    #[arg(long, env = "HARVEST_AGENT_URL")]
    pub agent_url: String,

    /// Identifier of the harvest agent
    #[arg(long, env = "HARVEST_AGENT_ID", default_value = "696a74c59ea90559bbf3f052")]
    pub agent_id: String,

    /// Bearer token forwarded to the gateway
    #[arg(long, env = "HARVEST_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Give up waiting for the agent after this long
    #[arg(long, default_value = "10m")]
    pub timeout: humantime::Duration,

    /// Name of the company list to create or refresh
    #[arg(long)]
    pub list_name: String,

    /// Company domain to scan (repeatable)
    #[arg(long = "domain", value_name = "DOMAIN")]
    pub domains: Vec<String>,

    /// Scan window: a number of days ending yesterday, or "custom"
    #[arg(long, default_value = "30")]
    pub preset: String,

    /// Start of a custom range (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<String>,

    /// End of a custom range (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Print the harvest result as JSON
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Print a text summary (default)
    #[arg(long)]
    pub text: bool,

    /// Suppress all output except errors
    #[arg(long, conflicts_with_all = ["json", "text"])]
    pub silent: bool,

    /// Show the detail panel for this contact email
    #[arg(long)]
    pub contact: Option<String>,

    /// Write the result, roster and totals to this file
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Show the harvest but drop its list from the roster afterwards
    #[arg(long)]
    pub discard_list: bool,
}

/// Build the transport configuration from CLI arguments.
pub fn build_config(args: &Cli) -> AgentConfig {
    AgentConfig {
        agent_url: args.agent_url.clone(),
        agent_id: args.agent_id.clone(),
        api_key: args.api_key.clone(),
        timeout: Duration::from(args.timeout),
        user_agent: format!("contact-harvester/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Trim domains, drop blanks and duplicates, keep entry order.
pub fn normalize_domains(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for d in raw {
        let d = d.trim();
        if !d.is_empty() && !out.iter().any(|seen| seen == d) {
            out.push(d.to_string());
        }
    }
    out
}

/// Resolve the date range and assemble the submit payload.
pub fn build_input(args: &Cli) -> Result<HarvestInput> {
    let preset: DatePreset = args.preset.parse()?;
    let range = date_range::resolve_today(
        preset,
        args.start_date.as_deref(),
        args.end_date.as_deref(),
    )
    .context("invalid scan date range")?;
    Ok(HarvestInput {
        list_name: args.list_name.clone(),
        domains: normalize_domains(&args.domains),
        range,
    })
}

/// How the single submission of a run ended.
#[derive(Debug, PartialEq, Eq)]
enum SubmissionOutcome {
    Succeeded,
    Failed(String),
    /// First Ctrl-C: the controller was reset and drained.
    Cancelled,
    /// Second Ctrl-C: stop without waiting for the agent.
    Aborted,
}

/// Follow controller events until the submission settles.
///
/// The first interrupt resets the controller and asks it to quit, so an in-flight
/// result is discarded when it arrives. A second interrupt gives up on waiting.
async fn drive_submission(
    evt_rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>,
    cmd_tx: &mpsc::UnboundedSender<ControllerCommand>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    discard_list: bool,
    mut on_info: impl FnMut(String),
) -> SubmissionOutcome {
    let mut cancelled = false;
    let mut harvested: Option<String> = None;
    let mut deleting = false;

    loop {
        tokio::select! {
            ev = evt_rx.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    LifecycleEvent::Info(info) => on_info(info.to_message()),
                    LifecycleEvent::SubmitRejected { reason } => {
                        return SubmissionOutcome::Failed(reason);
                    }
                    LifecycleEvent::StateChanged(LifecycleState::Succeeded(result)) => {
                        if !discard_list {
                            return SubmissionOutcome::Succeeded;
                        }
                        harvested = Some(result.list_name);
                    }
                    LifecycleEvent::StateChanged(LifecycleState::Failed { message }) => {
                        return SubmissionOutcome::Failed(message);
                    }
                    LifecycleEvent::RosterChanged { lists } => {
                        if deleting {
                            return SubmissionOutcome::Succeeded;
                        }
                        let Some(name) = harvested.as_deref() else { continue };
                        match lists.iter().find(|l| l.list_name == name) {
                            Some(list) => {
                                let _ = cmd_tx.send(ControllerCommand::DeleteList(list.id));
                                deleting = true;
                            }
                            None => return SubmissionOutcome::Succeeded,
                        }
                    }
                    LifecycleEvent::StateChanged(_) | LifecycleEvent::InputClosed => {}
                }
            }
            Some(()) = interrupts.recv() => {
                if cancelled {
                    return SubmissionOutcome::Aborted;
                }
                cancelled = true;
                on_info("Cancelling; waiting for the agent to answer (Ctrl-C again to stop now)".to_string());
                let _ = cmd_tx.send(ControllerCommand::Reset);
                let _ = cmd_tx.send(ControllerCommand::Quit);
            }
        }
    }

    if cancelled {
        SubmissionOutcome::Cancelled
    } else {
        SubmissionOutcome::Failed("harvest controller stopped unexpectedly".to_string())
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let input = build_input(&args)?;
    let transport = HttpTransport::new(build_config(&args))?;
    let client = Arc::new(AgentClient::new(transport));

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<LifecycleEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ControllerCommand>();
    let controller = tokio::spawn(orchestrator::run_controller(
        client,
        Roster::new(),
        evt_tx,
        cmd_rx,
    ));

    let (int_tx, mut int_rx) = mpsc::unbounded_channel::<()>();
    let signals = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if int_tx.send(()).is_err() {
                break;
            }
        }
    });

    let _ = cmd_tx.send(ControllerCommand::Submit(input));

    // One submission per process: wait for it to settle, then shut the controller down.
    let silent = args.silent;
    let outcome = drive_submission(
        &mut evt_rx,
        &cmd_tx,
        &mut int_rx,
        args.discard_list,
        |msg| {
            if !silent {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
        },
    )
    .await;
    signals.abort();

    if outcome == SubmissionOutcome::Aborted {
        controller.abort();
        drop(out_tx);
        let _ = out_handle.await;
        anyhow::bail!("harvest aborted");
    }

    let _ = cmd_tx.send(ControllerCommand::Quit);
    let snapshot = controller.await.context("harvest controller task failed")?;

    let result = match outcome {
        SubmissionOutcome::Succeeded => snapshot
            .last_result
            .clone()
            .context("harvest finished without a result")?,
        SubmissionOutcome::Failed(message) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(anyhow::anyhow!(message));
        }
        SubmissionOutcome::Cancelled | SubmissionOutcome::Aborted => {
            drop(out_tx);
            let _ = out_handle.await;
            anyhow::bail!("harvest cancelled");
        }
    };

    let processed = orchestrator::process_harvest_completion(args.export_json.as_deref(), &snapshot);
    if let Some(path) = processed.exported_path.as_deref() {
        tracing::info!(path = %path.display(), "export written");
    }
    if !args.silent {
        for msg in processed.export_messages {
            let _ = out_tx.send(OutputLine::Stderr(msg));
        }
        for line in render(&args, &result, &snapshot.roster)? {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

fn render(args: &Cli, result: &HarvestResult, roster: &Roster) -> Result<Vec<String>> {
    if args.json {
        let out = serde_json::to_string_pretty(result)?;
        return Ok(vec![out]);
    }

    let mut lines = crate::text_summary::build_text_summary(result, roster).lines;
    if let Some(email) = args.contact.as_deref() {
        lines.push(String::new());
        match result.contact_by_email(email) {
            Some(c) => lines.extend(crate::text_summary::contact_detail(c)),
            None => lines.push(format!("No contact {email} in this harvest")),
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{acme_result_json, StubTransport};
    use crate::agent::{AgentTransport, TransportError};
    use crate::model::{CompanyList, CompanyListId, ListStatus, ScanDateRange};
    use async_trait::async_trait;
    use serde_json::json;
    use time::macros::date;
    use tokio::sync::Semaphore;

    fn parse(extra: &[&str]) -> Cli {
        let mut argv = vec![
            "contact-harvester",
            "--agent-url",
            "https://agents.example/run",
            "--list-name",
            "Acme Partners",
        ];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn domains_are_trimmed_and_deduplicated() {
        let raw = vec![
            " acme.com ".to_string(),
            "".to_string(),
            "acme.com".to_string(),
            "acmecorp.io".to_string(),
        ];
        assert_eq!(normalize_domains(&raw), vec!["acme.com", "acmecorp.io"]);
    }

    #[test]
    fn builds_input_from_preset() {
        let args = parse(&["--domain", "acme.com", "--preset", "60"]);
        let input = build_input(&args).unwrap();
        assert_eq!(input.list_name, "Acme Partners");
        assert_eq!(input.domains, vec!["acme.com"]);
        assert_eq!(input.range.end - input.range.start, time::Duration::days(60));
    }

    #[test]
    fn builds_custom_input() {
        let args = parse(&[
            "--domain",
            "acme.com",
            "--preset",
            "custom",
            "--start-date",
            "2026-01-01",
            "--end-date",
            "2026-01-31",
        ]);
        let input = build_input(&args).unwrap();
        assert_eq!(input.range.start, time::macros::date!(2026 - 01 - 01));
    }

    #[test]
    fn bad_range_is_an_error_before_any_request() {
        let args = parse(&[
            "--domain",
            "acme.com",
            "--preset",
            "custom",
            "--start-date",
            "2026-02-01",
            "--end-date",
            "2026-01-01",
        ]);
        assert!(build_input(&args).is_err());
        assert!(build_input(&parse(&["--preset", "weekly"])).is_err());
    }

    #[test]
    fn config_uses_timeout_and_key() {
        let args = parse(&["--timeout", "30s", "--api-key", "k"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.api_key.as_deref(), Some("k"));
        assert!(cfg.user_agent.starts_with("contact-harvester/"));
    }

    #[test]
    fn silent_conflicts_with_json() {
        let argv = [
            "contact-harvester",
            "--agent-url",
            "u",
            "--list-name",
            "x",
            "--silent",
            "--json",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    fn acme_input() -> HarvestInput {
        HarvestInput {
            list_name: "Acme Partners".into(),
            domains: vec!["acme.com".into()],
            range: ScanDateRange {
                start: date!(2026 - 01 - 01),
                end: date!(2026 - 01 - 31),
            },
        }
    }

    /// Answers only after the test adds a permit.
    struct HeldTransport {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl AgentTransport for HeldTransport {
        async fn send(&self, _message: String) -> Result<serde_json::Value, TransportError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| TransportError::Gateway("gate closed".into()))?;
            Ok(json!({ "status": "success", "result": acme_result_json() }))
        }
    }

    fn start_controller<T: AgentTransport + 'static>(
        transport: T,
    ) -> (
        mpsc::UnboundedReceiver<LifecycleEvent>,
        mpsc::UnboundedSender<ControllerCommand>,
        tokio::task::JoinHandle<orchestrator::ControllerSnapshot>,
    ) {
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let client = Arc::new(AgentClient::new(transport));
        let handle = tokio::spawn(orchestrator::run_controller(client, Roster::new(), evt_tx, cmd_rx));
        (evt_rx, cmd_tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn ctrl_c_during_submission_discards_the_late_result() {
        let gate = Arc::new(Semaphore::new(0));
        let (mut evt_rx, cmd_tx, controller) = start_controller(HeldTransport { gate: gate.clone() });
        let (int_tx, mut int_rx) = mpsc::unbounded_channel();

        cmd_tx.send(ControllerCommand::Submit(acme_input())).unwrap();
        int_tx.send(()).unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            gate.add_permits(1);
        });

        let mut infos = Vec::new();
        let outcome =
            drive_submission(&mut evt_rx, &cmd_tx, &mut int_rx, false, |m| infos.push(m)).await;
        release.await.unwrap();

        assert_eq!(outcome, SubmissionOutcome::Cancelled);
        assert!(infos.iter().any(|m| m == "Discarded late result for \"Acme Partners\""));
        let snap = controller.await.unwrap();
        assert!(snap.roster.is_empty());
        assert!(snap.last_result.is_none());
    }

    #[tokio::test]
    async fn second_ctrl_c_stops_waiting() {
        let (_evt_tx, mut evt_rx) = mpsc::unbounded_channel::<LifecycleEvent>();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let (int_tx, mut int_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(async move {
            drive_submission(&mut evt_rx, &cmd_tx, &mut int_rx, false, |_| {}).await
        });
        int_tx.send(()).unwrap();
        assert!(matches!(cmd_rx.recv().await, Some(ControllerCommand::Reset)));
        assert!(matches!(cmd_rx.recv().await, Some(ControllerCommand::Quit)));
        int_tx.send(()).unwrap();

        assert_eq!(driver.await.unwrap(), SubmissionOutcome::Aborted);
    }

    #[tokio::test]
    async fn discard_list_deletes_the_harvested_entry() {
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let (_int_tx, mut int_rx) = mpsc::unbounded_channel();
        let result: HarvestResult = serde_json::from_value(acme_result_json()).unwrap();
        let entry = CompanyList {
            id: CompanyListId(4),
            list_name: "Acme Partners".into(),
            domains: Vec::new(),
            contacts: 2,
            emails_logged: 17,
            last_scan: date!(2026 - 01 - 31),
            status: ListStatus::Active,
            notion_url: None,
        };

        evt_tx
            .send(LifecycleEvent::StateChanged(LifecycleState::Succeeded(Box::new(result))))
            .unwrap();
        evt_tx
            .send(LifecycleEvent::RosterChanged { lists: vec![entry] })
            .unwrap();
        let driver = tokio::spawn(async move {
            drive_submission(&mut evt_rx, &cmd_tx, &mut int_rx, true, |_| {}).await
        });

        assert!(matches!(
            cmd_rx.recv().await,
            Some(ControllerCommand::DeleteList(CompanyListId(4)))
        ));
        evt_tx
            .send(LifecycleEvent::RosterChanged { lists: Vec::new() })
            .unwrap();
        assert_eq!(driver.await.unwrap(), SubmissionOutcome::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_list_leaves_result_but_not_roster() {
        let stub = StubTransport::ok(json!({ "status": "success", "result": acme_result_json() }));
        let (mut evt_rx, cmd_tx, controller) = start_controller(stub);
        let (_int_tx, mut int_rx) = mpsc::unbounded_channel();

        cmd_tx.send(ControllerCommand::Submit(acme_input())).unwrap();
        let mut infos = Vec::new();
        let outcome =
            drive_submission(&mut evt_rx, &cmd_tx, &mut int_rx, true, |m| infos.push(m)).await;
        assert_eq!(outcome, SubmissionOutcome::Succeeded);
        assert!(infos.iter().any(|m| m == "Deleted list 1"));

        cmd_tx.send(ControllerCommand::Quit).unwrap();
        let snap = controller.await.unwrap();
        assert!(snap.roster.is_empty());
        assert_eq!(snap.last_result.map(|r| r.total_contacts), Some(2));
    }

    #[tokio::test]
    async fn failure_ends_the_submission() {
        let stub = StubTransport::ok(json!({ "status": "error", "message": "Mailbox not connected" }));
        let (mut evt_rx, cmd_tx, controller) = start_controller(stub);
        let (_int_tx, mut int_rx) = mpsc::unbounded_channel();

        cmd_tx.send(ControllerCommand::Submit(acme_input())).unwrap();
        let outcome = drive_submission(&mut evt_rx, &cmd_tx, &mut int_rx, false, |_| {}).await;
        assert_eq!(
            outcome,
            SubmissionOutcome::Failed("Mailbox not connected".into())
        );
        cmd_tx.send(ControllerCommand::Quit).unwrap();
        assert!(controller.await.unwrap().roster.is_empty());
    }
}
