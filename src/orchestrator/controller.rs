//! Harvest request lifecycle controller.
//!
//! `HarvestController` is the state machine (idle → submitting → succeeded/failed
//! → idle) and the single owner of the roster and the displayed result.
//! `run_controller` drives it: it spawns the one in-flight invocation, runs the
//! success auto-dismiss timer and emits events for presentation layers.

use super::merge::{merge, Roster};
use crate::agent::{AgentClient, AgentTransport, InvocationError};
use crate::model::{
    CompanyListId, HarvestInput, HarvestResult, InfoEvent, LifecycleEvent, LifecycleState,
};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

/// How long a success summary stays up before the controller returns to idle.
pub(crate) const SUCCESS_DISMISS_DELAY: Duration = Duration::from_secs(2);

/// Identifies one accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum SubmitRejected {
    #[error("a harvest is already running")]
    Busy,
    #[error("list name is required")]
    BlankListName,
    #[error("add at least one company domain")]
    NoDomains,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Completion {
    Applied,
    /// The user walked away before the result arrived.
    Discarded { list_name: String },
}

struct InFlight {
    ticket: Ticket,
    list_name: String,
    detached: bool,
}

pub(crate) struct HarvestController {
    state: LifecycleState,
    roster: Roster,
    last_result: Option<HarvestResult>,
    in_flight: Option<InFlight>,
    settled: Option<Ticket>,
    next_ticket: u64,
}

impl HarvestController {
    pub(crate) fn new(roster: Roster) -> Self {
        Self {
            state: LifecycleState::Idle,
            roster,
            last_result: None,
            in_flight: None,
            settled: None,
            next_ticket: 0,
        }
    }

    pub(crate) fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub(crate) fn roster(&self) -> &Roster {
        &self.roster
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Accept a submission, or reject it without any state change.
    pub(crate) fn submit(&mut self, input: &HarvestInput) -> Result<Ticket, SubmitRejected> {
        if self.in_flight.is_some() {
            return Err(SubmitRejected::Busy);
        }
        if input.list_name.trim().is_empty() {
            return Err(SubmitRejected::BlankListName);
        }
        if input.domains.iter().all(|d| d.trim().is_empty()) {
            return Err(SubmitRejected::NoDomains);
        }

        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.in_flight = Some(InFlight {
            ticket,
            list_name: input.list_name.clone(),
            detached: false,
        });
        self.settled = None;
        self.state = LifecycleState::Submitting {
            list_name: input.list_name.clone(),
        };
        Ok(ticket)
    }

    /// Apply the outcome of the invocation identified by `ticket`.
    ///
    /// The roster is only touched on success; failures only change the visible state.
    pub(crate) fn complete(
        &mut self,
        ticket: Ticket,
        outcome: Result<HarvestResult, InvocationError>,
    ) -> Completion {
        let flight = match self.in_flight.take() {
            Some(f) if f.ticket == ticket => f,
            other => {
                self.in_flight = other;
                let list_name = outcome.map(|r| r.list_name).unwrap_or_default();
                return Completion::Discarded { list_name };
            }
        };
        if flight.detached {
            return Completion::Discarded {
                list_name: flight.list_name,
            };
        }

        self.settled = Some(ticket);
        self.state = match outcome {
            Ok(result) => {
                let (roster, shown) = merge(&self.roster, &result);
                self.roster = roster;
                debug!(lists = self.roster.len(), "roster updated");
                self.last_result = Some(shown.clone());
                LifecycleState::Succeeded(Box::new(shown))
            }
            Err(e) => LifecycleState::Failed {
                message: failure_message(&e),
            },
        };
        Completion::Applied
    }

    /// Auto-dismiss a success. Only the success it was scheduled for is dismissed.
    pub(crate) fn dismiss(&mut self, ticket: Ticket) -> bool {
        if matches!(self.state, LifecycleState::Succeeded(_)) && self.settled == Some(ticket) {
            self.state = LifecycleState::Idle;
            return true;
        }
        false
    }

    /// User cancel/reset. While submitting, the call keeps running but its result will be dropped.
    pub(crate) fn reset(&mut self) -> bool {
        if let Some(flight) = self.in_flight.as_mut() {
            flight.detached = true;
        }
        if self.state == LifecycleState::Idle {
            return false;
        }
        self.state = LifecycleState::Idle;
        true
    }

    pub(crate) fn delete_list(&mut self, id: CompanyListId) -> bool {
        if let Some(list) = self.roster.get(id) {
            debug!(%id, list_name = %list.list_name, "deleting list");
        }
        self.roster.delete(id)
    }

    pub(crate) fn into_snapshot(self) -> ControllerSnapshot {
        ControllerSnapshot {
            roster: self.roster,
            last_result: self.last_result,
        }
    }
}

/// User-facing text for a failed harvest. Transport detail and malformed payloads stay in the logs.
pub(crate) fn failure_message(e: &InvocationError) -> String {
    match e {
        InvocationError::Transport(_) => {
            "Could not reach the harvest agent. Check your connection and try again.".to_string()
        }
        InvocationError::Rejected(msg) => msg.clone(),
        InvocationError::MalformedResponse(_) => {
            "The harvest agent returned an unexpected response. No lists were changed.".to_string()
        }
    }
}

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum ControllerCommand {
    Submit(HarvestInput),
    Reset,
    DeleteList(CompanyListId),
    Quit,
}

/// Final roster and displayed result, returned when the controller exits.
#[derive(Debug, Clone)]
pub(crate) struct ControllerSnapshot {
    pub roster: Roster,
    pub last_result: Option<HarvestResult>,
}

/// Internal handle for the running invocation.
struct RunCtx {
    ticket: Ticket,
    handle: Option<tokio::task::JoinHandle<Result<HarvestResult, InvocationError>>>,
}

fn start_run<T: AgentTransport + 'static>(
    client: &Arc<AgentClient<T>>,
    ticket: Ticket,
    input: HarvestInput,
) -> RunCtx {
    let client = Arc::clone(client);
    let handle = tokio::spawn(async move {
        client
            .invoke(&input.list_name, &input.domains, input.range)
            .await
    });
    RunCtx {
        ticket,
        handle: Some(handle),
    }
}

/// Drive the lifecycle from UI commands and emit events back to presentation layers.
pub(crate) async fn run_controller<T: AgentTransport + 'static>(
    client: Arc<AgentClient<T>>,
    roster: Roster,
    event_tx: UnboundedSender<LifecycleEvent>,
    mut cmd_rx: UnboundedReceiver<ControllerCommand>,
) -> ControllerSnapshot {
    let mut ctl = HarvestController::new(roster);
    let mut run_ctx: Option<RunCtx> = None;
    let mut dismiss_at: Option<(Instant, Ticket)> = None;
    let mut quit_pending = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(ControllerCommand::Submit(input)) => match ctl.submit(&input) {
                        Ok(ticket) => {
                            debug!(list_name = %input.list_name, "submit accepted");
                            dismiss_at = None;
                            let _ = event_tx.send(LifecycleEvent::Info(InfoEvent::Submitting {
                                list_name: input.list_name.clone(),
                                domains: input.domains.len(),
                                range: input.range,
                            }));
                            let _ = event_tx.send(LifecycleEvent::StateChanged(ctl.state().clone()));
                            run_ctx = Some(start_run(&client, ticket, input));
                        }
                        Err(reason) => {
                            debug!(%reason, "submit rejected");
                            let _ = event_tx.send(LifecycleEvent::SubmitRejected {
                                reason: reason.to_string(),
                            });
                        }
                    },
                    Some(ControllerCommand::Reset) => {
                        if ctl.reset() {
                            dismiss_at = None;
                            let _ = event_tx.send(LifecycleEvent::StateChanged(LifecycleState::Idle));
                        }
                    }
                    Some(ControllerCommand::DeleteList(id)) => {
                        if ctl.delete_list(id) {
                            let _ = event_tx.send(LifecycleEvent::Info(InfoEvent::ListDeleted { id }));
                            let _ = event_tx.send(LifecycleEvent::RosterChanged {
                                lists: ctl.roster().lists().to_vec(),
                            });
                        }
                    }
                    Some(ControllerCommand::Quit) | None => {
                        // Quit waits for an in-flight invocation so its result is not lost.
                        quit_pending = true;
                        if !ctl.is_busy() {
                            break;
                        }
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    let Some(ctx) = run_ctx.take() else { continue };
                    let outcome = match join_res {
                        Ok(outcome) => outcome,
                        Err(e) => Err(InvocationError::Transport(format!("invocation task failed: {e}"))),
                    };
                    match ctl.complete(ctx.ticket, outcome) {
                        Completion::Applied => {
                            let _ = event_tx.send(LifecycleEvent::StateChanged(ctl.state().clone()));
                            if matches!(ctl.state(), LifecycleState::Succeeded(_)) {
                                let _ = event_tx.send(LifecycleEvent::RosterChanged {
                                    lists: ctl.roster().lists().to_vec(),
                                });
                                dismiss_at = Some((Instant::now() + SUCCESS_DISMISS_DELAY, ctx.ticket));
                            }
                        }
                        Completion::Discarded { list_name } => {
                            info!(%list_name, "discarding result of a cancelled harvest");
                            let _ = event_tx.send(LifecycleEvent::Info(
                                InfoEvent::StaleResultDiscarded { list_name },
                            ));
                        }
                    }
                    if quit_pending {
                        break;
                    }
                }
            }
            _ = async {
                match dismiss_at {
                    Some((deadline, _)) => tokio::time::sleep_until(deadline).await,
                    None => futures::future::pending().await,
                }
            } => {
                if let Some((_, ticket)) = dismiss_at.take() {
                    if ctl.dismiss(ticket) {
                        debug!("success summary dismissed");
                        let _ = event_tx.send(LifecycleEvent::StateChanged(LifecycleState::Idle));
                        let _ = event_tx.send(LifecycleEvent::InputClosed);
                    }
                }
            }
        }
    }

    ctl.into_snapshot()
}
