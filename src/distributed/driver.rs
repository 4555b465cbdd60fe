// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::RESERVED_FRAGMENT_NAME;
use crate::config::Address;
use crate::distributed::protocol::{reachable, unexpected, ControlChannel, ControlMessage, Endpoints};
use crate::errors::{ExecutionError, TransportError};
use crate::observability::messages::engine::{FragmentOutcome, FragmentsAssigned, WorkerRegistered};
use crate::observability::messages::StructuredLog;
use std::collections::HashMap;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Where one fragment ran and how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentAssignment {
    pub fragment: String,
    pub worker: String,
    pub error: Option<String>,
}

/// Outcome of a driver run, in application fragment order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverReport {
    pub assignments: Vec<FragmentAssignment>,
}

impl DriverReport {
    pub fn is_success(&self) -> bool {
        self.assignments.iter().all(|a| a.error.is_none())
    }

    pub fn failures(&self) -> Vec<(String, String)> {
        self.assignments
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (a.fragment.clone(), e.clone())))
            .collect()
    }

    pub fn worker_of(&self, fragment: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.fragment == fragment)
            .map(|a| a.worker.as_str())
    }
}

/// Takes the fragments a worker asked for out of `unassigned`.
///
/// No targets, or the reserved name among them, claims everything left.
/// Names that are unknown or already taken are skipped.
pub fn allocate(unassigned: &mut Vec<String>, targets: &[String]) -> Vec<String> {
    if targets.is_empty() || targets.iter().any(|t| t == RESERVED_FRAGMENT_NAME) {
        return std::mem::take(unassigned);
    }
    let (taken, rest): (Vec<String>, Vec<String>) = unassigned.drain(..).partition(|f| targets.contains(f));
    *unassigned = rest;
    taken
}

struct Session {
    worker: String,
    channel: ControlChannel,
    fragments: Vec<String>,
}

/// Coordinates workers: hands out fragments, publishes receiver endpoints,
/// and collects per-fragment outcomes.
pub struct Driver {
    address: Address,
    fragments: Vec<String>,
}

impl Driver {
    pub fn new(address: Address, fragments: Vec<String>) -> Self {
        Self { address, fragments }
    }

    pub async fn bind(&self) -> Result<TcpListener, ExecutionError> {
        let listener = TcpListener::bind(self.address.to_string())
            .await
            .map_err(|e| TransportError::Bind {
                address: self.address.to_string(),
                reason: e.to_string(),
            })?;
        if let Ok(local) = listener.local_addr() {
            tracing::info!(address = %local, fragments = self.fragments.len(), "Driver listening on {}", local);
        }
        Ok(listener)
    }

    pub async fn run(self) -> Result<DriverReport, ExecutionError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<DriverReport, ExecutionError> {
        let mut outcomes: HashMap<String, FragmentAssignment> = HashMap::new();
        let sessions = self.register(&listener).await?;
        for session in &sessions {
            for fragment in &session.fragments {
                outcomes.insert(
                    fragment.clone(),
                    FragmentAssignment {
                        fragment: fragment.clone(),
                        worker: session.worker.clone(),
                        error: None,
                    },
                );
            }
        }

        let mut fail = |fragment: &str, worker: &str, reason: String| {
            FragmentOutcome {
                fragment,
                worker,
                error: Some(&reason),
            }
            .log();
            if let Some(outcome) = outcomes.get_mut(fragment) {
                outcome.error = Some(reason);
            }
        };

        let mut endpoints = Endpoints::new();
        let mut live = Vec::with_capacity(sessions.len());
        for mut session in sessions {
            match session.channel.recv().await {
                Ok(ControlMessage::Bound { endpoints: bound }) => {
                    let peer_ip = session.channel.peer().ip();
                    endpoints.extend(bound.into_iter().map(|(key, addr)| (key, reachable(addr, peer_ip))));
                    live.push(session);
                }
                Ok(other) => {
                    let reason = match other {
                        ControlMessage::Failed { reason } => reason,
                        other => unexpected("bound", &other).to_string(),
                    };
                    for fragment in &session.fragments {
                        fail(fragment.as_str(), session.worker.as_str(), reason.clone());
                    }
                }
                Err(err) => {
                    for fragment in &session.fragments {
                        fail(fragment.as_str(), session.worker.as_str(), err.to_string());
                    }
                }
            }
        }

        let mut running = JoinSet::new();
        for mut session in live {
            let connect = ControlMessage::Connect {
                endpoints: endpoints.clone(),
            };
            running.spawn(async move {
                let finished = match session.channel.send(&connect).await {
                    Ok(()) => collect_finished(&mut session).await,
                    Err(err) => Err((Vec::new(), err)),
                };
                (session, finished)
            });
        }

        let mut closing = Vec::new();
        while let Some(joined) = running.join_next().await {
            let (session, finished) = joined.map_err(|e| ExecutionError::InternalError {
                message: format!("Driver session join error: {}", e),
            })?;
            let reported = match finished {
                Ok(reported) => reported,
                Err((reported, err)) => {
                    let reason = format!("worker '{}' was lost: {}", session.worker, err);
                    for fragment in session.fragments.iter().filter(|f| !reported.iter().any(|(r, _)| r == *f)) {
                        fail(fragment.as_str(), session.worker.as_str(), reason.clone());
                    }
                    reported
                }
            };
            for (fragment, error) in reported {
                match error {
                    Some(reason) => fail(fragment.as_str(), session.worker.as_str(), reason),
                    None => FragmentOutcome {
                        fragment: &fragment,
                        worker: &session.worker,
                        error: None,
                    }
                    .log(),
                }
            }
            closing.push(session);
        }

        for mut session in closing {
            if let Err(err) = session.channel.send(&ControlMessage::Shutdown).await {
                tracing::debug!(worker = %session.worker, error = %err, "Shutdown not delivered");
            }
        }

        let assignments = self
            .fragments
            .iter()
            .filter_map(|name| outcomes.remove(name))
            .collect();
        Ok(DriverReport { assignments })
    }

    /// Accepts workers until every fragment has an owner.
    async fn register(&self, listener: &TcpListener) -> Result<Vec<Session>, ExecutionError> {
        let mut unassigned = self.fragments.clone();
        let mut sessions = Vec::new();
        while !unassigned.is_empty() {
            let (stream, peer) = listener.accept().await.map_err(TransportError::from)?;
            let mut channel = ControlChannel::new(stream, peer);
            let (worker, targets) = match channel.recv().await {
                Ok(ControlMessage::Register { worker_id, targets }) => (worker_id, targets),
                Ok(other) => {
                    tracing::warn!(peer = %peer, "Rejecting worker: {}", unexpected("register", &other));
                    continue;
                }
                Err(err) => {
                    tracing::warn!(peer = %peer, error = %err, "Worker registration failed");
                    continue;
                }
            };
            WorkerRegistered {
                worker: &worker,
                targets: &targets,
            }
            .log();

            let fragments = allocate(&mut unassigned, &targets);
            FragmentsAssigned {
                worker: &worker,
                fragments: &fragments,
            }
            .log();
            let assign = ControlMessage::Assign {
                fragments: fragments.clone(),
            };
            if let Err(err) = channel.send(&assign).await {
                tracing::warn!(worker = %worker, error = %err, "Worker left before assignment");
                unassigned.extend(fragments);
                unassigned.sort_by_key(|f| self.fragments.iter().position(|n| n == f));
                continue;
            }
            sessions.push(Session {
                worker,
                channel,
                fragments,
            });
        }
        Ok(sessions)
    }
}

type Reported = Vec<(String, Option<String>)>;

/// Reads `Finished` frames until each of the session's fragments reported.
async fn collect_finished(session: &mut Session) -> Result<Reported, (Reported, ExecutionError)> {
    let mut reported = Vec::new();
    while reported.len() < session.fragments.len() {
        match session.channel.recv().await {
            Ok(ControlMessage::Finished { fragment, error }) => reported.push((fragment, error)),
            Ok(other) => return Err((reported, unexpected("finished", &other))),
            Err(err) => return Err((reported, err)),
        }
    }
    Ok(reported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_targeted_worker_takes_only_its_fragments() {
        let mut unassigned = names(&["f1", "f2", "f3"]);

        let taken = allocate(&mut unassigned, &names(&["f3", "f1"]));

        assert_eq!(taken, names(&["f1", "f3"]));
        assert_eq!(unassigned, names(&["f2"]));
    }

    #[test]
    fn test_all_or_no_targets_takes_the_rest() {
        let mut unassigned = names(&["f1", "f2"]);
        assert_eq!(allocate(&mut unassigned, &names(&["all"])), names(&["f1", "f2"]));
        assert!(unassigned.is_empty());

        let mut unassigned = names(&["f1", "f2"]);
        assert_eq!(allocate(&mut unassigned, &[]), names(&["f1", "f2"]));
        assert!(unassigned.is_empty());
    }

    #[test]
    fn test_taken_and_unknown_targets_are_skipped() {
        let mut unassigned = names(&["f2"]);

        let taken = allocate(&mut unassigned, &names(&["f1", "ghost"]));

        assert!(taken.is_empty());
        assert_eq!(unassigned, names(&["f2"]));
    }

    #[test]
    fn test_report_lists_failures() {
        let report = DriverReport {
            assignments: vec![
                FragmentAssignment {
                    fragment: "f1".to_string(),
                    worker: "w1".to_string(),
                    error: None,
                },
                FragmentAssignment {
                    fragment: "f2".to_string(),
                    worker: "w2".to_string(),
                    error: Some("bind failed".to_string()),
                },
            ],
        };

        assert!(!report.is_success());
        assert_eq!(report.failures(), vec![("f2".to_string(), "bind failed".to_string())]);
        assert_eq!(report.worker_of("f2"), Some("w2"));
    }
}
