//! One run of the harness: play the requested events, fire the scheduled
//! pause/resume/stop requests and report notifications until every event
//! ended or the timeout expired.

use std::collections::{BTreeSet, VecDeque};
use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use ngf_bus::{BusTransport, Properties};
use ngf_client::{ClientEvent, NgfClient};

/// Upper bound on one blocking wait, so scheduled actions fire on time
const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pause,
    Resume,
    Stop,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Pause => write!(f, "pause"),
            Action::Resume => write!(f, "resume"),
            Action::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAction {
    /// Offset from the moment the events were played
    pub at: Duration,
    pub action: Action,
}

/// What to do in one run
#[derive(Debug, Clone)]
pub struct Plan {
    pub events: Vec<String>,
    pub properties: Properties,
    pub actions: Vec<ScheduledAction>,
    pub timeout: Option<Duration>,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub played: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: bool,
}

pub fn run<T: BusTransport>(
    client: &NgfClient<T>,
    plan: &Plan,
    out: &mut impl Write,
) -> Result<Summary> {
    let notifications = client.events();

    if !client.connect() {
        bail!("Could not subscribe to the feedback daemon");
    }

    let mut summary = Summary::default();
    let mut live = BTreeSet::new();
    for name in &plan.events {
        let id = client
            .play_with(name, &plan.properties)
            .with_context(|| format!("Failed to play '{}'", name))?;
        tracing::info!("Playing '{}' as event {}", name, id);
        live.insert(id);
        summary.played += 1;
    }

    let mut actions: VecDeque<_> = {
        let mut sorted = plan.actions.clone();
        sorted.sort_by_key(|a| a.at);
        sorted.into()
    };

    let start = Instant::now();
    while !live.is_empty() {
        let elapsed = start.elapsed();

        while actions.front().is_some_and(|a| a.at <= elapsed) {
            if let Some(scheduled) = actions.pop_front() {
                apply(client, plan, scheduled.action);
            }
        }

        let mut wait = POLL;
        if let Some(next) = actions.front() {
            wait = wait.min(next.at.saturating_sub(elapsed));
        }
        if let Some(timeout) = plan.timeout {
            if elapsed >= timeout {
                tracing::warn!("Timed out with {} events still running", live.len());
                summary.timed_out = true;
                break;
            }
            wait = wait.min(timeout - elapsed);
        }

        let Some(notification) = notifications.recv_timeout(wait) else {
            continue;
        };
        report(out, &notification, plan.json)?;

        match notification {
            ClientEvent::Completed(id) => {
                summary.completed += usize::from(live.remove(&id));
            }
            ClientEvent::Failed(id) => {
                summary.failed += usize::from(live.remove(&id));
            }
            ClientEvent::ConnectionStatus(false) => {
                tracing::warn!("Feedback daemon went away, {} events dropped", live.len());
                live.clear();
            }
            _ => {}
        }
    }

    Ok(summary)
}

fn apply<T: BusTransport>(client: &NgfClient<T>, plan: &Plan, action: Action) {
    let names: BTreeSet<&str> = plan.events.iter().map(String::as_str).collect();
    for name in names {
        let matched = match action {
            Action::Pause => client.pause(name),
            Action::Resume => client.resume(name),
            Action::Stop => client.stop(name),
        };
        if matched {
            tracing::info!("Requested {} of '{}'", action, name);
        } else {
            tracing::info!("Nothing named '{}' left to {}", name, action);
        }
    }
}

fn report(out: &mut impl Write, notification: &ClientEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(notification).context("Failed to encode notification")?;
        writeln!(out, "{}", line)?;
    } else {
        writeln!(out, "{}", notification)?;
    }
    Ok(())
}
