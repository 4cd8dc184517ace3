use crate::engine::Command;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn the periodic health/expiry/persistence loop.
///
/// The loop holds only a weak handle to the dispatcher and exits once the
/// dispatcher is gone. The first tick fires one full interval after start.
pub(crate) fn spawn(
    commands: mpsc::WeakSender<Command>,
    interval: Duration,
    approval_timeout: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(commands) = commands.upgrade() else {
                break;
            };
            if tick(&commands, approval_timeout).await.is_none() {
                break;
            }
        }
        debug!("Monitor loop exited");
    })
}

async fn tick(commands: &mpsc::Sender<Command>, approval_timeout: Option<Duration>) -> Option<()> {
    let (reply, agents) = oneshot::channel();
    commands.send(Command::Agents { reply }).await.ok()?;

    for agent in agents.await.ok()? {
        let health = agent.health_check();
        if !health.healthy {
            warn!(
                agent = %health.agent_name,
                agent_id = %health.agent_id,
                state = %health.state,
                errors = health.errors_encountered,
                last_error = health.last_error.as_ref().and_then(|e| e.error.as_deref()).unwrap_or("-"),
                "Unhealthy agent"
            );
        }
    }

    if let Some(timeout) = approval_timeout {
        commands.send(Command::ExpireApprovals { timeout }).await.ok()?;
    }
    commands.send(Command::Persist { reply: None }).await.ok()
}
