//! Session: the owned, running bot.
//!
//! A single driver task owns the [`RoundController`] and with it the
//! knowledge base. The host talks to it only through a command channel, so
//! rounds, outcome checks and control requests never interleave and no
//! locking is needed.
//!
//! Timers per mode:
//!
//! - LEARNING: presentation poll every `poll_interval`, outcome check every
//!   `outcome_check_interval` while a round is pending
//! - GUESSING: push notifications from the presentation source (polling when
//!   the host has none, or while the image on display is still unanswered),
//!   plus the same outcome check for unknown images

use crate::config::TimingConfig;
use crate::controller::RoundController;
use crate::error::{FaceMatchError, Result};
use crate::host::Host;
use crate::stats::{DebugReport, ProgressReport, StatsReport};
use crate::types::Mode;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

enum Command {
    SetMode(Mode),
    Stats(oneshot::Sender<StatsReport>),
    Progress(oneshot::Sender<ProgressReport>),
    Debug(oneshot::Sender<DebugReport>),
    Reset(oneshot::Sender<()>),
    Stop,
}

/// Handle to a running session
pub struct Session {
    commands: mpsc::Sender<Command>,
    driver: JoinHandle<RoundController>,
}

impl Session {
    /// Spawn the driver task in the controller's current mode
    pub fn start(controller: RoundController, host: Host, timing: TimingConfig) -> Self {
        let (commands, rx) = mpsc::channel(16);
        let driver = tokio::spawn(drive(controller, host, timing, rx));
        Self { commands, driver }
    }

    /// Switch mode; the pending round and session counters are discarded
    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        self.send(Command::SetMode(mode)).await
    }

    pub async fn stats(&self) -> Result<StatsReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx)).await?;
        rx.await.map_err(|_| FaceMatchError::SessionClosed)
    }

    pub async fn progress(&self) -> Result<ProgressReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Progress(tx)).await?;
        rx.await.map_err(|_| FaceMatchError::SessionClosed)
    }

    pub async fn debug(&self) -> Result<DebugReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Debug(tx)).await?;
        rx.await.map_err(|_| FaceMatchError::SessionClosed)
    }

    /// Destructive: wipes everything learned. Callers confirm with the user first.
    pub async fn reset_knowledge(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Reset(tx)).await?;
        rx.await.map_err(|_| FaceMatchError::SessionClosed)
    }

    /// Stop all timers, discard any pending round and hand the controller back
    pub async fn stop(self) -> Result<RoundController> {
        // A driver that already exited still returns its controller on join
        let _ = self.commands.send(Command::Stop).await;
        self.driver.await.map_err(|_| FaceMatchError::SessionClosed)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FaceMatchError::SessionClosed)
    }
}

async fn drive(
    mut controller: RoundController,
    host: Host,
    timing: TimingConfig,
    mut commands: mpsc::Receiver<Command>,
) -> RoundController {
    let mut poll = interval(timing.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut outcome = interval(timing.outcome_check_interval());
    outcome.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut changes = host.presentation.subscribe();

    announce(controller.mode(), changes.is_some());

    // An image already on display, or one whose options were not ready,
    // gets no further notification; poll until it is answered
    let mut unsettled = true;

    loop {
        let mode = controller.mode();
        let push = mode == Mode::Guessing && changes.is_some();
        let pending = controller.pending().is_some();

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::SetMode(next)) => {
                    controller.set_mode(next);
                    poll.reset();
                    outcome.reset();
                    unsettled = true;
                    announce(next, changes.is_some());
                }
                Some(Command::Stats(reply)) => {
                    let _ = reply.send(controller.stats_report());
                }
                Some(Command::Progress(reply)) => {
                    let _ = reply.send(controller.progress_report());
                }
                Some(Command::Debug(reply)) => {
                    let _ = reply.send(controller.debug_report(changes.is_some()));
                }
                Some(Command::Reset(reply)) => {
                    controller.reset_knowledge();
                    unsettled = true;
                    let _ = reply.send(());
                }
                Some(Command::Stop) | None => {
                    controller.cancel();
                    info!("Bot stopped");
                    return controller;
                }
            },
            _ = poll.tick(), if !push || unsettled => {
                let event = match mode {
                    Mode::Learning => controller.poll_presentation(&host).await,
                    Mode::Guessing => controller.on_presentation_changed(&host).await,
                };
                unsettled = event.needs_retry();
            }
            alive = next_change(&mut changes), if push => {
                if alive {
                    let event = controller.on_presentation_changed(&host).await;
                    unsettled = event.needs_retry();
                } else {
                    warn!("Presentation notifications closed; polling instead");
                    changes = None;
                }
            }
            _ = outcome.tick(), if pending => {
                let event = controller.check_outcome(&host).await;
                // A change notification may have been deferred behind this round
                if push && event.clears_round() {
                    let event = controller.on_presentation_changed(&host).await;
                    unsettled = event.needs_retry();
                }
            }
        }
    }
}

async fn next_change(changes: &mut Option<watch::Receiver<Option<String>>>) -> bool {
    match changes {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

fn announce(mode: Mode, push: bool) {
    match mode {
        Mode::Learning => info!("LEARNING mode active: polling with negative elimination"),
        Mode::Guessing if push => info!("GUESSING mode active: reacting to presentation changes"),
        Mode::Guessing => info!("GUESSING mode active: polling (host has no change notifications)"),
    }
}
