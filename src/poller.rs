use crate::{
    client::{
        GameClient,
        Inner,
    },
    remote::GameService,
    sync::lock,
};
use std::{
    sync::{
        Weak,
        atomic::Ordering,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    warn,
};

enum PollCommand {
    FetchNow,
    Shutdown,
}

/// Periodic refresh of the game in view.
pub struct PollerHandle {
    game_id: String,
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<PollCommand>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn fetch_now(&self) {
        let _ = self.cmd_tx.send(PollCommand::FetchNow);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn shutdown(self) {
        let _ = self.cmd_tx.send(PollCommand::Shutdown);
    }
}

enum Poll {
    Continue,
    Stop,
}

async fn poll_once<S: GameService>(
    weak: &Weak<Inner<S>>,
    game_id: &str,
    generation: u64,
) -> Poll {
    let Some(client) = GameClient::upgrade(weak) else {
        return Poll::Stop;
    };
    if !client.inner.mirror.is_viewing(game_id) {
        debug!(%game_id, "game left view, poller stopping");
        return Poll::Stop;
    }
    let credential = client.primary_credential();
    let fetched = client.inner.service.game(&credential, game_id).await;
    // The view may have moved on while the request was outstanding.
    if !client.is_current_poller(generation) || !client.inner.mirror.is_viewing(game_id) {
        debug!(%game_id, generation, "poller replaced during fetch, dropping result");
        return Poll::Stop;
    }
    match fetched {
        Ok(record) => {
            let active = record.is_active();
            client.inner.mirror.publish_polled(record);
            if active {
                Poll::Continue
            } else {
                debug!(%game_id, "game no longer active, poller stopping");
                Poll::Stop
            }
        }
        Err(err) => {
            warn!(%game_id, ?err, "state poll failed");
            Poll::Continue
        }
    }
}

async fn poll_worker<S: GameService>(
    poll_interval: Duration,
    weak: Weak<Inner<S>>,
    game_id: String,
    generation: u64,
    mut cmd_rx: mpsc::UnboundedReceiver<PollCommand>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let poll = tokio::select! {
            _ = ticker.tick() => poll_once(&weak, &game_id, generation).await,
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(PollCommand::FetchNow) => poll_once(&weak, &game_id, generation).await,
                    Some(PollCommand::Shutdown) | None => Poll::Stop,
                }
            }
        };
        if let Poll::Stop = poll {
            break;
        }
    }
    debug!(%game_id, "poller exited");
}

impl<S: GameService> GameClient<S> {
    /// Starts polling `game_id`, replacing any running poller.
    pub(crate) fn start_poller(&self, game_id: &str) {
        let generation = self.inner.poller_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(poll_worker(
            self.inner.config.poll_interval,
            self.downgrade(),
            game_id.to_string(),
            generation,
            cmd_rx,
        ));
        let handle = PollerHandle {
            game_id: game_id.to_string(),
            generation,
            cmd_tx,
            task,
        };
        if let Some(previous) = lock(&self.inner.poller).replace(handle) {
            previous.shutdown();
        }
    }

    pub(crate) fn stop_poller(&self) {
        if let Some(handle) = lock(&self.inner.poller).take() {
            handle.shutdown();
        }
    }

    fn is_current_poller(&self, generation: u64) -> bool {
        lock(&self.inner.poller)
            .as_ref()
            .is_some_and(|handle| handle.generation == generation)
    }

    /// Asks the poller for an immediate refresh.
    pub fn poll_now(&self) {
        if let Some(handle) = lock(&self.inner.poller).as_ref() {
            handle.fetch_now();
        }
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poller)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
