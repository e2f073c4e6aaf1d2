use crate::sync::lock;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::task::AbortHandle;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    Forfeiture,
    Autoplay,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub game_id: String,
    pub purpose: TimerPurpose,
}

impl TimerKey {
    pub fn new(game_id: impl Into<String>, purpose: TimerPurpose) -> Self {
        Self {
            game_id: game_id.into(),
            purpose,
        }
    }
}

struct Scheduled {
    id: u64,
    handle: AbortHandle,
}

/// Cancellable delayed continuations, at most one per key. A continuation
/// that has started running is no longer cancellable and must check its own
/// context before acting.
#[derive(Clone, Default)]
pub struct DelayedTasks {
    scheduled: Arc<Mutex<HashMap<TimerKey, Scheduled>>>,
    next_id: Arc<AtomicU64>,
}

impl DelayedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay`, replacing any continuation under `key`.
    pub fn schedule<F>(&self, key: TimerKey, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let scheduled = self.scheduled.clone();
        let mut guard = lock(&self.scheduled);
        let fire_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut guard = lock(&scheduled);
                match guard.get(&fire_key) {
                    Some(entry) if entry.id == id => {
                        guard.remove(&fire_key);
                    }
                    _ => return,
                }
            }
            task.await;
        });
        if let Some(previous) = guard.insert(
            key.clone(),
            Scheduled {
                id,
                handle: handle.abort_handle(),
            },
        ) {
            debug!(?key, "replacing scheduled continuation");
            previous.handle.abort();
        }
    }

    pub fn cancel(&self, key: &TimerKey) -> bool {
        match lock(&self.scheduled).remove(key) {
            Some(entry) => {
                entry.handle.abort();
                debug!(?key, "cancelled continuation");
                true
            }
            None => false,
        }
    }

    pub fn cancel_game(&self, game_id: &str) {
        let mut guard = lock(&self.scheduled);
        guard.retain(|key, entry| {
            if key.game_id == game_id {
                entry.handle.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn cancel_all(&self) {
        for (_, entry) in lock(&self.scheduled).drain() {
            entry.handle.abort();
        }
    }

    pub fn is_scheduled(&self, key: &TimerKey) -> bool {
        lock(&self.scheduled).contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn schedule__fires_after_delay() {
        // given
        let tasks = DelayedTasks::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let key = TimerKey::new("g1", TimerPurpose::Forfeiture);

        // when
        tasks.schedule(key.clone(), Duration::from_secs(3), counter_task(&fired));
        tokio::time::sleep(Duration::from_secs(2)).await;
        let early = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // then
        assert_eq!(early, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!tasks.is_scheduled(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_game__drops_only_that_games_continuations() {
        // given
        let tasks = DelayedTasks::new();
        let fired = Arc::new(AtomicUsize::new(0));
        tasks.schedule(
            TimerKey::new("g1", TimerPurpose::Forfeiture),
            Duration::from_secs(1),
            counter_task(&fired),
        );
        tasks.schedule(
            TimerKey::new("g1", TimerPurpose::Autoplay),
            Duration::from_secs(1),
            counter_task(&fired),
        );
        tasks.schedule(
            TimerKey::new("g2", TimerPurpose::Autoplay),
            Duration::from_secs(1),
            counter_task(&fired),
        );

        // when
        tasks.cancel_game("g1");
        tokio::time::sleep(Duration::from_secs(2)).await;

        // then
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule__same_key_replaces_previous() {
        let tasks = DelayedTasks::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let key = TimerKey::new("g1", TimerPurpose::Autoplay);
        tasks.schedule(key.clone(), Duration::from_secs(1), counter_task(&fired));
        tasks.schedule(key.clone(), Duration::from_secs(1), counter_task(&fired));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
