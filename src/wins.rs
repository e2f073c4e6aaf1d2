use crate::storage::{
    SharedStore,
    WINS_KEY,
    load_json,
    save_json,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use tracing::{
    debug,
    warn,
};

/// Where a finished game's result came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Server,
    LocalFallback,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinTally {
    pub confirmed: u32,
    #[serde(default)]
    pub local: u32,
}

impl WinTally {
    pub fn total(&self) -> u32 {
        self.confirmed + self.local
    }
}

pub type WinsRecord = BTreeMap<String, WinTally>;

/// Best-effort per-account win counter. Failures are logged, never surfaced.
#[derive(Clone)]
pub struct WinCounter {
    store: SharedStore,
}

impl WinCounter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn wins(&self) -> WinsRecord {
        load_json(self.store.as_ref(), WINS_KEY).unwrap_or_default()
    }

    pub fn tally(&self, user_id: &str) -> WinTally {
        self.wins().get(user_id).copied().unwrap_or_default()
    }

    pub fn win_count(&self, user_id: &str) -> u32 {
        self.tally(user_id).total()
    }

    pub fn record_win(&self, user_id: &str, source: ResultSource) {
        let mut wins = self.wins();
        let tally = wins.entry(user_id.to_string()).or_default();
        match source {
            ResultSource::Server => tally.confirmed += 1,
            ResultSource::LocalFallback => tally.local += 1,
        }
        debug!(%user_id, ?source, "recording win");
        if let Err(err) = save_json(self.store.as_ref(), WINS_KEY, &wins) {
            warn!(?err, "failed to persist win counter");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::storage::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn record_win__keeps_fallback_results_apart() {
        // given
        let counter = WinCounter::new(Arc::new(InMemoryStore::new()));

        // when
        counter.record_win("u1", ResultSource::Server);
        counter.record_win("u1", ResultSource::LocalFallback);
        counter.record_win("u1", ResultSource::Server);

        // then
        let tally = counter.tally("u1");
        assert_eq!(tally.confirmed, 2);
        assert_eq!(tally.local, 1);
        assert_eq!(counter.win_count("u1"), 3);
        assert_eq!(counter.win_count("u2"), 0);
    }
}
