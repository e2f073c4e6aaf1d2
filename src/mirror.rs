use crate::types::{
    DiceOutcome,
    GameRecord,
    GameStatus,
};
use tokio::sync::watch;
use tracing::debug;

/// Last known authoritative state of the game in view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorState {
    pub game: GameRecord,
    pub last_roll: Option<DiceOutcome>,
}

/// Canonical State Mirror. Written with whole-record replacements taken from
/// service responses; readers subscribe to change notifications.
#[derive(Clone)]
pub struct Mirror {
    tx: watch::Sender<Option<MirrorState>>,
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Mirror {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<MirrorState>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<MirrorState> {
        self.tx.borrow().clone()
    }

    pub fn game(&self) -> Option<GameRecord> {
        self.tx.borrow().as_ref().map(|state| state.game.clone())
    }

    pub fn game_id(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|state| state.game.id.clone())
    }

    pub fn is_viewing(&self, game_id: &str) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .is_some_and(|state| state.game.id == game_id)
    }

    /// Puts `record` in view, replacing whatever game was there.
    pub fn load(&self, record: GameRecord) {
        debug!(game_id = %record.id, "mirror loaded");
        self.tx.send_replace(Some(MirrorState {
            game: record,
            last_roll: None,
        }));
    }

    /// Overwrites the record in view. Records for a game that is no longer
    /// in view are dropped; returns whether the record was applied.
    pub fn publish(&self, record: GameRecord) -> bool {
        self.apply(record, None)
    }

    pub fn publish_roll(&self, record: GameRecord, dice: DiceOutcome) -> bool {
        self.apply(record, Some(Some(dice)))
    }

    /// Like [`Mirror::publish`] but also forgets the displayed dice.
    pub fn publish_cleared(&self, record: GameRecord) -> bool {
        self.apply(record, Some(None))
    }

    /// Applies a record fetched in the background. A fetch that raced with a
    /// foreground write can be older than what is already shown, so records
    /// behind the mirror and anything arriving after a finished game are dropped.
    pub fn publish_polled(&self, record: GameRecord) -> bool {
        self.tx.send_if_modified(|slot| match slot {
            Some(state) if state.game.id == record.id => {
                if state.game.status == GameStatus::Finished
                    || record.updated_at < state.game.updated_at
                {
                    debug!(game_id = %record.id, "dropping stale polled record");
                    return false;
                }
                state.game = record;
                true
            }
            _ => {
                debug!(game_id = %record.id, "dropping record for game not in view");
                false
            }
        })
    }

    fn apply(&self, record: GameRecord, last_roll: Option<Option<DiceOutcome>>) -> bool {
        self.tx.send_if_modified(|slot| match slot {
            Some(state) if state.game.id == record.id => {
                state.game = record;
                if let Some(last_roll) = last_roll {
                    state.last_roll = last_roll;
                }
                true
            }
            _ => {
                debug!(game_id = %record.id, "dropping record for game not in view");
                false
            }
        })
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::types::sample_record;

    #[test]
    fn publish__ignores_records_for_other_games() {
        // given
        let mirror = Mirror::new();
        mirror.load(sample_record());
        let mut other = sample_record();
        other.id = "game-2".into();

        // when
        let applied = mirror.publish(other);

        // then
        assert!(!applied);
        assert_eq!(mirror.game_id().as_deref(), Some("game-1"));
    }

    #[test]
    fn publish_roll__keeps_dice_until_cleared() {
        // given
        let mirror = Mirror::new();
        mirror.load(sample_record());
        let dice = DiceOutcome {
            die1: 3,
            die2: 4,
            timestamp: 5,
        };

        // when
        mirror.publish_roll(sample_record(), dice);
        mirror.publish(sample_record());
        let after_poll = mirror.current().and_then(|s| s.last_roll);
        mirror.publish_cleared(sample_record());

        // then
        assert_eq!(after_poll, Some(dice));
        assert_eq!(mirror.current().and_then(|s| s.last_roll), None);
    }

    #[test]
    fn publish_polled__drops_records_behind_the_mirror() {
        // given
        let mirror = Mirror::new();
        let mut shown = sample_record();
        shown.updated_at = 10;
        shown.player1_score = 40;
        mirror.load(shown);
        let mut stale = sample_record();
        stale.updated_at = 9;

        // when
        let applied = mirror.publish_polled(stale);

        // then
        assert!(!applied);
        assert_eq!(mirror.game().unwrap().player1_score, 40);
    }

    #[test]
    fn publish_polled__finished_game_is_not_reopened() {
        // given
        let mirror = Mirror::new();
        let mut finished = sample_record();
        finished.status = GameStatus::Finished;
        mirror.load(finished);
        let mut polled = sample_record();
        polled.updated_at += 5;

        // when
        let applied = mirror.publish_polled(polled);

        // then
        assert!(!applied);
        assert_eq!(mirror.game().unwrap().status, GameStatus::Finished);
    }

    #[test]
    fn publish_polled__keeps_displayed_dice() {
        // given
        let mirror = Mirror::new();
        mirror.load(sample_record());
        let dice = DiceOutcome {
            die1: 2,
            die2: 5,
            timestamp: 5,
        };
        mirror.publish_roll(sample_record(), dice);
        let mut newer = sample_record();
        newer.updated_at += 1;
        newer.player2_score = 12;

        // when
        let applied = mirror.publish_polled(newer);

        // then
        assert!(applied);
        let state = mirror.current().unwrap();
        assert_eq!(state.game.player2_score, 12);
        assert_eq!(state.last_roll, Some(dice));
    }

    #[tokio::test]
    async fn subscribe__notifies_on_publish() {
        let mirror = Mirror::new();
        let mut rx = mirror.subscribe();
        mirror.load(sample_record());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_some());
    }
}
