use crate::{
    client::GameClient,
    dispatcher::MutationKind,
    error::{
        ClientError,
        Result,
        ServiceError,
    },
    remote::GameService,
    types::{
        GameRecord,
        GameStatus,
        Seat,
    },
    wins::ResultSource,
};
use std::cmp::Ordering;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndGameOutcome {
    /// Nothing was played against a human opponent; the caller should
    /// abandon the game rather than finalize it.
    TreatAsAbandon,
    Finished {
        record: GameRecord,
        source: ResultSource,
    },
}

/// Finalizes `record` on the client: the higher total wins, a tie has no
/// winner.
pub fn finalize_locally(record: &GameRecord) -> GameRecord {
    let mut finished = record.clone();
    finished.status = GameStatus::Finished;
    finished.winner_id = match record
        .total_score(Seat::One)
        .cmp(&record.total_score(Seat::Two))
    {
        Ordering::Greater => Some(record.player1.id.clone()),
        Ordering::Less => Some(record.player2.id.clone()),
        Ordering::Equal => None,
    };
    finished.updated_at = record.updated_at + 1;
    finished
}

impl<S: GameService> GameClient<S> {
    /// True for an untouched human-vs-human game ended by its creator.
    fn is_abandonable(&self, record: &GameRecord) -> bool {
        !self.inner.detector.is_autoplay_game(record)
            && record.player2_score == 0
            && record.player2_round_score == 0
            && record.current_seat() == Seat::One
            && record.player1.user_id == self.primary().user.id
    }

    /// Stops background work for `game_id` ahead of publishing its final
    /// record, so no poll or timer lands on top of it.
    fn wind_down(&self, game_id: &str) {
        self.stop_poller();
        self.reset_game_state(game_id);
    }

    /// Ends `game_id` early. A pending round is banked once first; if that
    /// bank finishes the game its result stands. Otherwise the service is
    /// asked to finalize, falling back to a local result when it cannot.
    /// A failed pending bank is logged and the game is finalized with the
    /// round left unbanked.
    pub async fn end_game(&self, game_id: &str) -> Result<EndGameOutcome> {
        let token = self.begin_mutation(game_id, MutationKind::EndGame)?;
        let mut record = match self.refresh(game_id).await {
            Ok(record) => record,
            Err(err) => {
                warn!(%game_id, ?err, "refresh before ending game failed, using mirrored state");
                self.inner
                    .mirror
                    .game()
                    .filter(|game| game.id == game_id)
                    .ok_or(err)?
            }
        };
        if !record.is_active() {
            return Err(ClientError::GameNotActive {
                game_id: game_id.to_string(),
            });
        }
        if self.is_abandonable(&record) {
            debug!(%game_id, "nothing played yet, ending means abandoning");
            return Ok(EndGameOutcome::TreatAsAbandon);
        }

        if record.current_round_score() > 0 {
            let side = self
                .seats()
                .side_owning_turn(&record)
                .unwrap_or_else(|| self.seats().human_side());
            match self.bank_locked(game_id, &side).await {
                Ok(response) if response.is_game_over => {
                    info!(%game_id, "pending round finished the game");
                    drop(token);
                    self.wind_down(game_id);
                    return Ok(EndGameOutcome::Finished {
                        record: response.game_state,
                        source: ResultSource::Server,
                    });
                }
                Ok(response) => record = response.game_state,
                Err(err) => warn!(%game_id, ?err, "banking pending round before ending failed"),
            }
            match self.refresh(game_id).await {
                Ok(fresh) => record = fresh,
                Err(err) => warn!(%game_id, ?err, "refresh after pending bank failed"),
            }
        }

        let credential = self.seats().credential_for_turn(&record).clone();
        let outcome = match self.inner.service.end_game(&credential, game_id).await {
            Ok(finished) => {
                self.wind_down(game_id);
                self.inner.mirror.publish_cleared(finished.clone());
                self.record_result(&finished, ResultSource::Server);
                EndGameOutcome::Finished {
                    record: finished,
                    source: ResultSource::Server,
                }
            }
            Err(ServiceError::Unsupported { capability }) => {
                info!(%game_id, %capability, "service cannot finalize, deciding locally");
                let finished = finalize_locally(&record);
                self.wind_down(game_id);
                self.inner.mirror.publish_cleared(finished.clone());
                self.record_result(&finished, ResultSource::LocalFallback);
                EndGameOutcome::Finished {
                    record: finished,
                    source: ResultSource::LocalFallback,
                }
            }
            Err(err) => return Err(err.into()),
        };
        drop(token);
        Ok(outcome)
    }

    /// Deletes `game_id`. Local state for it is torn down even when the
    /// service refuses.
    pub async fn abandon(&self, game_id: &str) -> Result<()> {
        self.reset_game_state(game_id);
        self.stop_poller();
        let credential = self.primary_credential();
        let result = self.inner.service.delete_game(&credential, game_id).await;
        if self.inner.mirror.is_viewing(game_id) {
            self.inner.mirror.clear();
        }
        self.clear_autoplay();
        match result {
            Ok(()) => {
                info!(%game_id, "game abandoned");
                Ok(())
            }
            Err(err) => {
                warn!(%game_id, ?err, "deleting game failed");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::types::sample_record;
    use proptest::prelude::*;

    #[test]
    fn finalize_locally__tie_has_no_winner() {
        // given
        let mut record = sample_record();
        record.player1_score = 40;
        record.player2_score = 40;

        // when
        let finished = finalize_locally(&record);

        // then
        assert_eq!(finished.status, GameStatus::Finished);
        assert_eq!(finished.winner_id, None);
    }

    proptest! {
        #[test]
        fn finalize_locally__higher_total_wins(p1 in 0u32..200, p2 in 0u32..200) {
            let mut record = sample_record();
            record.player1_score = p1;
            record.player2_score = p2;
            let finished = finalize_locally(&record);
            let expected = if p1 > p2 {
                Some("p1".to_string())
            } else if p2 > p1 {
                Some("p2".to_string())
            } else {
                None
            };
            prop_assert_eq!(finished.winner_id, expected);
            prop_assert!(finished.updated_at > record.updated_at);
        }
    }
}
