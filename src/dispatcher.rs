use crate::{
    client::GameClient,
    error::{
        ClientError,
        Result,
    },
    forfeiture::ConsistencyWarning,
    remote::GameService,
    sync::lock,
    turn_guard::ActingSide,
    types::{
        GameRecord,
        HoldResponse,
        Player,
        RollResponse,
        StateSignature,
    },
    wins::ResultSource,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
    time::Instant,
};
use tracing::{
    debug,
    info,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Roll,
    Bank,
    NewGame,
    EndGame,
}

/// Forced dispatches come from the forfeiture handler itself and pass the
/// suppression it holds on the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    Normal,
    Forced,
}

#[derive(Clone, Debug)]
struct InFlight {
    kind: MutationKind,
    started: Instant,
}

/// In-flight guard: at most one mutating call per game at a time, plus the
/// last state each game was acted upon from.
#[derive(Default)]
pub struct InFlightRegistry {
    games: Arc<Mutex<HashMap<String, InFlight>>>,
    last_acted: Mutex<HashMap<String, StateSignature>>,
}

impl InFlightRegistry {
    pub fn try_begin(&self, game_id: &str, kind: MutationKind) -> Option<InFlightToken> {
        let mut games = lock(&self.games);
        if let Some(current) = games.get(game_id) {
            debug!(
                %game_id,
                ?kind,
                running = ?current.kind,
                elapsed_ms = current.started.elapsed().as_millis() as u64,
                "mutation rejected, another is in flight"
            );
            return None;
        }
        games.insert(
            game_id.to_string(),
            InFlight {
                kind,
                started: Instant::now(),
            },
        );
        Some(InFlightToken {
            games: self.games.clone(),
            game_id: game_id.to_string(),
        })
    }

    pub fn in_flight(&self, game_id: &str) -> Option<MutationKind> {
        lock(&self.games).get(game_id).map(|entry| entry.kind)
    }

    pub fn last_acted(&self, game_id: &str) -> Option<StateSignature> {
        lock(&self.last_acted).get(game_id).cloned()
    }

    fn mark_acted(&self, game_id: &str, signature: StateSignature) {
        lock(&self.last_acted).insert(game_id.to_string(), signature);
    }
}

/// Marks a game busy until dropped.
#[must_use = "the game is only marked busy while the token is alive"]
pub struct InFlightToken {
    games: Arc<Mutex<HashMap<String, InFlight>>>,
    game_id: String,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        lock(&self.games).remove(&self.game_id);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollOutcome {
    pub response: RollResponse,
    pub roller: Player,
    /// Server responses that contradicted the double-six rules.
    pub warnings: Vec<ConsistencyWarning>,
}

impl RollOutcome {
    pub fn opened_forfeiture(&self) -> bool {
        self.response.dice.is_double_six()
    }
}

impl<S: GameService> GameClient<S> {
    pub(crate) fn begin_mutation(&self, game_id: &str, kind: MutationKind) -> Result<InFlightToken> {
        self.begin(game_id, kind, DispatchMode::Normal)
    }

    fn begin(&self, game_id: &str, kind: MutationKind, mode: DispatchMode) -> Result<InFlightToken> {
        if mode == DispatchMode::Normal && self.is_forfeiture_active(game_id) {
            debug!(%game_id, ?kind, "mutation suppressed by open forfeiture");
            return Err(ClientError::ForfeitureActive {
                game_id: game_id.to_string(),
            });
        }
        self.inner
            .in_flight
            .try_begin(game_id, kind)
            .ok_or_else(|| ClientError::ActionInProgress {
                game_id: game_id.to_string(),
            })
    }

    pub fn in_flight(&self, game_id: &str) -> Option<MutationKind> {
        self.inner.in_flight.in_flight(game_id)
    }

    pub fn last_acted(&self, game_id: &str) -> Option<StateSignature> {
        self.inner.in_flight.last_acted(game_id)
    }

    /// Authoritative read of `game_id`, mirrored when it is in view.
    pub async fn refresh(&self, game_id: &str) -> Result<GameRecord> {
        let credential = self.primary_credential();
        let record = self.inner.service.game(&credential, game_id).await?;
        self.inner.mirror.publish(record.clone());
        Ok(record)
    }

    /// Refreshes and checks that `side` may act on the fresh state.
    async fn refresh_for(&self, game_id: &str, side: &ActingSide) -> Result<GameRecord> {
        let record = self.refresh(game_id).await?;
        if !record.is_active() {
            return Err(ClientError::GameNotActive {
                game_id: game_id.to_string(),
            });
        }
        if !side.owns_turn(&record) {
            debug!(%game_id, owner = %record.current_player().username, "turn moved on");
            return Err(ClientError::StaleTurn {
                game_id: game_id.to_string(),
            });
        }
        Ok(record)
    }

    /// Rolls for the local human side.
    pub async fn roll(&self, game_id: &str) -> Result<RollOutcome> {
        let side = self.seats().human_side();
        self.roll_as(game_id, &side, DispatchMode::Normal).await
    }

    /// Banks for the local human side.
    pub async fn bank(&self, game_id: &str) -> Result<HoldResponse> {
        let side = self.seats().human_side();
        self.bank_as(game_id, &side, DispatchMode::Normal).await
    }

    pub(crate) async fn roll_as(
        &self,
        game_id: &str,
        side: &ActingSide,
        mode: DispatchMode,
    ) -> Result<RollOutcome> {
        let _token = self.begin(game_id, MutationKind::Roll, mode)?;
        let before = self.refresh_for(game_id, side).await?;
        let roller = before.current_player().clone();
        let credential = self.seats().credential_for_turn(&before).clone();
        self.inner.in_flight.mark_acted(game_id, before.signature());

        let response = self.inner.service.roll(&credential, game_id).await?;
        info!(
            %game_id,
            roller = %roller.username,
            die1 = response.dice.die1,
            die2 = response.dice.die2,
            round_score = response.round_score,
            "rolled"
        );
        self.inner
            .mirror
            .publish_roll(response.game_state.clone(), response.dice);
        if !response.game_state.is_active() {
            self.record_result(&response.game_state, ResultSource::Server);
        }
        let warnings = self.observe_roll(&roller, &response);
        Ok(RollOutcome {
            response,
            roller,
            warnings,
        })
    }

    pub(crate) async fn bank_as(
        &self,
        game_id: &str,
        side: &ActingSide,
        mode: DispatchMode,
    ) -> Result<HoldResponse> {
        let _token = self.begin(game_id, MutationKind::Bank, mode)?;
        self.bank_locked(game_id, side).await
    }

    /// Bank for callers already holding the game's in-flight token.
    pub(crate) async fn bank_locked(&self, game_id: &str, side: &ActingSide) -> Result<HoldResponse> {
        let before = self.refresh_for(game_id, side).await?;
        let credential = self.seats().credential_for_turn(&before).clone();
        self.inner.in_flight.mark_acted(game_id, before.signature());

        let response = self.inner.service.hold(&credential, game_id).await?;
        info!(
            %game_id,
            player = %before.current_player().username,
            banked = before.current_round_score(),
            game_over = response.is_game_over,
            "banked"
        );
        self.inner
            .mirror
            .publish_cleared(response.game_state.clone());
        if response.is_game_over {
            let mut finished = response.game_state.clone();
            if finished.winner_id.is_none() {
                finished.winner_id = response.winner_id.clone();
            }
            self.record_result(&finished, ResultSource::Server);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn try_begin__second_claim_fails_until_token_dropped() {
        // given
        let registry = InFlightRegistry::default();
        let token = registry.try_begin("g1", MutationKind::Roll);

        // when
        let second = registry.try_begin("g1", MutationKind::Bank);
        let other_game = registry.try_begin("g2", MutationKind::Bank);

        // then
        assert!(token.is_some());
        assert!(second.is_none());
        assert!(other_game.is_some());
        assert_eq!(registry.in_flight("g1"), Some(MutationKind::Roll));
        drop(token);
        assert_eq!(registry.in_flight("g1"), None);
        assert!(registry.try_begin("g1", MutationKind::Bank).is_some());
    }
}
