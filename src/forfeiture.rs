use crate::{
    client::GameClient,
    dispatcher::DispatchMode,
    error::{
        ClientError,
        Result,
    },
    remote::GameService,
    sync::lock,
    timers::{
        TimerKey,
        TimerPurpose,
    },
    turn_guard::ActingSide,
    types::{
        DiceOutcome,
        GameStatus,
        Player,
        RollResponse,
    },
};
use std::{
    collections::HashMap,
    fmt,
    time::Duration,
};
use tokio::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};

/// A double six as seen by this client: one per `(game, dice, roll time)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ForfeitureKey {
    pub game_id: String,
    pub die1: u8,
    pub die2: u8,
    pub timestamp: i64,
}

impl ForfeitureKey {
    fn new(game_id: &str, dice: &DiceOutcome) -> Self {
        Self {
            game_id: game_id.to_string(),
            die1: dice.die1,
            die2: dice.die2,
            timestamp: dice.timestamp,
        }
    }
}

/// A roll response that broke the double-six rules. Logged, never fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsistencyWarning {
    DiceOutOfRange {
        game_id: String,
        dice: DiceOutcome,
    },
    DoubleSixFlagMismatch {
        game_id: String,
        flagged: bool,
    },
    RoundScoreNotReset {
        game_id: String,
        player_id: String,
        round_score: u32,
    },
    TurnNotSwitched {
        game_id: String,
        player_id: String,
    },
    StatusChanged {
        game_id: String,
        status: GameStatus,
    },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyWarning::DiceOutOfRange { game_id, dice } => write!(
                f,
                "game {game_id}: dice {}/{} out of range",
                dice.die1, dice.die2
            ),
            ConsistencyWarning::DoubleSixFlagMismatch { game_id, flagged } => write!(
                f,
                "game {game_id}: double-six flag is {flagged} but the dice disagree"
            ),
            ConsistencyWarning::RoundScoreNotReset {
                game_id,
                player_id,
                round_score,
            } => write!(
                f,
                "game {game_id}: round score of {player_id} is {round_score} after double six"
            ),
            ConsistencyWarning::TurnNotSwitched { game_id, player_id } => write!(
                f,
                "game {game_id}: turn stayed with {player_id} after double six"
            ),
            ConsistencyWarning::StatusChanged { game_id, status } => {
                write!(f, "game {game_id}: status became {status:?} after double six")
            }
        }
    }
}

/// Checks a roll response against the rules the service is meant to apply.
pub fn check_roll(roller: &Player, response: &RollResponse) -> Vec<ConsistencyWarning> {
    let state = &response.game_state;
    let game_id = state.id.clone();
    let dice = response.dice;
    let mut warnings = Vec::new();
    if !dice.is_valid() {
        warnings.push(ConsistencyWarning::DiceOutOfRange {
            game_id: game_id.clone(),
            dice,
        });
    }
    if response.is_double_six != dice.is_double_six() {
        warnings.push(ConsistencyWarning::DoubleSixFlagMismatch {
            game_id: game_id.clone(),
            flagged: response.is_double_six,
        });
    }
    if !dice.is_double_six() {
        return warnings;
    }
    if let Some(seat) = state.seat_of(&roller.id) {
        let round_score = state.round_score(seat);
        if round_score != 0 {
            warnings.push(ConsistencyWarning::RoundScoreNotReset {
                game_id: game_id.clone(),
                player_id: roller.id.clone(),
                round_score,
            });
        }
    }
    if state.current_player_id == roller.id {
        warnings.push(ConsistencyWarning::TurnNotSwitched {
            game_id: game_id.clone(),
            player_id: roller.id.clone(),
        });
    }
    if state.status != GameStatus::Active {
        warnings.push(ConsistencyWarning::StatusChanged {
            game_id,
            status: state.status,
        });
    }
    warnings
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForfeitureExit {
    Elapsed,
    Dismissed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForfeitureResolution {
    pub exit: ForfeitureExit,
    /// The service had left the turn with the roller and a bank moved it.
    pub forced_bank: bool,
}

#[derive(Clone, Debug)]
enum Phase {
    Quiet,
    Active {
        key: ForfeitureKey,
        roller: Player,
        opened_at: Instant,
        closing: bool,
    },
}

#[derive(Clone, Debug)]
struct GameForfeiture {
    phase: Phase,
    last_trigger: Option<ForfeitureKey>,
}

impl Default for GameForfeiture {
    fn default() -> Self {
        Self {
            phase: Phase::Quiet,
            last_trigger: None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ForfeitureBook {
    games: HashMap<String, GameForfeiture>,
}

impl ForfeitureBook {
    fn active_key(&self, game_id: &str) -> Option<&ForfeitureKey> {
        match self.games.get(game_id).map(|game| &game.phase) {
            Some(Phase::Active { key, .. }) => Some(key),
            _ => None,
        }
    }
}

impl<S: GameService> GameClient<S> {
    /// Opens the forfeiture window for a double-six response, once per
    /// distinct roll. Returns the rule violations found in the response.
    pub(crate) fn observe_roll(&self, roller: &Player, response: &RollResponse) -> Vec<ConsistencyWarning> {
        let warnings = check_roll(roller, response);
        for warning in &warnings {
            warn!(%warning, "inconsistent roll response");
        }
        if !response.dice.is_double_six() {
            return warnings;
        }
        let game_id = response.game_state.id.clone();
        let key = ForfeitureKey::new(&game_id, &response.dice);
        {
            let mut book = lock(&self.inner.forfeiture);
            let entry = book.games.entry(game_id.clone()).or_default();
            if entry.last_trigger.as_ref() == Some(&key) {
                debug!(%game_id, "double six already handled");
                return warnings;
            }
            entry.last_trigger = Some(key.clone());
            entry.phase = Phase::Active {
                key: key.clone(),
                roller: roller.clone(),
                opened_at: Instant::now(),
                closing: false,
            };
        }
        info!(%game_id, roller = %roller.username, "double six, round forfeited");

        let client = self.clone();
        let timer_game_id = game_id.clone();
        self.inner.timers.schedule(
            TimerKey::new(game_id, TimerPurpose::Forfeiture),
            self.inner.config.forfeiture_window,
            async move {
                client
                    .conclude_forfeiture(&timer_game_id, &key, ForfeitureExit::Elapsed)
                    .await;
            },
        );
        warnings
    }

    pub fn is_forfeiture_active(&self, game_id: &str) -> bool {
        self.active_forfeiture(game_id).is_some()
    }

    pub fn active_forfeiture(&self, game_id: &str) -> Option<ForfeitureKey> {
        lock(&self.inner.forfeiture).active_key(game_id).cloned()
    }

    /// The player whose round was forfeited, while the window is open.
    pub fn forfeiting_player(&self, game_id: &str) -> Option<Player> {
        match lock(&self.inner.forfeiture).games.get(game_id).map(|g| &g.phase) {
            Some(Phase::Active { roller, .. }) => Some(roller.clone()),
            _ => None,
        }
    }

    /// Time left before the window closes by itself.
    pub fn forfeiture_remaining(&self, game_id: &str) -> Option<Duration> {
        match lock(&self.inner.forfeiture).games.get(game_id).map(|g| &g.phase) {
            Some(Phase::Active { opened_at, .. }) => Some(
                self.inner
                    .config
                    .forfeiture_window
                    .saturating_sub(opened_at.elapsed()),
            ),
            _ => None,
        }
    }

    /// Closes the open window early. Finishes the same way as the timer.
    pub async fn dismiss_forfeiture(&self, game_id: &str) -> Result<Option<ForfeitureResolution>> {
        let Some(key) = self.active_forfeiture(game_id) else {
            return Ok(None);
        };
        self.inner
            .timers
            .cancel(&TimerKey::new(game_id, TimerPurpose::Forfeiture));
        Ok(self
            .conclude_forfeiture(game_id, &key, ForfeitureExit::Dismissed)
            .await)
    }

    async fn conclude_forfeiture(
        &self,
        game_id: &str,
        key: &ForfeitureKey,
        exit: ForfeitureExit,
    ) -> Option<ForfeitureResolution> {
        let roller = {
            let mut book = lock(&self.inner.forfeiture);
            match book.games.get_mut(game_id).map(|g| &mut g.phase) {
                Some(Phase::Active {
                    key: active,
                    roller,
                    closing,
                    ..
                }) if active == key && !*closing => {
                    *closing = true;
                    roller.clone()
                }
                _ => return None,
            }
        };

        let side = ActingSide::single(roller.user_id.clone());
        let forced_bank = match self.bank_as(game_id, &side, DispatchMode::Forced).await {
            Ok(_) => {
                warn!(%game_id, roller = %roller.username, "turn was not switched after double six, forced a bank");
                true
            }
            Err(ClientError::StaleTurn { .. }) | Err(ClientError::GameNotActive { .. }) => false,
            Err(err) => {
                warn!(%game_id, ?err, "forced bank after double six failed");
                false
            }
        };

        {
            let mut book = lock(&self.inner.forfeiture);
            if let Some(game) = book.games.get_mut(game_id)
                && matches!(&game.phase, Phase::Active { key: active, .. } if active == key)
            {
                game.phase = Phase::Quiet;
            }
        }
        info!(%game_id, ?exit, forced_bank, "forfeiture window closed");

        if let Some(record) = self.inner.mirror.game()
            && record.id == game_id
        {
            self.autoplay_observe(&record);
        }
        Some(ForfeitureResolution { exit, forced_bank })
    }

    /// Drops all forfeiture tracking for `game_id`.
    pub(crate) fn reset_forfeiture(&self, game_id: &str) {
        self.inner
            .timers
            .cancel(&TimerKey::new(game_id, TimerPurpose::Forfeiture));
        lock(&self.inner.forfeiture).games.remove(game_id);
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::types::sample_record;

    fn double_six_response() -> (Player, RollResponse) {
        let mut state = sample_record();
        let roller = state.player1.clone();
        state.current_player_id = "p2".into();
        state.updated_at = 2;
        (
            roller,
            RollResponse {
                dice: DiceOutcome {
                    die1: 6,
                    die2: 6,
                    timestamp: 10,
                },
                round_score: 0,
                is_double_six: true,
                game_state: state,
            },
        )
    }

    #[test]
    fn check_roll__well_formed_double_six_has_no_warnings() {
        let (roller, response) = double_six_response();
        assert_eq!(check_roll(&roller, &response), vec![]);
    }

    #[test]
    fn check_roll__reports_every_broken_rule() {
        // given
        let (roller, mut response) = double_six_response();
        response.game_state.current_player_id = "p1".into();
        response.game_state.player1_round_score = 12;
        response.game_state.status = GameStatus::Finished;
        response.is_double_six = false;

        // when
        let warnings = check_roll(&roller, &response);

        // then
        assert_eq!(warnings.len(), 4);
        assert!(warnings.contains(&ConsistencyWarning::TurnNotSwitched {
            game_id: "game-1".into(),
            player_id: "p1".into(),
        }));
        assert!(warnings.contains(&ConsistencyWarning::RoundScoreNotReset {
            game_id: "game-1".into(),
            player_id: "p1".into(),
            round_score: 12,
        }));
    }

    #[test]
    fn check_roll__ordinary_roll_only_checks_dice() {
        let (roller, mut response) = double_six_response();
        response.dice.die2 = 5;
        response.is_double_six = false;
        response.game_state.current_player_id = "p1".into();
        response.game_state.player1_round_score = 11;
        assert_eq!(check_roll(&roller, &response), vec![]);
    }
}
