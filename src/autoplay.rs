// Autoplay controller: plays the turns of the autoplay seat in the game in view.
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
    types::{
        GameRecord,
        StateSignature,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoplayPhase {
    #[default]
    Idle,
    Deciding,
    Acting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoplayDecision {
    Roll,
    Bank,
}

/// Bank once the round is worth at least `threshold`, roll otherwise.
pub fn decide(round_score: u32, threshold: u32) -> AutoplayDecision {
    if round_score >= threshold {
        AutoplayDecision::Bank
    } else {
        AutoplayDecision::Roll
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct AutoplayState {
    phase: AutoplayPhase,
    last_processed: Option<StateSignature>,
    restoring: bool,
    /// User id of the autoplay player a restore already ran for.
    restore_attempted: Option<String>,
}

/// What one autoplay turn step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Rolled,
    Forfeited,
    Banked,
    Skipped,
}

impl<S: GameService> GameClient<S> {
    pub fn autoplay_phase(&self) -> AutoplayPhase {
        lock(&self.inner.autoplay).phase
    }

    pub(crate) fn reset_autoplay(&self) {
        let mut state = lock(&self.inner.autoplay);
        state.phase = AutoplayPhase::Idle;
        state.last_processed = None;
        state.restore_attempted = None;
    }

    /// Evaluates a mirrored state. Schedules a think-delayed decision when
    /// the autoplay seat owns the turn of a state not yet processed.
    pub(crate) fn autoplay_observe(&self, record: &GameRecord) {
        if !self.inner.mirror.is_viewing(&record.id) {
            return;
        }
        if !record.is_active() {
            self.reset_autoplay();
            return;
        }
        if !self.inner.detector.is_autoplay_game(record) {
            return;
        }
        let Some(identity) = self.autoplay_identity_for(record) else {
            self.spawn_autoplay_restore(record.clone());
            return;
        };
        if self.is_forfeiture_active(&record.id) {
            return;
        }
        if record.current_player().user_id != identity.user.id {
            lock(&self.inner.autoplay).last_processed = None;
            return;
        }

        let signature = record.signature();
        {
            let mut state = lock(&self.inner.autoplay);
            if state.phase != AutoplayPhase::Idle
                || state.last_processed.as_ref() == Some(&signature)
            {
                return;
            }
            state.phase = AutoplayPhase::Deciding;
            state.last_processed = Some(signature.clone());
        }
        debug!(game_id = %record.id, %signature, "autoplay turn qualified");

        let client = self.clone();
        let game_id = record.id.clone();
        let player_id = record.current_player_id.clone();
        self.inner.timers.schedule(
            TimerKey::new(record.id.clone(), TimerPurpose::Autoplay),
            self.inner.config.autoplay_think_delay,
            async move {
                client.autoplay_turn(&game_id, &player_id, signature).await;
            },
        );
    }

    async fn autoplay_turn(&self, game_id: &str, player_id: &str, signature: StateSignature) {
        {
            let state = lock(&self.inner.autoplay);
            if state.phase != AutoplayPhase::Deciding
                || state.last_processed.as_ref() != Some(&signature)
            {
                debug!(%game_id, "autoplay continuation no longer current");
                return;
            }
        }
        if !self.inner.mirror.is_viewing(game_id) {
            self.reset_autoplay();
            return;
        }

        let result = self.autoplay_step(game_id, player_id).await;
        {
            let mut state = lock(&self.inner.autoplay);
            state.phase = AutoplayPhase::Idle;
            match &result {
                Ok(Step::Rolled) | Ok(Step::Skipped) => {}
                Ok(Step::Banked) | Ok(Step::Forfeited) => state.last_processed = None,
                Err(ClientError::StaleTurn { .. }) => {}
                Err(_) => state.last_processed = None,
            }
        }
        match result {
            Ok(step) => debug!(%game_id, ?step, "autoplay step done"),
            Err(err) if err.is_quiet() => debug!(%game_id, ?err, "autoplay step rejected"),
            Err(ClientError::StaleTurn { .. }) => debug!(%game_id, "autoplay turn moved on"),
            Err(err) => warn!(%game_id, ?err, "autoplay step failed"),
        }

        if let Some(record) = self.inner.mirror.game()
            && record.id == game_id
        {
            self.autoplay_observe(&record);
        }
    }

    async fn autoplay_step(&self, game_id: &str, player_id: &str) -> Result<Step> {
        let Some(identity) = self.autoplay_identity() else {
            return Ok(Step::Skipped);
        };
        // Decide on a fresh read, not on the mirror.
        let latest = self
            .inner
            .service
            .game(&identity.credential, game_id)
            .await?;
        if !latest.is_active() || latest.current_player_id != player_id {
            return Ok(Step::Skipped);
        }

        let decision = decide(
            latest.current_round_score(),
            self.inner.config.autoplay_bank_threshold,
        );
        lock(&self.inner.autoplay).phase = AutoplayPhase::Acting;
        info!(%game_id, round_score = latest.current_round_score(), ?decision, "autoplay decided");

        let Some(side) = self.seats().autoplay_side() else {
            return Ok(Step::Skipped);
        };
        match decision {
            AutoplayDecision::Bank => {
                self.bank_as(game_id, &side, DispatchMode::Normal).await?;
                Ok(Step::Banked)
            }
            AutoplayDecision::Roll => {
                let outcome = self.roll_as(game_id, &side, DispatchMode::Normal).await?;
                if outcome.opened_forfeiture() {
                    Ok(Step::Forfeited)
                } else {
                    Ok(Step::Rolled)
                }
            }
        }
    }

    /// Recovers the identity playing `record` in the background, once per
    /// autoplay player until the autoplay state is reset.
    fn spawn_autoplay_restore(&self, record: GameRecord) {
        let Some(player) = self.inner.detector.autoplay_player(&record) else {
            return;
        };
        {
            let mut state = lock(&self.inner.autoplay);
            if state.restoring
                || state.restore_attempted.as_deref() == Some(player.user_id.as_str())
            {
                return;
            }
            state.restoring = true;
            state.restore_attempted = Some(player.user_id.clone());
        }
        debug!(game_id = %record.id, player = %player.username, "restoring autoplay identity");
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(err) = client.restore_autoplay(&record).await {
                warn!(game_id = %record.id, ?err, "could not restore autoplay identity");
            }
            lock(&client.inner.autoplay).restoring = false;
            if let Some(current) = client.inner.mirror.game()
                && client.autoplay_identity_for(&current).is_some()
            {
                client.autoplay_observe(&current);
            }
        });
    }

    /// Feeds every mirror change to [`GameClient::autoplay_observe`].
    pub(crate) fn spawn_autoplay_driver(&self) {
        let weak = self.downgrade();
        let mut rx = self.inner.mirror.subscribe();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let record = rx
                    .borrow_and_update()
                    .as_ref()
                    .map(|state| state.game.clone());
                let Some(client) = GameClient::upgrade(&weak) else {
                    break;
                };
                if let Some(record) = record {
                    client.autoplay_observe(&record);
                }
            }
        });
        *lock(&self.inner.driver) = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decide__banks_at_threshold() {
        assert_eq!(decide(87, 87), AutoplayDecision::Bank);
        assert_eq!(decide(90, 87), AutoplayDecision::Bank);
        assert_eq!(decide(86, 87), AutoplayDecision::Roll);
        assert_eq!(decide(0, 87), AutoplayDecision::Roll);
    }

    proptest! {
        #[test]
        fn decide__is_a_threshold_split(round in 0u32..500, threshold in 1u32..200) {
            let expected = if round >= threshold {
                AutoplayDecision::Bank
            } else {
                AutoplayDecision::Roll
            };
            prop_assert_eq!(decide(round, threshold), expected);
        }
    }
}
