use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use crossterm::event::EventStream;
use dice_sync::{
    ClientError,
    EndGameOutcome,
    GameClient,
    GameService,
    types::Seat,
    wins::ResultSource,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::time;

const MAX_ERRORS: usize = 5;

struct AppController<S> {
    client: GameClient<S>,
    status: String,
    errors: Vec<String>,
    last_result: Option<ResultSource>,
}

impl<S: GameService> AppController<S> {
    fn new(client: GameClient<S>) -> Self {
        Self {
            client,
            status: String::new(),
            errors: Vec::new(),
            last_result: None,
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.errors.clear();
    }

    fn push_error(&mut self, err: impl Into<String>) {
        self.errors.push(err.into());
        if self.errors.len() > MAX_ERRORS {
            self.errors.remove(0);
        }
    }

    /// Quiet rejections are dropped; everything else reaches the user.
    fn report(&mut self, err: ClientError) {
        if err.is_quiet() {
            tracing::debug!(?err, "action dropped");
            return;
        }
        match err {
            ClientError::StaleTurn { .. } => self.set_status("It is not your turn"),
            other => {
                tracing::warn!(?other, "action failed");
                self.push_error(other.to_string());
            }
        }
    }

    fn snapshot(&self) -> ui::ViewSnapshot {
        let mirror = self.client.mirror().current();
        let primary = self.client.primary();
        let game = mirror.as_ref().map(|state| state.game.clone());
        let autoplay_seat = game.as_ref().and_then(|game| {
            [Seat::One, Seat::Two]
                .into_iter()
                .find(|seat| self.client.detector().is_autoplay(game.player(*seat)))
        });
        let forfeiture = game.as_ref().and_then(|game| {
            let roller = self.client.forfeiting_player(&game.id)?;
            let remaining = self.client.forfeiture_remaining(&game.id)?;
            Some((roller.username, remaining))
        });
        ui::ViewSnapshot {
            last_roll: mirror.and_then(|state| state.last_roll),
            game,
            my_wins: self.client.win_count(&primary.user.id),
            username: primary.user.username,
            autoplay_seat,
            autoplay_phase: self.client.autoplay_phase(),
            forfeiture,
            last_result: self.last_result,
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    async fn handle(&mut self, event: ui::UserEvent) {
        if matches!(event, ui::UserEvent::Quit | ui::UserEvent::Redraw) {
            return;
        }
        let game_id = match self.client.require_game() {
            Ok(game_id) => game_id,
            Err(err) => {
                self.report(err);
                return;
            }
        };
        match event {
            ui::UserEvent::Roll => match self.client.roll(&game_id).await {
                Ok(outcome) if outcome.opened_forfeiture() => {
                    self.set_status("Double six! Round lost, turn passes");
                }
                Ok(outcome) => self.set_status(format!(
                    "Rolled {} + {}, round score {}",
                    outcome.response.dice.die1,
                    outcome.response.dice.die2,
                    outcome.response.round_score
                )),
                Err(err) => self.report(err),
            },
            ui::UserEvent::Bank => match self.client.bank(&game_id).await {
                Ok(response) if response.is_game_over => {
                    self.last_result = Some(ResultSource::Server);
                    self.set_status("Banked and won the game!");
                }
                Ok(_) => self.set_status("Banked"),
                Err(err) => self.report(err),
            },
            ui::UserEvent::EndGame => match self.client.end_game(&game_id).await {
                Ok(EndGameOutcome::TreatAsAbandon) => {
                    match self.client.abandon(&game_id).await {
                        Ok(()) => self.set_status("Nothing played yet, game abandoned"),
                        Err(err) => self.report(err),
                    }
                }
                Ok(EndGameOutcome::Finished { record, source }) => {
                    self.last_result = Some(source);
                    let verdict = match record.winner() {
                        Some(winner) => format!("{} wins", winner.username),
                        None => String::from("It's a tie"),
                    };
                    self.set_status(format!("Game ended: {verdict}"));
                }
                Err(err) => self.report(err),
            },
            ui::UserEvent::NewGame => match self.client.new_game(&game_id, None).await {
                Ok(_) => {
                    self.last_result = None;
                    self.set_status("New game started");
                }
                Err(err) => self.report(err),
            },
            ui::UserEvent::Abandon => match self.client.abandon(&game_id).await {
                Ok(()) => self.set_status("Game abandoned"),
                Err(err) => self.report(err),
            },
            ui::UserEvent::Dismiss => {
                if let Err(err) = self.client.dismiss_forfeiture(&game_id).await {
                    self.report(err);
                }
            }
            ui::UserEvent::Refresh => {
                if let Err(err) = self.client.refresh(&game_id).await {
                    self.report(err);
                }
            }
            ui::UserEvent::Quit | ui::UserEvent::Redraw => {}
        }
    }
}

pub async fn run_app<S: GameService>(client: GameClient<S>) -> Result<()> {
    let controller = AppController::new(client);
    let mut ui_state = ui::UiState::default();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<S: GameService>(
    mut controller: AppController<S>,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    let mut mirror_rx = controller.client.subscribe();
    let mut input_events = EventStream::new();
    let mut ticker = time::interval(Duration::from_millis(250));

    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;
    loop {
        tokio::select! {
            changed = mirror_rx.changed() => {
                if changed.is_err() {
                    tracing::warn!("mirror channel closed");
                    break;
                }
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after state update failed")?;
            }
            _ = ticker.tick() => {
                let counting_down = controller
                    .client
                    .mirror()
                    .game_id()
                    .is_some_and(|id| controller.client.is_forfeiture_active(&id));
                if counting_down {
                    ui::draw(ui_state, &controller.snapshot())?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = input_events.next() => {
                let Some(raw_ev) = raw_ev else {
                    break;
                };
                let event = raw_ev.wrap_err("reading terminal input failed")?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                if matches!(ev, ui::UserEvent::Quit) {
                    break;
                }
                controller.handle(ev).await;
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after action failed")?;
            }
        }
    }
    controller.client.shutdown();
    Ok(())
}
