use crate::{
    autoplay::AutoplayState,
    config::{
        AUTOPLAY_REGISTER_ATTEMPTS,
        EngineConfig,
    },
    dispatcher::InFlightRegistry,
    error::{
        ClientError,
        Result,
    },
    forfeiture::ForfeitureBook,
    identity::{
        self,
        AutoplayDetector,
        AutoplayIdentity,
    },
    mirror::{
        Mirror,
        MirrorState,
    },
    poller::PollerHandle,
    remote::GameService,
    seats::{
        self,
        Seats,
        Session,
    },
    storage::SharedStore,
    sync::lock,
    timers::{
        DelayedTasks,
        TimerKey,
        TimerPurpose,
    },
    types::{
        CreateGameRequest,
        Credential,
        GameRecord,
    },
    wins::{
        ResultSource,
        WinCounter,
        WinTally,
    },
};
use std::sync::{
    Arc,
    Mutex,
    Weak,
    atomic::AtomicU64,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Who sits in the second seat of a new game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Opponent {
    Human(String),
    Autoplay,
}

pub(crate) struct Inner<S> {
    pub(crate) service: S,
    pub(crate) store: SharedStore,
    pub(crate) config: EngineConfig,
    pub(crate) detector: AutoplayDetector,
    pub(crate) seats: Mutex<Seats>,
    pub(crate) mirror: Mirror,
    pub(crate) in_flight: InFlightRegistry,
    pub(crate) forfeiture: Mutex<ForfeitureBook>,
    pub(crate) autoplay: Mutex<AutoplayState>,
    pub(crate) timers: DelayedTasks,
    pub(crate) wins: WinCounter,
    pub(crate) poller: Mutex<Option<PollerHandle>>,
    pub(crate) poller_generation: AtomicU64,
    pub(crate) driver: Mutex<Option<JoinHandle<()>>>,
}

/// Client-side coordinator for one signed-in player. Cloning yields another
/// handle to the same state.
///
/// Must be created inside a tokio runtime: construction spawns the task that
/// feeds mirror updates to the autoplay controller.
pub struct GameClient<S> {
    pub(crate) inner: Arc<Inner<S>>,
}

impl<S> Clone for GameClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Signs the primary player in.
pub async fn login<S: GameService>(
    service: &S,
    username: &str,
    password: &str,
) -> Result<Session> {
    let auth = service.login(username, password).await?;
    info!(user = %auth.user.username, "signed in");
    Ok(Session::new(auth.user, auth.token))
}

pub async fn register<S: GameService>(
    service: &S,
    username: &str,
    password: &str,
) -> Result<Session> {
    let auth = service.register(username, password).await?;
    info!(user = %auth.user.username, "registered");
    Ok(Session::new(auth.user, auth.token))
}

impl<S: GameService> GameClient<S> {
    pub fn new(service: S, store: SharedStore, config: EngineConfig, primary: Session) -> Self {
        let detector = AutoplayDetector::new(config.autoplay_name_prefixes.clone());
        let inner = Arc::new(Inner {
            service,
            wins: WinCounter::new(store.clone()),
            store,
            config,
            detector,
            seats: Mutex::new(Seats::new(primary)),
            mirror: Mirror::new(),
            in_flight: InFlightRegistry::default(),
            forfeiture: Mutex::new(ForfeitureBook::default()),
            autoplay: Mutex::new(AutoplayState::default()),
            timers: DelayedTasks::new(),
            poller: Mutex::new(None),
            poller_generation: AtomicU64::new(0),
            driver: Mutex::new(None),
        });
        let client = Self { inner };
        client.spawn_autoplay_driver();
        client
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner<S>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<Inner<S>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn service(&self) -> &S {
        &self.inner.service
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn detector(&self) -> &AutoplayDetector {
        &self.inner.detector
    }

    pub fn mirror(&self) -> &Mirror {
        &self.inner.mirror
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<MirrorState>> {
        self.inner.mirror.subscribe()
    }

    pub fn seats(&self) -> Seats {
        lock(&self.inner.seats).clone()
    }

    pub fn primary(&self) -> Session {
        lock(&self.inner.seats).primary.clone()
    }

    pub(crate) fn primary_credential(&self) -> Credential {
        lock(&self.inner.seats).primary.credential.clone()
    }

    pub fn autoplay_identity(&self) -> Option<AutoplayIdentity> {
        lock(&self.inner.seats).autoplay.clone()
    }

    /// The held autoplay identity, when it is the account playing `record`.
    pub(crate) fn autoplay_identity_for(&self, record: &GameRecord) -> Option<AutoplayIdentity> {
        let player = self.inner.detector.autoplay_player(record)?;
        self.autoplay_identity()
            .filter(|identity| identity.user.id == player.user_id)
    }

    pub(crate) fn set_autoplay_identity(&self, identity: Option<AutoplayIdentity>) {
        lock(&self.inner.seats).autoplay = identity;
    }

    pub fn win_count(&self, user_id: &str) -> u32 {
        self.inner.wins.win_count(user_id)
    }

    pub fn win_tally(&self, user_id: &str) -> WinTally {
        self.inner.wins.tally(user_id)
    }

    /// Credits the winner of a finished record.
    pub(crate) fn record_result(&self, record: &GameRecord, source: ResultSource) {
        if let Some(winner) = record.winner() {
            info!(game_id = %record.id, winner = %winner.username, ?source, "game finished");
            self.inner.wins.record_win(&winner.user_id, source);
        }
    }

    pub async fn sign_in_second_seat(&self, username: &str, password: &str) -> Result<Session> {
        let session = login(&self.inner.service, username, password).await?;
        self.install_second_seat(session.clone());
        Ok(session)
    }

    pub async fn register_second_seat(&self, username: &str, password: &str) -> Result<Session> {
        let session = register(&self.inner.service, username, password).await?;
        self.install_second_seat(session.clone());
        Ok(session)
    }

    fn install_second_seat(&self, session: Session) {
        if let Err(err) = seats::store_second_seat(self.inner.store.as_ref(), &session) {
            warn!(?err, "failed to persist second seat");
        }
        lock(&self.inner.seats).second = Some(session);
    }

    pub fn sign_out_second_seat(&self) {
        lock(&self.inner.seats).second = None;
        if let Err(err) = seats::forget_second_seat(self.inner.store.as_ref()) {
            warn!(?err, "failed to forget second seat");
        }
    }

    /// Reinstates a persisted second seat after checking its token is still
    /// accepted; a rejected token is forgotten.
    pub async fn restore_second_seat(&self) -> Result<Option<Session>> {
        let Some(stored) = seats::stored_second_seat(self.inner.store.as_ref()) else {
            return Ok(None);
        };
        match self.inner.service.me(&stored.credential).await {
            Ok(user) => {
                let session = Session::new(user, stored.credential);
                lock(&self.inner.seats).second = Some(session.clone());
                debug!(user = %session.user.username, "second seat restored");
                Ok(Some(session))
            }
            Err(err) => {
                info!(?err, "stored second seat is no longer valid");
                self.sign_out_second_seat();
                Ok(None)
            }
        }
    }

    pub async fn list_games(&self) -> Result<Vec<GameRecord>> {
        let credential = self.primary_credential();
        Ok(self.inner.service.my_games(&credential).await?)
    }

    /// Fetches `game_id` and puts it in view.
    pub async fn load_game(&self, game_id: &str) -> Result<GameRecord> {
        let credential = self.primary_credential();
        let record = self.inner.service.game(&credential, game_id).await?;
        self.show(record.clone());
        Ok(record)
    }

    pub async fn create_game(
        &self,
        opponent: Opponent,
        winning_score: Option<u32>,
    ) -> Result<GameRecord> {
        let (player2_username, credential) = match opponent {
            Opponent::Autoplay => {
                let identity = self.register_autoplay().await?;
                (identity.name, self.primary_credential())
            }
            Opponent::Human(name) => {
                self.clear_autoplay();
                let seats = self.seats();
                let credential = seats
                    .second
                    .map(|second| second.credential)
                    .unwrap_or(seats.primary.credential);
                (name, credential)
            }
        };
        let request = CreateGameRequest {
            player1_username: self.primary().user.username,
            player2_username,
            winning_score: winning_score.unwrap_or(self.inner.config.default_winning_score),
        };
        let record = self.inner.service.create_game(&credential, &request).await?;
        info!(game_id = %record.id, opponent = %request.player2_username, "game created");
        self.show(record.clone());
        Ok(record)
    }

    /// Restarts the game in view. An autoplay opponent is kept, re-acquiring
    /// its identity if this client lost it.
    pub async fn new_game(&self, game_id: &str, winning_score: Option<u32>) -> Result<GameRecord> {
        let _token = self.begin_mutation(game_id, crate::dispatcher::MutationKind::NewGame)?;
        let credential = self.primary_credential();
        let record = self
            .inner
            .service
            .new_game(&credential, game_id, winning_score)
            .await?;
        self.reset_game_state(game_id);
        if record.id == game_id && self.inner.mirror.is_viewing(game_id) {
            self.inner.mirror.publish_cleared(record.clone());
            self.start_poller(game_id);
        } else {
            self.show(record.clone());
        }
        if self.inner.detector.is_autoplay_game(&record)
            && let Err(err) = self.restore_autoplay(&record).await
        {
            warn!(?err, "failed to restore autoplay identity for new game");
        }
        info!(game_id = %record.id, "new game started");
        self.autoplay_observe(&record);
        Ok(record)
    }

    /// Stops everything tied to the game in view and forgets it.
    pub fn close_view(&self) {
        if let Some(game_id) = self.inner.mirror.game_id() {
            self.reset_game_state(&game_id);
        }
        self.inner.timers.cancel_all();
        self.stop_poller();
        self.inner.mirror.clear();
    }

    /// Tears the client down: no task it spawned survives this call.
    pub fn shutdown(&self) {
        self.close_view();
        if let Some(driver) = lock(&self.inner.driver).take() {
            driver.abort();
        }
    }

    pub(crate) fn show(&self, record: GameRecord) {
        if let Some(previous) = self.inner.mirror.game_id()
            && previous != record.id
        {
            self.reset_game_state(&previous);
        }
        let game_id = record.id.clone();
        let active = record.is_active();
        self.inner.mirror.load(record);
        if active {
            self.start_poller(&game_id);
        } else {
            self.stop_poller();
        }
    }

    /// Cancels timers and returns forfeiture and autoplay tracking for
    /// `game_id` to their initial state.
    pub(crate) fn reset_game_state(&self, game_id: &str) {
        self.inner.timers.cancel_game(game_id);
        self.reset_forfeiture(game_id);
        self.reset_autoplay();
    }

    pub(crate) fn clear_autoplay(&self) {
        if let Some(game_id) = self.inner.mirror.game_id() {
            self.inner
                .timers
                .cancel(&TimerKey::new(game_id, TimerPurpose::Autoplay));
        }
        self.set_autoplay_identity(None);
        self.reset_autoplay();
    }

    /// Registers a fresh autoplay account and remembers its credentials.
    /// A taken name is retried with another generated one.
    pub async fn register_autoplay(&self) -> Result<AutoplayIdentity> {
        let mut attempt = 1;
        let (credentials, auth) = loop {
            let credentials = identity::new_credentials();
            match self
                .inner
                .service
                .register(&credentials.username, &credentials.password)
                .await
            {
                Ok(auth) => break (credentials, auth),
                Err(err)
                    if err.status() == Some(409) && attempt < AUTOPLAY_REGISTER_ATTEMPTS =>
                {
                    debug!(name = %credentials.username, "autoplay name taken, picking another");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        };
        if let Err(err) = identity::store_credentials(self.inner.store.as_ref(), &credentials) {
            warn!(?err, "failed to persist autoplay credentials");
        }
        let identity = AutoplayIdentity {
            name: auth.user.username.clone(),
            user: auth.user,
            credential: auth.token,
        };
        info!(name = %identity.name, "autoplay identity registered");
        self.set_autoplay_identity(Some(identity.clone()));
        Ok(identity)
    }

    /// Re-acquires the autoplay identity for `record`: the held one when it
    /// plays this game, then the stored account saved under the autoplay
    /// player's name, otherwise a new account.
    pub async fn restore_autoplay(&self, record: &GameRecord) -> Result<Option<AutoplayIdentity>> {
        if let Some(existing) = self.autoplay_identity_for(record) {
            return Ok(Some(existing));
        }
        let Some(player) = self.inner.detector.autoplay_player(record) else {
            return Ok(None);
        };
        let stored = identity::stored_credentials(self.inner.store.as_ref(), &player.username);
        if let Some(stored) = stored {
            match self
                .inner
                .service
                .login(&stored.username, &stored.password)
                .await
            {
                Ok(auth) => {
                    let identity = AutoplayIdentity {
                        name: auth.user.username.clone(),
                        user: auth.user,
                        credential: auth.token,
                    };
                    info!(name = %identity.name, "autoplay identity restored");
                    self.set_autoplay_identity(Some(identity.clone()));
                    return Ok(Some(identity));
                }
                Err(err) => {
                    info!(?err, "stored autoplay login failed, registering a new account");
                }
            }
        } else {
            debug!(name = %player.username, "no stored credentials for autoplay player");
        }
        self.register_autoplay().await.map(Some)
    }

    /// Id of the game in view.
    pub fn require_game(&self) -> Result<String> {
        self.inner.mirror.game_id().ok_or(ClientError::NoActiveGame)
    }
}
