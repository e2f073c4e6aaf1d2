// In-process game service with the server's rules, for tests.
use crate::{
    client::GameClient,
    config::EngineConfig,
    error::ServiceError,
    remote::{
        GameService,
        ServiceResult,
    },
    seats::Session,
    storage::{
        InMemoryStore,
        SharedStore,
    },
    sync::lock,
    types::{
        AuthResponse,
        CreateGameRequest,
        Credential,
        DiceOutcome,
        GameRecord,
        GameStatus,
        HoldResponse,
        Player,
        RollResponse,
        Seat,
        User,
    },
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};
use tokio::sync::Notify;

const DEFAULT_DICE: (u8, u8) = (2, 3);

/// Calls received, per endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub register: usize,
    pub login: usize,
    pub me: usize,
    pub create_game: usize,
    pub game: usize,
    pub my_games: usize,
    pub roll: usize,
    pub hold: usize,
    pub new_game: usize,
    pub end_game: usize,
    pub delete_game: usize,
}

impl RequestCounts {
    pub fn mutations(&self) -> usize {
        self.create_game + self.roll + self.hold + self.new_game + self.end_game + self.delete_game
    }
}

struct Account {
    user: User,
    password: String,
}

struct FakeState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    games: BTreeMap<String, GameRecord>,
    dice: VecDeque<(u8, u8)>,
    requests: RequestCounts,
    next_id: u64,
    clock: i64,
    supports_end: bool,
    keeps_turn_on_double_six: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            tokens: HashMap::new(),
            games: BTreeMap::new(),
            dice: VecDeque::new(),
            requests: RequestCounts::default(),
            next_id: 1,
            clock: 1_000,
            supports_end: true,
            keeps_turn_on_double_six: false,
        }
    }
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn issue(&mut self, user: &User) -> AuthResponse {
        let token = format!("token-{}-{}", user.username, self.next_id());
        self.tokens.insert(token.clone(), user.id.clone());
        AuthResponse {
            token: Credential::new(token),
            user: user.clone(),
        }
    }

    fn authenticate(&self, credential: &Credential) -> ServiceResult<User> {
        self.tokens
            .get(credential.as_str())
            .and_then(|user_id| {
                self.accounts
                    .values()
                    .find(|account| &account.user.id == user_id)
            })
            .map(|account| account.user.clone())
            .ok_or_else(|| http(401, "Invalid token"))
    }

    fn game_mut(&mut self, game_id: &str) -> ServiceResult<&mut GameRecord> {
        self.games
            .get_mut(game_id)
            .ok_or_else(|| http(404, "Game not found"))
    }

    fn player_for(&self, username: &str, game_id: &str, slot: &str) -> ServiceResult<Player> {
        let account = self
            .accounts
            .get(username)
            .ok_or_else(|| http(404, "User not found"))?;
        Ok(Player {
            id: format!("{game_id}-{slot}"),
            user_id: account.user.id.clone(),
            username: account.user.username.clone(),
            role: None,
        })
    }
}

fn http(status: u16, message: &str) -> ServiceError {
    ServiceError::Http {
        status,
        message: message.to_string(),
    }
}

fn acting_turn(record: &GameRecord, user: &User) -> ServiceResult<Seat> {
    if record.status != GameStatus::Active {
        return Err(http(400, "Game is not active"));
    }
    let seat = record.current_seat();
    if record.player(seat).user_id != user.id {
        return Err(http(403, "Not your turn"));
    }
    Ok(seat)
}

fn round_mut(record: &mut GameRecord, seat: Seat) -> &mut u32 {
    match seat {
        Seat::One => &mut record.player1_round_score,
        Seat::Two => &mut record.player2_round_score,
    }
}

fn total_mut(record: &mut GameRecord, seat: Seat) -> &mut u32 {
    match seat {
        Seat::One => &mut record.player1_score,
        Seat::Two => &mut record.player2_score,
    }
}

#[derive(Default)]
struct CallGate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl CallGate {
    /// Parks the caller while the gate is armed.
    async fn pass(&self) {
        if self.armed.load(Ordering::SeqCst) {
            self.park().await;
        }
    }

    /// Parks only the first caller after arming.
    async fn pass_once(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.park().await;
        }
    }

    async fn park(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }

    fn open(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }
}

/// In-memory [`GameService`] applying the game rules: a roll adds the dice
/// to the round, a double six wipes the round and passes the turn, a bank
/// commits the round and either wins or passes the turn.
#[derive(Clone, Default)]
pub struct FakeGameService {
    state: Arc<Mutex<FakeState>>,
    rolls: Arc<CallGate>,
    reads: Arc<CallGate>,
}

impl FakeGameService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account and returns a signed-in session for it.
    pub fn add_user(&self, username: &str, password: &str) -> Session {
        let mut state = lock(&self.state);
        let user = User {
            id: format!("user-{}", state.next_id()),
            username: username.to_string(),
        };
        state.accounts.insert(
            username.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        let auth = state.issue(&user);
        Session::new(auth.user, auth.token)
    }

    pub fn queue_dice(&self, dice: &[(u8, u8)]) {
        lock(&self.state).dice.extend(dice.iter().copied());
    }

    pub fn set_supports_end(&self, supported: bool) {
        lock(&self.state).supports_end = supported;
    }

    /// Makes the service break the double-six rule by leaving the turn with
    /// the roller.
    pub fn set_keeps_turn_on_double_six(&self, keeps: bool) {
        lock(&self.state).keeps_turn_on_double_six = keeps;
    }

    pub fn requests(&self) -> RequestCounts {
        lock(&self.state).requests
    }

    pub fn game_snapshot(&self, game_id: &str) -> Option<GameRecord> {
        lock(&self.state).games.get(game_id).cloned()
    }

    /// Edits a stored game in place; counts as an update.
    pub fn update_game(&self, game_id: &str, edit: impl FnOnce(&mut GameRecord)) {
        let mut state = lock(&self.state);
        let now = state.tick();
        if let Some(record) = state.games.get_mut(game_id) {
            edit(record);
            record.updated_at = now;
        }
    }

    /// Deletes a game behind the clients' backs.
    pub fn drop_game(&self, game_id: &str) {
        lock(&self.state).games.remove(game_id);
    }

    /// Invalidates every token issued to `username`.
    pub fn revoke_sessions(&self, username: &str) {
        let mut state = lock(&self.state);
        let Some(user_id) = state.accounts.get(username).map(|a| a.user.id.clone()) else {
            return;
        };
        state.tokens.retain(|_, owner| *owner != user_id);
    }

    /// Holds every roll after it is counted until [`Self::release_rolls`].
    pub fn pause_rolls(&self) {
        self.rolls.armed.store(true, Ordering::SeqCst);
    }

    pub async fn wait_for_roll(&self) {
        self.rolls.entered.notified().await;
    }

    pub fn release_rolls(&self) {
        self.rolls.open();
    }

    /// Delays the response of the next game read. The record is read when
    /// the request arrives, so the caller gets the state as of that moment.
    pub fn pause_next_read(&self) {
        self.reads.armed.store(true, Ordering::SeqCst);
    }

    pub async fn wait_for_read(&self) {
        self.reads.entered.notified().await;
    }

    pub fn release_read(&self) {
        self.reads.open();
    }
}

impl GameService for FakeGameService {
    async fn register(&self, username: &str, password: &str) -> ServiceResult<AuthResponse> {
        let mut state = lock(&self.state);
        state.requests.register += 1;
        if state.accounts.contains_key(username) {
            return Err(http(409, "Username already exists"));
        }
        let user = User {
            id: format!("user-{}", state.next_id()),
            username: username.to_string(),
        };
        state.accounts.insert(
            username.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        Ok(state.issue(&user))
    }

    async fn login(&self, username: &str, password: &str) -> ServiceResult<AuthResponse> {
        let mut state = lock(&self.state);
        state.requests.login += 1;
        let user = match state.accounts.get(username) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(http(401, "Invalid credentials")),
        };
        Ok(state.issue(&user))
    }

    async fn me(&self, credential: &Credential) -> ServiceResult<User> {
        let mut state = lock(&self.state);
        state.requests.me += 1;
        state.authenticate(credential)
    }

    async fn create_game(
        &self,
        credential: &Credential,
        request: &CreateGameRequest,
    ) -> ServiceResult<GameRecord> {
        let mut state = lock(&self.state);
        state.requests.create_game += 1;
        state.authenticate(credential)?;
        let game_id = format!("game-{}", state.next_id());
        let player1 = state.player_for(&request.player1_username, &game_id, "p1")?;
        let player2 = state.player_for(&request.player2_username, &game_id, "p2")?;
        let now = state.tick();
        let record = GameRecord {
            id: game_id.clone(),
            current_player_id: player1.id.clone(),
            player1,
            player2,
            player1_score: 0,
            player2_score: 0,
            player1_round_score: 0,
            player2_round_score: 0,
            winning_score: request.winning_score,
            status: GameStatus::Active,
            winner_id: None,
            created_at: now,
            updated_at: now,
        };
        state.games.insert(game_id, record.clone());
        Ok(record)
    }

    async fn game(&self, credential: &Credential, game_id: &str) -> ServiceResult<GameRecord> {
        let found = {
            let mut state = lock(&self.state);
            state.requests.game += 1;
            state.authenticate(credential)?;
            state
                .games
                .get(game_id)
                .cloned()
                .ok_or_else(|| http(404, "Game not found"))
        };
        self.reads.pass_once().await;
        found
    }

    async fn my_games(&self, credential: &Credential) -> ServiceResult<Vec<GameRecord>> {
        let mut state = lock(&self.state);
        state.requests.my_games += 1;
        let user = state.authenticate(credential)?;
        Ok(state
            .games
            .values()
            .filter(|game| game.player_by_user(&user.id).is_some())
            .cloned()
            .collect())
    }

    async fn roll(&self, credential: &Credential, game_id: &str) -> ServiceResult<RollResponse> {
        lock(&self.state).requests.roll += 1;
        self.rolls.pass().await;

        let mut state = lock(&self.state);
        let user = state.authenticate(credential)?;
        let seat = acting_turn(state.game_mut(game_id)?, &user)?;
        let (die1, die2) = state.dice.pop_front().unwrap_or(DEFAULT_DICE);
        let keeps_turn = state.keeps_turn_on_double_six;
        let now = state.tick();
        let record = state.game_mut(game_id)?;
        let dice = DiceOutcome {
            die1,
            die2,
            timestamp: now,
        };
        if dice.is_double_six() {
            *round_mut(record, seat) = 0;
            if !keeps_turn {
                record.current_player_id = record.player(seat.other()).id.clone();
            }
        } else {
            *round_mut(record, seat) += dice.total();
        }
        record.updated_at = now;
        Ok(RollResponse {
            dice,
            round_score: record.round_score(seat),
            is_double_six: dice.is_double_six(),
            game_state: record.clone(),
        })
    }

    async fn hold(&self, credential: &Credential, game_id: &str) -> ServiceResult<HoldResponse> {
        let mut state = lock(&self.state);
        state.requests.hold += 1;
        let user = state.authenticate(credential)?;
        let now = state.tick();
        let record = state.game_mut(game_id)?;
        let seat = acting_turn(record, &user)?;
        let banked = std::mem::take(round_mut(record, seat));
        *total_mut(record, seat) += banked;
        let is_game_over = record.total_score(seat) >= record.winning_score;
        if is_game_over {
            record.status = GameStatus::Finished;
            record.winner_id = Some(record.player(seat).id.clone());
        } else {
            record.current_player_id = record.player(seat.other()).id.clone();
        }
        record.updated_at = now;
        Ok(HoldResponse {
            winner_id: record.winner_id.clone(),
            is_game_over,
            game_state: record.clone(),
        })
    }

    async fn new_game(
        &self,
        credential: &Credential,
        game_id: &str,
        winning_score: Option<u32>,
    ) -> ServiceResult<GameRecord> {
        let mut state = lock(&self.state);
        state.requests.new_game += 1;
        state.authenticate(credential)?;
        let now = state.tick();
        let record = state.game_mut(game_id)?;
        record.player1_score = 0;
        record.player2_score = 0;
        record.player1_round_score = 0;
        record.player2_round_score = 0;
        record.current_player_id = record.player1.id.clone();
        record.status = GameStatus::Active;
        record.winner_id = None;
        if let Some(score) = winning_score {
            record.winning_score = score;
        }
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn end_game(&self, credential: &Credential, game_id: &str) -> ServiceResult<GameRecord> {
        let mut state = lock(&self.state);
        state.requests.end_game += 1;
        if !state.supports_end {
            return Err(ServiceError::Unsupported {
                capability: "game finalization",
            });
        }
        state.authenticate(credential)?;
        let now = state.tick();
        let record = state.game_mut(game_id)?;
        record.status = GameStatus::Finished;
        record.winner_id = if record.player1_score > record.player2_score {
            Some(record.player1.id.clone())
        } else if record.player2_score > record.player1_score {
            Some(record.player2.id.clone())
        } else {
            None
        };
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn delete_game(&self, credential: &Credential, game_id: &str) -> ServiceResult<()> {
        let mut state = lock(&self.state);
        state.requests.delete_game += 1;
        state.authenticate(credential)?;
        state
            .games
            .remove(game_id)
            .map(|_| ())
            .ok_or_else(|| http(404, "Game not found"))
    }
}

/// A fake service with two registered players and a shared store.
pub struct TestContext {
    service: FakeGameService,
    store: SharedStore,
    alice: Session,
    bob: Session,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let service = FakeGameService::new();
        let alice = service.add_user("alice", "alice-pw");
        let bob = service.add_user("bob", "bob-pw");
        Self {
            service,
            store: Arc::new(InMemoryStore::new()),
            alice,
            bob,
        }
    }

    pub fn service(&self) -> &FakeGameService {
        &self.service
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn alice(&self) -> Session {
        self.alice.clone()
    }

    pub fn bob(&self) -> Session {
        self.bob.clone()
    }

    /// A client signed in as `session`. Must be called inside a runtime.
    pub fn client(&self, session: Session) -> GameClient<FakeGameService> {
        self.client_with(session, EngineConfig::default())
    }

    pub fn client_with(
        &self,
        session: Session,
        config: EngineConfig,
    ) -> GameClient<FakeGameService> {
        GameClient::new(self.service.clone(), self.store.clone(), config, session)
    }
}
