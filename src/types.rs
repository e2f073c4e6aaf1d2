use chrono::{
    DateTime,
    TimeZone,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::fmt;

pub const MAX_FACE: u8 = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

/// Bearer token selecting which account performs a call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Human,
    Autoplay,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub user_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<PlayerRole>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: String,
    pub player1: Player,
    pub player2: Player,
    pub current_player_id: String,
    pub player1_score: u32,
    pub player2_score: u32,
    pub player1_round_score: u32,
    pub player2_round_score: u32,
    pub winning_score: u32,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
}

impl GameRecord {
    pub fn player(&self, seat: Seat) -> &Player {
        match seat {
            Seat::One => &self.player1,
            Seat::Two => &self.player2,
        }
    }

    pub fn seat_of(&self, player_id: &str) -> Option<Seat> {
        if self.player1.id == player_id {
            Some(Seat::One)
        } else if self.player2.id == player_id {
            Some(Seat::Two)
        } else {
            None
        }
    }

    /// Seat of the turn owner. A record whose pointer matches neither player
    /// is malformed; seat one is reported so callers stay total.
    pub fn current_seat(&self) -> Seat {
        self.seat_of(&self.current_player_id).unwrap_or(Seat::One)
    }

    pub fn current_player(&self) -> &Player {
        self.player(self.current_seat())
    }

    pub fn total_score(&self, seat: Seat) -> u32 {
        match seat {
            Seat::One => self.player1_score,
            Seat::Two => self.player2_score,
        }
    }

    pub fn round_score(&self, seat: Seat) -> u32 {
        match seat {
            Seat::One => self.player1_round_score,
            Seat::Two => self.player2_round_score,
        }
    }

    pub fn current_round_score(&self) -> u32 {
        self.round_score(self.current_seat())
    }

    pub fn player_by_user(&self, user_id: &str) -> Option<&Player> {
        [&self.player1, &self.player2]
            .into_iter()
            .find(|p| p.user_id == user_id)
    }

    pub fn winner(&self) -> Option<&Player> {
        let winner_id = self.winner_id.as_deref()?;
        self.seat_of(winner_id).map(|seat| self.player(seat))
    }

    pub fn is_active(&self) -> bool {
        self.status == GameStatus::Active
    }

    pub fn signature(&self) -> StateSignature {
        StateSignature::of(&self.current_player_id, self.updated_at)
    }
}

/// Identifies one `(turn owner, update time)` state of a game. Only ever
/// compared for equality.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StateSignature([u8; 16]);

impl StateSignature {
    pub fn of(current_player_id: &str, updated_at: i64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(current_player_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(updated_at.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }
}

impl fmt::Debug for StateSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateSignature({})", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for StateSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..6]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceOutcome {
    pub die1: u8,
    pub die2: u8,
    pub timestamp: i64,
}

impl DiceOutcome {
    pub fn is_valid(&self) -> bool {
        (1..=MAX_FACE).contains(&self.die1) && (1..=MAX_FACE).contains(&self.die2)
    }

    pub fn is_double_six(&self) -> bool {
        self.die1 == MAX_FACE && self.die2 == MAX_FACE
    }

    pub fn total(&self) -> u32 {
        u32::from(self.die1) + u32::from(self.die2)
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollResponse {
    pub dice: DiceOutcome,
    pub round_score: u32,
    pub is_double_six: bool,
    pub game_state: GameRecord,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldResponse {
    pub game_state: GameRecord,
    pub is_game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: Credential,
    pub user: User,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub player1_username: String,
    pub player2_username: String,
    pub winning_score: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGameRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_score: Option<u32>,
}

#[cfg(test)]
pub(crate) fn sample_record() -> GameRecord {
    GameRecord {
        id: "game-1".into(),
        player1: Player {
            id: "p1".into(),
            user_id: "u1".into(),
            username: "alice".into(),
            role: None,
        },
        player2: Player {
            id: "p2".into(),
            user_id: "u2".into(),
            username: "bob".into(),
            role: None,
        },
        current_player_id: "p1".into(),
        player1_score: 0,
        player2_score: 0,
        player1_round_score: 0,
        player2_round_score: 0,
        winning_score: 100,
        status: GameStatus::Active,
        winner_id: None,
        created_at: 1,
        updated_at: 1,
    }
}
