use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("service responded with {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid service payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("service does not support {capability}")]
    Unsupported { capability: &'static str },
}

impl ServiceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for an authentication form.
    pub fn auth_message(&self) -> &'static str {
        match self.status() {
            Some(401) => "Invalid credentials",
            Some(409) => "Username already taken",
            _ => "Authentication failed",
        }
    }
}

#[derive(Debug, Error)]
#[error("storage failure: {0}")]
pub struct StorageError(pub String);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("it is not your turn")]
    StaleTurn { game_id: String },
    #[error("an action is already in progress for game {game_id}")]
    ActionInProgress { game_id: String },
    #[error("double six! actions are paused for game {game_id}")]
    ForfeitureActive { game_id: String },
    #[error("game {game_id} is not in progress")]
    GameNotActive { game_id: String },
    #[error("no game is loaded")]
    NoActiveGame,
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// Rejections the caller should drop without telling the user.
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            ClientError::ActionInProgress { .. } | ClientError::ForfeitureActive { .. }
        )
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
