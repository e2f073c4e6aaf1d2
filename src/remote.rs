use crate::{
    error::ServiceError,
    types::{
        AuthResponse,
        CreateGameRequest,
        Credential,
        GameRecord,
        HoldResponse,
        RollResponse,
        User,
    },
};

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// The authoritative game service. Every call names the account performing it
/// through `credential`; unauthenticated calls take none.
pub trait GameService: Send + Sync + 'static {
    fn register(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = ServiceResult<AuthResponse>> + Send;

    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = ServiceResult<AuthResponse>> + Send;

    /// Token validity check.
    fn me(&self, credential: &Credential) -> impl Future<Output = ServiceResult<User>> + Send;

    fn create_game(
        &self,
        credential: &Credential,
        request: &CreateGameRequest,
    ) -> impl Future<Output = ServiceResult<GameRecord>> + Send;

    fn game(
        &self,
        credential: &Credential,
        game_id: &str,
    ) -> impl Future<Output = ServiceResult<GameRecord>> + Send;

    fn my_games(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = ServiceResult<Vec<GameRecord>>> + Send;

    fn roll(
        &self,
        credential: &Credential,
        game_id: &str,
    ) -> impl Future<Output = ServiceResult<RollResponse>> + Send;

    fn hold(
        &self,
        credential: &Credential,
        game_id: &str,
    ) -> impl Future<Output = ServiceResult<HoldResponse>> + Send;

    fn new_game(
        &self,
        credential: &Credential,
        game_id: &str,
        winning_score: Option<u32>,
    ) -> impl Future<Output = ServiceResult<GameRecord>> + Send;

    /// Finalization is optional; services without it answer
    /// [`ServiceError::Unsupported`].
    fn end_game(
        &self,
        credential: &Credential,
        game_id: &str,
    ) -> impl Future<Output = ServiceResult<GameRecord>> + Send;

    fn delete_game(
        &self,
        credential: &Credential,
        game_id: &str,
    ) -> impl Future<Output = ServiceResult<()>> + Send;
}
