use std::fmt;

use reqwest::{
    Method,
    RequestBuilder,
    StatusCode,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use tracing::debug;

use crate::{
    error::ServiceError,
    remote::{
        GameService,
        ServiceResult,
    },
    types::{
        AuthResponse,
        CreateGameRequest,
        Credential,
        GameRecord,
        HoldResponse,
        NewGameRequest,
        RollResponse,
        User,
    },
};

/// HTTP/JSON implementation of [`GameService`].
#[derive(Clone)]
pub struct HttpGameService {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpGameService {
    pub fn new(base_url: impl Into<String>) -> ServiceResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .map_err(ServiceError::Transport)?;
        Ok(Self { base_url, http })
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        credential: Option<&Credential>,
    ) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "service request");
        let builder = self.http.request(method, url);
        match credential {
            Some(credential) => builder.bearer_auth(credential.as_str()),
            None => builder,
        }
    }

    async fn fetch_bytes(request: RequestBuilder) -> ServiceResult<(StatusCode, Vec<u8>)> {
        let res = request.send().await.map_err(ServiceError::Transport)?;
        let status = res.status();
        let bytes = res.bytes().await.map_err(ServiceError::Transport)?;
        Ok((status, bytes.to_vec()))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> ServiceResult<T> {
        let (status, bytes) = Self::fetch_bytes(request).await?;
        if !status.is_success() {
            return Err(http_error(status, &bytes));
        }
        serde_json::from_slice(&bytes).map_err(ServiceError::Decode)
    }
}

fn http_error(status: StatusCode, bytes: &[u8]) -> ServiceError {
    let message = serde_json::from_slice::<ErrorBody>(bytes)
        .ok()
        .and_then(|body| body.error.or(body.message))
        .unwrap_or_else(|| {
            let body = String::from_utf8_lossy(bytes);
            if body.trim().is_empty() {
                format!("HTTP error! status: {}", status.as_u16())
            } else {
                body.into_owned()
            }
        });
    ServiceError::Http {
        status: status.as_u16(),
        message,
    }
}

impl GameService for HttpGameService {
    async fn register(&self, username: &str, password: &str) -> ServiceResult<AuthResponse> {
        let body = AuthRequest { username, password };
        Self::send(self.request(Method::POST, "/auth/register", None).json(&body)).await
    }

    async fn login(&self, username: &str, password: &str) -> ServiceResult<AuthResponse> {
        let body = AuthRequest { username, password };
        Self::send(self.request(Method::POST, "/auth/login", None).json(&body)).await
    }

    async fn me(&self, credential: &Credential) -> ServiceResult<User> {
        Self::send(self.request(Method::GET, "/auth/me", Some(credential))).await
    }

    async fn create_game(
        &self,
        credential: &Credential,
        request: &CreateGameRequest,
    ) -> ServiceResult<GameRecord> {
        Self::send(
            self.request(Method::POST, "/games", Some(credential))
                .json(request),
        )
        .await
    }

    async fn game(&self, credential: &Credential, game_id: &str) -> ServiceResult<GameRecord> {
        let path = format!("/games/{game_id}");
        Self::send(self.request(Method::GET, &path, Some(credential))).await
    }

    async fn my_games(&self, credential: &Credential) -> ServiceResult<Vec<GameRecord>> {
        Self::send(self.request(Method::GET, "/games/mine", Some(credential))).await
    }

    async fn roll(&self, credential: &Credential, game_id: &str) -> ServiceResult<RollResponse> {
        let path = format!("/games/{game_id}/roll");
        Self::send(self.request(Method::POST, &path, Some(credential))).await
    }

    async fn hold(&self, credential: &Credential, game_id: &str) -> ServiceResult<HoldResponse> {
        let path = format!("/games/{game_id}/hold");
        Self::send(self.request(Method::POST, &path, Some(credential))).await
    }

    async fn new_game(
        &self,
        credential: &Credential,
        game_id: &str,
        winning_score: Option<u32>,
    ) -> ServiceResult<GameRecord> {
        let path = format!("/games/{game_id}/new-game");
        let body = NewGameRequest { winning_score };
        Self::send(
            self.request(Method::POST, &path, Some(credential))
                .json(&body),
        )
        .await
    }

    async fn end_game(
        &self,
        credential: &Credential,
        game_id: &str,
    ) -> ServiceResult<GameRecord> {
        let path = format!("/games/{game_id}/end");
        let (status, bytes) =
            Self::fetch_bytes(self.request(Method::POST, &path, Some(credential))).await?;
        match status {
            StatusCode::NOT_FOUND
            | StatusCode::METHOD_NOT_ALLOWED
            | StatusCode::NOT_IMPLEMENTED => Err(ServiceError::Unsupported {
                capability: "game finalization",
            }),
            status if !status.is_success() => Err(http_error(status, &bytes)),
            _ => serde_json::from_slice(&bytes).map_err(ServiceError::Decode),
        }
    }

    async fn delete_game(&self, credential: &Credential, game_id: &str) -> ServiceResult<()> {
        let path = format!("/games/{game_id}");
        let (status, bytes) =
            Self::fetch_bytes(self.request(Method::DELETE, &path, Some(credential))).await?;
        if !status.is_success() {
            return Err(http_error(status, &bytes));
        }
        Ok(())
    }
}

impl fmt::Display for HttpGameService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}
