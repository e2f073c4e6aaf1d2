//! Client-side engine for a two-player "bank before you roll a double six"
//! dice game played against a remote authoritative service.

pub mod api_client;

pub mod autoplay;

pub mod client;

pub mod config;

pub mod dispatcher;

pub mod end_game;

pub mod error;

pub mod forfeiture;

pub mod identity;

pub mod mirror;

pub mod poller;

pub mod remote;

pub mod seats;

pub mod storage;

mod sync;

pub mod test_helpers;

pub mod timers;

pub mod turn_guard;

pub mod types;

pub mod wins;

pub use api_client::HttpGameService;
pub use client::{
    GameClient,
    Opponent,
};
pub use config::EngineConfig;
pub use end_game::EndGameOutcome;
pub use error::{
    ClientError,
    ServiceError,
};
pub use remote::GameService;
pub use seats::Session;
pub use types::GameRecord;
