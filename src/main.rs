use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use dice_sync::{
    ClientError,
    EngineConfig,
    GameClient,
    HttpGameService,
    Opponent,
    Session,
    client,
    config::DEFAULT_API_URL,
    storage::JsonFileStore,
};
use rpassword::prompt_password;
use std::{
    path::PathBuf,
    sync::Arc,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use url::Url;

mod app;
mod ui;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Terminal client for the dice banking game",
    long_about = None,
    group(ArgGroup::new("opponent_kind").args(["opponent", "autoplay"]))
)]
struct Args {
    /// Base URL of the game service.
    #[arg(long, env = "DICE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: Url,

    #[arg(short, long)]
    username: String,

    /// Create the account instead of signing in.
    #[arg(long)]
    register: bool,

    /// Start a new game against this player.
    #[arg(long)]
    opponent: Option<String>,

    /// Start a new game against an autoplay opponent.
    #[arg(long)]
    autoplay: bool,

    /// Open an existing game.
    #[arg(short, long, conflicts_with = "opponent_kind")]
    game: Option<String>,

    #[arg(long)]
    winning_score: Option<u32>,

    /// Sign a second local player in on this terminal.
    #[arg(long)]
    second_player: Option<String>,

    #[arg(long, default_value = "~/.dice-sync/state.json")]
    state_file: String,

    #[arg(long, default_value = "~/.dice-sync/logs")]
    log_dir: String,
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn init_tracing(log_dir: &str) -> WorkerGuard {
    let appender = rolling::daily(expand(log_dir), "dice-sync.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

async fn sign_in(service: &HttpGameService, args: &Args) -> Result<Session> {
    let password = prompt_password(format!("Password for {}: ", args.username))
        .wrap_err("failed to read password")?;
    let result = if args.register {
        client::register(service, &args.username, &password).await
    } else {
        client::login(service, &args.username, &password).await
    };
    result.map_err(|err| match err {
        ClientError::Service(service_err) => eyre!(service_err.auth_message()),
        other => eyre!(other),
    })
}

async fn open_game(game_client: &GameClient<HttpGameService>, args: &Args) -> Result<()> {
    if let Some(game_id) = &args.game {
        game_client
            .load_game(game_id)
            .await
            .wrap_err_with(|| format!("failed to load game {game_id}"))?;
        return Ok(());
    }
    let opponent = match (&args.opponent, args.autoplay) {
        (Some(name), _) => Some(Opponent::Human(name.clone())),
        (None, true) => Some(Opponent::Autoplay),
        (None, false) => None,
    };
    if let Some(opponent) = opponent {
        game_client
            .create_game(opponent, args.winning_score)
            .await
            .wrap_err("failed to create game")?;
        return Ok(());
    }
    let games = game_client
        .list_games()
        .await
        .wrap_err("failed to list games")?;
    let latest = games
        .into_iter()
        .filter(|game| game.is_active())
        .max_by_key(|game| game.updated_at)
        .ok_or_else(|| eyre!("no game in progress; pass --game, --opponent or --autoplay"))?;
    game_client.load_game(&latest.id).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _log_guard = init_tracing(&args.log_dir);
    tracing::info!("starting dice-sync client");

    let service = HttpGameService::new(args.api_url.as_str())
        .wrap_err("failed to build game service client")?;
    let store = JsonFileStore::open(expand(&args.state_file))
        .wrap_err("failed to open state file")?;
    let session = sign_in(&service, &args).await?;
    tracing::info!(user = %session.user.username, "signed in");

    let config = EngineConfig::default();
    let game_client = GameClient::new(service, Arc::new(store), config, session);
    if let Some(second) = &args.second_player {
        let password = prompt_password(format!("Password for {second}: "))
            .wrap_err("failed to read password")?;
        game_client
            .sign_in_second_seat(second, &password)
            .await
            .wrap_err("second player sign-in failed")?;
    } else {
        game_client.restore_second_seat().await?;
    }

    open_game(&game_client, &args).await?;
    let res = app::run_app(game_client.clone()).await;
    if let Err(err) = &res {
        tracing::error!(?err, "client exited with an error");
    }
    game_client.shutdown();
    res
}
