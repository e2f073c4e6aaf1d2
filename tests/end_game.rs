#![allow(non_snake_case)]
use dice_sync::{
    ClientError,
    EndGameOutcome,
    Opponent,
    ServiceError,
    test_helpers::*,
    types::GameStatus,
    wins::ResultSource,
};

#[tokio::test]
async fn end_game__banks_pending_round_once_before_finalizing() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().update_game(&game.id, |g| {
        g.player1_score = 30;
        g.player1_round_score = 10;
        g.player2_score = 20;
    });

    // when
    let outcome = client.end_game(&game.id).await.unwrap();

    // then
    let EndGameOutcome::Finished { record, source } = outcome else {
        panic!("expected a finished game, got {outcome:?}");
    };
    assert_eq!(source, ResultSource::Server);
    assert_eq!(record.status, GameStatus::Finished);
    assert_eq!(record.player1_score, 40);
    assert_eq!(record.winner_id, Some(game.player1.id.clone()));
    let requests = ctx.service().requests();
    assert_eq!(requests.hold, 1);
    assert_eq!(requests.end_game, 1);
    assert_eq!(client.win_tally(&ctx.alice().user.id).confirmed, 1);
    assert!(!client.is_polling());
}

#[tokio::test]
async fn end_game__pending_bank_that_wins_stands_as_the_result() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().update_game(&game.id, |g| {
        g.player1_score = 95;
        g.player1_round_score = 10;
        g.player2_score = 50;
    });

    // when
    let outcome = client.end_game(&game.id).await.unwrap();

    // then
    let EndGameOutcome::Finished { record, source } = outcome else {
        panic!("expected a finished game, got {outcome:?}");
    };
    assert_eq!(source, ResultSource::Server);
    assert_eq!(record.player1_score, 105);
    assert_eq!(record.winner_id, Some(game.player1.id.clone()));
    assert_eq!(ctx.service().requests().end_game, 0);
    assert_eq!(client.win_count(&ctx.alice().user.id), 1);
}

#[tokio::test]
async fn end_game__unsupported_service_decides_tie_locally() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().set_supports_end(false);
    ctx.service().update_game(&game.id, |g| {
        g.player1_score = 30;
        g.player2_score = 30;
    });

    // when
    let outcome = client.end_game(&game.id).await.unwrap();

    // then
    let EndGameOutcome::Finished { record, source } = outcome else {
        panic!("expected a finished game, got {outcome:?}");
    };
    assert_eq!(source, ResultSource::LocalFallback);
    assert_eq!(record.status, GameStatus::Finished);
    assert_eq!(record.winner_id, None);
    assert_eq!(client.win_count(&ctx.alice().user.id), 0);
    assert_eq!(client.win_count(&ctx.bob().user.id), 0);
    let mirrored = client.mirror().game().unwrap();
    assert_eq!(mirrored.status, GameStatus::Finished);
}

#[tokio::test]
async fn end_game__local_fallback_credits_the_leader() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().set_supports_end(false);
    ctx.service().update_game(&game.id, |g| {
        g.player1_score = 12;
        g.player2_score = 48;
    });

    // when
    client.end_game(&game.id).await.unwrap();

    // then
    let tally = client.win_tally(&ctx.bob().user.id);
    assert_eq!(tally.local, 1);
    assert_eq!(tally.confirmed, 0);
}

#[tokio::test]
async fn end_game__untouched_human_game_is_treated_as_abandon() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();

    // when
    let outcome = client.end_game(&game.id).await.unwrap();

    // then
    assert_eq!(outcome, EndGameOutcome::TreatAsAbandon);
    assert_eq!(ctx.service().requests().end_game, 0);
    assert!(ctx.service().game_snapshot(&game.id).is_some());
}

#[tokio::test]
async fn end_game__finished_game_is_rejected() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service()
        .update_game(&game.id, |g| g.status = GameStatus::Finished);

    // when
    let result = client.end_game(&game.id).await;

    // then
    assert!(matches!(result, Err(ClientError::GameNotActive { .. })));
    assert_eq!(ctx.service().requests().end_game, 0);
}

#[tokio::test]
async fn abandon__deletes_game_and_clears_view() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();

    // when
    client.abandon(&game.id).await.unwrap();

    // then
    assert!(ctx.service().game_snapshot(&game.id).is_none());
    assert_eq!(client.mirror().current(), None);
    assert!(!client.is_polling());
}

#[tokio::test]
async fn require_game__reports_no_active_game_after_abandon() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    let in_view = client.require_game().unwrap();

    // when
    client.abandon(&game.id).await.unwrap();

    // then
    assert_eq!(in_view, game.id);
    assert!(matches!(
        client.require_game(),
        Err(ClientError::NoActiveGame)
    ));
}

#[tokio::test]
async fn abandon__clears_view_even_when_delete_fails() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client.create_game(Opponent::Autoplay, None).await.unwrap();
    ctx.service().drop_game(&game.id);

    // when
    let result = client.abandon(&game.id).await;

    // then
    assert!(matches!(
        result,
        Err(ClientError::Service(ServiceError::Http { status: 404, .. }))
    ));
    assert_eq!(client.mirror().current(), None);
    assert!(client.autoplay_identity().is_none());
    assert!(!client.is_polling());
}
