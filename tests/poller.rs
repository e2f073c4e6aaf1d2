#![allow(non_snake_case)]
use dice_sync::{
    EndGameOutcome,
    EngineConfig,
    Opponent,
    test_helpers::*,
    types::GameStatus,
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn poller__mirrors_updates_made_elsewhere() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    let rx = client.subscribe();
    ctx.service().update_game(&game.id, |g| g.player2_score = 33);

    // when
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    // then
    assert!(rx.has_changed().unwrap());
    let mirrored = client.mirror().game().unwrap();
    assert_eq!(mirrored.player2_score, 33);
    assert!(client.is_polling());
}

#[tokio::test(start_paused = true)]
async fn poller__stops_once_the_game_is_over() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().update_game(&game.id, |g| {
        g.status = GameStatus::Finished;
        g.winner_id = Some(g.player2.id.clone());
    });

    // when
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    let polls = ctx.service().requests().game;
    tokio::time::sleep(Duration::from_secs(10)).await;

    // then
    assert!(!client.is_polling());
    assert_eq!(ctx.service().requests().game, polls);
    assert_eq!(client.mirror().game().unwrap().status, GameStatus::Finished);
}

#[tokio::test(start_paused = true)]
async fn poll_now__fetches_without_waiting_for_the_interval() {
    let ctx = TestContext::new();
    let config = EngineConfig::default().with_poll_interval(Duration::from_secs(60));
    let client = ctx.client_with(ctx.alice(), config);
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().update_game(&game.id, |g| g.player1_score = 7);

    // when
    client.poll_now();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // then
    assert_eq!(client.mirror().game().unwrap().player1_score, 7);
}

#[tokio::test(start_paused = true)]
async fn close_view__stops_polling_and_clears_mirror() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();

    // when
    client.close_view();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // then
    assert!(!client.is_polling());
    assert_eq!(client.mirror().current(), None);
    assert_eq!(ctx.service().requests().game, 0);
}

#[tokio::test(start_paused = true)]
async fn poller__late_poll_does_not_reopen_an_ended_game() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().set_supports_end(false);
    ctx.service().update_game(&game.id, |g| {
        g.player1_score = 20;
        g.player2_score = 10;
    });
    ctx.service().pause_next_read();
    client.poll_now();
    ctx.service().wait_for_read().await;

    // when
    let outcome = client.end_game(&game.id).await.unwrap();
    ctx.service().release_read();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // then
    assert!(matches!(outcome, EndGameOutcome::Finished { .. }));
    let mirrored = client.mirror().game().unwrap();
    assert_eq!(mirrored.status, GameStatus::Finished);
    assert_eq!(mirrored.winner_id, Some(game.player1.id.clone()));
    assert!(!client.is_polling());
}
