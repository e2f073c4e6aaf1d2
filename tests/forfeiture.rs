#![allow(non_snake_case)]
use dice_sync::{
    ClientError,
    Opponent,
    forfeiture::{
        ConsistencyWarning,
        ForfeitureExit,
    },
    test_helpers::*,
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn roll__double_six_resets_round_and_opens_window() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service()
        .update_game(&game.id, |g| g.player1_round_score = 20);
    ctx.service().queue_dice(&[(6, 6)]);

    // when
    let outcome = client.roll(&game.id).await.unwrap();

    // then
    assert!(outcome.opened_forfeiture());
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.response.game_state.player1_round_score, 0);
    assert_eq!(outcome.response.game_state.current_player_id, game.player2.id);
    assert!(client.is_forfeiture_active(&game.id));
    assert_eq!(
        client.forfeiture_remaining(&game.id),
        Some(Duration::from_secs(3))
    );
    assert_eq!(
        client.forfeiting_player(&game.id).map(|p| p.id),
        Some(game.player1.id.clone())
    );
}

#[tokio::test(start_paused = true)]
async fn forfeiture__suppresses_mutations_until_window_closes() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    client.sign_in_second_seat("bob", "bob-pw").await.unwrap();
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().queue_dice(&[(6, 6)]);
    client.roll(&game.id).await.unwrap();

    // when
    let during = client.roll(&game.id).await;
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    let after = client.roll(&game.id).await;

    // then
    assert!(matches!(during, Err(ClientError::ForfeitureActive { .. })));
    assert!(!client.is_forfeiture_active(&game.id));
    let after = after.unwrap();
    assert_eq!(after.roller.id, game.player2.id);
    assert_eq!(ctx.service().requests().roll, 2);
    assert_eq!(ctx.service().requests().hold, 0);
}

#[tokio::test(start_paused = true)]
async fn forfeiture__forces_bank_when_service_keeps_the_turn() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().set_keeps_turn_on_double_six(true);
    ctx.service().queue_dice(&[(6, 6)]);

    // when
    let outcome = client.roll(&game.id).await.unwrap();
    let hold_before = ctx.service().requests().hold;
    tokio::time::sleep(Duration::from_millis(3_100)).await;

    // then
    assert!(outcome.warnings.contains(&ConsistencyWarning::TurnNotSwitched {
        game_id: game.id.clone(),
        player_id: game.player1.id.clone(),
    }));
    assert_eq!(hold_before, 0);
    assert_eq!(ctx.service().requests().hold, 1);
    let server = ctx.service().game_snapshot(&game.id).unwrap();
    assert_eq!(server.current_player_id, game.player2.id);
    assert_eq!(server.player1_score, 0);
    assert!(!client.is_forfeiture_active(&game.id));
}

#[tokio::test(start_paused = true)]
async fn dismiss_forfeiture__closes_early_exactly_once() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().set_keeps_turn_on_double_six(true);
    ctx.service().queue_dice(&[(6, 6)]);
    client.roll(&game.id).await.unwrap();

    // when
    let resolution = client.dismiss_forfeiture(&game.id).await.unwrap();
    let again = client.dismiss_forfeiture(&game.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // then
    let resolution = resolution.unwrap();
    assert_eq!(resolution.exit, ForfeitureExit::Dismissed);
    assert!(resolution.forced_bank);
    assert_eq!(again, None);
    assert_eq!(ctx.service().requests().hold, 1);
    assert!(!client.is_forfeiture_active(&game.id));
}

#[tokio::test(start_paused = true)]
async fn close_view__cancels_pending_forced_bank() {
    let ctx = TestContext::new();
    let client = ctx.client(ctx.alice());
    // given
    let game = client
        .create_game(Opponent::Human("bob".into()), None)
        .await
        .unwrap();
    ctx.service().set_keeps_turn_on_double_six(true);
    ctx.service().queue_dice(&[(6, 6)]);
    client.roll(&game.id).await.unwrap();

    // when
    client.close_view();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // then
    assert_eq!(ctx.service().requests().hold, 0);
    assert!(!client.is_forfeiture_active(&game.id));
    assert!(!client.is_polling());
}
