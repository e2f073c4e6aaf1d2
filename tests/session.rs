#![allow(non_snake_case)]
use dice_sync::{
    ClientError,
    ServiceError,
    client,
    test_helpers::*,
};

#[tokio::test]
async fn login__wrong_password_is_rejected() {
    let ctx = TestContext::new();

    let result = client::login(ctx.service(), "alice", "nope").await;

    let Err(ClientError::Service(err)) = result else {
        panic!("expected a service error");
    };
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.auth_message(), "Invalid credentials");
}

#[tokio::test]
async fn register__taken_username_is_a_conflict() {
    let ctx = TestContext::new();

    let result = client::register(ctx.service(), "bob", "whatever").await;

    assert!(matches!(
        result,
        Err(ClientError::Service(ServiceError::Http { status: 409, .. }))
    ));
}

#[tokio::test]
async fn restore_second_seat__reinstates_a_valid_session() {
    let ctx = TestContext::new();
    // given
    let first = ctx.client(ctx.alice());
    let signed_in = first.sign_in_second_seat("bob", "bob-pw").await.unwrap();
    first.shutdown();

    // when
    let second = ctx.client(ctx.alice());
    let restored = second.restore_second_seat().await.unwrap();

    // then
    let restored = restored.unwrap();
    assert_eq!(restored.user, ctx.bob().user);
    assert_eq!(restored.credential, signed_in.credential);
    assert_eq!(second.seats().second, Some(restored));
    assert_eq!(ctx.service().requests().me, 1);
}

#[tokio::test]
async fn restore_second_seat__revoked_session_is_forgotten() {
    let ctx = TestContext::new();
    // given
    let first = ctx.client(ctx.alice());
    first.sign_in_second_seat("bob", "bob-pw").await.unwrap();
    first.shutdown();
    ctx.service().revoke_sessions("bob");

    // when
    let second = ctx.client(ctx.alice());
    let restored = second.restore_second_seat().await.unwrap();
    let again = ctx.client(ctx.alice()).restore_second_seat().await.unwrap();

    // then
    assert_eq!(restored, None);
    assert_eq!(again, None);
    assert!(second.seats().second.is_none());
    assert_eq!(ctx.service().requests().me, 1);
}

#[tokio::test]
async fn sign_out_second_seat__nothing_left_to_restore() {
    let ctx = TestContext::new();
    // given
    let game_client = ctx.client(ctx.alice());
    game_client.sign_in_second_seat("bob", "bob-pw").await.unwrap();

    // when
    game_client.sign_out_second_seat();

    // then
    assert!(game_client.seats().second.is_none());
    assert_eq!(game_client.restore_second_seat().await.unwrap(), None);
    assert_eq!(ctx.service().requests().me, 0);
}
