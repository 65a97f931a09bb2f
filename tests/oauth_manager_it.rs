mod common;

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use esi_broker::{
	auth::ScopeSet,
	clock::ManualClock,
	error::{AuthError, Error},
	provider::GrantType,
};
use time::Duration;
// self
use common::*;

#[tokio::test]
async fn authenticate_stores_token_with_provider_expiry() {
	let client = ScriptedHttpClient::new();

	client.on(TOKEN_PATH, token_reply("access-1", Some("refresh-1")));

	let clock = ManualClock::new(T0);
	let manager = manager(&client, &clock);
	let token = manager.authenticate("auth-code").await.expect("Code exchange should succeed.");

	assert_eq!(token.access_token.expose(), "access-1");
	assert_eq!(token.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-1"));
	assert_eq!(token.issued_at, T0);
	assert_eq!(token.expires_at, T0 + Duration::seconds(1200));
	assert_eq!(
		manager.current_token().map(|stored| stored.access_token),
		Some(token.access_token)
	);

	let request = client.last(TOKEN_PATH);

	assert_eq!(request.method, "POST");
	assert!(request.body.contains("grant_type=authorization_code"));
	assert!(request.body.contains("code=auth-code"));
	assert!(request.header("authorization").is_some_and(|value| value.starts_with("Basic ")));
}

#[tokio::test]
async fn rejected_exchange_keeps_provider_body_and_store() {
	let client = ScriptedHttpClient::new();

	client.on(TOKEN_PATH, Reply::json(400, "{\"message\":\"Failed successfuly\"}"));

	let clock = ManualClock::new(T0);
	let manager = manager(&client, &clock);
	let err = manager.authenticate("fail_test").await.expect_err("Provider rejected the code.");

	match err {
		Error::Auth(AuthError::Rejected { grant, status, body }) => {
			assert_eq!(grant, GrantType::AuthorizationCode);
			assert_eq!(status, 400);
			assert_eq!(body, "{\"message\":\"Failed successfuly\"}");
		},
		other => panic!("Expected a rejection, got {other:?}."),
	}

	assert!(manager.current_token().is_none());
}

#[tokio::test]
async fn ensure_valid_honors_expiry_boundary() {
	let client = ScriptedHttpClient::new();

	client.on(TOKEN_PATH, token_reply("access-2", None));

	let clock = ManualClock::new(T0 + Duration::seconds(1199));
	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));
	let reused = manager.ensure_valid().await.expect("Fresh token should be reused.");

	assert_eq!(reused.access_token.expose(), "access-1");
	assert_eq!(client.calls(TOKEN_PATH), 0);

	clock.advance(Duration::seconds(2));

	let refreshed = manager.ensure_valid().await.expect("Expired token should be refreshed.");

	assert_eq!(refreshed.access_token.expose(), "access-2");
	assert_eq!(refreshed.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-1"));
	assert_eq!(refreshed.expires_at, T0 + Duration::seconds(1201 + 1200));
	assert_eq!(client.calls(TOKEN_PATH), 1);
	assert_eq!(manager.refresh_metrics.attempts(), 1);
	assert_eq!(manager.refresh_metrics.successes(), 1);

	let request = client.last(TOKEN_PATH);

	assert!(request.body.contains("grant_type=refresh_token"));
	assert!(request.body.contains("refresh_token=refresh-1"));
}

#[tokio::test]
async fn refresh_adopts_rotated_refresh_token_and_notifies_listeners() {
	let client = ScriptedHttpClient::new();

	client.on(TOKEN_PATH, token_reply("access-2", Some("refresh-2")));

	let clock = ManualClock::new(T0 + Duration::hours(1));
	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));
	let notified = Arc::new(AtomicUsize::new(0));
	let counter = notified.clone();

	manager.store.on_replace(Arc::new(move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
	}));

	let refreshed = manager.ensure_valid().await.expect("Refresh should succeed.");

	assert_eq!(refreshed.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-2"));
	assert_eq!(
		manager.store.snapshot().and_then(|stored| stored.refresh_token),
		refreshed.refresh_token
	);
	assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_token_without_refresh_fails_without_network() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0 + Duration::seconds(1201));
	let manager = manager_with_token(&client, &clock, token("access-1", None, T0));
	let err = manager.ensure_valid().await.expect_err("Token cannot be renewed.");

	assert!(matches!(err, Error::Auth(AuthError::NoRefreshToken)));

	let current = manager.current_token().expect("Token should remain stored.");
	let err = manager.refresh(&current).await.expect_err("Explicit refresh cannot proceed.");

	assert!(matches!(err, Error::Auth(AuthError::NoRefreshToken)));
	assert_eq!(client.calls(TOKEN_PATH), 0);
	assert_eq!(manager.refresh_metrics.attempts(), 0);
}

#[tokio::test]
async fn empty_store_is_not_authenticated() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);
	let err = manager(&client, &clock).ensure_valid().await.expect_err("No token is stored.");

	assert!(matches!(err, Error::Auth(AuthError::NotAuthenticated)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_single_refresh() {
	let client = ScriptedHttpClient::new().with_latency(StdDuration::from_millis(50));

	client.on(TOKEN_PATH, token_reply("access-2", None));

	let clock = ManualClock::new(T0 + Duration::seconds(1300));
	let manager =
		Arc::new(manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0)));
	let tasks = (0..8)
		.map(|_| {
			let manager = manager.clone();

			tokio::spawn(async move { manager.ensure_valid().await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let token = task
			.await
			.expect("Refresh task should not panic.")
			.expect("Every caller should receive a token.");

		assert_eq!(token.access_token.expose(), "access-2");
	}

	assert_eq!(client.calls(TOKEN_PATH), 1);
	assert_eq!(manager.refresh_metrics.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_failed_refresh() {
	let client = ScriptedHttpClient::new().with_latency(StdDuration::from_millis(50));

	client.on(TOKEN_PATH, Reply::json(400, "{\"error\":\"invalid_grant\"}"));

	let clock = ManualClock::new(T0 + Duration::seconds(1300));
	let manager =
		Arc::new(manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0)));
	let tasks = (0..8)
		.map(|_| {
			let manager = manager.clone();

			tokio::spawn(async move { manager.ensure_valid().await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let err = task
			.await
			.expect("Refresh task should not panic.")
			.expect_err("Every caller should observe the rejection.");

		assert!(matches!(
			err,
			Error::Auth(AuthError::Rejected { status: 400, ref body, .. })
				if body == "{\"error\":\"invalid_grant\"}"
		));
	}

	assert_eq!(client.calls(TOKEN_PATH), 1);
	assert_eq!(manager.refresh_metrics.attempts(), 1);
	assert_eq!(
		manager.current_token().map(|stored| stored.access_token.expose().to_owned()),
		Some("access-1".to_owned())
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clearing_the_store_during_refresh_keeps_it_signed_out() {
	let client = ScriptedHttpClient::new().with_latency(StdDuration::from_millis(100));

	client.on(TOKEN_PATH, token_reply("access-2", Some("refresh-2")));

	let clock = ManualClock::new(T0 + Duration::seconds(1300));
	let manager =
		Arc::new(manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0)));
	let refreshing = tokio::spawn({
		let manager = manager.clone();

		async move { manager.ensure_valid().await }
	});

	tokio::time::sleep(StdDuration::from_millis(30)).await;
	manager.store.clear();

	let err = refreshing
		.await
		.expect("Refresh task should not panic.")
		.expect_err("Signed-out store must not be repopulated.");

	assert!(matches!(err, Error::Auth(AuthError::NotAuthenticated)));
	assert_eq!(client.calls(TOKEN_PATH), 1);
	assert!(!manager.store.is_authenticated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn revoke_waits_for_an_in_flight_refresh() {
	let client = ScriptedHttpClient::new().with_latency(StdDuration::from_millis(100));

	client
		.on(TOKEN_PATH, token_reply("access-2", Some("refresh-2")))
		.on(REVOKE_PATH, Reply::new(200, ""));

	let clock = ManualClock::new(T0 + Duration::seconds(1300));
	let manager =
		Arc::new(manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0)));
	let refreshing = tokio::spawn({
		let manager = manager.clone();

		async move { manager.ensure_valid().await }
	});

	tokio::time::sleep(StdDuration::from_millis(30)).await;
	manager.revoke().await.expect("Revocation should succeed.");

	let refreshed = refreshing
		.await
		.expect("Refresh task should not panic.")
		.expect("Refresh started first and should commit.");

	assert_eq!(refreshed.access_token.expose(), "access-2");
	assert!(client.last(REVOKE_PATH).body.contains("token=refresh-2"));
	assert!(manager.current_token().is_none());
}

#[tokio::test]
async fn transient_token_failures_leave_token_unchanged() {
	let client = ScriptedHttpClient::new();

	client
		.on(TOKEN_PATH, Reply::json(503, "{\"error\":\"server_error\"}"))
		.on(TOKEN_PATH, Step::NetworkFailure);

	let clock = ManualClock::new(T0 + Duration::seconds(1300));
	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));
	let err = manager.ensure_valid().await.expect_err("Token endpoint is unavailable.");

	assert!(matches!(err, Error::Server { status: 503, attempts: 1, .. }));
	assert!(err.is_transient());

	let err = manager.ensure_valid().await.expect_err("Token endpoint is unreachable.");

	assert!(matches!(err, Error::Network { attempts: 1, .. }));
	assert_eq!(
		manager.current_token().map(|stored| stored.access_token.expose().to_owned()),
		Some("access-1".to_owned())
	);
	assert_eq!(manager.refresh_metrics.failures(), 2);
	assert_eq!(manager.refresh_metrics.transient_failures(), 2);
}

#[tokio::test]
async fn pkce_session_validates_state_before_exchanging() {
	let client = ScriptedHttpClient::new();

	client.on(TOKEN_PATH, token_reply("access-1", Some("refresh-1")));

	let clock = ManualClock::new(T0);
	let manager = manager(&client, &clock);
	let scope = ScopeSet::new(["esi-skills.read_skills.v1"]).expect("Scope should be valid.");
	let redirect = url("https://app.example.com/callback");
	let session = manager.start_authorization(scope, redirect);

	assert!(
		session.authorize_url.as_str().starts_with("https://login.eveonline.com/oauth/authorize?")
	);

	let err = manager
		.complete_authorization(session.clone(), "auth-code", "forged")
		.await
		.expect_err("Mismatched state must be rejected.");

	assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
	assert_eq!(client.calls(TOKEN_PATH), 0);

	let state = session.state.clone();
	let token = manager
		.complete_authorization(session, "auth-code", &state)
		.await
		.expect("Matching state should complete the exchange.");
	let request = client.last(TOKEN_PATH);

	assert_eq!(token.access_token.expose(), "access-1");
	assert!(request.body.contains("code_verifier="));
	assert!(request.body.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcallback"));
}

#[tokio::test]
async fn revoke_clears_store_after_provider_acknowledges() {
	let client = ScriptedHttpClient::new();

	client.on(REVOKE_PATH, Reply::new(200, ""));

	let clock = ManualClock::new(T0);
	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));

	manager.revoke().await.expect("Revocation should succeed.");

	let request = client.last(REVOKE_PATH);

	assert!(request.body.contains("token=refresh-1"));
	assert!(request.body.contains("token_type_hint=refresh_token"));
	assert!(manager.current_token().is_none());
}

#[tokio::test]
async fn revoke_rejection_keeps_token() {
	let client = ScriptedHttpClient::new();

	client.on(REVOKE_PATH, Reply::json(400, "{\"error\":\"invalid_request\"}"));

	let clock = ManualClock::new(T0);
	let manager = manager_with_token(&client, &clock, token("access-1", None, T0));
	let err = manager.revoke().await.expect_err("Provider rejected the revocation.");

	assert!(matches!(err, Error::Auth(AuthError::RevocationRejected { status: 400, .. })));
	assert!(client.last(REVOKE_PATH).body.contains("token_type_hint=access_token"));
	assert!(manager.current_token().is_some());
}
