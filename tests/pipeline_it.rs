mod common;

// crates.io
use esi_broker::{
	auth::VerifiedIdentity,
	clock::ManualClock,
	error::{AuthError, ConfigError, Error},
	request::RequestDescriptor,
};
use serde::Deserialize;
use time::Duration;
// self
use common::*;

const INCURSIONS_PATH: &str = "/latest/incursions/";
const WALLET: &str = "https://esi.evetech.net/latest/characters/123456789/wallet/";
const WALLET_PATH: &str = "/latest/characters/123456789/wallet/";
const DEPRECATION: &str = "199 - This endpoint has been updated.";

#[derive(Debug, Deserialize)]
struct Incursion {
	state: String,
}

fn incursions_reply() -> Reply {
	Reply::json(200, "[{\"state\":\"mobilizing\"}]")
}

#[tokio::test]
async fn future_expires_is_served_from_cache_until_it_passes() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client.on(INCURSIONS_PATH, incursions_reply().expires(T0 + Duration::minutes(5)));

	let pipeline = pipeline(&client, &clock);
	let first = pipeline.get(url(INCURSIONS)).await.expect("First fetch should succeed.");

	assert!(!first.from_cache);
	assert_eq!(first.expires_at, Some(T0 + Duration::minutes(5)));

	let second = pipeline.get(url(INCURSIONS)).await.expect("Second fetch should succeed.");
	let incursions: Vec<Incursion> = second.json().expect("Cached payload should decode.");

	assert!(second.from_cache);
	assert_eq!(incursions[0].state, "mobilizing");
	assert_eq!(client.calls(INCURSIONS_PATH), 1);

	clock.advance(Duration::minutes(5));

	let third = pipeline.get(url(INCURSIONS)).await.expect("Expired entry should be refetched.");

	assert!(!third.from_cache);
	assert_eq!(client.calls(INCURSIONS_PATH), 2);
}

#[tokio::test]
async fn past_or_missing_expires_is_never_served_from_cache() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client
		.on(INCURSIONS_PATH, incursions_reply().expires(T0 - Duration::minutes(5)))
		.on(INCURSIONS_PATH, incursions_reply());

	let pipeline = pipeline(&client, &clock);

	for _ in 0..3 {
		let response = pipeline.get(url(INCURSIONS)).await.expect("Fetch should succeed.");

		assert!(!response.from_cache);
	}

	assert_eq!(client.calls(INCURSIONS_PATH), 3);
}

#[tokio::test]
async fn malformed_expires_is_not_cacheable() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client.on(INCURSIONS_PATH, incursions_reply().header("expires", "tomorrow-ish"));

	let pipeline = pipeline(&client, &clock);
	let first = pipeline.get(url(INCURSIONS)).await.expect("Fetch should succeed.");
	let second = pipeline.get(url(INCURSIONS)).await.expect("Fetch should succeed.");

	assert!(first.expires_at.is_none());
	assert!(!second.from_cache);
	assert_eq!(client.calls(INCURSIONS_PATH), 2);
}

#[tokio::test]
async fn warning_is_surfaced_without_bypassing_the_cache() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client.on(
		INCURSIONS_PATH,
		incursions_reply().expires(T0 + Duration::minutes(5)).header("warning", DEPRECATION),
	);

	let pipeline = pipeline(&client, &clock);
	let fetched = pipeline.get(url(INCURSIONS)).await.expect("Fetch should succeed.");
	let cached = pipeline.get(url(INCURSIONS)).await.expect("Cached fetch should succeed.");

	assert_eq!(fetched.warning.as_deref(), Some(DEPRECATION));
	assert!(cached.from_cache);
	assert_eq!(cached.warning.as_deref(), Some(DEPRECATION));
	assert_eq!(client.calls(INCURSIONS_PATH), 1);
}

#[tokio::test]
async fn repeated_server_errors_exhaust_the_retry_budget() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client.on(INCURSIONS_PATH, Reply::json(500, "{\"error\":\"Internal error\",\"count\":3}"));

	let pipeline = pipeline(&client, &clock);
	let err = pipeline.get(url(INCURSIONS)).await.expect_err("Every attempt fails.");

	match err {
		Error::Server { status, body, attempts } => {
			assert_eq!(status, 500);
			assert_eq!(body, "{\"error\":\"Internal error\",\"count\":3}");
			assert_eq!(attempts, 3);
		},
		other => panic!("Expected a server error, got {other:?}."),
	}

	assert_eq!(client.calls(INCURSIONS_PATH), 3);
}

#[tokio::test]
async fn transient_failures_recover_on_retry() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client
		.on(INCURSIONS_PATH, Step::NetworkFailure)
		.on(INCURSIONS_PATH, Reply::json(503, "busy").header("retry-after", "0"))
		.on(INCURSIONS_PATH, incursions_reply());

	let response = pipeline(&client, &clock)
		.get(url(INCURSIONS))
		.await
		.expect("Third attempt should succeed.");

	assert_eq!(response.status, 200);
	assert_eq!(client.calls(INCURSIONS_PATH), 3);
}

#[tokio::test]
async fn client_errors_and_unsafe_methods_are_not_retried() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client
		.on(INCURSIONS_PATH, Reply::json(404, "{\"error\":\"Not found\"}"))
		.on("/latest/universe/ids/", Reply::json(502, "bad gateway"));

	let pipeline = pipeline(&client, &clock);
	let err = pipeline.get(url(INCURSIONS)).await.expect_err("404 is final.");

	assert!(matches!(err, Error::Client { status: 404, .. }));
	assert_eq!(client.calls(INCURSIONS_PATH), 1);

	let post = RequestDescriptor::post(url("https://esi.evetech.net/latest/universe/ids/"))
		.json_body(&["Jita"])
		.expect("JSON body should serialize.");
	let err = pipeline.request(&post).await.expect_err("POST is not retried.");

	assert!(matches!(err, Error::Server { status: 502, attempts: 1, .. }));
	assert_eq!(client.calls("/latest/universe/ids/"), 1);

	let err = pipeline.request(&post.allow_retry()).await.expect_err("Opted-in POST is retried.");

	assert!(matches!(err, Error::Server { attempts: 3, .. }));
	assert_eq!(client.calls("/latest/universe/ids/"), 4);
}

#[tokio::test]
async fn unsafe_methods_bypass_the_cache() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0);

	client.on("/latest/universe/ids/", Reply::json(200, "{}").expires(T0 + Duration::hours(1)));

	let pipeline = pipeline(&client, &clock);
	let post = RequestDescriptor::post(url("https://esi.evetech.net/latest/universe/ids/"))
		.json_body(&["Jita"])
		.expect("JSON body should serialize.");

	pipeline.request(&post).await.expect("First POST should succeed.");

	let second = pipeline.request(&post).await.expect("Second POST should succeed.");

	assert!(!second.from_cache);
	assert_eq!(client.calls("/latest/universe/ids/"), 2);
}

#[tokio::test]
async fn bearer_is_attached_only_to_protected_requests() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0 + Duration::minutes(1));

	client.on(WALLET_PATH, Reply::json(200, "1000.5")).on(INCURSIONS_PATH, incursions_reply());

	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));
	let pipeline = pipeline(&client, &clock).with_oauth(manager);
	let balance = pipeline
		.get_authenticated(url(WALLET))
		.await
		.expect("Protected request should succeed.")
		.json::<f64>()
		.expect("Balance should decode.");

	assert_eq!(balance, 1000.5);
	assert_eq!(client.last(WALLET_PATH).header("authorization"), Some("Bearer access-1"));
	assert!(
		client
			.last(WALLET_PATH)
			.header("user-agent")
			.is_some_and(|value| value.starts_with("esi-broker/"))
	);

	pipeline.get(url(INCURSIONS)).await.expect("Public request should succeed.");

	assert!(client.last(INCURSIONS_PATH).header("authorization").is_none());
}

#[tokio::test]
async fn protected_requests_refresh_expired_tokens_first() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0 + Duration::hours(1));

	client.on(TOKEN_PATH, token_reply("access-2", None)).on(WALLET_PATH, Reply::json(200, "1"));

	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));
	let pipeline = pipeline(&client, &clock).with_oauth(manager);

	pipeline.get_authenticated(url(WALLET)).await.expect("Protected request should succeed.");

	assert_eq!(client.calls(TOKEN_PATH), 1);
	assert_eq!(client.last(WALLET_PATH).header("authorization"), Some("Bearer access-2"));
}

#[tokio::test]
async fn auth_failures_short_circuit_before_dispatch() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0 + Duration::hours(1));

	client.on(WALLET_PATH, Reply::json(200, "1"));

	let unconfigured = pipeline(&client, &clock);
	let err =
		unconfigured.get_authenticated(url(WALLET)).await.expect_err("No manager is attached.");

	assert!(matches!(err, Error::Config(ConfigError::OAuthNotConfigured)));

	let err = unconfigured.verify().await.expect_err("Verification needs a manager too.");

	assert!(matches!(err, Error::Config(ConfigError::OAuthNotConfigured)));

	let manager = manager_with_token(&client, &clock, token("access-1", None, T0));
	let err = pipeline(&client, &clock)
		.with_oauth(manager)
		.get_authenticated(url(WALLET))
		.await
		.expect_err("Expired token without refresh token cannot be used.");

	assert!(matches!(err, Error::Auth(AuthError::NoRefreshToken)));
	assert_eq!(client.calls(WALLET_PATH), 0);
	assert_eq!(client.calls(TOKEN_PATH), 0);
}

#[tokio::test]
async fn verify_decodes_identity() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0 + Duration::minutes(1));

	client.on(
		VERIFY_PATH,
		Reply::json(
			200,
			"{\"CharacterID\":123456789,\"CharacterName\":\"EsiPy Tester\",\"CharacterOwnerHash\":\"YetAnotherHash\"}",
		),
	);

	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));
	let identity: VerifiedIdentity = pipeline(&client, &clock)
		.with_oauth(manager)
		.verify()
		.await
		.expect("Verification should succeed.");

	assert_eq!(identity.character_id, 123_456_789);
	assert_eq!(identity.character_name, "EsiPy Tester");
	assert_eq!(identity.character_owner_hash, "YetAnotherHash");
	assert_eq!(client.last(VERIFY_PATH).header("authorization"), Some("Bearer access-1"));
}

#[tokio::test]
async fn verify_rejection_is_a_client_error_without_refresh() {
	let client = ScriptedHttpClient::new();
	let clock = ManualClock::new(T0 + Duration::minutes(1));

	client.on(VERIFY_PATH, Reply::json(400, "{\"error\":\"invalid_token\"}"));

	let manager = manager_with_token(&client, &clock, token("access-1", Some("refresh-1"), T0));
	let pipeline = pipeline(&client, &clock).with_oauth(manager);
	let err = pipeline.verify().await.expect_err("Verification endpoint rejected the token.");

	assert!(matches!(
		err,
		Error::Client { status: 400, ref body } if body.contains("invalid_token")
	));
	assert_eq!(client.calls(VERIFY_PATH), 1);
	assert_eq!(client.calls(TOKEN_PATH), 0);
	assert_eq!(
		pipeline
			.oauth()
			.and_then(|manager| manager.current_token())
			.map(|stored| stored.access_token.expose().to_owned()),
		Some("access-1".to_owned())
	);
}
