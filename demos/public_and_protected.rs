//! Demonstrates a cached public request and a protected request that runs through the PKCE
//! authorization flow, all against a local mock of the SSO and API hosts.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use esi_broker::{
	auth::ScopeSet,
	config::ClientConfig,
	http::{ReqwestHttpClient, headers},
	oauth::ReqwestTransportErrorMapper,
	pipeline::ReqwestRequestPipeline,
	provider::ProviderDescriptor,
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expires = headers::format_http_date(OffsetDateTime::now_utc() + Duration::minutes(5))
		.unwrap_or_default();
	let incursions_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/latest/incursions/");
			then.status(200)
				.header("content-type", "application/json")
				.header("expires", expires.as_str())
				.body("[{\"state\":\"mobilizing\",\"staging_solar_system_id\":30003838}]");
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"refresh_token\":\"demo-refresh\",\"token_type\":\"Bearer\",\"expires_in\":1200}",
			);
		})
		.await;
	let wallet_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/latest/characters/123456789/wallet/")
				.header("authorization", "Bearer demo-access");
			then.status(200).header("content-type", "application/json").body("1000.5");
		})
		.await;
	let descriptor = ProviderDescriptor::builder()
		.authorization_endpoint(Url::parse(&server.url("/oauth/authorize"))?)
		.token_endpoint(Url::parse(&server.url("/oauth/token"))?)
		.build()?;
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let config = ClientConfig::default().with_user_agent("esi-broker-demo/0.1 (ops@example.com)");
	let pipeline = <ReqwestRequestPipeline>::with_http_client(
		http_client,
		Arc::new(ReqwestTransportErrorMapper),
	)
	.with_config(&config);
	let incursions = Url::parse(&server.url("/latest/incursions/"))?;

	for _ in 0..2 {
		let response = pipeline.get(incursions.clone()).await?;

		println!(
			"incursions: status={} from_cache={} expires_at={:?}",
			response.status, response.from_cache, response.expires_at
		);
	}

	incursions_mock.assert_calls_async(1).await;

	let manager = pipeline
		.oauth_manager(descriptor, "demo-client")
		.with_client_secret("demo-secret")
		.with_config(&config);
	let session = manager.start_authorization(
		ScopeSet::new(["esi-wallet.read_character_wallet.v1"])?,
		Url::parse("https://app.example.com/callback")?,
	);

	println!("open in a browser: {}", session.authorize_url);

	// The SSO redirects back with `code` and `state`; echo the state for the demo.
	let state = session.state.clone();
	let token = manager.complete_authorization(session, "demo-code", &state).await?;

	println!("authenticated until {}", token.expires_at);

	let pipeline = pipeline.with_oauth(manager);
	let balance = pipeline
		.get_authenticated(Url::parse(&server.url("/latest/characters/123456789/wallet/"))?)
		.await?
		.json::<f64>()?;

	println!("wallet balance: {balance}");

	token_mock.assert_async().await;
	wallet_mock.assert_async().await;

	Ok(())
}
