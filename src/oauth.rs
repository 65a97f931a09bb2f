//! Internal OAuth client facade abstractions.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AccessToken, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ErrorResponse, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken,
	RequestTokenError, RevocationUrl, StandardRevocableToken, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::Token,
	clock::Clock,
	error::{AuthError, ConfigError, TransportError},
	http::{ApiHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: "unknown HTTP client failure".into() }.into(),
		}
	}
}

/// Mapper for custom transports: every transport failure becomes [`Error::Network`].
#[derive(Clone, Debug, Default)]
pub struct PassthroughTransportErrorMapper;
impl<E> TransportErrorMapper<E> for PassthroughTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(&self, _: Option<&ResponseMetadata>, err: HttpClientError<E>) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => TransportError::network(*inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: "unknown HTTP client failure".into() }.into(),
		}
	}
}

/// Token revocation target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RevocableKind {
	Access,
	Refresh,
}

pub(crate) trait OAuth2Facade {
	fn exchange_authorization_code<'a, 'code, 'pkce, 'redirect>(
		&'a self,
		code: &'code str,
		pkce_verifier: Option<&'pkce str>,
		redirect_uri: Option<&'redirect Url>,
	) -> FacadeFuture<'a, Token>
	where
		'code: 'a,
		'pkce: 'a,
		'redirect: 'a;

	fn refresh_token<'a, 'refresh>(
		&'a self,
		refresh_token: &'refresh str,
	) -> FacadeFuture<'a, (Token, Option<String>)>
	where
		'refresh: 'a;

	fn revoke_token<'a, 'token>(
		&'a self,
		token: &'token str,
		kind: RevocableKind,
	) -> FacadeFuture<'a, ()>
	where
		'token: 'a;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	revocation_url: Option<RevocationUrl>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	clock: Arc<dyn Clock>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let revocation_url = descriptor
			.endpoints
			.revocation
			.as_ref()
			.map(|url| RevocationUrl::new(url.to_string()))
			.transpose()
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let secret = if matches!(descriptor.client_auth_method, ClientAuthMethod::NoneWithPkce) {
			None
		} else {
			client_secret.map(|value| ClientSecret::new(value.to_owned()))
		};
		let mut oauth_client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = secret {
			oauth_client = oauth_client.set_client_secret(secret);
		}
		if !matches!(descriptor.client_auth_method, ClientAuthMethod::ClientSecretBasic) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, revocation_url, http_client, error_mapper, clock })
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_authorization_code<'a, 'code, 'pkce, 'redirect>(
		&'a self,
		code: &'code str,
		pkce_verifier: Option<&'pkce str>,
		redirect_uri: Option<&'redirect Url>,
	) -> FacadeFuture<'a, Token>
	where
		'code: 'a,
		'pkce: 'a,
		'redirect: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request =
				self.oauth_client.exchange_code(AuthorizationCode::new(code.to_owned()));

			if let Some(verifier) = pkce_verifier {
				request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
			}
			if let Some(redirect) = redirect_uri {
				let redirect_url = RedirectUrl::new(redirect.to_string())
					.map_err(|source| ConfigError::InvalidRedirect { source })?;

				request = request.set_redirect_uri(Cow::Owned(redirect_url));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					Endpoint::Token(GrantType::AuthorizationCode),
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;
			let (token, _) = map_token_response(&response, self.clock.now())?;

			Ok(token)
		})
	}

	fn refresh_token<'a, 'refresh>(
		&'a self,
		refresh_token: &'refresh str,
	) -> FacadeFuture<'a, (Token, Option<String>)>
	where
		'refresh: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(
						Endpoint::Token(GrantType::RefreshToken),
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})?;

			map_token_response(&response, self.clock.now())
		})
	}

	fn revoke_token<'a, 'token>(
		&'a self,
		token: &'token str,
		kind: RevocableKind,
	) -> FacadeFuture<'a, ()>
	where
		'token: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let revocation_url = self
				.revocation_url
				.clone()
				.ok_or(ConfigError::MissingEndpoint { endpoint: "revocation" })?;
			let client = self.oauth_client.clone().set_revocation_url(revocation_url);
			let revocable = match kind {
				RevocableKind::Access =>
					StandardRevocableToken::AccessToken(AccessToken::new(token.to_owned())),
				RevocableKind::Refresh =>
					StandardRevocableToken::RefreshToken(RefreshToken::new(token.to_owned())),
			};
			let instrumented = self.http_client.with_metadata(meta.clone());

			client
				.revoke_token(revocable)
				.map_err(ConfigError::from)?
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(
						Endpoint::Revocation,
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})
		})
	}
}

/// Identity-provider endpoint a failed call was addressed to.
#[derive(Clone, Copy, Debug)]
enum Endpoint {
	Token(GrantType),
	Revocation,
}
impl Endpoint {
	fn rejected(self, status: u16, body: String) -> AuthError {
		match self {
			Endpoint::Token(grant) => AuthError::Rejected { grant, status, body },
			Endpoint::Revocation => AuthError::RevocationRejected { status, body },
		}
	}
}

fn map_token_response(
	response: &BasicTokenResponse,
	issued_at: OffsetDateTime,
) -> Result<(Token, Option<String>)> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let new_refresh = response.refresh_token().map(|token| token.secret().to_owned());
	let mut builder = Token::builder()
		.access_token(response.access_token().secret().to_owned())
		.issued_at(issued_at)
		.expires_in(Duration::seconds(expires_in));

	if let Some(secret) = &new_refresh {
		builder = builder.refresh_token(secret.clone());
	}

	let token = builder.build().map_err(ConfigError::from)?;

	Ok((token, new_refresh))
}

fn map_request_error<E, M, T>(
	endpoint: Endpoint,
	meta: Option<ResponseMetadata>,
	err: RequestTokenError<HttpClientError<E>, T>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
	T: ErrorResponse + Serialize,
{
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::Request(error) => mapper.map_transport_error(meta.as_ref(), error),
		RequestTokenError::ServerResponse(response) => {
			let body = captured_body(meta)
				.unwrap_or_else(|| serde_json::to_string(&response).unwrap_or_default());

			classify_failure(endpoint, status.unwrap_or(400), body)
		},
		RequestTokenError::Parse(source, raw) => match status {
			Some(code) if code != 200 => {
				let body = captured_body(meta)
					.unwrap_or_else(|| String::from_utf8_lossy(&raw).into_owned());

				classify_failure(endpoint, code, body)
			},
			_ => Error::Decode { source, status },
		},
		RequestTokenError::Other(message) => match status {
			Some(code) if code != 200 =>
				classify_failure(endpoint, code, captured_body(meta).unwrap_or_default()),
			_ => Error::UnexpectedResponse { status, message },
		},
	}
}

fn captured_body(meta: Option<ResponseMetadata>) -> Option<String> {
	meta.and_then(|value| value.body)
}

fn classify_failure(endpoint: Endpoint, status: u16, body: String) -> Error {
	match status {
		500..=599 => Error::Server { status, body, attempts: 1 },
		400..=499 => endpoint.rejected(status, body).into(),
		_ => Error::UnexpectedResponse {
			status: Some(status),
			message: format!("identity provider answered with status {status}"),
		},
	}
}
