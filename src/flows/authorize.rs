//! Authorization Code exchanges, with or without a PKCE session.
//!
//! [`OAuthManager::start_authorization`] prepares the browser redirect and
//! [`OAuthManager::complete_authorization`] validates the returned `state` before redeeming the
//! code. [`OAuthManager::authenticate`] redeems a code obtained out of band. Every successful
//! exchange replaces the stored token.

mod session;

pub use session::*;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Token},
	flows::OAuthManager,
	http::ApiHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
};

impl<C, M> OAuthManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the authorize URL plus the `state` and PKCE values to keep until the redirect.
	pub fn start_authorization(&self, scope: ScopeSet, redirect_uri: Url) -> AuthorizationSession {
		session::build_session(&self.descriptor, &self.client_id, scope, redirect_uri)
	}

	/// Validates `returned_state` and exchanges `code` using the session's PKCE verifier.
	pub async fn complete_authorization(
		&self,
		session: AuthorizationSession,
		code: &str,
		returned_state: &str,
	) -> Result<Token> {
		obs::observe(FlowKind::AuthorizationCode, "complete_authorization", async move {
			session.validate_state(returned_state)?;

			let (redirect_uri, verifier) = session.into_exchange_parts();

			self.exchange_code(code, Some(&verifier), Some(&redirect_uri)).await
		})
		.await
	}

	/// Exchanges a one-time authorization `code` and stores the resulting token.
	///
	/// Provider rejections surface as [`AuthError::Rejected`](crate::error::AuthError) with the
	/// response body verbatim; the stored token is left untouched on any failure.
	pub async fn authenticate(&self, code: &str) -> Result<Token> {
		obs::observe(FlowKind::AuthorizationCode, "authenticate", async move {
			self.exchange_code(code, None, self.redirect_uri.as_ref()).await
		})
		.await
	}

	async fn exchange_code(
		&self,
		code: &str,
		pkce_verifier: Option<&str>,
		redirect_uri: Option<&Url>,
	) -> Result<Token> {
		let facade = self.facade()?;
		let token = facade.exchange_authorization_code(code, pkce_verifier, redirect_uri).await?;

		self.store.replace(token.clone());

		Ok(token)
	}
}
