// self
use crate::{
	_prelude::*,
	error::AuthError,
	flows::OAuthManager,
	http::ApiHttpClient,
	oauth::{OAuth2Facade, RevocableKind, TransportErrorMapper},
	obs::{self, FlowKind},
};

impl<C, M> OAuthManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Revokes the stored grant at the provider and clears the store on success.
	///
	/// The refresh token is revoked when present, otherwise the access token. A rejection
	/// surfaces as [`AuthError::RevocationRejected`] and keeps the stored token. Waits for any
	/// in-flight refresh, and no refresh starts until the revocation settles.
	pub async fn revoke(&self) -> Result<()> {
		obs::observe(FlowKind::Revoke, "revoke", async move {
			let _flight = self.refresh_flight.enter().await;
			let current = self.store.current().ok_or(AuthError::NotAuthenticated)?;
			let (secret, kind) = match &current.refresh_token {
				Some(refresh) => (refresh, RevocableKind::Refresh),
				None => (&current.access_token, RevocableKind::Access),
			};

			self.facade()?.revoke_token(secret.expose(), kind).await?;

			let unchanged = self
				.store
				.current()
				.is_some_and(|stored| stored.access_token == current.access_token);

			if unchanged {
				self.store.clear();
			}

			Ok(())
		})
		.await
	}
}
