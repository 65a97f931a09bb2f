//! Provider descriptor data structures shared by the token lifecycle flows.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Grant identifiers used in token requests and error reports.
pub mod grant;

pub use builder::*;
pub use grant::*;

// self
use crate::_prelude::*;

/// Client authentication modes for token and revocation endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that prove possession via PKCE.
	NoneWithPkce,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint used to start the Authorization Code flow.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
	/// Optional token verification endpoint returning the bound identity.
	pub verify: Option<Url>,
	/// Optional revocation endpoint.
	pub revocation: Option<Url>,
}

/// Immutable provider descriptor consumed by the OAuth manager and pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Client authentication mechanism.
	pub client_auth_method: ClientAuthMethod,
}
impl ProviderDescriptor {
	/// Creates a new, empty builder.
	pub fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::default()
	}

	/// Descriptor for the EVE Online single sign-on service.
	pub fn eve_sso() -> Result<Self, ProviderDescriptorError> {
		Self::builder()
			.authorization_endpoint(parse_static("https://login.eveonline.com/oauth/authorize")?)
			.token_endpoint(parse_static("https://login.eveonline.com/oauth/token")?)
			.verify_endpoint(parse_static("https://esi.evetech.net/verify/")?)
			.revocation_endpoint(parse_static("https://login.eveonline.com/oauth/revoke")?)
			.build()
	}
}

fn parse_static(raw: &'static str) -> Result<Url, ProviderDescriptorError> {
	Url::parse(raw).map_err(|_| ProviderDescriptorError::InvalidEndpoint { url: raw.into() })
}
