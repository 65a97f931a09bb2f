//! Identity payload returned by the token verification endpoint.

// self
use crate::_prelude::*;

/// Character identity bound to a verified access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VerifiedIdentity {
	/// Numeric character identifier.
	#[serde(rename = "CharacterID")]
	pub character_id: u64,
	/// Display name of the character.
	pub character_name: String,
	/// Stable hash identifying the owning account; changes when the character is transferred.
	pub character_owner_hash: String,
	/// Space-delimited scopes granted to the token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scopes: Option<String>,
	/// Expiry reported by the provider, verbatim.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_on: Option<String>,
	/// Token type reported by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
}
