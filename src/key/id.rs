//! Strongly typed identifiers enforced across the key domain.
//!
//! Credential ids end up in store keys, audit notes, log lines, and health reports, so they are
//! restricted to a URL- and file-safe alphabet (`A-Z a-z 0-9 - _ . :`) of at most 64 bytes.
//! User ids come from the host application (emails, external account ids) and only have to be
//! non-empty printable text without whitespace, up to 128 bytes.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $rules:expr) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, $rules, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, $rules, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const CREDENTIAL_ID_MAX_LEN: usize = 64;
const USER_ID_MAX_LEN: usize = 128;
const CREDENTIAL_ID_RULES: IdRules =
	IdRules { max_len: CREDENTIAL_ID_MAX_LEN, allowed: is_credential_id_char };
const USER_ID_RULES: IdRules = IdRules { max_len: USER_ID_MAX_LEN, allowed: is_user_id_char };

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (credential, user).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (credential, user).
		kind: &'static str,
	},
	/// The identifier contains a character outside its alphabet.
	#[error("{kind} identifier contains the disallowed character {character:?}.")]
	InvalidCharacter {
		/// Kind of identifier (credential, user).
		kind: &'static str,
		/// First offending character.
		character: char,
	},
	/// The identifier exceeded the allowed byte length.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (credential, user).
		kind: &'static str,
		/// Maximum permitted length in bytes.
		max: usize,
	},
}

struct IdRules {
	max_len: usize,
	allowed: fn(char) -> bool,
}

def_id! {
	CredentialId,
	"Unique identifier for a pooled marketplace credential, such as `etsy-1` or `amz:na.primary`.",
	"Credential",
	CREDENTIAL_ID_RULES
}
def_id! {
	UserId,
	"Identifier of the seller or admin acting through the broker, such as `seller@example.com`.",
	"User",
	USER_ID_RULES
}

fn is_credential_id_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn is_user_id_char(c: char) -> bool {
	!c.is_control()
}

fn validate_view(kind: &'static str, rules: IdRules, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if let Some(character) = view.chars().find(|c| !(rules.allowed)(*c)) {
		return Err(IdentifierError::InvalidCharacter { kind, character });
	}
	if view.len() > rules.max_len {
		return Err(IdentifierError::TooLong { kind, max: rules.max_len });
	}

	Ok(())
}
