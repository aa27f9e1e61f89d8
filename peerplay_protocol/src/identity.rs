// Session codes and endpoint identities.
//
// An endpoint identity is the transport address of a peer. It is derived
// deterministically from the session code and role so that a player can
// compute the GM's address without any discovery step:
//
//   peerplay-<CODE>-GM
//   peerplay-<CODE>-PLAYER-<sanitized tag>
//
// Sanitization replaces every character outside `[A-Za-z0-9]` with `_`.
// The placeholder is deliberately not `-`, so a sanitized tag never contains
// the field separator and `parse` is the exact inverse of `derive`. Two tags
// that differ only in disallowed characters ("bob!" and "bob?") map to the
// same endpoint; the transport then refuses the second registration.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed prefix shared by every endpoint of this application.
pub const ENDPOINT_PREFIX: &str = "peerplay";

/// Replacement for characters outside `[A-Za-z0-9]` in display tags.
pub const TAG_PLACEHOLDER: char = '_';

/// Length of generated session codes.
pub const SESSION_CODE_LEN: usize = 6;

const GM_ROLE: &str = "GM";
const PLAYER_ROLE: &str = "PLAYER";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid session code {0:?}: expected letters and digits only")]
    InvalidSessionCode(String),

    #[error("display tag must not be empty")]
    EmptyTag,

    #[error("malformed endpoint identity {0:?}")]
    MalformedEndpoint(String),
}

/// Short code naming one session. Letters and digits, stored uppercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    pub fn new(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdentityError::InvalidSessionCode(raw.into()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Six random uppercase letters.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let code = (0..SESSION_CODE_LEN)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();
        Self(code)
    }

    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

/// Role half of a parsed identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    GameMaster,
    /// `tag` is the sanitized tag once parsed from an endpoint.
    Player { tag: String },
}

/// Structured form of an endpoint identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub session_code: SessionCode,
    pub role: Role,
}

impl Identity {
    pub fn endpoint(&self) -> Result<EndpointId, IdentityError> {
        derive_endpoint(&self.session_code, &self.role)
    }
}

/// Transport address of one peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Wrap an address received from a transport. No validation; use
    /// [`EndpointId::parse`] or [`EndpointId::belongs_to`] before trusting it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn game_master(code: &SessionCode) -> Self {
        Self(format!("{ENDPOINT_PREFIX}-{code}-{GM_ROLE}"))
    }

    pub fn player(code: &SessionCode, tag: &str) -> Result<Self, IdentityError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(IdentityError::EmptyTag);
        }
        Ok(Self(format!(
            "{ENDPOINT_PREFIX}-{code}-{PLAYER_ROLE}-{}",
            sanitize_tag(tag)
        )))
    }

    pub fn parse(&self) -> Result<Identity, IdentityError> {
        parse_endpoint(&self.0)
    }

    /// True when this identity parses and names the given session.
    pub fn belongs_to(&self, code: &SessionCode) -> bool {
        self.parse().is_ok_and(|identity| &identity.session_code == code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every character outside `[A-Za-z0-9]` with [`TAG_PLACEHOLDER`].
pub fn sanitize_tag(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { TAG_PLACEHOLDER })
        .collect()
}

/// Pure derivation `(session code, role) -> endpoint`.
pub fn derive_endpoint(code: &SessionCode, role: &Role) -> Result<EndpointId, IdentityError> {
    match role {
        Role::GameMaster => Ok(EndpointId::game_master(code)),
        Role::Player { tag } => EndpointId::player(code, tag),
    }
}

/// Inverse of [`derive_endpoint`].
pub fn parse_endpoint(raw: &str) -> Result<Identity, IdentityError> {
    let malformed = || IdentityError::MalformedEndpoint(raw.into());

    let mut parts = raw.splitn(4, '-');
    if parts.next() != Some(ENDPOINT_PREFIX) {
        return Err(malformed());
    }
    let code = parts.next().ok_or_else(malformed)?;
    // Codes are stored uppercase; anything else was not derived by us.
    if code.is_empty()
        || !code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(malformed());
    }
    let session_code = SessionCode::new(code).map_err(|_| malformed())?;

    let role = match (parts.next(), parts.next()) {
        (Some(GM_ROLE), None) => Role::GameMaster,
        (Some(PLAYER_ROLE), Some(tag))
            if !tag.is_empty()
                && tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == TAG_PLACEHOLDER) =>
        {
            Role::Player { tag: tag.into() }
        }
        _ => return Err(malformed()),
    };

    Ok(Identity { session_code, role })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn code() -> SessionCode {
        SessionCode::new("ABCDEF").unwrap()
    }

    #[test]
    fn gm_endpoint_format() {
        assert_eq!(EndpointId::game_master(&code()).as_str(), "peerplay-ABCDEF-GM");
    }

    #[test]
    fn player_endpoint_replaces_disallowed_characters() {
        let endpoint = EndpointId::player(&code(), "Sir Alice-2!").unwrap();
        assert_eq!(endpoint.as_str(), "peerplay-ABCDEF-PLAYER-Sir_Alice_2_");
    }

    #[test]
    fn sanitized_collision_is_deterministic() {
        let a = EndpointId::player(&code(), "bob!").unwrap();
        let b = EndpointId::player(&code(), "bob?").unwrap();
        assert_eq!(a, b);
        let c = EndpointId::player(&code(), "bob").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn empty_tag_rejected() {
        assert_eq!(
            EndpointId::player(&code(), "   "),
            Err(IdentityError::EmptyTag)
        );
    }

    #[test]
    fn derive_then_parse_round_trip() {
        for tag in ["alice", "Bob 99", "ü-ber", "x"] {
            let role = Role::Player { tag: tag.into() };
            let endpoint = derive_endpoint(&code(), &role).unwrap();
            let parsed = endpoint.parse().unwrap();
            assert_eq!(parsed.session_code, code());
            assert_eq!(
                parsed.role,
                Role::Player {
                    tag: sanitize_tag(tag)
                }
            );
            // And back again: parse is the inverse of derive.
            assert_eq!(parsed.endpoint().unwrap(), endpoint);
        }

        let gm = EndpointId::game_master(&code());
        assert_eq!(gm.parse().unwrap().role, Role::GameMaster);
        assert_eq!(gm.parse().unwrap().endpoint().unwrap(), gm);
    }

    #[test]
    fn parse_rejects_foreign_identities() {
        for raw in [
            "",
            "peerplay",
            "other-ABCDEF-GM",
            "peerplay-ABCDEF",
            "peerplay-ABCDEF-GM-extra",
            "peerplay-ABCDEF-PLAYER",
            "peerplay-ABCDEF-PLAYER-",
            "peerplay-ABCDEF-PLAYER-a-b",
            "peerplay-abcdef-GM",
            "peerplay-AB CD-GM",
            "peerplay-ABCDEF-HOST",
        ] {
            assert!(parse_endpoint(raw).is_err(), "{raw:?} should not parse");
        }
    }

    #[test]
    fn belongs_to_checks_session_code() {
        let endpoint = EndpointId::player(&code(), "alice").unwrap();
        assert!(endpoint.belongs_to(&code()));
        assert!(!endpoint.belongs_to(&SessionCode::new("ZZZZZZ").unwrap()));
        assert!(!EndpointId::from_raw("garbage").belongs_to(&code()));
    }

    #[test]
    fn session_code_normalized_and_validated() {
        assert_eq!(SessionCode::new(" abc123 ").unwrap().as_str(), "ABC123");
        assert!(SessionCode::new("").is_err());
        assert!(SessionCode::new("AB-CD").is_err());
        assert!("ABCDEF".parse::<SessionCode>().is_ok());
    }

    #[test]
    fn generated_codes_are_six_uppercase_letters() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = SessionCode::generate(&mut rng);
            assert_eq!(code.as_str().len(), SESSION_CODE_LEN);
            assert!(code.as_str().chars().all(|c| c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn session_code_deserialization_validates() {
        let ok: SessionCode = serde_json::from_str(r#""ABCDEF""#).unwrap();
        assert_eq!(ok, code());
        assert!(serde_json::from_str::<SessionCode>(r#""AB-CD""#).is_err());
    }
}
