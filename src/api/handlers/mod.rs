pub mod auth;
pub mod comments;
pub mod companies;
pub mod health;
pub mod projects;
pub mod reports;
pub mod users;

// common functions for the handlers
use crate::api::{error::ApiError, gate::Identity};
use crate::store::EntityId;
use axum::Json;
use regex::Regex;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

/// Unwrap an optional JSON payload, mapping absence/malformation to a 400.
pub(crate) fn require_payload<T>(payload: Option<Json<T>>) -> Result<T, ApiError> {
    payload
        .map(|Json(payload)| payload)
        .ok_or_else(|| ApiError::Validation("missing or malformed request body".to_string()))
}

/// Parse a client-supplied entity id, naming the entity in the rejection.
pub(crate) fn parse_entity_id(raw: &str, what: &str) -> Result<EntityId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("invalid {what} id")))
}

/// The acting user's id from the gate-resolved identity. A token subject
/// that is not a store id cannot act on anything.
pub(crate) fn actor_id(identity: &Identity) -> Result<EntityId, ApiError> {
    identity
        .subject
        .parse()
        .map_err(|_| ApiError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_accepts_plausible_addresses() {
        assert!(valid_email("ada@example.test"));
        assert!(valid_email("dev+tag@sub.domain.org"));
    }

    #[test]
    fn valid_email_rejects_malformed_addresses() {
        assert!(!valid_email(""));
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("two@@example.test"));
        assert!(!valid_email("spaces in@example.test"));
        assert!(!valid_email("nodot@example"));
    }

    #[test]
    fn actor_id_requires_a_store_shaped_subject() {
        let ok = Identity {
            subject: "68e23b3d997deadd848a490b".to_string(),
        };
        assert!(actor_id(&ok).is_ok());

        let numeric = Identity {
            subject: "42".to_string(),
        };
        assert!(matches!(
            actor_id(&numeric),
            Err(ApiError::Unauthenticated)
        ));
    }
}
