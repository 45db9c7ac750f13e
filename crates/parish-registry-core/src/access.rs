//! Passphrase-gated access to protected areas.
//!
//! A [`Session`] remembers which areas were unlocked during its lifetime.
//! Handlers for protected areas take a [`Capability`], which can only be
//! obtained from a session that unlocked the area against its configured
//! credential.

use std::collections::BTreeSet;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};

use crate::RegistryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProtectedArea {
    PastoralCare,
    Finance,
    Admin,
}

impl ProtectedArea {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PastoralCare => "pastoral_care",
            Self::Finance => "finance",
            Self::Admin => "admin",
        }
    }
}

/// Salted passphrase hashes (PHC strings) per protected area.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pastoral_care: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn for_area(&self, area: ProtectedArea) -> Option<&str> {
        match area {
            ProtectedArea::PastoralCare => self.pastoral_care.as_deref(),
            ProtectedArea::Finance => self.finance.as_deref(),
            ProtectedArea::Admin => self.admin.as_deref(),
        }
    }
}

/// Proof that a session unlocked `area`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Capability {
    area: ProtectedArea,
}

impl Capability {
    #[must_use]
    pub fn area(&self) -> ProtectedArea {
        self.area
    }

    /// # Errors
    /// Returns [`RegistryError::AccessDenied`] when the token was issued for a
    /// different area.
    pub fn require(&self, area: ProtectedArea) -> Result<(), RegistryError> {
        if self.area == area {
            Ok(())
        } else {
            Err(RegistryError::AccessDenied(format!(
                "capability for {} cannot open {}",
                self.area.as_str(),
                area.as_str()
            )))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    unlocked: BTreeSet<ProtectedArea>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies `passphrase` against the credential configured for `area` and
    /// records the area as unlocked.
    ///
    /// # Errors
    /// Returns [`RegistryError::Configuration`] when no credential is configured
    /// for the area or the stored hash is malformed, and
    /// [`RegistryError::AccessDenied`] when the passphrase does not match.
    pub fn unlock(
        &mut self,
        area: ProtectedArea,
        passphrase: &str,
        credentials: &Credentials,
    ) -> Result<Capability, RegistryError> {
        let Some(stored_hash) = credentials.for_area(area) else {
            return Err(RegistryError::Configuration(format!(
                "no credential configured for {}",
                area.as_str()
            )));
        };

        if !verify_passphrase(passphrase, stored_hash)? {
            return Err(RegistryError::AccessDenied(format!(
                "incorrect passphrase for {}",
                area.as_str()
            )));
        }

        self.unlocked.insert(area);
        Ok(Capability { area })
    }

    /// Returns a capability for an area unlocked earlier in this session.
    ///
    /// # Errors
    /// Returns [`RegistryError::AccessDenied`] when the area is locked.
    pub fn capability(&self, area: ProtectedArea) -> Result<Capability, RegistryError> {
        if self.unlocked.contains(&area) {
            Ok(Capability { area })
        } else {
            Err(RegistryError::AccessDenied(format!(
                "{} is locked",
                area.as_str()
            )))
        }
    }

    #[must_use]
    pub fn is_unlocked(&self, area: ProtectedArea) -> bool {
        self.unlocked.contains(&area)
    }

    pub fn lock(&mut self, area: ProtectedArea) {
        self.unlocked.remove(&area);
    }
}

/// Hashes a passphrase with a fresh random salt.
///
/// # Errors
/// Returns [`RegistryError::Validation`] for an empty passphrase and
/// [`RegistryError::Configuration`] when hashing fails.
pub fn hash_passphrase(passphrase: &str) -> Result<String, RegistryError> {
    if passphrase.is_empty() {
        return Err(RegistryError::Validation(
            "passphrase MUST NOT be empty".to_string(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| RegistryError::Configuration(format!("failed to hash passphrase: {err}")))
}

/// # Errors
/// Returns [`RegistryError::Configuration`] when `stored_hash` is not a valid
/// PHC string.
pub fn verify_passphrase(passphrase: &str, stored_hash: &str) -> Result<bool, RegistryError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| RegistryError::Configuration(format!("invalid credential hash: {err}")))?;
    Ok(Argon2::default()
        .verify_password(passphrase.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn fixture_credentials() -> Credentials {
        Credentials {
            pastoral_care: Some(must_ok(hash_passphrase("shepherd"))),
            finance: Some(must_ok(hash_passphrase("ledger"))),
            admin: None,
        }
    }

    #[test]
    fn hashes_are_salted_and_verify() {
        let first = must_ok(hash_passphrase("ledger"));
        let second = must_ok(hash_passphrase("ledger"));
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2"));
        assert!(must_ok(verify_passphrase("ledger", &first)));
        assert!(must_ok(verify_passphrase("ledger", &second)));
        assert!(!must_ok(verify_passphrase("Ledger", &first)));
    }

    #[test]
    fn empty_passphrase_cannot_be_hashed() {
        assert!(matches!(
            hash_passphrase(""),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn malformed_hash_is_a_configuration_error() {
        assert!(matches!(
            verify_passphrase("ledger", "ledger"),
            Err(RegistryError::Configuration(_))
        ));
    }

    #[test]
    fn unlock_grants_only_the_requested_area() {
        let credentials = fixture_credentials();
        let mut session = Session::new();

        let capability = must_ok(session.unlock(ProtectedArea::Finance, "ledger", &credentials));
        assert_eq!(capability.area(), ProtectedArea::Finance);
        must_ok(capability.require(ProtectedArea::Finance));
        assert!(capability.require(ProtectedArea::Admin).is_err());

        assert!(session.is_unlocked(ProtectedArea::Finance));
        assert!(!session.is_unlocked(ProtectedArea::PastoralCare));
        assert!(matches!(
            session.capability(ProtectedArea::PastoralCare),
            Err(RegistryError::AccessDenied(_))
        ));
        assert_eq!(
            must_ok(session.capability(ProtectedArea::Finance)),
            capability
        );
    }

    #[test]
    fn wrong_passphrase_is_denied_and_leaves_area_locked() {
        let credentials = fixture_credentials();
        let mut session = Session::new();

        let result = session.unlock(ProtectedArea::PastoralCare, "ledger", &credentials);
        assert!(matches!(result, Err(RegistryError::AccessDenied(_))));
        assert!(!session.is_unlocked(ProtectedArea::PastoralCare));
    }

    #[test]
    fn unconfigured_area_cannot_be_unlocked() {
        let credentials = fixture_credentials();
        let mut session = Session::new();

        let result = session.unlock(ProtectedArea::Admin, "anything", &credentials);
        assert!(matches!(result, Err(RegistryError::Configuration(_))));
    }

    #[test]
    fn lock_revokes_future_capabilities() {
        let credentials = fixture_credentials();
        let mut session = Session::new();
        let _ = must_ok(session.unlock(ProtectedArea::PastoralCare, "shepherd", &credentials));

        session.lock(ProtectedArea::PastoralCare);
        assert!(session.capability(ProtectedArea::PastoralCare).is_err());
    }
}
