/// Password hashing and verification.
///
/// bcrypt with a tunable cost factor. The 72-byte bcrypt input limit is
/// enforced before hashing; anything longer is rejected instead of being
/// silently truncated.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, StoreError, ValidationError};

pub const MIN_PASSWORD_CHARS: usize = 8;
/// bcrypt ignores input beyond 72 bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Rejects passwords the bcrypt family cannot fully consume. Callers that
/// verify (rather than hash) run this check themselves before calling in.
pub fn check_max_length(password: &str) -> Result<(), ValidationError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_BYTES));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    /// `cost` is the bcrypt work factor (4..=31). Tests use a low cost;
    /// production uses the bcrypt default.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a password for storage. Enforces the registration length policy
    /// before doing any CPU-expensive work.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ValidationError::TooShort("password", MIN_PASSWORD_CHARS).into());
        }
        check_max_length(password)?;

        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash. Returns false on mismatch;
    /// only a malformed stored hash is an error.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AppError> {
        verify(password, stored_hash).map_err(|e| {
            AppError::Store(StoreError::CorruptRecord(format!("password hash: {}", e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn hasher() -> PasswordHasher {
        // minimum bcrypt cost, to keep the tests fast
        PasswordHasher::new(4)
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hashed = hasher().hash("correct123").unwrap();

        assert_ne!(hashed, "correct123");
        assert!(hashed.starts_with("$2"));
        assert!(hasher().verify("correct123", &hashed).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hashed = hasher().hash("correct123").unwrap();
        assert!(!hasher().verify("incorrect123", &hashed).unwrap());
    }

    #[test]
    fn rejects_short_password() {
        assert!(hasher().hash("short12").is_err());
    }

    #[test]
    fn max_length_boundary() {
        let at_limit = "a".repeat(MAX_PASSWORD_BYTES);
        let over_limit = "a".repeat(MAX_PASSWORD_BYTES + 1);

        assert!(hasher().hash(&at_limit).is_ok());

        match hasher().hash(&over_limit) {
            Err(AppError::Validation(ValidationError::TooLong("password", 72))) => (),
            other => panic!("expected TooLong, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn max_length_counts_bytes_not_chars() {
        // 25 three-byte characters: 25 chars, 75 bytes
        let multibyte = "가".repeat(25);
        assert!(check_max_length(&multibyte).is_err());
    }

    #[test]
    fn malformed_stored_hash_is_corrupt_record() {
        match hasher().verify("whatever123", "not-a-bcrypt-hash") {
            Err(AppError::Store(StoreError::CorruptRecord(_))) => (),
            other => panic!("expected CorruptRecord, got {:?}", other),
        }
    }
}
