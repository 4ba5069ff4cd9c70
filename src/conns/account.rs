//! Allowed / forbidden account checks.

use crate::conns::ConnsError;

/// Check the caller's account against the configured lists.
///
/// The forbidden list is checked first. An empty allow list allows every
/// account; a non-empty one must contain `account_id`.
pub fn validate_account_id(
    account_id: &str,
    allowed: &[String],
    forbidden: &[String],
) -> Result<(), ConnsError> {
    if forbidden.iter().any(|id| id == account_id) {
        return Err(ConnsError::ForbiddenAccount(account_id.to_string()));
    }
    if !allowed.is_empty() && !allowed.iter().any(|id| id == account_id) {
        return Err(ConnsError::AccountNotAllowed(account_id.to_string()));
    }
    Ok(())
}

/// Whether `id` looks like an AWS account ID (12 digits).
pub fn is_account_id(id: &str) -> bool {
    id.len() == 12 && id.bytes().all(|b| b.is_ascii_digit())
}
