//! Request validation for `AnalyzeRequest`: length and charset bounds that
//! double as an SSRF guard on the url built from `owner`/`repo`.

use crate::error::{OrchestratorError, OrchestratorResult};

const MAX_OWNER_LEN: usize = 39;
const MAX_REPO_LEN: usize = 100;

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn validate_field(value: &str, field: &str, max_len: usize) -> OrchestratorResult<()> {
    if value.is_empty() {
        return Err(OrchestratorError::InvalidInput {
            message: format!("{field} must not be empty"),
        });
    }
    if value.chars().count() > max_len {
        return Err(OrchestratorError::InvalidInput {
            message: format!("{field} exceeds {max_len} characters"),
        });
    }
    if !value.chars().all(is_allowed_char) {
        return Err(OrchestratorError::InvalidInput {
            message: format!("{field} may only contain letters, digits, '.', '_', '-'"),
        });
    }
    Ok(())
}

/// Validate `owner` and `repo` against the charset/length bounds that keep
/// the cloned url from smuggling a scheme, host, or credentials.
pub fn validate_owner_repo(owner: &str, repo: &str) -> OrchestratorResult<()> {
    validate_field(owner, "owner", MAX_OWNER_LEN)?;
    validate_field(repo, "repo", MAX_REPO_LEN)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_typical_owner_repo() {
        assert!(validate_owner_repo("rails", "rails").is_ok());
        assert!(validate_owner_repo("my-org", "my_repo.rb").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(validate_owner_repo("", "repo").is_err());
        assert!(validate_owner_repo("owner", "").is_err());
    }

    #[test]
    fn test_rejects_ssrf_guarded_characters() {
        for bad in ["evil.com/repo", "owner:9999", "owner@host", "owner#frag", "owner?query"] {
            assert!(validate_owner_repo(bad, "repo").is_err(), "expected {bad} to be rejected");
        }
    }

    #[test]
    fn test_rejects_over_length() {
        let long_owner = "a".repeat(40);
        assert!(validate_owner_repo(&long_owner, "repo").is_err());
        let long_repo = "a".repeat(101);
        assert!(validate_owner_repo("owner", &long_repo).is_err());
    }
}
