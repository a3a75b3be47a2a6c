//! Identifier validation for SQL interpolation.
//!
//! DDL identifiers cannot be bound as parameters, so every table or column
//! name that ends up inside a statement must pass [`validate_identifier`]
//! first. Names are limited to letters, digits and underscores (Unicode
//! letters included, so `Atualização` is accepted) and may not start with a
//! digit.

use crate::{Result, error::TableKeeperError};
use regex::Regex;
use std::sync::OnceLock;

/// Longest identifier accepted by SQL Server (`sysname`).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"^[\p{L}_][\p{L}\p{N}_]*$").expect("identifier pattern is valid")
    })
}

/// Checks whether `name` is safe to interpolate into a SQL statement.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_IDENTIFIER_LENGTH
        && identifier_pattern().is_match(name)
}

/// Validates an identifier, naming what it identifies in the error.
///
/// # Errors
/// Returns a configuration error when the name is empty, too long, or
/// contains characters outside the accepted set.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(TableKeeperError::configuration(format!(
            "invalid {kind} name '{name}': only letters, digits and underscores are allowed \
             (max {MAX_IDENTIFIER_LENGTH} characters, not starting with a digit)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        assert!(is_valid_identifier("Chamados"));
        assert!(is_valid_identifier("AtualizacaoDeDados"));
        assert!(is_valid_identifier("_hidden"));
        assert!(is_valid_identifier("coluna_01"));
        assert!(is_valid_identifier("Atualização"));
    }

    #[test]
    fn test_rejects_injection_attempts() {
        assert!(!is_valid_identifier("Chamados; DROP TABLE Usuarios"));
        assert!(!is_valid_identifier("Chamados--"));
        assert!(!is_valid_identifier("[Chamados]"));
        assert!(!is_valid_identifier("\"Chamados\""));
        assert!(!is_valid_identifier("a b"));
        assert!(!is_valid_identifier("dbo.Chamados"));
    }

    #[test]
    fn test_rejects_empty_leading_digit_and_overlong() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1coluna"));
        assert!(!is_valid_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1)));
        assert!(is_valid_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)));
    }

    #[test]
    fn test_validate_identifier_names_kind() {
        let error = validate_identifier("table", "bad name").unwrap_err();
        assert!(error.to_string().contains("invalid table name 'bad name'"));
        assert!(validate_identifier("column", "Status").is_ok());
    }
}
