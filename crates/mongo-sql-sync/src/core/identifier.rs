//! Identifier derivation, validation and quoting.
//!
//! Document field names are free-form, so every table and column name is
//! derived through [`sanitize`] before it reaches SQL text. Dialects then quote
//! the result with their closing quote character doubled.
//!
//! SQL identifiers cannot be bound as statement parameters, so this module is
//! the only guard between document keys and generated SQL.

use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};

/// Maximum identifier length accepted by both MySQL and SQL Server.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Number of hex characters of the name hash appended to shortened identifiers.
const HASH_SUFFIX_LEN: usize = 8;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than [`MAX_IDENTIFIER_LENGTH`] characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(SyncError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let len = name.chars().count();
    if len > MAX_IDENTIFIER_LENGTH {
        return Err(SyncError::Config(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, len, name
        )));
    }

    Ok(())
}

/// Turn a document path segment (or a composed name) into a safe identifier.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`. Names longer than the
/// identifier limit are shortened and suffixed with a hash of the full name so
/// distinct long names stay distinct.
pub fn sanitize(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        cleaned.push('_');
    }

    if cleaned.len() <= MAX_IDENTIFIER_LENGTH {
        return cleaned;
    }

    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    let keep = MAX_IDENTIFIER_LENGTH - HASH_SUFFIX_LEN - 1;
    format!("{}_{}", &cleaned[..keep], &digest[..HASH_SUFFIX_LEN])
}

/// Column name for a document field path relative to its table.
///
/// Nested segments are joined with `_` and array markers are dropped, so
/// `address.city` becomes `address_city`.
pub fn column_name(path: &str) -> String {
    sanitize(&path.replace("[]", "").replace('.', "_"))
}

/// Name of a child or junction table derived from `path` under `main`.
pub fn child_table_name(main: &str, path: &str) -> String {
    sanitize(&format!("{}_{}", main, path.replace("[]", "").replace('.', "_")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_valid() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("_id").is_ok());
        assert!(validate_identifier("orders_items").is_ok());
    }

    #[test]
    fn test_validate_identifier_empty() {
        let err = validate_identifier("").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_null_byte() {
        let err = validate_identifier("user\0s").unwrap_err();
        assert!(err.to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_too_long() {
        let name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&name).is_err());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize("first name"), "first_name");
        assert_eq!(sanitize("price-$"), "price__");
        assert_eq!(sanitize("_id"), "_id");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn test_sanitize_shortens_long_names_distinctly() {
        let a = format!("{}a", "x".repeat(80));
        let b = format!("{}b", "x".repeat(80));
        let sa = sanitize(&a);
        let sb = sanitize(&b);
        assert_eq!(sa.len(), MAX_IDENTIFIER_LENGTH);
        assert_ne!(sa, sb);
        assert!(validate_identifier(&sa).is_ok());
    }

    #[test]
    fn test_column_name_from_paths() {
        assert_eq!(column_name("age"), "age");
        assert_eq!(column_name("geo.lat"), "geo_lat");
        assert_eq!(column_name("tags[]"), "tags");
    }

    #[test]
    fn test_child_table_name() {
        assert_eq!(child_table_name("users", "address"), "users_address");
        assert_eq!(child_table_name("orders", "items[]"), "orders_items");
        assert_eq!(child_table_name("users", "profile.tags[]"), "users_profile_tags");
    }
}
