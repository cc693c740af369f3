//! Vault secret references.
//!
//! A reference has the form `op://<vault>/<item>[/<section>]/<field>`,
//! optionally followed by `?attribute=<name>`.

use thiserror::Error;

/// Prefix of every vault reference.
pub const PREFIX: &str = "op://";

/// A reference string that is not a usable vault reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid vault reference \"{reference}\": {reason}")]
pub struct InvalidVaultRef {
    /// The rejected reference.
    pub reference: String,
    /// Why it was rejected.
    pub reason: String,
}

/// A parsed vault reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRef {
    raw: String,
    /// Vault name or id.
    pub vault: String,
    /// Item name or id.
    pub item: String,
    /// Section, when the reference has four path parts.
    pub section: Option<String>,
    /// Field name.
    pub field: String,
    /// Optional field attribute (`otp`, `type`, ...).
    pub attribute: Option<String>,
}

impl VaultRef {
    /// Parses a reference.
    ///
    /// Names may contain spaces and any character other than `/` and `?`;
    /// percent escapes are decoded, `+` is kept literally.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference does not start with `op://` or the
    /// path does not name a vault, an item and a field.
    pub fn parse(reference: &str) -> Result<Self, InvalidVaultRef> {
        let invalid = |reason: &str| InvalidVaultRef {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let rest = reference
            .strip_prefix(PREFIX)
            .ok_or_else(|| invalid("must start with op://"))?;
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let parts = path
            .split('/')
            .map(decode)
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| invalid("invalid percent escape"))?;
        if parts.iter().any(String::is_empty) {
            return Err(invalid("vault, item, section and field must not be empty"));
        }

        let (vault, item, section, field) = match parts.as_slice() {
            [vault, item, field] => (vault.clone(), item.clone(), None, field.clone()),
            [vault, item, section, field] => {
                (vault.clone(), item.clone(), Some(section.clone()), field.clone())
            }
            _ => return Err(invalid("expected op://vault/item[/section]/field")),
        };

        let mut attribute = None;
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if let Some(value) = pair.strip_prefix("attribute=") {
                attribute = Some(decode(value).ok_or_else(|| invalid("invalid percent escape"))?);
            }
        }

        Ok(Self {
            raw: reference.to_string(),
            vault,
            item,
            section,
            field,
            attribute,
        })
    }

    /// Returns the reference exactly as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for VaultRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn decode(segment: &str) -> Option<String> {
    urlencoding::decode(segment).ok().map(std::borrow::Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_field() {
        let r = VaultRef::parse("op://Private/github/token").expect("valid reference");
        assert_eq!(r.vault, "Private");
        assert_eq!(r.item, "github");
        assert_eq!(r.section, None);
        assert_eq!(r.field, "token");
        assert_eq!(r.attribute, None);
        assert_eq!(r.to_string(), "op://Private/github/token");
    }

    #[test]
    fn test_parse_section_and_attribute() {
        let r = VaultRef::parse("op://dev/db/admin/password?attribute=type")
            .expect("valid reference");
        assert_eq!(r.item, "db");
        assert_eq!(r.section.as_deref(), Some("admin"));
        assert_eq!(r.field, "password");
        assert_eq!(r.attribute.as_deref(), Some("type"));
    }

    #[test]
    fn test_parse_percent_encoded_item() {
        let r = VaultRef::parse("op://dev/my%20item/field").expect("valid reference");
        assert_eq!(r.item, "my item");
    }

    #[test]
    fn test_vault_name_with_space() {
        let r = VaultRef::parse("op://Shared Vault/db/password").expect("valid reference");
        assert_eq!(r.vault, "Shared Vault");
        assert_eq!(r.item, "db");
        assert_eq!(r.field, "password");
    }

    #[test]
    fn test_plus_is_kept_literally() {
        let r = VaultRef::parse("op://dev/C++ key/field").expect("valid reference");
        assert_eq!(r.item, "C++ key");

        let r = VaultRef::parse("op://dev/a%2Bb/field").expect("valid reference");
        assert_eq!(r.item, "a+b");
    }

    #[test]
    fn test_rejects_other_schemes_and_shapes() {
        assert!(VaultRef::parse("https://vault/item/field").is_err());
        assert!(VaultRef::parse("op://vault/item").is_err());
        assert!(VaultRef::parse("op://vault/a/b/c/d").is_err());
        assert!(VaultRef::parse("not a uri").is_err());
        assert!(VaultRef::parse("op:///item/field").is_err());
        assert!(VaultRef::parse("op://vault//field").is_err());
        assert!(VaultRef::parse("op://vault/item/%ZZ").is_err());
    }
}
