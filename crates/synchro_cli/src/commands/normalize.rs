//! Normalize command implementation.

use clap::ValueEnum;
use synchro_model::{normalize_email, normalize_name, normalize_phone};

/// Which identifier to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    /// Phone number.
    Phone,
    /// Email address.
    Email,
    /// Display name.
    Name,
}

/// The matching key for `value`, if it has one.
pub fn key(kind: KeyKind, value: &str) -> Option<String> {
    match kind {
        KeyKind::Phone => normalize_phone(value),
        KeyKind::Email => normalize_email(value),
        KeyKind::Name => normalize_name(value),
    }
}

/// Runs the normalize command.
pub fn run(kind: KeyKind, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    match key(kind, value) {
        Some(key) => {
            println!("{}", key);
            Ok(())
        }
        None => Err(format!("{:?} has no {:?} key", value, kind).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_per_kind() {
        assert_eq!(
            key(KeyKind::Phone, "+1 (555) 000-1111").as_deref(),
            Some("5550001111")
        );
        assert_eq!(
            key(KeyKind::Email, " Ben@X.com ").as_deref(),
            Some("ben@x.com")
        );
        assert!(key(KeyKind::Phone, "12-34").is_none());
        assert!(key(KeyKind::Name, "   ").is_none());
    }
}
