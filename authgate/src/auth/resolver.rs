//! Identifier classification and validation.
//!
//! A login identifier is a single opaque string; classification decides which
//! columns to try, in order, when resolving it to an account. An identifier
//! shaped like an email is tried as an email first, one shaped like a mobile
//! number as a mobile first, and name is always the final fallback.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::Error;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex"));

// Mainland mobile numbers: 11 digits, 13x-19x prefixes
static MOBILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").expect("mobile regex"));

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w{5,20}$").expect("name regex"));

/// Which credential column an identifier may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Email,
    Mobile,
    Name,
}

/// Ordered lookup candidates for an identifier.
///
/// Name is always last so that a user named like someone else's email can
/// never shadow that email.
pub fn classify(identifier: &str) -> Vec<IdentifierKind> {
    let mut kinds = Vec::with_capacity(2);
    if EMAIL_RE.is_match(identifier) {
        kinds.push(IdentifierKind::Email);
    } else if MOBILE_RE.is_match(identifier) {
        kinds.push(IdentifierKind::Mobile);
    }
    kinds.push(IdentifierKind::Name);
    kinds
}

/// Validate a registration name: 5-20 word characters, not purely numeric.
///
/// Purely numeric names are reserved for identity placeholders and would
/// collide with the mobile namespace.
pub fn check_name(name: &str) -> Result<(), Error> {
    if !NAME_RE.is_match(name) || name.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Argument {
            message: "Invalid name".to_string(),
        });
    }
    Ok(())
}

pub fn check_email(email: &str) -> Result<(), Error> {
    if !EMAIL_RE.is_match(email) {
        return Err(Error::Argument {
            message: "Invalid email".to_string(),
        });
    }
    Ok(())
}

pub fn check_mobile(mobile: &str) -> Result<(), Error> {
    if !MOBILE_RE.is_match(mobile) {
        return Err(Error::Argument {
            message: "Invalid mobile number".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_email_first() {
        assert_eq!(classify("user@example.com"), vec![IdentifierKind::Email, IdentifierKind::Name]);
    }

    #[test]
    fn test_classify_mobile_first() {
        assert_eq!(classify("13812345678"), vec![IdentifierKind::Mobile, IdentifierKind::Name]);
    }

    #[test]
    fn test_classify_plain_name() {
        assert_eq!(classify("zhangsan"), vec![IdentifierKind::Name]);
        // 12 digits is not a valid mobile, falls through to name only
        assert_eq!(classify("138123456789"), vec![IdentifierKind::Name]);
    }

    #[test]
    fn test_name_rules() {
        assert!(check_name("zhangsan").is_ok());
        assert!(check_name("user_01").is_ok());
        assert!(check_name("abcd").is_err()); // too short
        assert!(check_name(&"a".repeat(21)).is_err()); // too long
        assert!(check_name("12345678").is_err()); // purely numeric
        assert!(check_name("bad name").is_err()); // whitespace
    }

    #[test]
    fn test_mobile_rules() {
        assert!(check_mobile("13812345678").is_ok());
        assert!(check_mobile("19912345678").is_ok());
        assert!(check_mobile("12812345678").is_err()); // 12x prefix
        assert!(check_mobile("1381234567").is_err()); // 10 digits
        assert!(check_mobile("138123456789").is_err()); // 12 digits
    }

    #[test]
    fn test_email_rules() {
        assert!(check_email("a@b.co").is_ok());
        assert!(check_email("first.last+tag@sub.example.com").is_ok());
        assert!(check_email("not-an-email").is_err());
        assert!(check_email("a@b").is_err());
    }
}
