//! Client-side form validation. These checks run before any request is
//! built; a failure here never reaches the network layer.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationFailure;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").expect("email regex")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub fn validate_login(username: &str, password: &str) -> Result<(), ValidationFailure> {
    if username.trim().is_empty() {
        return Err(ValidationFailure::BlankUsername);
    }
    if password.is_empty() {
        return Err(ValidationFailure::BlankPassword);
    }
    Ok(())
}

pub fn validate_registration(
    username: &str,
    password: &str,
    password_confirm: &str,
    email: &str,
) -> Result<(), ValidationFailure> {
    if username.trim().is_empty() {
        return Err(ValidationFailure::BlankUsername);
    }
    if password.is_empty() {
        return Err(ValidationFailure::BlankPassword);
    }
    if password != password_confirm {
        return Err(ValidationFailure::PasswordMismatch);
    }
    if !is_valid_email(email) {
        return Err(ValidationFailure::InvalidEmail);
    }
    Ok(())
}

pub fn validate_reset(username_or_email: &str) -> Result<(), ValidationFailure> {
    if username_or_email.trim().is_empty() {
        return Err(ValidationFailure::BlankUsernameOrEmail);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user@example.com", true)]
    #[case("first.last@sub.example.org", true)]
    #[case("a_b-c@host.io", true)]
    #[case("no-at-sign", false)]
    #[case("user@", false)]
    #[case("@example.com", false)]
    #[case("user@example", false)]
    fn email_shapes(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid, "{email}");
    }

    #[test]
    fn login_requires_both_fields() {
        assert_eq!(
            validate_login("  ", "pw"),
            Err(ValidationFailure::BlankUsername)
        );
        assert_eq!(
            validate_login("alice", ""),
            Err(ValidationFailure::BlankPassword)
        );
        assert_eq!(validate_login("alice", "pw"), Ok(()));
    }

    #[test]
    fn registration_checks_confirmation_then_email() {
        assert_eq!(
            validate_registration("alice", "pw", "other", "a@b.io"),
            Err(ValidationFailure::PasswordMismatch)
        );
        assert_eq!(
            validate_registration("alice", "pw", "pw", "not-an-email"),
            Err(ValidationFailure::InvalidEmail)
        );
        assert_eq!(
            validate_registration("alice", "pw", "pw", "a@b.io"),
            Ok(())
        );
    }

    #[test]
    fn reset_requires_identifier() {
        assert_eq!(
            validate_reset(""),
            Err(ValidationFailure::BlankUsernameOrEmail)
        );
        assert_eq!(validate_reset("alice"), Ok(()));
    }
}
