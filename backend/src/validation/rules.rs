//! Common validation rules shared across request payloads.

use validator::ValidationError;

/// Validates username format.
///
/// Requirements:
/// - Only alphanumeric characters, underscores, dots and dashes
/// - 1-50 characters in length
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() || username.len() > 50 {
        return Err(ValidationError::new("username_invalid_length"));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ValidationError::new("username_invalid_characters"));
    }

    Ok(())
}

/// Accepts only absolute http(s) URLs, the only ones a device ever blocks.
pub fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    navguard_policy::in_scope(url)
        .filter(|parsed| parsed.host_str().is_some())
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("url_not_http"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rejects_empty() {
        let result = validate_username("");
        assert!(result.is_err());
    }

    #[test]
    fn username_rejects_special_chars() {
        let result = validate_username("user@name");
        assert!(result.is_err());
    }

    #[test]
    fn username_accepts_valid() {
        let result = validate_username("valid_user.123");
        assert!(result.is_ok());
    }

    #[test]
    fn http_url_accepts_http_and_https() {
        assert!(validate_http_url("http://bad.com/x").is_ok());
        assert!(validate_http_url("https://good.com").is_ok());
    }

    #[test]
    fn http_url_rejects_other_schemes_and_garbage() {
        assert!(validate_http_url("ftp://files.example/").is_err());
        assert!(validate_http_url("not a url").is_err());
    }
}
