use chrono::Duration;

pub const SESSION_COOKIE_NAME: &str = "session";
pub const SESSION_COOKIE_PATH: &str = "/";

#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub secure: bool,
}

pub fn build_session_cookie(value: &str, max_age: Duration, options: CookieOptions) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE_NAME,
        value,
        SESSION_COOKIE_PATH,
        max_age.num_seconds().max(0)
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn build_clear_cookie(options: CookieOptions) -> String {
    let mut cookie = format!(
        "{}=; Path={}; Max-Age=0; HttpOnly; SameSite=Lax",
        SESSION_COOKIE_NAME, SESSION_COOKIE_PATH
    );
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn extract_cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key.trim() == name {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_includes_security_attributes() {
        let cookie = build_session_cookie(
            "abc",
            Duration::hours(24),
            CookieOptions { secure: true },
        );
        assert!(cookie.starts_with("session=abc"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn clear_cookie_sets_max_age_zero() {
        let cookie = build_clear_cookie(CookieOptions { secure: false });
        assert!(cookie.contains("session=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn extract_cookie_value_finds_matching_name() {
        let header = "a=1; session=token-value; b=2";
        assert_eq!(
            extract_cookie_value(header, SESSION_COOKIE_NAME).as_deref(),
            Some("token-value")
        );
        assert!(extract_cookie_value(header, "missing").is_none());
    }
}
