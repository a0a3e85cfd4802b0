use url::Url;

/// Derives a pattern covering the whole host of `url`, e.g.
/// `https://www.news.example/a?b` becomes `www.news.example/*`. The host is
/// kept as-is so the suggestion always matches the URL it came from.
pub fn suggest_pattern(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(format!("{}/*", host))
}
