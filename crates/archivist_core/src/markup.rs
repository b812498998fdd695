/// Drops a leading `http://`/`https://` and `www.` so two spellings of the
/// same address compare equal.
pub fn strip_url_scheme(url: &str) -> &str {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme)
}

/// Cuts a `?page=N...` suffix so the address points at the first page.
pub fn clean_page_url(url: &str) -> &str {
    let mut search_from = 0;
    while let Some(found) = url[search_from..].find("?page=") {
        let start = search_from + found;
        let digits = &url[start + "?page=".len()..];
        if digits.starts_with(|c: char| c.is_ascii_digit()) {
            return &url[..start];
        }
        search_from = start + 1;
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_and_www_are_stripped() {
        assert_eq!(
            strip_url_scheme("https://www.forum.example/messenger"),
            "forum.example/messenger"
        );
        assert_eq!(strip_url_scheme("http://forum.example"), "forum.example");
        assert_eq!(strip_url_scheme("forum.example"), "forum.example");
    }

    #[test]
    fn page_query_is_cut() {
        assert_eq!(
            clean_page_url("https://f.example/messenger/12-chat/?page=3&sort=asc"),
            "https://f.example/messenger/12-chat/"
        );
        assert_eq!(
            clean_page_url("https://f.example/messenger/12-chat/?page=x"),
            "https://f.example/messenger/12-chat/?page=x"
        );
    }
}
