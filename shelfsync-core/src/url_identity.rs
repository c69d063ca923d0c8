// URL identity: the comparable key used for products and categories
use url::Url;

/// Fragments that mark pagination, sorting or filtering rather than a real
/// sub-category. Matched against the lower-cased normalized URL.
const LISTING_CONTROL_FRAGMENTS: &[&str] = &[
    "/page/", "/p/", "/filter/", "/sort/", "page-", "sort-", "filter-",
];

/// Canonicalize `url` into its identity key.
///
/// Relative references are resolved against `base`. Query and fragment are
/// dropped, as are trailing slashes. Host case is folded by the parser.
/// Returns `None` for blank input, unresolvable references, and URLs
/// without a host.
pub fn normalize(url: &str, base: &str) -> Option<String> {
    let raw = url.trim();
    if raw.is_empty() {
        return None;
    }

    let mut parsed = match Url::parse(raw) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(base.trim()).ok()?;
            base.join(raw).ok()?
        }
        Err(_) => return None,
    };

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }

    parsed.set_query(None);
    parsed.set_fragment(None);

    let key = parsed.as_str().trim_end_matches('/');
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Normalize an already absolute URL, using itself as the base.
pub fn normalize_absolute(url: &str) -> Option<String> {
    normalize(url, url)
}

/// Whether two URLs share an identity once both are normalized against `base`.
pub fn same_identity(a: &str, b: &str, base: &str) -> bool {
    match (normalize(a, base), normalize(b, base)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Pagination, sort and filter links that show up in category candidate lists.
pub fn looks_like_listing_control(url: &str) -> bool {
    let lowered = url.to_lowercase();
    LISTING_CONTROL_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// Host with any leading `www.` removed.
pub fn bare_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

pub fn same_site(a: &str, b: &str) -> bool {
    match (bare_host(a), bare_host(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// The URL path as a slug: `/catalog/phones/` becomes `catalog-phones`.
pub fn path_slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let slug = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { None } else { Some(slug) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://shop.example/catalog/phones";

    #[test]
    fn test_blank_is_none() {
        assert_eq!(normalize("", BASE), None);
        assert_eq!(normalize("   ", BASE), None);
    }

    #[test]
    fn test_absolute_path_uses_base_host() {
        assert_eq!(
            normalize("/p/1", BASE).as_deref(),
            Some("https://shop.example/p/1")
        );
    }

    #[test]
    fn test_relative_path_is_joined() {
        assert_eq!(
            normalize("android/", BASE).as_deref(),
            Some("https://shop.example/catalog/android")
        );
        assert_eq!(
            normalize("android", "https://shop.example/catalog/phones/").as_deref(),
            Some("https://shop.example/catalog/phones/android")
        );
    }

    #[test]
    fn test_query_fragment_and_trailing_slash_stripped() {
        assert_eq!(
            normalize("https://shop.example/p/2/?ref=ads#reviews", BASE).as_deref(),
            Some("https://shop.example/p/2")
        );
        assert_eq!(
            normalize("https://shop.example/", BASE).as_deref(),
            Some("https://shop.example")
        );
    }

    #[test]
    fn test_host_case_folded_path_case_kept() {
        assert_eq!(
            normalize("HTTPS://Shop.EXAMPLE/P/Phone", BASE).as_deref(),
            Some("https://shop.example/P/Phone")
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "/p/1",
            "p/2?x=1",
            "https://shop.example/a//",
            "HTTPS://WWW.Shop.Example:443/x/#top",
            "../up/one",
            "https://shop.example/with%20space/",
        ];
        for input in inputs {
            let once = normalize(input, BASE).unwrap();
            let twice = normalize(&once, BASE).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_unusable_urls() {
        assert_eq!(normalize("mailto:sales@shop.example", BASE), None);
        assert_eq!(normalize("javascript:void(0)", BASE), None);
        assert_eq!(normalize("relative/only", "not a base"), None);
    }

    #[test]
    fn test_same_identity() {
        assert!(same_identity("/p/2", "https://shop.example/p/2?ref=ads", BASE));
        assert!(!same_identity("/p/2", "/p/3", BASE));
        assert!(!same_identity("", "", BASE));
    }

    #[test]
    fn test_listing_control_heuristics() {
        assert!(looks_like_listing_control("https://shop.example/phones/page/2"));
        assert!(looks_like_listing_control("https://shop.example/phones/Sort-price"));
        assert!(looks_like_listing_control("https://shop.example/phones/filter-brand"));
        assert!(!looks_like_listing_control("https://shop.example/phones/android"));
    }

    #[test]
    fn test_site_and_slug_helpers() {
        assert!(same_site("https://www.shop.example/a", "https://shop.example"));
        assert!(!same_site("https://other.example/a", "https://shop.example"));
        assert_eq!(
            path_slug("https://shop.example/catalog/phones/").as_deref(),
            Some("catalog-phones")
        );
        assert_eq!(path_slug("https://shop.example/"), None);
    }
}
