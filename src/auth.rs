use std::sync::atomic::{AtomicUsize, Ordering};

use http::header::AUTHORIZATION;

const KEY_QUERY_PARAM: &str = "key";
const BEARER_PREFIX: &str = "bearer ";

/// Round-robin selection across the comma-separated keys a caller supplies.
///
/// One counter is shared by every request; each request advances it once and
/// picks `counter % keys.len()` from its own list.
#[derive(Debug, Default)]
pub struct KeyRotator {
    next: AtomicUsize,
}

impl KeyRotator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick one key from a `k1,k2,k3` list. Empty entries are ignored.
    ///
    /// Returns `None` (without advancing) when the list holds no key.
    pub fn select<'a>(&self, keys: &'a str) -> Option<&'a str> {
        let count = split_keys(keys).count();
        if count == 0 {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % count;
        split_keys(keys).nth(index)
    }

    /// Authorization value for the upstream call.
    ///
    /// Uses the caller's `Authorization: Bearer` list when present, otherwise
    /// the `key` query parameter (empty when absent).
    #[must_use]
    pub fn upstream_authorization(
        &self,
        headers: &http::HeaderMap,
        query: Option<&str>,
    ) -> String {
        if let Some(list) = bearer_list(headers) {
            if let Some(key) = self.select(list) {
                return format!("Bearer {key}");
            }
        }
        format!("Bearer {}", query_key(query).unwrap_or_default())
    }
}

#[inline]
fn split_keys(keys: &str) -> impl Iterator<Item = &str> {
    keys.split(',').map(str::trim).filter(|key| !key.is_empty())
}

/// The auth scheme matches case-insensitively.
fn bearer_list(headers: &http::HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..BEARER_PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    value.get(BEARER_PREFIX.len()..)
}

fn query_key(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == KEY_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bearer(value: &str) -> http::HeaderMap {
        let mut headers = http::HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn test_select_rotates_round_robin() {
        let rotator = KeyRotator::new();
        let picks: Vec<_> = (0..4).map(|_| rotator.select("k1,k2,k3").unwrap()).collect();
        assert_eq!(picks, vec!["k1", "k2", "k3", "k1"]);
    }

    #[test]
    fn test_select_ignores_empty_entries() {
        let rotator = KeyRotator::new();
        assert_eq!(rotator.select(",a,, b ,"), Some("a"));
        assert_eq!(rotator.select(",a,, b ,"), Some("b"));
        assert_eq!(rotator.select(" , ,"), None);
    }

    #[test]
    fn test_single_key_is_stable() {
        let rotator = KeyRotator::new();
        for _ in 0..3 {
            assert_eq!(
                rotator.upstream_authorization(&bearer("Bearer only"), None),
                "Bearer only"
            );
        }
    }

    #[test]
    fn test_query_key_fallback() {
        let rotator = KeyRotator::new();
        let headers = http::HeaderMap::new();
        assert_eq!(
            rotator.upstream_authorization(&headers, Some("a=1&key=co%2Dkey")),
            "Bearer co-key"
        );
        assert_eq!(rotator.upstream_authorization(&headers, None), "Bearer ");
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let rotator = KeyRotator::new();
        assert_eq!(
            rotator.upstream_authorization(&bearer("bearer k1,k2"), None),
            "Bearer k1"
        );
        assert_eq!(
            rotator.upstream_authorization(&bearer("BEARER k1,k2"), None),
            "Bearer k2"
        );
    }

    #[test]
    fn test_non_bearer_header_uses_query() {
        let rotator = KeyRotator::new();
        assert_eq!(
            rotator.upstream_authorization(&bearer("Basic abc"), Some("key=q")),
            "Bearer q"
        );
    }
}
