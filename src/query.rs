//! Query parameter merging.
//!
//! Resolves the effective query string for one request from its own parameters
//! and an optional global parameter set. A key defined on the request always
//! wins; a global key applies only when the request does not define it. This
//! runs once per request, before its first transmission; the resolved URL is
//! what retries resend, so merging is never reapplied.

use std::collections::HashMap;
use url::form_urlencoded;

/// Merge per-request and global query parameters into the request URL.
///
/// Returns the URL unmodified when neither source yields a parameter. Keys are
/// emitted in sorted order so the resulting URL is deterministic.
pub(crate) fn merge_query_params(
    url: &str,
    own: Option<&HashMap<String, String>>,
    global: Option<&HashMap<String, String>>,
) -> String {
    let mut pairs: Vec<(&str, &str)> = Vec::new();

    if let Some(own) = own {
        pairs.extend(own.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    if let Some(global) = global {
        for (k, v) in global {
            let defined = own.map(|o| o.contains_key(k)).unwrap_or(false);
            if !defined {
                pairs.push((k.as_str(), v.as_str()));
            }
        }
    }

    if pairs.is_empty() {
        return url.to_string();
    }
    pairs.sort_unstable();

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    let query = serializer.finish();

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn request_params_win_over_global() {
        let own = params(&[("$select", "id")]);
        let global = params(&[("$select", "displayName")]);
        let url = merge_query_params("/users", Some(&own), Some(&global));
        assert_eq!(url, "/users?%24select=id");
    }

    #[test]
    fn global_fills_missing_keys() {
        let own = params(&[("$top", "5")]);
        let global = params(&[("$select", "id")]);
        let url = merge_query_params("/users", Some(&own), Some(&global));
        assert_eq!(url, "/users?%24select=id&%24top=5");
    }

    #[test]
    fn appends_with_ampersand_when_url_has_query() {
        let global = params(&[("$count", "true")]);
        let url = merge_query_params("/users?$filter=x", None, Some(&global));
        assert_eq!(url, "/users?$filter=x&%24count=true");
    }

    #[test]
    fn no_params_leaves_url_untouched() {
        assert_eq!(merge_query_params("/users", None, None), "/users");
        let empty = HashMap::new();
        assert_eq!(
            merge_query_params("/users", Some(&empty), Some(&empty)),
            "/users"
        );
    }

    #[test]
    fn values_are_percent_encoded() {
        let own = params(&[("$filter", "startsWith(displayName,'a b')")]);
        let url = merge_query_params("/users", Some(&own), None);
        assert_eq!(
            url,
            "/users?%24filter=startsWith%28displayName%2C%27a+b%27%29"
        );
    }
}
