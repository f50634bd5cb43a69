use http::Uri;

/// Derives a resource identifier from an arbitrary scope string.
///
/// If the scope parses as a URI with a scheme, the path and query are
/// dropped and `scheme://authority` is returned; otherwise the scope is
/// returned unchanged. This is a reasonable-effort heuristic, not a
/// correctness guarantee: callers must not assume the result is a valid
/// resource identifier for every possible input.
pub fn scope_to_resource(scope: &str) -> String {
    if let Ok(uri) = scope.parse::<Uri>() {
        if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
            return format!("{scheme}://{authority}");
        }
    }
    scope.to_owned()
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::scope_to_resource;

    #[rstest]
    #[case("https://graph.microsoft.com/.default", "https://graph.microsoft.com")]
    #[case(
        "https://vault.azure.net/user_impersonation",
        "https://vault.azure.net"
    )]
    #[case("https://management.azure.com", "https://management.azure.com")]
    #[case("opaque-resource-string", "opaque-resource-string")]
    #[case("", "")]
    fn scope_resolution(#[case] scope: &str, #[case] expected: &str) {
        assert_eq!(scope_to_resource(scope), expected);
    }
}
