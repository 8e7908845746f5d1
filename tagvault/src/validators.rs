use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

static NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("namespace regex is valid")
});

/// Returns `true` if the provided string is a plain field identifier.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

/// Returns `true` if the provided string is a dotted module path such as `blog.posts`.
pub fn is_valid_namespace(value: &str) -> bool {
    NAMESPACE.is_match(value)
}

/// Returns `true` if the provided string is usable as an opaque type handle.
pub fn is_valid_type_id(value: &str) -> bool {
    !value.trim().is_empty() && !value.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("tags"));
        assert!(is_valid_identifier("_private2"));
        assert!(!is_valid_identifier("2tags"));
        assert!(!is_valid_identifier("my-tags"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn namespace_validation() {
        assert!(is_valid_namespace("blog"));
        assert!(is_valid_namespace("shop.catalog"));
        assert!(!is_valid_namespace("shop..catalog"));
        assert!(!is_valid_namespace(".blog"));
    }

    #[test]
    fn patterns_compile_and_accept_the_simple_case() {
        assert!(IDENTIFIER.is_match("a"));
        assert!(NAMESPACE.is_match("a.b"));
    }

    #[test]
    fn type_id_validation() {
        assert!(is_valid_type_id("ct-42"));
        assert!(!is_valid_type_id("  "));
        assert!(!is_valid_type_id("a b"));
    }
}
