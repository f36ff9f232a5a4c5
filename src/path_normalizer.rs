//! Route template normalization.
//!
//! Declared paths arrive in several framework dialects (`/users/{id:\d+}`,
//! `users/:id`, `//users/`) and with composition pieces (version, controller
//! prefix). Everything that ends up as a key of `paths` goes through
//! [`normalize`] so the document only ever sees `/segment/{name}` form.

use crate::schema_generator::capitalize;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Segment meaning "use the controller's own computed prefix"; never documented.
pub const SELF_PATH_SENTINEL: &str = "_self_path";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}/]+)\}").unwrap());

/// Normalize a route template to document path syntax.
///
/// Idempotent: normalizing an already normalized path returns it unchanged.
///
/// ```
/// use openapi_from_metadata::path_normalizer::normalize;
///
/// assert_eq!(normalize(r"users//{id:\d+}/"), "/users/{id}");
/// assert_eq!(normalize("/users/{id}"), "/users/{id}");
/// ```
pub fn normalize(path: &str) -> String {
    let stripped = strip_patterns(path);
    let segments: Vec<String> = stripped
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != SELF_PATH_SENTINEL)
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{}}}", name),
            _ => segment.to_string(),
        })
        .collect();

    format!("/{}", segments.join("/"))
}

/// Compose version, controller prefix and method path into one normalized path.
///
/// The version is prepended exactly once, in front of the prefix, even when
/// the prefix itself starts with the same segment (`api` + `/api/orders` is
/// `/api/api/orders`). Prefix and path are joined with exactly one slash.
pub fn compose(version: Option<&str>, prefix: &str, path: &str) -> String {
    let version = version.map(|v| v.trim_matches('/')).unwrap_or_default();
    normalize(&format!("{}/{}/{}", version, prefix, path))
}

/// Identifier form of a normalized path, used in operationIds and model names.
///
/// Each segment is capitalised and a placeholder `{name}` becomes `ByName`,
/// so a literal segment never reads like a placeholder. `_`, `-` and `.` are
/// kept; any other character outside `[A-Za-z0-9]` becomes `_`.
///
/// ```
/// use openapi_from_metadata::path_normalizer::identifier;
///
/// assert_eq!(identifier("/users/{id}"), "UsersById");
/// assert_eq!(identifier("/users/id"), "UsersId");
/// assert_eq!(identifier("/user_list"), "User_list");
/// assert_eq!(identifier("/"), "");
/// ```
pub fn identifier(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let segment =
                PLACEHOLDER.replace_all(segment, |caps: &Captures| format!("By{}", capitalize(&caps[1])));
            let cleaned: String = segment
                .chars()
                .map(|c| match c {
                    'A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '-' | '.' => c,
                    _ => '_',
                })
                .collect();
            capitalize(&cleaned)
        })
        .collect()
}

/// Placeholder names of a normalized path, in order of appearance.
pub fn placeholders(path: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(path)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Reduce `{name:pattern}` to `{name}`.
///
/// Patterns may contain their own braces (`{id:\d{2,4}}`), so the scan tracks
/// brace depth instead of matching the first `}`.
fn strip_patterns(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    let mut in_pattern = false;

    for c in path.chars() {
        match c {
            '{' => {
                depth += 1;
                if depth == 1 {
                    in_pattern = false;
                    out.push(c);
                }
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    out.push(c);
                }
            }
            ':' if depth == 1 => in_pattern = true,
            _ if depth == 1 && !in_pattern => out.push(c),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_placeholder_is_reduced() {
        assert_eq!(normalize(r"/users/{id:\d+}"), "/users/{id}");
        assert_eq!(normalize(r"/items/{code:[a-z]{2,4}}/x"), "/items/{code}/x");
    }

    #[test]
    fn test_doubled_separators_and_leading_slash() {
        assert_eq!(normalize("users//{id}"), "/users/{id}");
        assert_eq!(normalize("users/"), "/users");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [r"/a/{b:\d+}//c/", "x/:id", "/api/_self_path", "/"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "path {}", raw);
        }
    }

    #[test]
    fn test_colon_placeholder() {
        assert_eq!(normalize("/users/:id/posts/:post_id"), "/users/{id}/posts/{post_id}");
    }

    #[test]
    fn test_sentinel_is_stripped() {
        assert_eq!(normalize("/api/users/_self_path"), "/api/users");
    }

    #[test]
    fn test_compose_prefix_and_path() {
        assert_eq!(compose(None, "/api/users/", "/{id}"), "/api/users/{id}");
        assert_eq!(compose(None, "api/users", "{id}"), "/api/users/{id}");
        assert_eq!(compose(None, "/api/users", ""), "/api/users");
        assert_eq!(compose(None, "", "/health"), "/health");
    }

    #[test]
    fn test_compose_prepends_version_once() {
        assert_eq!(compose(Some("v1"), "/users", "{id}"), "/v1/users/{id}");
        assert_eq!(compose(Some("/v1/"), "users/", "/{id}"), "/v1/users/{id}");
        assert_eq!(compose(Some(""), "/users", ""), "/users");
    }

    #[test]
    fn test_compose_keeps_version_matching_prefix() {
        assert_eq!(compose(Some("api"), "/api/orders", ""), "/api/api/orders");
    }

    #[test]
    fn test_identifier_keeps_placeholders_and_separators_apart() {
        assert_eq!(identifier("/users/{id}"), "UsersById");
        assert_eq!(identifier("/users/id"), "UsersId");
        assert_eq!(identifier("/user_list"), "User_list");
        assert_eq!(identifier("/user-list"), "User-list");
        assert_eq!(identifier("/users/{post_id}/files/v1.2"), "UsersByPost_idFilesV1.2");
        assert_eq!(identifier("/a~b"), "A_b");
    }

    #[test]
    fn test_placeholders_in_order() {
        assert_eq!(placeholders("/users/{id}/posts/{post_id}"), vec!["id", "post_id"]);
        assert!(placeholders("/users").is_empty());
    }
}
