// Image reference parsing and destination tag derivation

use std::fmt;

use anyhow::{bail, Result};
use url::Url;

/// A parsed container image reference.
///
/// The `tag` field is the empty string when the source expression did not
/// specify one; callers treat that as "unspecified" and let the container
/// CLI apply its own default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub namespace: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(namespace: &str, repository: &str, tag: &str) -> Self {
        Self {
            registry: None,
            namespace: namespace.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }

}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        if !self.namespace.is_empty() {
            write!(f, "{}/", self.namespace)?;
        }
        write!(f, "{}", self.repository)?;
        if !self.tag.is_empty() {
            write!(f, ":{}", self.tag)?;
        }
        Ok(())
    }
}

/// Parse a Docker Hub style repository URL into (namespace, repository).
///
/// Two shapes are recognized:
/// - library images: `https://hub.docker.com/_/nginx` (namespace "library")
/// - namespaced images: `https://hub.docker.com/r/grafana/loki`
///
/// Trailing path segments such as `/tags` are ignored. Anything else is an
/// error; callers warn and skip the source rather than aborting the run.
pub fn parse_source_url(raw: &str) -> Result<(String, String)> {
    let url = Url::parse(raw)?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["_", repository, ..] => Ok(("library".to_string(), repository.to_string())),
        ["r", namespace, repository, ..] => {
            Ok((namespace.to_string(), repository.to_string()))
        }
        // A bare /r/<segment> path names a namespace, not a repository
        ["r", ..] => bail!("unrecognized repository URL shape: {}", raw),
        [namespace, repository, ..] => Ok((namespace.to_string(), repository.to_string())),
        _ => bail!("unrecognized repository URL shape: {}", raw),
    }
}

/// Parse a slash-delimited image expression into an [`ImageReference`].
///
/// With three segments the first (a registry-ish prefix) is ignored; with
/// two the first is the namespace; with one the namespace is empty. Any
/// `@digest` suffix is stripped before parsing, and the final segment is
/// split on `:` into repository and tag.
pub fn parse_image_expression(expr: &str) -> ImageReference {
    let expr = expr.split('@').next().unwrap_or(expr);
    let parts: Vec<&str> = expr.split('/').collect();

    let (namespace, name_and_tag) = match parts.as_slice() {
        [_, namespace, name] => (*namespace, *name),
        [namespace, name] => (*namespace, *name),
        _ => ("", *parts.last().unwrap_or(&"")),
    };

    let (repository, tag) = match name_and_tag.split_once(':') {
        Some((repository, tag)) => (repository, tag),
        None => (name_and_tag, ""),
    };

    ImageReference::new(namespace, repository, tag)
}

/// Replace every character outside `[A-Za-z0-9_.-]` with `_` so the result
/// is always a valid tag component.
pub fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Build the destination tag from its components, joined with `_` in the
/// order base tag, platform qualifier, namespace qualifier. Absent or empty
/// components are omitted entirely.
pub fn derive_destination_tag(
    base_tag: &str,
    platform_qualifier: Option<&str>,
    namespace_qualifier: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if !base_tag.is_empty() {
        parts.push(base_tag.to_string());
    }
    if let Some(platform) = platform_qualifier.filter(|p| !p.is_empty()) {
        parts.push(sanitize(&platform.replace('/', "_")));
    }
    if let Some(namespace) = namespace_qualifier.filter(|n| !n.is_empty()) {
        parts.push(sanitize(namespace));
    }
    parts.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_url_library_shape() {
        let (ns, repo) = parse_source_url("https://hub.docker.com/_/nginx/tags").unwrap();
        assert_eq!(ns, "library");
        assert_eq!(repo, "nginx");
    }

    #[test]
    fn test_parse_source_url_namespaced_shape() {
        let (ns, repo) = parse_source_url("https://hub.docker.com/r/grafana/loki").unwrap();
        assert_eq!(ns, "grafana");
        assert_eq!(repo, "loki");

        // Shape without the /r/ prefix is accepted too
        let (ns, repo) = parse_source_url("https://hub.docker.com/grafana/loki/tags").unwrap();
        assert_eq!(ns, "grafana");
        assert_eq!(repo, "loki");
    }

    #[test]
    fn test_parse_source_url_rejects_other_shapes() {
        assert!(parse_source_url("https://hub.docker.com/").is_err());
        assert!(parse_source_url("not a url").is_err());
        // /r/ followed by a single segment is a namespace page, not a repo
        assert!(parse_source_url("https://hub.docker.com/r/grafana").is_err());
    }

    #[test]
    fn test_parse_image_expression_segment_counts() {
        // Three segments: registry prefix ignored
        let r = parse_image_expression("docker.io/library/nginx:1.25");
        assert_eq!(r.namespace, "library");
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag, "1.25");

        // Two segments
        let r = parse_image_expression("grafana/loki:2.9");
        assert_eq!(r.namespace, "grafana");
        assert_eq!(r.repository, "loki");
        assert_eq!(r.tag, "2.9");

        // One segment: namespace empty
        let r = parse_image_expression("redis");
        assert_eq!(r.namespace, "");
        assert_eq!(r.repository, "redis");
        assert_eq!(r.tag, "");
    }

    #[test]
    fn test_parse_image_expression_strips_digest() {
        let r = parse_image_expression("nginx:1.25@sha256:deadbeef");
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag, "1.25");

        // Digest without a tag
        let r = parse_image_expression("nginx@sha256:deadbeef");
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag, "");
    }

    #[test]
    fn test_sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize("linux/arm64"), "linux_arm64");
        assert_eq!(sanitize("v1.2-rc_3"), "v1.2-rc_3");
        assert_eq!(sanitize("a b@c:d"), "a_b_c_d");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in ["linux/arm64", "weird tag!", "~/path", "ok-1.0_x"] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once);
            assert!(once
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')));
        }
    }

    #[test]
    fn test_derive_destination_tag_component_order() {
        assert_eq!(derive_destination_tag("v1", None, None), "v1");
        assert_eq!(
            derive_destination_tag("v1", Some("linux/arm64"), None),
            "v1_linux_arm64"
        );
        assert_eq!(
            derive_destination_tag("v1", Some("linux/arm64"), Some("org1")),
            "v1_linux_arm64_org1"
        );
        assert_eq!(derive_destination_tag("v1", None, Some("org2")), "v1_org2");
    }

    #[test]
    fn test_derive_destination_tag_omits_empty_components() {
        // No base tag: components that are present still join cleanly
        assert_eq!(
            derive_destination_tag("", Some("linux/amd64"), None),
            "linux_amd64"
        );
        assert_eq!(derive_destination_tag("", None, None), "");
        assert_eq!(derive_destination_tag("v1", Some(""), Some("")), "v1");
    }

    #[test]
    fn test_display_omits_empty_parts() {
        assert_eq!(ImageReference::new("", "redis", "").to_string(), "redis");
        assert_eq!(
            ImageReference::new("grafana", "loki", "2.9").to_string(),
            "grafana/loki:2.9"
        );
    }
}
