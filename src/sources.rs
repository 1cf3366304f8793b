// Source list handling: image expression files, repository URLs, and the
// run-scoped duplicate name index

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::reference::{parse_image_expression, parse_source_url, ImageReference};

/// One configured mirror source.
#[derive(Debug, Clone)]
pub enum MirrorSource {
    /// A single explicit image expression, optionally pinned to a platform.
    Pinned {
        reference: ImageReference,
        platform: Option<String>,
    },
    /// A repository whose recent tags are discovered at run time.
    TagListing {
        namespace: String,
        repository: String,
    },
}

impl MirrorSource {
    /// The bare repository name and namespace used for duplicate detection.
    fn name_and_namespace(&self) -> (&str, &str) {
        match self {
            MirrorSource::Pinned { reference, .. } => {
                (&reference.repository, &reference.namespace)
            }
            MirrorSource::TagListing {
                namespace,
                repository,
            } => (repository, namespace),
        }
    }
}

/// Parse one non-comment line of a source list file.
///
/// The last whitespace-delimited token is the image expression; a
/// `--platform=<p>` or `--platform <p>` token earlier on the line selects
/// a platform. Returns `None` for lines with no usable expression.
pub fn parse_source_line(line: &str) -> Option<MirrorSource> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let expr = tokens.last()?;
    if expr.starts_with("--") {
        // A line of nothing but flags has no expression
        return None;
    }

    let mut platform = None;
    for (i, token) in tokens.iter().enumerate() {
        if let Some(value) = token.strip_prefix("--platform=") {
            platform = Some(value.to_string());
        } else if *token == "--platform" {
            // Value form: the platform is the next token, unless that token
            // is the expression itself
            if i + 1 < tokens.len() - 1 {
                platform = Some(tokens[i + 1].to_string());
            }
        }
    }

    let reference = parse_image_expression(expr);
    if reference.repository.is_empty() {
        return None;
    }

    Some(MirrorSource::Pinned {
        reference,
        platform,
    })
}

/// Read a source list file: one image expression per line, empty lines and
/// `#` comments ignored.
pub fn read_source_file(path: &Path) -> Result<Vec<MirrorSource>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source list {}", path.display()))?;

    let mut sources = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_source_line(line) {
            Some(source) => sources.push(source),
            None => warn!("Skipping unparseable source line: {}", line),
        }
    }
    Ok(sources)
}

/// Parse a comma-separated list of repository URLs into tag-listing sources.
/// Malformed URLs are skipped with a warning; they never abort the run.
pub fn parse_source_urls(raw: &str) -> Vec<MirrorSource> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|url| match parse_source_url(url) {
            Ok((namespace, repository)) => Some(MirrorSource::TagListing {
                namespace,
                repository,
            }),
            Err(err) => {
                warn!("Skipping malformed source URL '{}': {:#}", url, err);
                None
            }
        })
        .collect()
}

/// Run-scoped index of bare repository names that appear under more than
/// one namespace. Built in a first pass over all configured sources so
/// naming decisions are collision-aware from the first transfer onward.
#[derive(Debug, Default)]
pub struct DuplicateNameIndex {
    first_seen: HashMap<String, String>,
    duplicates: HashSet<String>,
}

impl DuplicateNameIndex {
    pub fn build(sources: &[MirrorSource]) -> Self {
        let mut index = Self::default();
        for source in sources {
            let (name, namespace) = source.name_and_namespace();
            match index.first_seen.get(name) {
                Some(seen) if seen != namespace => {
                    index.duplicates.insert(name.to_string());
                }
                Some(_) => {}
                None => {
                    index
                        .first_seen
                        .insert(name.to_string(), namespace.to_string());
                }
            }
        }
        index
    }

    pub fn is_duplicate(&self, repository: &str) -> bool {
        self.duplicates.contains(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_source_line_plain_expression() {
        let source = parse_source_line("nginx:1.25").unwrap();
        match source {
            MirrorSource::Pinned {
                reference,
                platform,
            } => {
                assert_eq!(reference.repository, "nginx");
                assert_eq!(reference.tag, "1.25");
                assert_eq!(platform, None);
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_parse_source_line_with_platform_flag() {
        for line in [
            "--platform=linux/arm64 org1/app:v1",
            "--platform linux/arm64 org1/app:v1",
        ] {
            let source = parse_source_line(line).unwrap();
            match source {
                MirrorSource::Pinned {
                    reference,
                    platform,
                } => {
                    assert_eq!(reference.namespace, "org1");
                    assert_eq!(reference.repository, "app");
                    assert_eq!(platform.as_deref(), Some("linux/arm64"));
                }
                other => panic!("unexpected source: {:?}", other),
            }
        }
    }

    #[test]
    fn test_read_source_file_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# mirrored images").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "nginx:1.25").unwrap();
        writeln!(file, "  # indented comment is a comment too").unwrap();
        writeln!(file, "--platform=linux/arm64 grafana/loki:2.9").unwrap();

        let sources = read_source_file(file.path()).unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn test_parse_source_urls_skips_malformed_entries() {
        let sources =
            parse_source_urls("https://hub.docker.com/_/nginx/tags, nonsense ,https://hub.docker.com/r/grafana/loki");
        assert_eq!(sources.len(), 2);
        match &sources[0] {
            MirrorSource::TagListing {
                namespace,
                repository,
            } => {
                assert_eq!(namespace, "library");
                assert_eq!(repository, "nginx");
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_index_flags_second_namespace() {
        let sources = vec![
            MirrorSource::Pinned {
                reference: parse_image_expression("org1/app:v1"),
                platform: None,
            },
            MirrorSource::Pinned {
                reference: parse_image_expression("org2/app:v1"),
                platform: None,
            },
            MirrorSource::Pinned {
                reference: parse_image_expression("org1/solo:v1"),
                platform: None,
            },
        ];
        let index = DuplicateNameIndex::build(&sources);
        assert!(index.is_duplicate("app"));
        assert!(!index.is_duplicate("solo"));
    }

    #[test]
    fn test_duplicate_index_same_namespace_twice_is_not_duplicate() {
        let sources = vec![
            MirrorSource::Pinned {
                reference: parse_image_expression("org1/app:v1"),
                platform: None,
            },
            MirrorSource::Pinned {
                reference: parse_image_expression("org1/app:v2"),
                platform: None,
            },
        ];
        let index = DuplicateNameIndex::build(&sources);
        assert!(!index.is_duplicate("app"));
    }
}
