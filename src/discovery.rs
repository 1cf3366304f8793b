// Tag discovery against the Docker Hub tag-listing API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_HUB_URL: &str = "https://hub.docker.com";

/// One entry of the tag-listing response. Only the name is used; the API
/// returns plenty of other metadata we ignore.
#[derive(Debug, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

/// Tag-listing response page. A body without a `results` field counts as
/// zero tags rather than a parse error.
#[derive(Debug, Deserialize)]
pub struct TagPage {
    #[serde(default)]
    pub results: Vec<TagEntry>,
}

/// Lists the most recent tags of a repository. The orchestrator only
/// depends on this trait so tests can substitute a canned implementation.
#[async_trait]
pub trait TagDiscovery {
    async fn list_recent_tags(&self, namespace: &str, repository: &str, limit: usize)
        -> Vec<String>;
}

/// Tag discovery client backed by the Docker Hub v2 API.
pub struct HubClient {
    client: Client,
    base_url: String,
}

impl HubClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn tags_url(&self, namespace: &str, repository: &str, limit: usize) -> String {
        format!(
            "{}/v2/repositories/{}/{}/tags?page_size={}",
            self.base_url, namespace, repository, limit
        )
    }
}

#[async_trait]
impl TagDiscovery for HubClient {
    /// Fetch the first `limit` entries of the repository's tag list, in the
    /// registry's default most-recent-first order. Any failure is logged
    /// and reported as an empty list; discovery problems never abort a run.
    async fn list_recent_tags(
        &self,
        namespace: &str,
        repository: &str,
        limit: usize,
    ) -> Vec<String> {
        let url = self.tags_url(namespace, repository, limit);
        debug!("Fetching tag list: {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "Tag discovery request for {}/{} failed: {}",
                    namespace, repository, err
                );
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(
                "Tag discovery for {}/{} returned HTTP {}",
                namespace,
                repository,
                response.status()
            );
            return Vec::new();
        }

        match response.json::<TagPage>().await {
            Ok(page) => page.results.into_iter().map(|entry| entry.name).collect(),
            Err(err) => {
                warn!(
                    "Tag discovery response for {}/{} was not usable: {}",
                    namespace, repository, err
                );
                Vec::new()
            }
        }
    }
}
