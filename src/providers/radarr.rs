//! Radarr v3 API adapter

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ItemId, ListedItem, ProfileCutoffs, Provider};
use crate::error::{ProviderError, ProviderResult};

/// Radarr quality profile response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrQualityProfile {
    id: i64,
    #[serde(default)]
    cutoff_format_score: i64,
}

/// Radarr movie response (only the fields the cycle needs)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovie {
    id: i64,
    monitored: bool,
    #[serde(default)]
    has_file: bool,
    quality_profile_id: i64,
}

/// Radarr movie file response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovieFile {
    #[serde(default)]
    custom_format_score: Option<i64>,
}

/// Command body for `POST /api/v3/command`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MoviesSearchCommand<'a> {
    name: &'static str,
    movie_ids: &'a [ItemId],
}

/// Radarr API client implementing [`Provider`]
pub struct RadarrProvider {
    base_url: Url,
    api_key: String,
    client: Client,
}

impl RadarrProvider {
    pub fn new(base_url: Url, api_key: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(base_url, api_key, client))
    }

    /// Use an existing HTTP client (shared connection pool)
    pub fn with_client(base_url: Url, api_key: impl Into<String>, client: Client) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            client,
        }
    }

    fn endpoint(&self, path: &str) -> ProviderResult<Url> {
        // Keep any path prefix the user configured (e.g. reverse proxy at /radarr)
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/api/v3/{}", base, path))
            .map_err(|e| ProviderError::configuration(format!("invalid Radarr URL: {}", e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ProviderResult<T> {
        debug!(url = %url, "Radarr GET");
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Turn a non-success response into a [`ProviderError`]
async fn check_status(response: Response) -> ProviderResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, body))
}

#[async_trait]
impl Provider for RadarrProvider {
    async fn list_quality_profiles(&self) -> ProviderResult<ProfileCutoffs> {
        let profiles: Vec<RadarrQualityProfile> =
            self.get_json(self.endpoint("qualityprofile")?).await?;

        Ok(profiles
            .into_iter()
            .map(|p| (p.id, p.cutoff_format_score))
            .collect())
    }

    async fn list_items(&self) -> ProviderResult<Vec<ListedItem>> {
        let movies: Vec<RadarrMovie> = self.get_json(self.endpoint("movie")?).await?;

        Ok(movies
            .into_iter()
            .map(|m| ListedItem {
                id: m.id,
                monitored: m.monitored,
                has_file: m.has_file,
                quality_profile_id: m.quality_profile_id,
            })
            .collect())
    }

    async fn get_item_score(&self, id: ItemId) -> ProviderResult<i64> {
        let mut url = self.endpoint("moviefile")?;
        url.query_pairs_mut().append_pair("movieId", &id.to_string());

        let files: Vec<RadarrMovieFile> = self.get_json(url).await?;

        Ok(files
            .first()
            .and_then(|f| f.custom_format_score)
            .unwrap_or(0))
    }

    async fn dispatch_search(&self, ids: &[ItemId]) -> ProviderResult<()> {
        let url = self.endpoint("command")?;
        debug!(url = %url, count = ids.len(), "Radarr MoviesSearch");

        let response = self
            .client
            .post(url)
            .header("X-Api-Key", &self.api_key)
            .json(&MoviesSearchCommand {
                name: "MoviesSearch",
                movie_ids: ids,
            })
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}
