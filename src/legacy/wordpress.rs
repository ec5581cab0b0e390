//! WordPress REST API client

use super::{LegacyApi, ListPage};
use crate::config::LegacyConfig;
use crate::fetch::{retry_with_backoff, FetchConfig, FetchError, HttpFetcher, RetryPolicy};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Error code WordPress returns for a page number beyond the last page
const PAST_END_CODE: &str = "rest_post_invalid_page_number";

/// `{ "rendered": "..." }` wrapper used for titles, content and excerpts
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Rendered {
    pub rendered: String,
}

/// Media item (only the fields the exporter reads)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WpMedia {
    pub source_url: Option<String>,
    pub guid: Option<Rendered>,
}

impl WpMedia {
    /// `source_url`, else the media GUID
    pub fn url(&self) -> Option<String> {
        self.source_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| {
                self.guid
                    .as_ref()
                    .map(|g| g.rendered.clone())
                    .filter(|u| !u.is_empty())
            })
    }
}

/// `_embedded` block requested with `_embed=true`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Embedded {
    #[serde(rename = "wp:featuredmedia")]
    pub featured_media: Vec<WpMedia>,
}

/// Post, page or custom post type item
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WpPost {
    pub id: u64,
    pub date_gmt: Option<String>,
    pub modified_gmt: Option<String>,
    pub slug: String,
    pub status: String,
    pub link: String,
    pub title: Rendered,
    pub content: Rendered,
    pub excerpt: Rendered,
    pub author: u64,
    pub featured_media: u64,
    pub categories: Vec<u64>,
    pub tags: Vec<u64>,
    /// Registered meta; WordPress sends `[]` when none is registered
    pub meta: serde_json::Value,
    #[serde(rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

impl WpPost {
    /// Featured image URL carried inline by `_embed`
    pub fn embedded_featured_url(&self) -> Option<String> {
        self.embedded
            .as_ref()
            .and_then(|e| e.featured_media.first())
            .and_then(|m| m.source_url.clone())
            .filter(|u| !u.is_empty())
    }

    /// First non-empty string among the given meta keys
    pub fn meta_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| self.meta.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string)
    }
}

/// Taxonomy term
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WpTerm {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub link: String,
    pub count: u64,
}

/// User (public fields; `slug` is the login)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WpUser {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
struct WpErrorBody {
    #[serde(default)]
    code: String,
}

/// [`LegacyApi`] over the WordPress v2 REST namespace
#[derive(Debug, Clone)]
pub struct WpClient {
    fetcher: HttpFetcher,
    base: String,
    api_root: String,
    per_page: u32,
    retry: RetryPolicy,
}

impl WpClient {
    pub fn new(config: &LegacyConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(FetchConfig {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            ..FetchConfig::default()
        })?;
        Ok(Self {
            fetcher,
            base: config.base().to_string(),
            api_root: config.api_root(),
            per_page: config.per_page,
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_delay_ms),
            ),
        })
    }

    fn list_url(&self, route: &str, page: u32, extra: &[(&str, &str)]) -> Result<String, FetchError> {
        let mut url = Url::parse(&format!("{}/{}", self.api_root, route.trim_matches('/')))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("per_page", &self.per_page.to_string());
            query.append_pair("page", &page.to_string());
            for (k, v) in extra {
                query.append_pair(k, v);
            }
        }
        Ok(url.into())
    }

    async fn list<T: DeserializeOwned + Send>(
        &self,
        route: &str,
        page: u32,
        extra: &[(&str, &str)],
    ) -> Result<ListPage<T>, FetchError> {
        let url = self.list_url(route, page, extra)?;
        let result = retry_with_backoff(self.retry, |_| self.fetcher.get_json::<Vec<T>>(&url)).await;

        match result {
            Ok(response) => {
                let total_pages = response.header_u64("x-wp-totalpages");
                Ok(ListPage::Items {
                    items: response.body,
                    total_pages,
                })
            }
            Err(err) if page > 1 && is_past_end(&err) => Ok(ListPage::PastEnd),
            Err(err) => Err(err),
        }
    }
}

/// HTTP 400 carrying the explicit "invalid page number" code
fn is_past_end(err: &FetchError) -> bool {
    match err {
        FetchError::Status { status: 400, body } => serde_json::from_str::<WpErrorBody>(body)
            .map(|b| b.code == PAST_END_CODE)
            .unwrap_or(false),
        _ => false,
    }
}

#[async_trait]
impl LegacyApi for WpClient {
    fn base_url(&self) -> &str {
        &self.base
    }

    fn per_page(&self) -> u32 {
        self.per_page
    }

    async fn probe(&self) -> Result<(), FetchError> {
        let status = self.fetcher.probe(&format!("{}/wp-json/", self.base)).await?;
        debug!("legacy API root answered {}", status);
        Ok(())
    }

    async fn list_posts(&self, route: &str, page: u32) -> Result<ListPage<WpPost>, FetchError> {
        self.list(route, page, &[("status", "publish"), ("_embed", "true")])
            .await
    }

    async fn list_terms(&self, route: &str, page: u32) -> Result<ListPage<WpTerm>, FetchError> {
        self.list(route, page, &[("hide_empty", "false")]).await
    }

    async fn list_users(&self, page: u32) -> Result<ListPage<WpUser>, FetchError> {
        self.list("users", page, &[]).await
    }

    async fn media_url(&self, media_id: u64) -> Result<Option<String>, FetchError> {
        let url = format!("{}/media/{}", self.api_root, media_id);
        let media = self.fetcher.get_json::<WpMedia>(&url).await?;
        Ok(media.body.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_end_requires_the_explicit_code() {
        let past_end = FetchError::Status {
            status: 400,
            body: r#"{"code":"rest_post_invalid_page_number","message":"x"}"#.to_string(),
        };
        let other_400 = FetchError::Status {
            status: 400,
            body: r#"{"code":"rest_invalid_param"}"#.to_string(),
        };
        let server = FetchError::Status {
            status: 500,
            body: String::new(),
        };
        assert!(is_past_end(&past_end));
        assert!(!is_past_end(&other_400));
        assert!(!is_past_end(&server));
    }

    #[test]
    fn list_url_carries_paging_and_filters() {
        let client = WpClient::new(&LegacyConfig {
            base_url: "https://legacy.test/".to_string(),
            ..LegacyConfig::default()
        })
        .unwrap();
        let url = client.list_url("posts", 2, &[("status", "publish")]).unwrap();
        assert_eq!(
            url,
            "https://legacy.test/wp-json/wp/v2/posts?per_page=100&page=2&status=publish"
        );
    }

    #[test]
    fn post_deserializes_embedded_media_and_yoast_meta() {
        let json = r#"{
            "id": 42, "slug": "launch", "status": "publish",
            "link": "https://legacy.test/blog/launch/",
            "title": {"rendered": "Launch"},
            "content": {"rendered": "<p>Hi</p>"},
            "meta": {"_yoast_wpseo_title": "SEO Launch"},
            "_embedded": {"wp:featuredmedia": [{"source_url": "https://legacy.test/f.jpg"}]}
        }"#;
        let post: WpPost = serde_json::from_str(json).unwrap();
        assert_eq!(post.embedded_featured_url().as_deref(), Some("https://legacy.test/f.jpg"));
        assert_eq!(
            post.meta_str(&["_yoast_wpseo_title", "yoast_wpseo_title"]).as_deref(),
            Some("SEO Launch")
        );
        assert!(post.categories.is_empty());
    }

    #[test]
    fn media_url_falls_back_to_guid() {
        let media: WpMedia =
            serde_json::from_str(r#"{"guid": {"rendered": "https://legacy.test/g.png"}}"#).unwrap();
        assert_eq!(media.url().as_deref(), Some("https://legacy.test/g.png"));
    }
}
