//! HTTP client for the hosted content store

use super::{ContentStore, StoreError, StoreRedirect, StoreSlug};
use crate::config::{TargetConfig, DEFAULT_USER_AGENT};
use crate::documents::RawDocument;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

const CONTENT_TYPES: &str = r#"["article", "node", "caseStudy", "page"]"#;

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    document: AssetDocument,
}

#[derive(Debug, Deserialize)]
struct AssetDocument {
    #[serde(rename = "_id")]
    id: String,
}

/// [`ContentStore`] over the hosted data and asset HTTP APIs
#[derive(Debug, Clone)]
pub struct SanityStore {
    client: reqwest::Client,
    host: String,
    dataset: String,
    token: String,
}

impl SanityStore {
    /// Build a client; project ID and token must be present
    pub fn new(config: &TargetConfig) -> Result<Self, StoreError> {
        let host = config
            .api_host()
            .ok_or_else(|| StoreError::NotConfigured("target.project_id".to_string()))?;
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StoreError::NotConfigured("target.token".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            host,
            dataset: config.dataset.clone(),
            token,
        })
    }

    fn endpoint(&self, section: &str) -> String {
        format!("{}/{}/{}", self.host, section, self.dataset)
    }

    async fn mutate(&self, docs: &[RawDocument]) -> Result<(), StoreError> {
        let mutations: Vec<Value> = docs
            .iter()
            .map(|d| json!({ "createOrReplace": d.to_value() }))
            .collect();
        let response = self
            .client
            .post(format!("{}?returnIds=false&visibility=sync", self.endpoint("data/mutate")))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&json!({ "mutations": mutations }))
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Run a query with JSON-encoded parameters
    async fn query<T: DeserializeOwned + Send>(
        &self,
        groq: &str,
        params: &[(&str, &str)],
    ) -> Result<T, StoreError> {
        let mut url = Url::parse(&self.endpoint("data/query"))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", groq);
            for (name, value) in params {
                pairs.append_pair(&format!("${}", name), &Value::from(*value).to_string());
            }
        }
        debug!("store query: {}", groq);

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;
        let text = check_status(response).await?;
        let parsed: QueryResponse<T> =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(parsed.result)
    }
}

async fn check_status(response: reqwest::Response) -> Result<String, StoreError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(StoreError::Api {
            status: status.as_u16(),
            body: crate::util::truncate_str(&body, 500),
        })
    }
}

#[async_trait]
impl ContentStore for SanityStore {
    async fn commit_create_or_replace(&self, docs: &[RawDocument]) -> Result<(), StoreError> {
        if docs.is_empty() {
            return Ok(());
        }
        self.mutate(docs).await
    }

    async fn create_or_replace(&self, doc: &RawDocument) -> Result<(), StoreError> {
        self.mutate(std::slice::from_ref(doc)).await
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        filename: &str,
    ) -> Result<String, StoreError> {
        let mut url = Url::parse(&self.endpoint("assets/images"))
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        url.query_pairs_mut().append_pair("filename", filename);

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let text = check_status(response).await?;
        let asset: AssetResponse =
            serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(asset.document.id)
    }

    async fn count_documents(&self, doc_type: &str, legacy_only: bool) -> Result<u64, StoreError> {
        let groq = if legacy_only {
            "count(*[_type == $type && defined(legacySource)])"
        } else {
            "count(*[_type == $type])"
        };
        self.query(groq, &[("type", doc_type)]).await
    }

    async fn legacy_slugs(&self, doc_type: &str) -> Result<Vec<String>, StoreError> {
        let slugs: Vec<Option<String>> = self
            .query(
                "*[_type == $type && defined(legacySource)].slug.current",
                &[("type", doc_type)],
            )
            .await?;
        Ok(slugs.into_iter().flatten().collect())
    }

    async fn count_residual_legacy_urls(&self, marker: &str) -> Result<u64, StoreError> {
        let groq = format!(
            "count(*[_type in {} && defined(legacySource) && (\
             pt::text(content) match $pattern || \
             pt::text(sections[].content[]) match $pattern || \
             string(featuredImage.asset._ref) match $pattern)])",
            CONTENT_TYPES
        );
        let pattern = format!("*{}*", marker);
        self.query(&groq, &[("pattern", pattern.as_str())]).await
    }

    async fn active_redirects(&self) -> Result<Vec<StoreRedirect>, StoreError> {
        self.query(
            r#"*[_type == "redirect" && isActive == true]{fromPath, toPath, statusCode}"#,
            &[],
        )
        .await
    }

    async fn current_slugs(&self) -> Result<Vec<StoreSlug>, StoreError> {
        self.query(
            r#"*[defined(legacySource) && defined(slug.current)]{_id, "slug": slug.current}"#,
            &[],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_project_and_token() {
        let mut config = TargetConfig::default();
        assert!(matches!(
            SanityStore::new(&config),
            Err(StoreError::NotConfigured(_))
        ));
        config.project_id = Some("abc".into());
        assert!(matches!(
            SanityStore::new(&config),
            Err(StoreError::NotConfigured(_))
        ));
        config.token = Some("sk".into());
        let store = SanityStore::new(&config).unwrap();
        assert_eq!(
            store.endpoint("data/mutate"),
            "https://abc.api.sanity.io/v2024-01-01/data/mutate/production"
        );
    }
}
