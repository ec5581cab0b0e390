//! In-process fakes for the legacy API and asset downloads

#![allow(dead_code)]

use async_trait::async_trait;
use cms_migrate::{
    config::Config,
    fetch::{AssetFetcher, Downloaded, FetchError},
    legacy::{LegacyApi, ListPage, Rendered, WpPost, WpTerm, WpUser},
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const BASE: &str = "https://legacy.test";

/// Legacy site held in memory, paginated like the real API
#[derive(Default)]
pub struct FakeLegacyApi {
    pub per_page: u32,
    pub posts: HashMap<String, Vec<WpPost>>,
    pub terms: HashMap<String, Vec<WpTerm>>,
    pub users: Vec<WpUser>,
    pub media: HashMap<u64, String>,
    pub failing_routes: HashSet<String>,
    pub users_forbidden: bool,
    pub unreachable: bool,
}

impl FakeLegacyApi {
    pub fn new(per_page: u32) -> Self {
        Self {
            per_page,
            ..Self::default()
        }
    }

    pub fn with_post(mut self, route: &str, post: WpPost) -> Self {
        self.posts.entry(route.to_string()).or_default().push(post);
        self
    }

    pub fn with_term(mut self, route: &str, term: WpTerm) -> Self {
        self.terms.entry(route.to_string()).or_default().push(term);
        self
    }

    pub fn with_user(mut self, user: WpUser) -> Self {
        self.users.push(user);
        self
    }

    fn page<T: Clone>(&self, items: &[T], page: u32) -> ListPage<T> {
        let per_page = self.per_page.max(1) as usize;
        let total_pages = items.len().div_ceil(per_page).max(1) as u64;
        if page as u64 > total_pages {
            return ListPage::PastEnd;
        }
        let start = (page as usize - 1) * per_page;
        ListPage::Items {
            items: items.iter().skip(start).take(per_page).cloned().collect(),
            total_pages: Some(total_pages),
        }
    }

    fn check_route(&self, route: &str) -> Result<(), FetchError> {
        if self.failing_routes.contains(route) {
            Err(FetchError::Status {
                status: 500,
                body: "Internal Server Error".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LegacyApi for FakeLegacyApi {
    fn base_url(&self) -> &str {
        BASE
    }

    fn per_page(&self) -> u32 {
        self.per_page
    }

    async fn probe(&self) -> Result<(), FetchError> {
        if self.unreachable {
            Err(FetchError::Decode("connection refused".into()))
        } else {
            Ok(())
        }
    }

    async fn list_posts(&self, route: &str, page: u32) -> Result<ListPage<WpPost>, FetchError> {
        self.check_route(route)?;
        Ok(self.page(self.posts.get(route).map(Vec::as_slice).unwrap_or(&[]), page))
    }

    async fn list_terms(&self, route: &str, page: u32) -> Result<ListPage<WpTerm>, FetchError> {
        self.check_route(route)?;
        Ok(self.page(self.terms.get(route).map(Vec::as_slice).unwrap_or(&[]), page))
    }

    async fn list_users(&self, page: u32) -> Result<ListPage<WpUser>, FetchError> {
        if self.users_forbidden {
            return Err(FetchError::Status {
                status: 401,
                body: "rest_user_cannot_view".into(),
            });
        }
        Ok(self.page(&self.users, page))
    }

    async fn media_url(&self, media_id: u64) -> Result<Option<String>, FetchError> {
        Ok(self.media.get(&media_id).cloned())
    }
}

/// Serves every URL except the listed ones, counting downloads
#[derive(Default)]
pub struct FakeAssetFetcher {
    pub failing: HashSet<String>,
    pub downloads: AtomicUsize,
}

impl FakeAssetFetcher {
    pub fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for FakeAssetFetcher {
    async fn download(&self, url: &str) -> Result<Downloaded, FetchError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(url) {
            return Err(FetchError::Status {
                status: 404,
                body: "Not Found".into(),
            });
        }
        let content_type = if url.to_ascii_lowercase().ends_with(".svg") {
            "image/svg+xml"
        } else {
            "image/png"
        };
        Ok(Downloaded {
            bytes: url.as_bytes().to_vec(),
            content_type: content_type.into(),
        })
    }
}

pub fn upload(path: &str) -> String {
    format!("{}/wp-content/uploads/{}", BASE, path)
}

pub fn post(id: u64, slug: &str, html: &str) -> WpPost {
    WpPost {
        id,
        slug: slug.to_string(),
        status: "publish".into(),
        link: format!("{}/{}/", BASE, slug),
        title: Rendered {
            rendered: format!("Post {}", id),
        },
        content: Rendered {
            rendered: html.to_string(),
        },
        date_gmt: Some(format!("2024-01-{:02}T09:00:00", id % 28 + 1)),
        ..WpPost::default()
    }
}

pub fn term(id: u64, slug: &str) -> WpTerm {
    WpTerm {
        id,
        name: slug.to_uppercase(),
        slug: slug.to_string(),
        link: format!("{}/category/{}/", BASE, slug),
        ..WpTerm::default()
    }
}

pub fn user(id: u64, login: &str) -> WpUser {
    WpUser {
        id,
        name: login.to_string(),
        slug: login.to_string(),
        email: format!("{}@legacy.test", login),
    }
}

/// Configuration pointing every artifact into `dir`, with no pauses
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.legacy.base_url = BASE.to_string();
    config.legacy.request_delay_ms = 0;
    config.legacy.retry_delay_ms = 0;
    config.assets.retry_delay_ms = 0;
    config.assets.flush_every = 1;
    config.import.confirm_delay_secs = 0;
    config.paths.artifacts_dir = dir.join("artifacts");
    config.paths.redirects_file = dir.join("public").join("_redirects");
    config
}
