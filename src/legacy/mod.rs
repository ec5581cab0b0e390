//! Legacy CMS access
//!
//! The exporter only ever talks to the legacy system through [`LegacyApi`],
//! so tests can drive it with an in-process fake.
//!
//! # Pagination
//!
//! A listing is read page by page until one of:
//! - the page is shorter than `per_page`
//! - the page is empty
//! - the page number reaches the advertised total (`X-WP-TotalPages`)
//! - the API explicitly reports the page as past the end
//!
//! Any other error is a genuine failure of that listing.

mod wordpress;

pub use wordpress::{Embedded, Rendered, WpClient, WpMedia, WpPost, WpTerm, WpUser};

use crate::fetch::FetchError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// One page of a listing
#[derive(Debug, Clone, PartialEq)]
pub enum ListPage<T> {
    /// Items on this page, plus the total page count when advertised
    Items { items: Vec<T>, total_pages: Option<u64> },
    /// The requested page is past the last one
    PastEnd,
}

impl<T> ListPage<T> {
    /// Page with no advertised total
    pub fn items(items: Vec<T>) -> Self {
        Self::Items {
            items,
            total_pages: None,
        }
    }
}

/// Read access to the legacy CMS
#[async_trait]
pub trait LegacyApi: Send + Sync {
    /// Base URL of the legacy site (no trailing slash)
    fn base_url(&self) -> &str;

    /// Items requested per page
    fn per_page(&self) -> u32;

    /// Check the API root answers at all
    async fn probe(&self) -> Result<(), FetchError>;

    /// One page of published items of a content route
    async fn list_posts(&self, route: &str, page: u32) -> Result<ListPage<WpPost>, FetchError>;

    /// One page of terms of a taxonomy route (empty terms included)
    async fn list_terms(&self, route: &str, page: u32) -> Result<ListPage<WpTerm>, FetchError>;

    /// One page of users
    async fn list_users(&self, page: u32) -> Result<ListPage<WpUser>, FetchError>;

    /// Source URL of a media item; `None` when the item has no usable URL
    async fn media_url(&self, media_id: u64) -> Result<Option<String>, FetchError>;
}

/// Read every page of a listing.
///
/// `delay` is slept between consecutive page requests.
pub async fn collect_pages<T, F, Fut>(
    per_page: u32,
    delay: Duration,
    mut fetch_page: F,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ListPage<T>, FetchError>>,
{
    let mut all = Vec::new();
    let mut page = 1u32;

    loop {
        let (items, total_pages) = match fetch_page(page).await? {
            ListPage::PastEnd => {
                debug!("page {} is past the end", page);
                break;
            }
            ListPage::Items { items, total_pages } => (items, total_pages),
        };

        let count = items.len();
        all.extend(items);

        if count == 0 || count < per_page as usize {
            break;
        }
        if total_pages.is_some_and(|total| u64::from(page) >= total) {
            break;
        }

        page += 1;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(all)
}
