//! cms-migrate: resumable WordPress → structured content store migration
//!
//! The pipeline runs as independent, restartable stages that hand off only
//! through files in the artifact directory:
//! - export: legacy REST API → `wp_export.ndjson`
//! - images: legacy uploads → store assets, tracked in `image_manifest.json`
//! - transform: export + manifest → `sanity_import.ndjson`
//! - import: batched atomic upserts into the target store
//! - redirects: legacy URL patterns → `_redirects`
//! - parity: counts, slugs, residual URLs and redirect checks

pub mod artifacts;
pub mod config;
pub mod documents;
pub mod error;
pub mod fetch;
pub mod ids;
pub mod legacy;
pub mod pipeline;
pub mod richtext;
pub mod store;
pub mod types;
pub mod util;

pub use config::Config;
pub use error::{MigrateError, MigrateResult};
pub use types::*;
