//! Pipeline stages
//!
//! Each stage reads its inputs from the artifact directory, does its work,
//! and writes its outputs back there. Stages never share in-memory state, so
//! any one of them can be re-run on its own.

pub mod assets;
pub mod export;
pub mod import;
pub mod parity;
pub mod progress;
pub mod redirects;
pub mod transform;

pub use assets::{collect_image_jobs, run_transfer, ImageJob, TransferSummary};
pub use export::{detect_collisions, run_export, ExportSummary, SlugCollision};
pub use import::{guard_documents, import_documents, load_documents, run_import, ImportSummary};
pub use parity::{run_parity, validate, Check, ParityInputs, ParityReport, Verdict};
pub use progress::StageProgress;
pub use redirects::{
    build_redirect_map, order_rules, parse_redirects, run_redirects, RedirectMap, RedirectRule,
    RedirectSummary,
};
pub use transform::{run_transform, transform_all, Lookups, TransformSummary, Transformer};
