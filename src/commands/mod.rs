//! One async handler per subcommand

mod export;
mod images;
mod import;
mod init;
mod parity;
mod redirects;
mod status;
mod transform;

pub use export::export_content;
pub use images::transfer_images;
pub use import::{import_content, ImportArgs};
pub use init::init_config;
pub use parity::check_parity;
pub use redirects::generate_redirects;
pub use status::show_status;
pub use transform::transform_content;
