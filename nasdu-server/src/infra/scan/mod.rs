pub mod catalog;
pub mod control_plane;

pub use catalog::ScanCatalog;
pub use control_plane::{ScanControlError, ScanControlPlane};
