pub mod handle_scan;

pub use handle_scan::ScanHttpError;
