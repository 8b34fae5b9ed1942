pub mod local_mount;

pub use local_mount::LocalDirSizeTasks;
