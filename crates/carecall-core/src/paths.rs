use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CARECALL_DIR: &str = ".carecall";
pub const CONFIG_FILE: &str = ".carecall/config.yaml";
pub const QUEUE_FILE: &str = ".carecall/queue.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn carecall_dir(root: &Path) -> PathBuf {
    root.join(CARECALL_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn queue_path(root: &Path) -> PathBuf {
    root.join(QUEUE_FILE)
}
