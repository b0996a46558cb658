use std::path::{Path, PathBuf};

/// Resolve the project root that holds `.carecall/`.
///
/// Priority:
/// 1. `--root` flag / `CARECALL_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of `cwd` containing `.carecall/`
/// 3. Nearest ancestor of `cwd` containing `.git/`
/// 4. `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, carecall_core::paths::CARECALL_DIR)
        .or_else(|| find_upward(&cwd, ".git"))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}
