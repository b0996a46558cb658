use std::path::Path;

pub fn run(root: &Path, port: Option<u16>, open_browser: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let root = root.to_path_buf();
    rt.block_on(carecall_server::serve(root, port, open_browser))
}
