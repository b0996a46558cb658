use anyhow::Context;
use carecall_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clinic".to_string());

    println!("Initializing carecall in: {}", root.display());

    let dir = paths::carecall_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    // The queue file holds patient data; keep it out of version control.
    io::ensure_gitignore_entry(root, paths::QUEUE_FILE).context("failed to update .gitignore")?;

    println!("\nNext: set telephony.webhook_url in {}, then run `carecall serve`.", paths::CONFIG_FILE);
    Ok(())
}
