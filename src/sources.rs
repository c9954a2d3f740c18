use anyhow::Result;

use crate::config::Config;
use crate::extract;
use crate::loader;

/// Print the configured document set and whether each file is present.
pub fn list_sources(config: &Config) -> Result<()> {
    let paths = loader::configured_paths(&config.documents)?;

    if paths.is_empty() {
        println!("No documents configured.");
        return Ok(());
    }

    println!("{:<56} {:<16} PRESENT", "DOCUMENT", "TYPE");
    for path in &paths {
        println!(
            "{:<56} {:<16} {}",
            path.display(),
            extract::content_type_for_path(path),
            path.is_file()
        );
    }

    Ok(())
}
