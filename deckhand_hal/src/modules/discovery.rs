//! Module discovery.
//!
//! Module device nodes appear in a directory (by default `/dev/modules`)
//! under names containing the module name, e.g. `thermocycler0`.

use deckhand_common::hal::module::ModuleAddress;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Scan `dir` for device nodes matching any of `known` module names.
///
/// A missing directory yields no modules. Results are sorted by port.
pub fn scan(dir: &Path, known: &[&str]) -> Vec<ModuleAddress> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Module directory {:?} unavailable: {}", dir, e);
            return Vec::new();
        }
    };

    let mut found: Vec<ModuleAddress> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let file_name = entry.file_name().to_string_lossy().to_lowercase();
            let name = known.iter().find(|name| file_name.contains(*name))?;
            Some(ModuleAddress {
                name: name.to_string(),
                port: entry.path().to_string_lossy().into_owned(),
            })
        })
        .collect();
    found.sort();
    debug!("Discovered {} module(s) in {:?}", found.len(), dir);
    found
}
