use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::errors::Result;
use crate::utils::file::is_safe_relative_path;

/// Extracts every entry of `archive` into `target_dir`, skipping entries whose
/// normalized name satisfies `skip` or whose path escapes the target.
/// `on_entry` is called once per visited entry, extracted or not.
pub fn extract_zip_archive<R, S, P>(
    archive: &mut ZipArchive<R>,
    target_dir: &Path,
    skip: S,
    mut on_entry: P,
) -> Result<Vec<PathBuf>>
where
    R: Read + Seek,
    S: Fn(&str) -> bool,
    P: FnMut(),
{
    fs::create_dir_all(target_dir)?;
    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().replace('\\', "/");
        let entry_path = Path::new(&name);
        if name.is_empty() || skip(&name) {
            on_entry();
            continue;
        }
        if !is_safe_relative_path(entry_path) {
            tracing::warn!("skipping unsafe archive entry {}", name);
            on_entry();
            continue;
        }
        let out_path = target_dir.join(entry_path);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&out_path)?;
            io::copy(&mut entry, &mut outfile)?;
            written.push(out_path);
        }
        on_entry();
    }
    Ok(written)
}
