//! Zip bundling for multi-file conversions

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use zip::CompressionMethod;
use zip::write::FileOptions;

use super::ToolError;

/// One file to place in an archive under `name`
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Write `entries` into a new zip at `output`. Repeated names get a
/// numeric suffix so no entry shadows another.
pub async fn bundle(entries: Vec<ArchiveEntry>, output: PathBuf) -> Result<(), ToolError> {
    tokio::task::spawn_blocking(move || write_zip(&entries, &output))
        .await
        .map_err(|error| ToolError::Io(io::Error::other(error)))?
}

fn write_zip(entries: &[ArchiveEntry], output: &Path) -> Result<(), ToolError> {
    let file = File::create(output)?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut used = HashSet::new();
    for entry in entries {
        let name = unique_name(&entry.name, &mut used);
        writer.start_file(name, options)?;
        let mut source = File::open(&entry.path)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        })
        .find(|candidate| used.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_unique_name_suffixes_duplicates() {
        let mut used = HashSet::new();
        assert_eq!(unique_name("a.png", &mut used), "a.png");
        assert_eq!(unique_name("a.png", &mut used), "a-1.png");
        assert_eq!(unique_name("a.png", &mut used), "a-2.png");
        assert_eq!(unique_name("README", &mut used), "README");
        assert_eq!(unique_name("README", &mut used), "README-1");
    }

    #[tokio::test]
    async fn test_bundle_writes_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.webp");
        let second = dir.path().join("two.webp");
        std::fs::write(&first, b"first").unwrap();
        std::fs::write(&second, b"second").unwrap();

        let output = dir.path().join("bundle.zip");
        bundle(
            vec![
                ArchiveEntry { name: "photo.webp".into(), path: first },
                ArchiveEntry { name: "photo.webp".into(), path: second },
            ],
            output.clone(),
        )
        .await
        .unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("photo-1.webp")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "second");
    }

    #[tokio::test]
    async fn test_missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = bundle(
            vec![ArchiveEntry {
                name: "gone.png".into(),
                path: dir.path().join("gone.png"),
            }],
            dir.path().join("out.zip"),
        )
        .await;
        assert!(matches!(result, Err(ToolError::Io(_))));
    }
}
