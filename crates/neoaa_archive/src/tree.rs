//! Conversion between directory trees and archives

use bon::Builder;
use std::borrow::Cow;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::archive::PlainArchive;
use crate::error::{Error, Result};
use crate::header::FieldKey;
use crate::item::{EntryMetadata, EntryType, Item};

/// Options for how an archive is extracted
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct ExtractOptions {
    /// Replace files that already exist in the destination
    #[builder(default)]
    pub overwrite: bool,
}

#[cfg(unix)]
fn os_bytes(value: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(value.as_bytes())
}

#[cfg(not(unix))]
fn os_bytes(value: &OsStr) -> Cow<'_, [u8]> {
    Cow::Owned(value.to_string_lossy().into_owned().into_bytes())
}

#[cfg(unix)]
fn bytes_path(value: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(value))
}

#[cfg(not(unix))]
fn bytes_path(value: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(value).into_owned())
}

/// Archive path of `relative`, components joined by `/`
fn archive_path(relative: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    for component in relative.components() {
        if !out.is_empty() {
            out.push(b'/');
        }
        out.extend_from_slice(&os_bytes(component.as_os_str()));
    }
    out
}

fn encode_entry(root: &Path, entry: &DirEntry) -> Result<Option<Item>> {
    let relative = entry
        .path()
        .strip_prefix(root)
        .map_err(|e| Error::CustomError(e.to_string()))?;
    let path = archive_path(relative);

    let metadata = fs::symlink_metadata(entry.path())?;
    let owner = EntryMetadata::from_metadata(&metadata);
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        Item::directory(path, &owner).map(Some)
    } else if file_type.is_symlink() {
        let target = fs::read_link(entry.path())?;
        Item::symlink(path, os_bytes(target.as_os_str()), &owner).map(Some)
    } else if file_type.is_file() {
        let data = fs::read(entry.path())?;
        Item::file(path, data, &owner).map(Some)
    } else {
        debug!(path = %entry.path().display(), "skipping special file");
        Ok(None)
    }
}

/// Encode every entry below `root`, parents first
///
/// Entries are visited in file name order and symbolic links are stored as links, never
/// followed. An entry that cannot be inspected or read is logged and left out, while failing to
/// list a directory aborts the whole encode.
#[instrument(skip(root), err, fields(root = %root.as_ref().display()))]
pub fn build_from_directory(root: impl AsRef<Path>) -> Result<PlainArchive> {
    let root = root.as_ref();
    if !fs::metadata(root)?.is_dir() {
        return Err(Error::NotADirectory(root.display().to_string()));
    }

    let mut archive = PlainArchive::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        match encode_entry(root, &entry) {
            Ok(Some(item)) => archive.push(item)?,
            Ok(None) => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping entry"),
        }
    }

    info!(items = archive.len(), "encoded directory");
    Ok(archive)
}

/// Describe the regular file at `path`
///
/// The item is stored under `archive_path`, or the file name of `path` when none is given.
#[instrument(skip(path), err, fields(path = %path.as_ref().display()))]
pub fn file_item(path: impl AsRef<Path>, archive_path: Option<&str>) -> Result<Item> {
    let path = path.as_ref();
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(Error::CustomError(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let name = match archive_path {
        Some(name) => Cow::Borrowed(name.as_bytes()),
        None => path
            .file_name()
            .map(os_bytes)
            .ok_or_else(|| Error::CustomError(format!("{} has no file name", path.display())))?,
    };

    Item::file(name, fs::read(path)?, &EntryMetadata::from_metadata(&metadata))
}

/// Relative location of an archive path below the extraction root
///
/// `None` for absolute paths and paths leaving the root.
fn sanitize(path: &[u8]) -> Option<PathBuf> {
    let path = bytes_path(path);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn with_path(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |e| Error::IOError(io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

fn create_file(path: &Path, replace: bool) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(with_path(parent))?;
    }
    let file = if replace {
        File::create(path)
    } else {
        File::create_new(path)
    };
    file.map_err(with_path(path))
}

#[cfg(unix)]
fn create_symlink(target: &[u8], path: &Path, replace: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(with_path(parent))?;
    }
    if replace && fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path).map_err(with_path(path))?;
    }
    std::os::unix::fs::symlink(bytes_path(target), path).map_err(with_path(path))
}

#[cfg(not(unix))]
fn create_symlink(_target: &[u8], path: &Path, _replace: bool) -> Result<()> {
    warn!(path = %path.display(), "symbolic links are not supported here, skipping");
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u64>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        let permissions = fs::Permissions::from_mode((mode & 0o7777) as u32);
        fs::set_permissions(path, permissions).map_err(with_path(path))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u64>) -> Result<()> {
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|metadata| metadata.file_type().is_symlink())
}

/// First parent of `relative` below `destination` that is a symbolic link
fn linked_parent(destination: &Path, relative: &Path) -> Option<PathBuf> {
    let mut current = destination.to_path_buf();
    for component in relative.parent()?.components() {
        current.push(component);
        if is_symlink(&current) {
            return Some(current);
        }
    }
    None
}

/// Recreate the items of `archive` below `destination`, in archive order
///
/// Absolute paths and paths containing `..` are skipped with a warning, and so are items whose
/// parent is a symbolic link, so nothing is written outside of `destination`. Existing files are
/// kept unless [`ExtractOptions::overwrite`] is set, though an item always replaces one written
/// earlier by the same extraction. Directory permissions are applied once every item is in
/// place.
#[instrument(skip(archive, destination), err, fields(destination = %destination.as_ref().display()))]
pub fn extract(
    archive: &PlainArchive,
    destination: impl AsRef<Path>,
    options: &ExtractOptions,
) -> Result<()> {
    let destination = destination.as_ref();
    fs::create_dir_all(destination).map_err(with_path(destination))?;

    let mut written = HashSet::new();
    let mut directories = Vec::new();

    for item in archive {
        let Some(raw) = item.path_bytes() else {
            debug!("skipping item without path");
            continue;
        };
        let Some(relative) = sanitize(raw) else {
            warn!(path = %String::from_utf8_lossy(raw), "skipping path outside of the destination");
            continue;
        };
        if relative.as_os_str().is_empty() {
            debug!("skipping item for the destination itself");
            continue;
        }

        if let Some(link) = linked_parent(destination, &relative) {
            warn!(
                path = %relative.display(),
                link = %link.display(),
                "skipping path below a symbolic link"
            );
            continue;
        }

        let target = destination.join(&relative);
        let mode = item.header().uint(FieldKey::MOD);
        let replace = options.overwrite || written.contains(&target);

        match item.entry_type() {
            Some(EntryType::Directory) => {
                if is_symlink(&target) {
                    warn!(path = %target.display(), "skipping directory replacing a symbolic link");
                    continue;
                }
                debug!(path = %target.display(), "creating directory");
                fs::create_dir_all(&target).map_err(with_path(&target))?;
                directories.push((target.clone(), mode));
            }
            Some(EntryType::File) => {
                debug!(path = %target.display(), "writing file");
                if replace && is_symlink(&target) {
                    fs::remove_file(&target).map_err(with_path(&target))?;
                }
                let mut out = create_file(&target, replace)?;
                out.write_all(item.data().unwrap_or_default())
                    .map_err(with_path(&target))?;
                apply_mode(&target, mode)?;
            }
            Some(EntryType::Symlink) => {
                let Some(link) = item.link_target() else {
                    warn!(path = %target.display(), "skipping link without target");
                    continue;
                };
                debug!(path = %target.display(), "creating link");
                create_symlink(link, &target, replace)?;
            }
            other => {
                debug!(path = %target.display(), kind = ?other, "skipping unsupported entry");
                continue;
            }
        }

        written.insert(target);
    }

    for (path, mode) in directories.into_iter().rev() {
        apply_mode(&path, mode)?;
    }

    info!(items = written.len(), "extracted archive");
    Ok(())
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::{Path, PathBuf};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::archive::PlainArchive;
    use crate::error::{Error, Result};
    use crate::item::{EntryMetadata, EntryType, Item};
    use crate::tree::{archive_path, build_from_directory, extract, file_item, sanitize, ExtractOptions};

    #[test]
    fn joins_components_with_slash() {
        let path: PathBuf = ["a", "b", "c.txt"].iter().collect();
        assert_eq!(archive_path(&path), b"a/b/c.txt".to_vec());
    }

    #[test]
    fn sanitize_paths() {
        assert_eq!(sanitize(b"a/./b"), Some(Path::new("a/b").to_path_buf()));
        assert_eq!(sanitize(b"../etc/passwd"), None);
        assert_eq!(sanitize(b"a/../../b"), None);
        assert_eq!(sanitize(b"/etc/shadow"), None);
    }

    #[traced_test]
    #[test]
    fn encode_sorted_tree() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("b"))?;
        fs::write(root.path().join("b/inner.txt"), b"inner")?;
        fs::write(root.path().join("a.txt"), b"hi")?;

        let archive = build_from_directory(root.path())?;
        assert_eq!(
            archive.paths().collect::<Vec<_>>(),
            vec!["a.txt", "b", "b/inner.txt"]
        );

        let kinds = archive
            .iter()
            .map(|item| item.entry_type())
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                Some(EntryType::File),
                Some(EntryType::Directory),
                Some(EntryType::File)
            ]
        );

        Ok(())
    }

    #[cfg(unix)]
    #[traced_test]
    #[test]
    fn encode_records_ownership() -> Result<()> {
        use crate::header::FieldKey;
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let root = tempfile::tempdir()?;
        let file = root.path().join("a.txt");
        fs::write(&file, b"hi")?;
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640))?;
        let metadata = fs::metadata(&file)?;

        let archive = build_from_directory(root.path())?;
        let header = archive.by_index(0)?.header();
        assert_eq!(header.uint(FieldKey::UID), Some(metadata.uid() as u64));
        assert_eq!(header.uint(FieldKey::GID), Some(metadata.gid() as u64));
        assert_eq!(header.uint(FieldKey::MOD), Some(0o640));

        Ok(())
    }

    #[test]
    fn encode_file_is_not_a_directory() -> Result<()> {
        let root = tempfile::tempdir()?;
        let file = root.path().join("a.txt");
        fs::write(&file, b"hi")?;

        assert!(matches!(
            build_from_directory(&file),
            Err(Error::NotADirectory(_))
        ));

        Ok(())
    }

    #[test]
    fn encode_missing_root() {
        assert!(matches!(
            build_from_directory("/does/not/exist/anywhere"),
            Err(Error::IOError(_))
        ));
    }

    #[test]
    fn file_item_names() -> Result<()> {
        let root = tempfile::tempdir()?;
        let file = root.path().join("data.bin");
        fs::write(&file, [1, 2, 3])?;

        let item = file_item(&file, None)?;
        assert_eq!(item.path().as_deref(), Some("data.bin"));
        assert_eq!(item.data(), Some(&[1u8, 2, 3][..]));

        let item = file_item(&file, Some("nested/other.bin"))?;
        assert_eq!(item.path().as_deref(), Some("nested/other.bin"));

        assert!(file_item(root.path(), None).is_err());

        Ok(())
    }

    #[traced_test]
    #[test]
    fn extract_skips_unsafe_paths() -> Result<()> {
        let meta = EntryMetadata::default();
        let mut archive = PlainArchive::new();
        archive.push(Item::file("../escape.txt", b"no".to_vec(), &meta)?)?;
        archive.push(Item::file("/abs.txt", b"no".to_vec(), &meta)?)?;
        archive.push(Item::file("safe.txt", b"yes".to_vec(), &meta)?)?;

        let root = tempfile::tempdir()?;
        let destination = root.path().join("out");
        extract(&archive, &destination, &ExtractOptions::default())?;

        assert_eq!(fs::read(destination.join("safe.txt"))?, b"yes");
        assert!(!root.path().join("escape.txt").exists());
        assert!(logs_contain("skipping path outside of the destination"));

        Ok(())
    }

    #[traced_test]
    #[test]
    fn extract_later_duplicate_wins() -> Result<()> {
        let meta = EntryMetadata::default();
        let mut archive = PlainArchive::new();
        archive.push(Item::file("same.txt", b"one".to_vec(), &meta)?)?;
        archive.push(Item::file("same.txt", b"two".to_vec(), &meta)?)?;

        let root = tempfile::tempdir()?;
        extract(&archive, root.path(), &ExtractOptions::default())?;

        assert_eq!(fs::read(root.path().join("same.txt"))?, b"two");

        Ok(())
    }

    #[traced_test]
    #[test]
    fn extract_keeps_existing_files() -> Result<()> {
        let mut archive = PlainArchive::new();
        archive.push(Item::file("a.txt", b"new".to_vec(), &EntryMetadata::default())?)?;

        let root = tempfile::tempdir()?;
        fs::write(root.path().join("a.txt"), b"old")?;

        assert!(extract(&archive, root.path(), &ExtractOptions::default()).is_err());
        assert_eq!(fs::read(root.path().join("a.txt"))?, b"old");

        extract(
            &archive,
            root.path(),
            &ExtractOptions::builder().overwrite(true).build(),
        )?;
        assert_eq!(fs::read(root.path().join("a.txt"))?, b"new");

        Ok(())
    }

    #[cfg(unix)]
    #[traced_test]
    #[test]
    fn extract_skips_items_below_links() -> Result<()> {
        let meta = EntryMetadata::default();
        let outside = tempfile::tempdir()?;

        let mut archive = PlainArchive::new();
        archive.push(Item::symlink(
            "evil",
            outside.path().as_os_str().as_encoded_bytes(),
            &meta,
        )?)?;
        archive.push(Item::file("evil/pwned.txt", b"no".to_vec(), &meta)?)?;
        archive.push(Item::directory("evil/nested", &meta)?)?;

        let root = tempfile::tempdir()?;
        extract(&archive, root.path(), &ExtractOptions::default())?;

        assert!(fs::symlink_metadata(root.path().join("evil"))?.file_type().is_symlink());
        assert!(!outside.path().join("pwned.txt").exists());
        assert!(!outside.path().join("nested").exists());
        assert!(logs_contain("skipping path below a symbolic link"));

        Ok(())
    }

    #[cfg(unix)]
    #[traced_test]
    #[test]
    fn extract_never_writes_through_a_link() -> Result<()> {
        let meta = EntryMetadata::default();
        let outside = tempfile::tempdir()?;
        let victim = outside.path().join("victim.txt");
        fs::write(&victim, b"untouched")?;

        let mut archive = PlainArchive::new();
        archive.push(Item::symlink("x", victim.as_os_str().as_encoded_bytes(), &meta)?)?;
        archive.push(Item::file("x", b"clobbered".to_vec(), &meta)?)?;

        let root = tempfile::tempdir()?;
        extract(&archive, root.path(), &ExtractOptions::default())?;

        assert_eq!(fs::read(&victim)?, b"untouched");
        let extracted = root.path().join("x");
        assert!(fs::symlink_metadata(&extracted)?.file_type().is_file());
        assert_eq!(fs::read(&extracted)?, b"clobbered");

        Ok(())
    }

    #[cfg(unix)]
    #[traced_test]
    #[test]
    fn extract_with_overwrite_replaces_existing_link() -> Result<()> {
        let outside = tempfile::tempdir()?;
        let victim = outside.path().join("victim.txt");
        fs::write(&victim, b"untouched")?;

        let root = tempfile::tempdir()?;
        std::os::unix::fs::symlink(&victim, root.path().join("x"))?;

        let mut archive = PlainArchive::new();
        archive.push(Item::file("x", b"new".to_vec(), &EntryMetadata::default())?)?;

        assert!(extract(&archive, root.path(), &ExtractOptions::default()).is_err());
        extract(
            &archive,
            root.path(),
            &ExtractOptions::builder().overwrite(true).build(),
        )?;

        assert_eq!(fs::read(&victim)?, b"untouched");
        assert_eq!(fs::read(root.path().join("x"))?, b"new");

        Ok(())
    }
}
