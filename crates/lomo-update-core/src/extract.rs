use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use zip::ZipArchive;

use crate::error::UpdateError;

/// Unpack the zip archive at `archive_path` into `dest`.
///
/// Every entry name is checked before anything is written, so an archive
/// containing a path that escapes `dest` leaves nothing behind. Entries may
/// not sit underneath a symlink entry of the same archive, and symlinks are
/// only created once all regular entries are on disk, so no write ever goes
/// through a link. Any later failure removes `dest` again; callers see either
/// a fully populated directory or an error. A pre-existing `dest` is cleared
/// first.
///
/// # Errors
/// Returns [`UpdateError::IllegalPath`] for entries resolving outside `dest`,
/// and archive or filesystem errors for unreadable archives and failed
/// writes, including failed content copies.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), UpdateError> {
    if dest.exists() {
        debug!("Removing stale extraction directory {}", dest.display());
        std::fs::remove_dir_all(dest).map_err(|error| {
            UpdateError::fs("failed to clear extraction directory", dest, error)
        })?;
    }
    std::fs::create_dir_all(dest)
        .map_err(|error| UpdateError::fs("failed to create extraction directory", dest, error))?;

    let result = extract_into(archive_path, dest);
    if result.is_err()
        && let Err(error) = std::fs::remove_dir_all(dest)
    {
        warn!(
            "Failed to clean up partial extraction {}: {error}",
            dest.display()
        );
    }
    result
}

fn extract_into(archive_path: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = File::open(archive_path)
        .map_err(|error| UpdateError::fs("failed to open archive", archive_path, error))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|error| UpdateError::archive("failed to read zip archive", error))?;

    let links = validate_entries(&mut archive, dest)?;

    let mut dir_modes = Vec::new();
    #[cfg(unix)]
    let mut pending_links = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|error| UpdateError::archive("failed to read zip entry", error))?;
        let relative = entry_path(dest, entry.name(), entry.enclosed_name().as_deref())?;
        let out_path = dest.join(relative);
        let mode = entry.unix_mode().map(|mode| mode & 0o7777);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                UpdateError::fs("failed to create directory", &out_path, error)
            })?;
            if let Some(mode) = mode {
                dir_modes.push((out_path, mode));
            }
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                UpdateError::fs("failed to create parent directory", parent, error)
            })?;
        }

        #[cfg(unix)]
        {
            if entry.is_symlink() {
                let target = read_link_target(&mut entry, &out_path)?;
                pending_links.push((out_path, target));
                continue;
            }
        }

        write_file(&mut entry, &out_path, mode)?;
    }

    #[cfg(unix)]
    for (out_path, target) in pending_links {
        create_symlink(dest, &out_path, &target, &links)?;
    }
    #[cfg(not(unix))]
    let _ = links;

    // Applied last so a read-only directory mode cannot block its own children.
    for (path, mode) in dir_modes.into_iter().rev() {
        set_mode(&path, mode)?;
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

/// Check every entry name without decompressing anything and return the
/// relative paths of the archive's symlink entries.
fn validate_entries(
    archive: &mut ZipArchive<File>,
    dest: &Path,
) -> Result<HashSet<PathBuf>, UpdateError> {
    let mut entries = Vec::with_capacity(archive.len());
    let mut links = HashSet::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|error| UpdateError::archive("failed to read zip entry", error))?;
        let relative = entry_path(dest, entry.name(), entry.enclosed_name().as_deref())?;
        if entry.is_symlink() {
            links.insert(relative.clone());
        }
        entries.push((entry.name().to_owned(), relative));
    }

    for (name, relative) in &entries {
        if relative
            .ancestors()
            .skip(1)
            .any(|ancestor| links.contains(ancestor))
        {
            return Err(UpdateError::illegal_path(dest.join(name)));
        }
    }
    Ok(links)
}

/// Relative location of an entry below `dest`.
///
/// `enclosed` is the archive's own `enclosed_name()`, which is `None` for
/// absolute names and names climbing above the root. The accepted path is
/// collapsed so `a/../b` and `b` name the same entry.
fn entry_path(dest: &Path, name: &str, enclosed: Option<&Path>) -> Result<PathBuf, UpdateError> {
    match enclosed.and_then(normalize_within) {
        Some(relative) if !relative.as_os_str().is_empty() => Ok(relative),
        _ => Err(UpdateError::illegal_path(dest.join(name))),
    }
}

/// Lexically resolve `path` against an implicit root, or `None` if it is
/// absolute or climbs above that root.
fn normalize_within(path: &Path) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Resolve a symlink `target` written in `link_dir`, refusing targets that
/// leave the root or step through another link of the archive.
#[cfg(unix)]
fn link_target_within(link_dir: &Path, target: &Path, links: &HashSet<PathBuf>) -> bool {
    let mut resolved = link_dir.to_path_buf();
    let mut components = target.components().peekable();
    while let Some(component) = components.next() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                if components.peek().is_some() && links.contains(&resolved) {
                    return false;
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn write_file<R: Read>(
    entry: &mut R,
    out_path: &Path,
    mode: Option<u32>,
) -> Result<(), UpdateError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if let Some(mode) = mode {
            options.mode(mode);
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut outfile = options
        .open(out_path)
        .map_err(|error| UpdateError::fs("failed to create extracted file", out_path, error))?;
    std::io::copy(entry, &mut outfile)
        .map_err(|error| UpdateError::fs("failed to extract archive entry", out_path, error))?;
    Ok(())
}

#[cfg(unix)]
fn read_link_target<R: Read>(entry: &mut R, out_path: &Path) -> Result<String, UpdateError> {
    let mut target = String::new();
    entry
        .read_to_string(&mut target)
        .map_err(|error| UpdateError::fs("failed to read symlink target", out_path, error))?;
    Ok(target)
}

#[cfg(unix)]
fn create_symlink(
    dest: &Path,
    out_path: &Path,
    target: &str,
    links: &HashSet<PathBuf>,
) -> Result<(), UpdateError> {
    let link_dir = out_path
        .parent()
        .and_then(|parent| parent.strip_prefix(dest).ok())
        .unwrap_or_else(|| Path::new(""));
    if !link_target_within(link_dir, Path::new(target), links) {
        return Err(UpdateError::illegal_path(dest.join(link_dir).join(target)));
    }

    if out_path.symlink_metadata().is_ok() {
        std::fs::remove_file(out_path)
            .map_err(|error| UpdateError::fs("failed to replace existing file", out_path, error))?;
    }
    std::os::unix::fs::symlink(target, out_path)
        .map_err(|error| UpdateError::fs("failed to create symlink", out_path, error))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|error| UpdateError::fs("failed to set directory permissions", path, error))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), UpdateError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;

    use zip::write::SimpleFileOptions;

    use super::{entry_path, extract_archive};
    use crate::error::UpdateError;

    fn write_zip(path: &Path, build: impl FnOnce(&mut zip::ZipWriter<std::fs::File>)) {
        let file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(file);
        build(&mut writer);
        writer.finish().expect("zip archive should be finalized");
    }

    fn add_file(writer: &mut zip::ZipWriter<std::fs::File>, name: &str, body: &[u8], mode: u32) {
        let options = SimpleFileOptions::default().unix_permissions(mode);
        writer
            .start_file(name, options)
            .expect("file entry should be started");
        writer.write_all(body).expect("file entry should be written");
    }

    #[test]
    fn extracts_files_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("uncompress");

        write_zip(&zip_path, |writer| {
            writer
                .add_directory("lomod/", SimpleFileOptions::default().unix_permissions(0o755))
                .expect("directory entry should be written");
            add_file(writer, "lomod/bin/lomod", b"binary-content", 0o755);
            add_file(writer, "lomod/README", b"readme", 0o644);
        });

        extract_archive(&zip_path, &dest).expect("archive should extract");

        assert_eq!(
            std::fs::read(dest.join("lomod/bin/lomod")).expect("binary should be extracted"),
            b"binary-content"
        );
        assert_eq!(
            std::fs::read(dest.join("lomod/README")).expect("readme should be extracted"),
            b"readme"
        );
    }

    #[cfg(unix)]
    #[test]
    fn applies_recorded_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("uncompress");

        write_zip(&zip_path, |writer| {
            add_file(writer, "lomod/run.sh", b"#!/bin/sh\n", 0o700);
            writer
                .add_directory("lomod/", SimpleFileOptions::default().unix_permissions(0o750))
                .expect("directory entry should be written");
        });

        extract_archive(&zip_path, &dest).expect("archive should extract");

        let file_mode = std::fs::metadata(dest.join("lomod/run.sh"))
            .expect("script should exist")
            .permissions()
            .mode();
        let dir_mode = std::fs::metadata(dest.join("lomod"))
            .expect("directory should exist")
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o700);
        assert_eq!(dir_mode & 0o777, 0o750);
    }

    #[test]
    fn traversal_entry_aborts_before_any_write() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("evil.zip");
        let dest = temp.path().join("stage").join("uncompress");

        write_zip(&zip_path, |writer| {
            add_file(writer, "lomod/good.txt", b"fine", 0o644);
            add_file(writer, "../../evil", b"pwned", 0o644);
        });

        let result = extract_archive(&zip_path, &dest);

        assert!(matches!(
            result,
            Err(UpdateError::IllegalPath { ref path }) if path.ends_with("evil")
        ));
        assert!(!temp.path().join("evil").exists());
        assert!(!dest.exists(), "no partial extraction should remain");
    }

    #[test]
    fn names_climbing_out_through_a_subdirectory_are_illegal() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("evil.zip");
        let dest = temp.path().join("stage").join("uncompress");

        write_zip(&zip_path, |writer| {
            add_file(writer, "lomod/../../evil", b"pwned", 0o644);
        });

        let result = extract_archive(&zip_path, &dest);

        assert!(matches!(result, Err(UpdateError::IllegalPath { .. })));
        assert!(!temp.path().join("stage/evil").exists());
        assert!(!dest.exists());
    }

    #[test]
    fn entry_resolving_to_the_root_is_illegal() {
        let dest = Path::new("/stage/uncompress");

        assert!(entry_path(dest, "./", Some(Path::new("./"))).is_err());
        assert!(entry_path(dest, "/etc/passwd", None).is_err());
    }

    #[test]
    fn parent_components_that_stay_inside_are_collapsed() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("uncompress");

        write_zip(&zip_path, |writer| {
            add_file(writer, "lomod/tmp/../bin/lomod", b"binary", 0o755);
        });

        extract_archive(&zip_path, &dest).expect("archive should extract");

        assert_eq!(
            std::fs::read(dest.join("lomod/bin/lomod")).expect("binary should be extracted"),
            b"binary"
        );
        assert!(!dest.join("lomod/tmp").exists());
    }

    #[test]
    fn corrupted_entry_data_is_fatal_and_leaves_nothing() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("uncompress");
        let body = b"lomod-payload-0123456789abcdef";

        write_zip(&zip_path, |writer| {
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .unix_permissions(0o644);
            writer
                .start_file("lomod/bin/lomod", options)
                .expect("file entry should be started");
            writer.write_all(body).expect("file entry should be written");
        });
        let mut bytes = std::fs::read(&zip_path).expect("archive should be readable");
        let offset = bytes
            .windows(body.len())
            .position(|window| window == body)
            .expect("stored body should appear verbatim");
        bytes[offset] ^= 0xff;
        std::fs::write(&zip_path, &bytes).expect("archive should be rewritten");

        let result = extract_archive(&zip_path, &dest);

        assert!(matches!(
            result,
            Err(UpdateError::Filesystem { context, .. }) if context == "failed to extract archive entry"
        ));
        assert!(!dest.exists(), "no partial extraction should remain");
    }

    #[test]
    fn clears_stale_extraction_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("uncompress");
        std::fs::create_dir_all(dest.join("old")).expect("stale dir should be created");
        std::fs::write(dest.join("old/leftover"), b"x").expect("stale file should be written");

        write_zip(&zip_path, |writer| add_file(writer, "lomod/new", b"new", 0o644));

        extract_archive(&zip_path, &dest).expect("archive should extract");

        assert!(!dest.join("old").exists());
        assert!(dest.join("lomod/new").is_file());
    }

    #[test]
    fn corrupt_archive_is_an_error_and_leaves_nothing() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("broken.zip");
        let dest = temp.path().join("uncompress");
        std::fs::write(&zip_path, b"definitely not a zip").expect("fixture should be written");

        let result = extract_archive(&zip_path, &dest);

        assert!(matches!(result, Err(UpdateError::Archive { .. })));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_inside_destination_are_recreated() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("uncompress");

        write_zip(&zip_path, |writer| {
            writer
                .add_symlink(
                    "lomod/lib/liblomo.so",
                    "liblomo.so.1",
                    SimpleFileOptions::default(),
                )
                .expect("symlink entry should be written");
            add_file(writer, "lomod/lib/liblomo.so.1", b"elf", 0o644);
        });

        extract_archive(&zip_path, &dest).expect("archive should extract");

        let link = dest.join("lomod/lib/liblomo.so");
        assert_eq!(
            std::fs::read_link(&link).expect("link should exist"),
            Path::new("liblomo.so.1")
        );
        assert_eq!(std::fs::read(&link).expect("link should resolve"), b"elf");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_destination_is_illegal() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("release.zip");
        let dest = temp.path().join("uncompress");

        write_zip(&zip_path, |writer| {
            writer
                .add_symlink("lomod/escape", "../../..", SimpleFileOptions::default())
                .expect("symlink entry should be written");
        });

        let result = extract_archive(&zip_path, &dest);

        assert!(matches!(result, Err(UpdateError::IllegalPath { .. })));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn entries_below_a_symlink_entry_are_illegal() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("chain.zip");
        let dest = temp.path().join("stage").join("uncompress");

        write_zip(&zip_path, |writer| {
            writer
                .add_symlink("x", ".", SimpleFileOptions::default())
                .expect("symlink entry should be written");
            writer
                .add_symlink("x/y", "..", SimpleFileOptions::default())
                .expect("symlink entry should be written");
            add_file(writer, "x/y/evil", b"pwned", 0o644);
        });

        let result = extract_archive(&zip_path, &dest);

        assert!(matches!(result, Err(UpdateError::IllegalPath { .. })));
        assert!(!temp.path().join("stage/evil").exists());
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_target_through_another_symlink_is_illegal() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("chain.zip");
        let dest = temp.path().join("stage").join("uncompress");

        write_zip(&zip_path, |writer| {
            writer
                .add_symlink("x", ".", SimpleFileOptions::default())
                .expect("symlink entry should be written");
            writer
                .add_symlink("up", "x/..", SimpleFileOptions::default())
                .expect("symlink entry should be written");
        });

        let result = extract_archive(&zip_path, &dest);

        assert!(matches!(result, Err(UpdateError::IllegalPath { .. })));
        assert!(!dest.exists());
    }
}
