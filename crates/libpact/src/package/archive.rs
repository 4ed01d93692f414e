//! Package archive codec: gzipped tar with a leading `.PKGINFO` metadata
//! entry and an optional `.INSTALL` scriptlet.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::constant::{INSTALL_ENTRY, PACNEW_SUFFIX, PKGINFO_ENTRY};
use crate::error::{Context, Error, Fallible};
use crate::internal::checksum;
use crate::package::{Backup, FileEntry, Package, PackageOrigin};
use crate::Session;

fn open(path: &Path) -> Fallible<tar::Archive<GzDecoder<std::fs::File>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open archive {}", path.display()))?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

fn entry_rel_path(raw: &Path) -> Option<String> {
    let rel = raw.to_string_lossy();
    let rel = rel.trim_start_matches("./");
    if rel.is_empty() {
        return None;
    }
    // refuse anything trying to escape the root
    if raw.components().any(|c| matches!(c, Component::ParentDir)) {
        warn!("skipping suspicious archive entry {}", rel);
        return None;
    }
    Some(rel.to_owned())
}

/// Load a package record, including its file list, from an archive on
/// disk.
pub(crate) fn load(path: &Path) -> Fallible<Package> {
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut archive = open(path)?;
    let mut pkg: Option<Package> = None;
    let mut scriptlet = false;
    let mut files: Vec<FileEntry> = vec![];

    for entry in archive
        .entries()
        .with_context(|| format!("failed to read archive {}", path.display()))?
    {
        let mut entry =
            entry.with_context(|| format!("failed to read archive {}", path.display()))?;
        let rel = match entry.path().ok().as_deref().and_then(entry_rel_path) {
            Some(rel) => rel,
            None => continue,
        };

        if rel == PKGINFO_ENTRY {
            let mut buf = vec![];
            entry
                .read_to_end(&mut buf)
                .with_context(|| format!("failed to read {} of {}", PKGINFO_ENTRY, display_name))?;
            pkg = Some(
                serde_json::from_slice(&buf)
                    .map_err(|_| Error::InvalidPackages(vec![display_name.clone()]))?,
            );
        } else if rel == INSTALL_ENTRY {
            scriptlet = true;
        } else if !rel.starts_with('.') {
            let header = entry.header();
            let path = if header.entry_type().is_dir() && !rel.ends_with('/') {
                format!("{}/", rel)
            } else {
                rel
            };
            files.push(FileEntry {
                path,
                mode: header.mode().unwrap_or(0),
                size: header.size().unwrap_or(0),
            });
        }
    }

    let mut pkg = pkg.ok_or_else(|| Error::InvalidPackages(vec![display_name]))?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    pkg.files = files;
    pkg.scriptlet = pkg.scriptlet || scriptlet;
    pkg.origin = PackageOrigin::File;
    pkg.archive_path = Some(path.to_owned());
    if pkg.size == 0 {
        pkg.size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    }
    debug!("loaded {} from {}", pkg.ident(), path.display());
    Ok(pkg)
}

/// Unpack the `.INSTALL` scriptlet into `dest`, when the archive carries
/// one.
pub(crate) fn extract_scriptlet(path: &Path, dest: &Path) -> Fallible<bool> {
    let mut archive = open(path)?;
    for entry in archive
        .entries()
        .with_context(|| format!("failed to read archive {}", path.display()))?
    {
        let mut entry =
            entry.with_context(|| format!("failed to read archive {}", path.display()))?;
        let rel = match entry.path().ok().as_deref().and_then(entry_rel_path) {
            Some(rel) => rel,
            None => continue,
        };
        if rel == INSTALL_ENTRY {
            let mut buf = vec![];
            entry
                .read_to_end(&mut buf)
                .with_context(|| format!("failed to read {}", path.display()))?;
            std::fs::write(dest, buf)
                .with_context(|| format!("failed to write {}", dest.display()))?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Outcome of a payload extraction.
pub(crate) struct Extracted {
    /// Entries that could not be written.
    pub errors: usize,
    /// Backup paths with the hash of the content as shipped, for the db
    /// entry. Recording the shipped hash keeps a parked `.pacnew` from
    /// marking the user's file as pristine later.
    pub backup: Vec<Backup>,
}

/// Extract a package's payload into the install root.
///
/// Backup paths already on disk are upgraded in place only when the user
/// never touched them (the content still matches the hash recorded at the
/// predecessor's install time, passed in as `old_backup`); modified ones
/// are left alone and the payload lands beside them as `.pacnew`.
pub(crate) fn extract(
    session: &Session,
    pkg: &Package,
    path: &Path,
    old_backup: &[Backup],
) -> Fallible<Extracted> {
    let root = session.config().root_path().to_owned();
    let mut archive = open(path)?;
    let mut result = Extracted {
        errors: 0,
        backup: vec![],
    };

    for entry in archive
        .entries()
        .with_context(|| format!("failed to read archive {}", path.display()))?
    {
        let mut entry =
            entry.with_context(|| format!("failed to read archive {}", path.display()))?;
        let rel = match entry.path().ok().as_deref().and_then(entry_rel_path) {
            Some(rel) => rel,
            None => continue,
        };
        if rel.starts_with('.') {
            // metadata entries never land on the filesystem
            continue;
        }

        let dest = root.join(rel.trim_end_matches('/'));

        if entry.header().entry_type().is_dir() {
            if let Err(err) = crate::internal::fs::ensure_dir(&dest) {
                warn!("could not create directory {}: {}", dest.display(), err);
                result.errors += 1;
            }
            continue;
        }

        if let Some(parent) = dest.parent() {
            let _ = crate::internal::fs::ensure_dir(parent);
        }

        if pkg.backup.iter().any(|b| b.path == rel) {
            let old_hash = old_backup
                .iter()
                .find(|b| b.path == rel)
                .map(|b| b.hash.as_str());
            match extract_backup(&mut entry, &dest, old_hash) {
                Ok(backup) => result.backup.push(Backup {
                    path: rel,
                    hash: backup,
                }),
                Err(err) => {
                    warn!("could not extract {}: {}", dest.display(), err);
                    result.errors += 1;
                }
            }
            continue;
        }

        if let Err(err) = entry.unpack(&dest) {
            warn!("could not extract {}: {}", dest.display(), err);
            result.errors += 1;
        }
    }

    Ok(result)
}

/// Write one backup entry, parking the payload as `.pacnew` when the file
/// on disk carries local modifications. Returns the shipped content hash.
fn extract_backup<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    dest: &Path,
    old_hash: Option<&str>,
) -> std::io::Result<String> {
    use std::os::unix::fs::PermissionsExt;

    let mut content = vec![];
    entry.read_to_end(&mut content)?;
    let incoming = checksum::md5_hex(&content);

    let target = match checksum::md5_file(dest) {
        Err(_) => dest.to_owned(),
        Ok(on_disk) => {
            let unmodified =
                on_disk == incoming || old_hash.map(|h| h == on_disk).unwrap_or(false);
            if unmodified {
                dest.to_owned()
            } else {
                let mut s = dest.as_os_str().to_owned();
                s.push(PACNEW_SUFFIX);
                let target = PathBuf::from(s);
                warn!("{} installed as {}", dest.display(), target.display());
                target
            }
        }
    };

    std::fs::write(&target, &content)?;
    if let Ok(mode) = entry.header().mode() {
        let _ = std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode));
    }
    Ok(incoming)
}
