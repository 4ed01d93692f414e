pub(crate) mod archive;
pub(crate) mod depend;
pub mod files;
pub mod version;

use serde::{Deserialize, Serialize};

pub use depend::{DepMod, Depend};
pub use files::FileEntry;

/// Why a package is (or will be) present on the system.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageReason {
    /// Explicitly requested by the user.
    #[default]
    Explicit,
    /// Pulled in as a dependency of something else.
    Depend,
}

/// Where a package record was loaded from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PackageOrigin {
    #[default]
    LocalDb,
    SyncDb,
    File,
}

/// How an archive may be validated before install.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    None,
    Md5,
    Sha256,
    Signature,
}

/// A backup entry: a config-style path whose local modifications must
/// survive removal and upgrade, plus the content hash recorded at install
/// time (MD5, hex encoded).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Backup {
    pub path: String,
    pub hash: String,
}

/// A package: the named unit the engine plans over.
///
/// A package is immutable once loaded from its source. The transaction
/// duplicates records into working copies when planning needs per-target
/// state (install reason, the `removes` list, chosen validation); all
/// cross-list comparisons are by name, never by identity.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Build timestamp, unix seconds.
    #[serde(default)]
    pub build_date: i64,
    /// Install timestamp, unix seconds. Local packages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_date: Option<i64>,
    #[serde(default)]
    pub reason: PackageReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<Depend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optdepends: Vec<Depend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Depend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Depend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaces: Vec<Depend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup: Vec<Backup>,
    /// Whether the package ships an install scriptlet.
    #[serde(default)]
    pub scriptlet: bool,
    /// Archive size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Unpacked size in bytes.
    #[serde(default)]
    pub installed_size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<Validation>,
    /// Expected archive digests, sync packages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256sum: Option<String>,
    /// Archive filename within the repo, sync packages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Sorted, deduplicated file list. Stored out-of-band by the local db
    /// codec and filled from archive entries for loaded packages; sync
    /// records carry none until the archive is loaded.
    #[serde(skip)]
    pub files: Vec<FileEntry>,

    #[serde(skip)]
    pub origin: PackageOrigin,

    /// Name of the owning sync repo, sync packages only.
    #[serde(skip)]
    pub repo: Option<String>,

    /// Where the loaded archive lives on disk, loaded packages only.
    #[serde(skip)]
    pub archive_path: Option<std::path::PathBuf>,

    /// Bytes still to fetch for this package, computed during prepare.
    #[serde(skip)]
    pub download_size: u64,

    /// Local packages this target subsumes: conflict resolutions the user
    /// approved and replacement victims. Owned by the transaction working
    /// copy only.
    #[serde(skip)]
    pub removes: Vec<Package>,
}

impl Package {
    /// `name-version`, the conventional display form.
    #[inline]
    pub fn ident(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Does this package satisfy the given dependency expression, by name
    /// or by provides?
    #[inline]
    pub fn satisfies(&self, dep: &Depend) -> bool {
        dep.satisfied_by(self)
    }

    /// Does any of this package's dependencies match `other`?
    pub fn depends_on(&self, other: &Package) -> bool {
        self.depends.iter().any(|dep| dep.satisfied_by(other))
    }

    pub(crate) fn find_by_name<'a>(pkgs: &'a [Package], name: &str) -> Option<&'a Package> {
        pkgs.iter().find(|p| p.name == name)
    }

    #[cfg(test)]
    pub(crate) fn synthetic(name: &str, version: &str) -> Package {
        Package {
            name: name.to_owned(),
            version: version.to_owned(),
            ..Default::default()
        }
    }
}
