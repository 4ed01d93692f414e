/// Default install root.
pub(crate) const DEFAULT_ROOT: &str = "/";

/// Default database path, relative to the install root.
pub(crate) const DEFAULT_DB_PATH: &str = "var/lib/pact";

/// Default package cache path, relative to the install root.
pub(crate) const DEFAULT_CACHE_PATH: &str = "var/cache/pact/pkg";

/// Default config file path.
pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/pact/config.json";

/// Name of the lock file guarding the database, created under the db path.
pub(crate) const LOCK_FILE: &str = "db.lck";

/// Suffix appended to modified backup files preserved on package removal.
pub(crate) const PACSAVE_SUFFIX: &str = ".pacsave";

/// Suffix given to an incoming payload that would clobber a locally
/// modified backup file on upgrade.
pub(crate) const PACNEW_SUFFIX: &str = ".pacnew";

/// Suffix of partially downloaded files in the package cache.
pub(crate) const PART_SUFFIX: &str = ".part";

/// Name of the package metadata entry inside an archive.
pub(crate) const PKGINFO_ENTRY: &str = ".PKGINFO";

/// Name of the scriptlet entry inside an archive.
pub(crate) const INSTALL_ENTRY: &str = ".INSTALL";
