pub(crate) mod checksum;
pub(crate) mod dag;
pub(crate) mod diskspace;
pub(crate) mod fs;
pub(crate) mod lock;

use std::path::Path;

use tracing::debug;

/// Check if a given executable is available on the system.
pub(crate) fn is_program_available(exe: &str) -> bool {
    if let Ok(path) = std::env::var("PATH") {
        for p in path.split(':') {
            if std::fs::metadata(Path::new(p).join(exe)).is_ok() {
                return true;
            }
        }
    }
    false
}

/// Refresh the runtime linker cache after a commit. Only meaningful when
/// operating on the live root; failures are logged and swallowed.
pub(crate) fn ldconfig(root: &Path) {
    if root != Path::new("/") || !is_program_available("ldconfig") {
        return;
    }
    debug!("running ldconfig");
    let _ = std::process::Command::new("ldconfig")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
}
