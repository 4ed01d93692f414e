use std::path::Path;

use sysinfo::{DiskExt, System, SystemExt};
use tracing::debug;

use crate::error::{Error, Fallible};

/// Check that the filesystem holding the install root can absorb the
/// transaction's net installed size plus a safety margin for the database
/// entries.
pub fn check(root: &Path, needed: i64) -> Fallible<()> {
    if needed <= 0 {
        return Ok(());
    }
    let needed = needed as u64 + needed as u64 / 10;

    let mut sys = System::new();
    sys.refresh_disks_list();

    // pick the mounted filesystem with the longest prefix of the root
    let available = sys
        .disks()
        .iter()
        .filter(|disk| root.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space());

    match available {
        // no matching mount found: nothing sensible to enforce
        None => Ok(()),
        Some(available) if available >= needed => {
            debug!(needed, available, "disk space check passed");
            Ok(())
        }
        Some(available) => Err(Error::DiskSpace { needed, available }),
    }
}
