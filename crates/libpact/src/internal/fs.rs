use std::io;
use std::path::Path;

/// Ensure given `path` exists.
pub fn ensure_dir<P: AsRef<Path> + ?Sized>(path: &P) -> io::Result<()> {
    std::fs::create_dir_all(path.as_ref())
}

/// Count the live entries of a directory.
///
/// Returns `None` when the directory cannot be read; callers treat that
/// the same as "not empty" and keep the directory.
pub fn count_dir_entries<P: AsRef<Path>>(path: P) -> Option<usize> {
    std::fs::read_dir(path.as_ref())
        .map(|rd| rd.filter_map(Result::ok).count())
        .ok()
}

/// Check write access to a path the way the removability precheck wants
/// it: via `access(2)`, without following the final symlink's target
/// permissions into account (a dangling symlink is removable).
///
/// Returns `Ok(())` on success and the `errno` value on failure.
pub fn writable(path: &Path) -> Result<(), i32> {
    use std::os::unix::ffi::OsStrExt;

    let cpath = match std::ffi::CString::new(path.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => return Err(libc::EINVAL),
    };
    // SAFETY: cpath is a valid NUL-terminated string for the call duration.
    let ret = unsafe { libc::access(cpath.as_ptr(), libc::W_OK) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}
