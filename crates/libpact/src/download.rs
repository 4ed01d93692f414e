//! Synchronous HTTP downloads into the package cache, with `.part` resume
//! files.

use std::io::{Read, Write};
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::constant::PART_SUFFIX;
use crate::db::SyncDb;
use crate::error::{Context, Error, Fallible};
use crate::event::{DownloadCtx, Event};
use crate::Session;

/// Find a finished file in the package cache.
pub(crate) fn filecache_find(session: &Session, filename: &str) -> Option<PathBuf> {
    let path = session.config().cache_path().join(filename);
    path.is_file().then_some(path)
}

/// Fetch one file into the cache, trying each server in order.
pub(crate) fn fetch_from_servers(
    session: &Session,
    servers: &[String],
    filename: &str,
) -> Fallible<()> {
    let mut last_err = None;
    for server in servers {
        let url = format!("{}/{}", server.trim_end_matches('/'), filename);
        match fetch_one(session, &url, filename) {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!("failed to download {}: {}", url, err);
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Custom(format!("no server carried {}", filename))))
}

fn fetch_one(session: &Session, url: &str, filename: &str) -> Fallible<()> {
    let cache = session.config().cache_path();
    crate::internal::fs::ensure_dir(&cache)
        .with_context(|| format!("failed to create cache dir {}", cache.display()))?;

    let part = cache.join(format!("{}{}", filename, PART_SUFFIX));
    let dest = cache.join(filename);

    let mut resume_from = std::fs::metadata(&part).map(|m| m.len()).unwrap_or(0);

    let mut request = ureq::get(url);
    if resume_from > 0 {
        debug!("resuming {} at byte {}", filename, resume_from);
        request = request.set("Range", &format!("bytes={}-", resume_from));
    }
    let response = request
        .call()
        .with_context(|| format!("request to {} failed", url))?;

    // server ignored the range request, start over
    if resume_from > 0 && response.status() != 206 {
        resume_from = 0;
    }

    let total = response
        .header("Content-Length")
        .and_then(|len| len.parse::<u64>().ok())
        .map(|len| len + resume_from)
        .unwrap_or(0);

    let mut out = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(resume_from > 0)
        .truncate(resume_from == 0)
        .open(&part)
        .with_context(|| format!("failed to open {}", part.display()))?;

    let mut reader = response.into_reader();
    let mut written = resume_from;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("read from {} failed", url))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .with_context(|| format!("failed to write {}", part.display()))?;
        written += n as u64;
        session.emit(Event::DownloadProgress(DownloadCtx {
            filename: filename.to_owned(),
            dlnow: written,
            dltotal: total,
        }));
    }
    drop(out);

    std::fs::rename(&part, &dest)
        .with_context(|| format!("failed to finalize {}", dest.display()))?;
    debug!("downloaded {}", dest.display());
    Ok(())
}

/// Fetch a repo's index into the sync db directory.
pub(crate) fn fetch_index(session: &Session, db: &SyncDb) -> Fallible<()> {
    if db.servers().is_empty() {
        return Err(Error::ServerNone(db.name().to_owned()));
    }
    let dest = db.file_path().to_owned();
    if let Some(parent) = dest.parent() {
        crate::internal::fs::ensure_dir(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let index_name = format!("{}.json", db.name());
    let mut last_err = None;
    for server in db.servers() {
        let url = format!("{}/{}", server.trim_end_matches('/'), index_name);
        let result = ureq::get(&url)
            .call()
            .with_context(|| format!("request to {} failed", url))
            .and_then(|response| {
                let mut buf = vec![];
                response
                    .into_reader()
                    .read_to_end(&mut buf)
                    .with_context(|| format!("read from {} failed", url))?;
                std::fs::write(&dest, buf)
                    .with_context(|| format!("failed to write {}", dest.display()))
            });
        match result {
            Ok(()) => {
                db.invalidate();
                return Ok(());
            }
            Err(err) => {
                warn!("failed to refresh {} from {}: {}", db.name(), url, err);
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::ServerNone(db.name().to_owned())))
}
