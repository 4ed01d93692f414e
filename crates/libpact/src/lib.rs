//! This crate is the transaction engine of [pact], a system package
//! manager. It is a library crate: given a set of requested package
//! operations (install, upgrade, remove, full system upgrade) it plans a
//! consistent sequence of package additions and removals, validates it
//! against the installed set and the repository metadata, and executes it
//! on the live filesystem with controlled failure behavior. End users
//! want the `pact` CLI, a reference frontend built on top of this crate.
//!
//! # Overview
//!
//! The primary type in this crate is a [`Session`], which is an entry
//! point to this crate. A session instance is a handle to the engine's
//! state; most of the functions exposed by this crate take a session as
//! their first argument. Transactions are driven through the
//! [`operation`] module and report back through the session's
//! [`event bus`][EventBus]: notifications flow out, questions block until
//! the frontend answers.
//!
//! ## Examples
//!
//! Initialize a session against the default root and list the installed
//! packages:
//!
//! ```no_run
//! use libpact::{operation, Session};
//! let session = Session::new().expect("failed to create session");
//! let installed = operation::package_query(&session, &[], &[], true).unwrap();
//! println!("{} package(s) installed", installed.len());
//! ```
//!
//! [pact]: https://github.com/pact-pm/pact

mod add;
mod config;
mod conflict;
mod constant;
mod db;
mod deps;
mod download;
mod error;
mod event;
mod internal;
mod package;
mod remove;
mod session;
mod sync;
mod trans;

pub mod operation;

pub use config::{Config, RepoConfig, SigLevel};
pub use conflict::{Conflict, FileConflict, FileConflictKind};
pub use db::{DbStatus, LocalDb, SyncDb};
pub use deps::DepMissing;
pub use error::{Error, Fallible};
pub use event::{
    ConflictCtx, CorruptedCtx, DownloadCtx, Event, EventBus, PackageCtx, ProgressCtx, ProviderCtx,
    ReplaceCtx, UpgradeCtx,
};
pub use package::files;
pub use package::version::vercmp;
pub use package::{
    Backup, DepMod, Depend, FileEntry, Package, PackageOrigin, PackageReason, Validation,
};
pub use session::Session;
pub use trans::{InstallSummary, TransFlag, TransState, TransSummary};

// frontends drain the event bus from their own threads and need the
// channel types the bus hands out
pub use flume;
