use std::cell::{Ref, RefCell, RefMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flume::{Receiver, Sender};
use once_cell::unsync::OnceCell;

use crate::config::{default_config_path, Config, ConfigBuilder};
use crate::db::{LocalDb, SyncDb};
use crate::error::{Error, Fallible};
use crate::event::{Event, EventBus};
use crate::trans::Transaction;

/// A handle representing a pact session.
///
/// A session owns the configuration, the database handles and the pending
/// transaction, and is threaded explicitly through every engine entry
/// point. The engine itself is single-threaded; the only cross-thread
/// pieces are the event bus endpoints and the interrupt flag.
#[derive(Debug)]
pub struct Session {
    /// [`Config`] for the session.
    config: RefCell<Config>,

    /// Full duplex channel for event transmission back and forth.
    event_bus: OnceCell<EventBus>,

    local_db: OnceCell<LocalDb>,
    sync_dbs: OnceCell<Vec<SyncDb>>,

    /// The pending transaction, if one has been initialized.
    trans: RefCell<Option<Transaction>>,

    /// Set (e.g. from a signal handler) to make the commit loops return at
    /// the next package boundary.
    interrupted: Arc<AtomicBool>,
}

impl Session {
    /// Create a new session using the default config path.
    pub fn new() -> Fallible<Session> {
        Self::new_with(default_config_path())
    }

    /// Create a new session with the given config path.
    ///
    /// # Errors
    ///
    /// This method will return an error if the config file exists but
    /// cannot be parsed.
    pub fn new_with<P: AsRef<Path>>(config_path: P) -> Fallible<Session> {
        let config = RefCell::new(ConfigBuilder::new(config_path).build()?);
        Ok(Session {
            config,
            event_bus: OnceCell::new(),
            local_db: OnceCell::new(),
            sync_dbs: OnceCell::new(),
            trans: RefCell::new(None),
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get an immutable reference to the config held by the session.
    pub fn config(&self) -> Ref<Config> {
        self.config.borrow()
    }

    /// Get a mutable reference to the config held by the session.
    pub(crate) fn config_mut(&self) -> Fallible<RefMut<Config>> {
        self.config.try_borrow_mut().map_err(|_| Error::ConfigInUse)
    }

    /// Get the event bus for the session.
    ///
    /// The event bus is used for transmitting [`events`][1] between the
    /// session backend and the caller frontend. It is created on first
    /// access; a session whose bus is never touched answers every question
    /// with its default.
    ///
    /// [1]: crate::Event
    pub fn event_bus(&self) -> &EventBus {
        self.event_bus.get_or_init(EventBus::new)
    }

    /// Get an outbound sender to emit events, when a bus is attached.
    pub(crate) fn emitter(&self) -> Option<Sender<Event>> {
        self.event_bus.get().map(|bus| bus.inner_sender())
    }

    /// Get the engine-side receiver of question answers.
    pub(crate) fn answer_receiver(&self) -> Option<Receiver<Event>> {
        self.event_bus.get().map(|bus| bus.inner_receiver())
    }

    /// Emit an event when a frontend is listening.
    pub(crate) fn emit(&self, event: Event) {
        if let Some(tx) = self.emitter() {
            let _ = tx.send(event);
        }
    }

    /// Ask the frontend a question and block for its answer.
    ///
    /// `extract` picks the matching `Prompt*Result` payload out of the
    /// inbound stream; unrelated inbound events are discarded. Without an
    /// attached frontend the question resolves to `default`.
    pub(crate) fn ask<T, F>(&self, question: Event, default: T, extract: F) -> T
    where
        F: Fn(Event) -> Option<T>,
    {
        let (tx, rx) = match (self.emitter(), self.answer_receiver()) {
            (Some(tx), Some(rx)) => (tx, rx),
            _ => return default,
        };
        if tx.send(question).is_err() {
            return default;
        }
        while let Ok(event) = rx.recv() {
            if let Some(answer) = extract(event) {
                return answer;
            }
        }
        default
    }

    /// Get a clonable handle to the interrupt flag, suitable for a signal
    /// handler.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    /// The local database of installed packages.
    pub fn local_db(&self) -> &LocalDb {
        self.local_db
            .get_or_init(|| LocalDb::new(self.config().local_db_path()))
    }

    /// The configured sync repositories, in configuration order.
    pub fn sync_dbs(&self) -> &[SyncDb] {
        self.sync_dbs.get_or_init(|| {
            let config = self.config();
            let dir = config.sync_db_path();
            config
                .repos()
                .iter()
                .map(|repo| SyncDb::new(&dir, repo.clone()))
                .collect()
        })
    }

    /// Look up a sync db by repo name.
    pub fn sync_db(&self, name: &str) -> Option<&SyncDb> {
        self.sync_dbs().iter().find(|db| db.name() == name)
    }

    pub(crate) fn trans_put(&self, trans: Transaction) -> Fallible<()> {
        let mut slot = self.trans.borrow_mut();
        if slot.is_some() {
            return Err(Error::Custom("a transaction is already active".into()));
        }
        *slot = Some(trans);
        Ok(())
    }

    /// Take the active transaction out of the session for the duration of
    /// an operation. Callers must put it back with [`trans_put`] or drop
    /// it via release.
    ///
    /// [`trans_put`]: Session::trans_put
    pub(crate) fn trans_take(&self) -> Fallible<Transaction> {
        self.trans
            .borrow_mut()
            .take()
            .ok_or(Error::TransNotInitialized)
    }

    pub(crate) fn trans_restore(&self, trans: Transaction) {
        *self.trans.borrow_mut() = Some(trans);
    }
}
