use flume::{Receiver, Sender};

/// Events transmitted between the engine backend and the caller frontend.
///
/// Plain variants are notifications. `Prompt*` variants are questions: the
/// engine emits the question and blocks until the frontend sends back the
/// matching `Prompt*Result` variant through [`EventBus::sender`]. When no
/// event bus is attached to the session, every question resolves to its
/// default answer (refuse, or the first provider).
#[derive(Debug)]
#[non_exhaustive]
pub enum Event {
    CheckDepsStart,
    CheckDepsDone,
    ResolveDepsStart,
    ResolveDepsDone,
    InterConflictsStart,
    InterConflictsDone,
    FileConflictsStart,
    FileConflictsDone,
    IntegrityStart,
    IntegrityDone,
    LoadStart,
    LoadDone,
    DiskSpaceStart,
    DiskSpaceDone,

    /// Package downloads for the given repo are about to begin.
    RetrieveStart(String),
    DownloadProgress(DownloadCtx),

    AddStart(PackageCtx),
    AddDone(PackageCtx),
    AddProgress(ProgressCtx),
    RemoveStart(PackageCtx),
    RemoveDone(PackageCtx),
    RemoveProgress(ProgressCtx),
    UpgradeStart(UpgradeCtx),
    UpgradeDone(UpgradeCtx),

    /// A `Needed` sync target was dropped because the installed version is
    /// already up to date.
    TargetUpToDate(PackageCtx),

    /// A question asking whether an ignored package should be installed
    /// anyway.
    PromptInstallIgnored(PackageCtx),
    PromptInstallIgnoredResult(bool),

    /// A question asking whether a local package should be replaced by a
    /// sync package declaring it obsolete.
    PromptReplacePackage(ReplaceCtx),
    PromptReplacePackageResult(bool),

    /// A question asking whether the local package conflicting with a
    /// target may be removed.
    PromptConflictRemove(ConflictCtx),
    PromptConflictRemoveResult(bool),

    /// A question asking whether a corrupted download may be deleted from
    /// the cache.
    PromptCorruptedDelete(CorruptedCtx),
    PromptCorruptedDeleteResult(bool),

    /// A question asking whether unresolvable targets should be dropped
    /// from the transaction rather than failing it.
    PromptRemoveUnresolvable(Vec<String>),
    PromptRemoveUnresolvableResult(bool),

    /// A question asking which of several satisfying providers should be
    /// pulled for a dependency. The answer is an index into the provider
    /// list.
    PromptSelectProvider(ProviderCtx),
    PromptSelectProviderResult(usize),
}

#[derive(Clone, Debug)]
pub struct PackageCtx {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug)]
pub struct UpgradeCtx {
    pub name: String,
    pub old_version: String,
    pub new_version: String,
}

#[derive(Clone, Debug)]
pub struct ReplaceCtx {
    pub oldpkg: String,
    pub newpkg: String,
    pub repo: String,
}

#[derive(Clone, Debug)]
pub struct ConflictCtx {
    /// The transaction target.
    pub target: String,
    /// The installed package it conflicts with.
    pub local: String,
    /// The conflict expression that matched.
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct CorruptedCtx {
    pub filename: String,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct ProviderCtx {
    pub depend: String,
    pub providers: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DownloadCtx {
    pub filename: String,
    pub dlnow: u64,
    pub dltotal: u64,
}

#[derive(Clone, Debug)]
pub struct ProgressCtx {
    pub name: String,
    pub percent: u8,
    pub current: usize,
    pub total: usize,
}

/// Full duplex channel pair for event transmission back and forth.
///
/// The outbound channel carries engine events to the frontend, the inbound
/// channel carries question answers back. Both ends are clonable so the
/// frontend may drain events from a separate thread while the engine stays
/// single-threaded.
#[derive(Debug)]
pub struct EventBus {
    outbound_tx: Sender<Event>,
    outbound_rx: Receiver<Event>,
    inbound_tx: Sender<Event>,
    inbound_rx: Receiver<Event>,
}

impl EventBus {
    pub(crate) fn new() -> EventBus {
        let (outbound_tx, outbound_rx) = flume::unbounded();
        let (inbound_tx, inbound_rx) = flume::unbounded();
        EventBus {
            outbound_tx,
            outbound_rx,
            inbound_tx,
            inbound_rx,
        }
    }

    /// Get the frontend receiver of engine events.
    pub fn receiver(&self) -> Receiver<Event> {
        self.outbound_rx.clone()
    }

    /// Get the frontend sender used to answer questions.
    pub fn sender(&self) -> Sender<Event> {
        self.inbound_tx.clone()
    }

    /// Engine side outbound sender.
    pub(crate) fn inner_sender(&self) -> Sender<Event> {
        self.outbound_tx.clone()
    }

    /// Engine side inbound receiver.
    pub(crate) fn inner_receiver(&self) -> Receiver<Event> {
        self.inbound_rx.clone()
    }
}
