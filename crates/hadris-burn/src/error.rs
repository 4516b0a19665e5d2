//! Error kinds for the drive/session/verification engine.
//!
//! Each error *kind* from the original specification's error handling design
//! gets its own `thiserror`-derived enum; [`EngineError`] unifies them the
//! way [`hadris_iso::IsoImageError`] wraps its sub-errors.

/// Address/drive/write policy violations.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("address '{0}' is banned")]
    AddressBanned(String),
    #[error("address '{0}' is risky, prepend \"stdio:\" to accept it explicitly")]
    AddressRisky(String),
    #[error("writing to stdio is banned")]
    WriteStdioBanned,
    #[error("drive is not appendable")]
    NotAppendable,
    #[error("drive is not erasable")]
    NotErasable,
    #[error("exclusive access was not granted")]
    ExclusivityMissing,
    #[error("-multi is not allowed on this profile, a closed write is required")]
    MultiNotAllowed,
}

/// I/O and system resource failures.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("cannot open '{0}'")]
    CannotOpen(String),
    #[error("cannot read: {0}")]
    CannotRead(#[source] std::io::Error),
    #[error("cannot write: {0}")]
    CannotWrite(#[source] std::io::Error),
    #[error("out of memory")]
    OutOfMemory,
    #[error("failed to create worker thread")]
    ThreadCreateFailed,
    #[error("capability '{0}' is not available from the Image Tree adapter")]
    ImageTreeGap(&'static str),
}

/// On-media format violations.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("expected ISO 9660 primary volume descriptor at LBA {0}")]
    NotIso9660(u64),
    #[error("MBR partition 1 does not line up with the image end")]
    MbrMismatch,
    #[error("MD5 tag area is corrupted")]
    CorruptedMd5Area,
    #[error("failed to decode on-media structure: {0}")]
    DecodeFailure(String),
}

/// Verification-job bounds being reached.
#[derive(Debug, thiserror::Error)]
pub enum BoundsError {
    #[error("path is too long")]
    PathTooLong,
    #[error("item limit reached")]
    ItemLimit,
    #[error("time limit reached")]
    TimeLimit,
    #[error("abort file is present")]
    AbortFilePresent,
}

/// The burn backend reported that a write did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum BackendAbortError {
    #[error("backend reported failure: {0}")]
    WriteFailed(String),
    #[error("backend did not confirm completion before cancellation")]
    CancelledAfterTimeout,
}

/// Internal invariant violations. Always fatal; never guessed around.
#[derive(Debug, thiserror::Error)]
pub enum ProgramInvariantError {
    #[error("two distinct drives were re-assessed in a single call")]
    DualDriveReassessment,
    #[error("acquire requested with neither indev nor outdev role set")]
    NoRoleRequested,
    #[error("attempted to release a drive handle that is not owned")]
    HandleNotOwned,
}

/// Top-level error type returned by every fallible `hadris-burn` operation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Bounds(#[from] BoundsError),
    #[error(transparent)]
    BackendAbort(#[from] BackendAbortError),
    #[error(transparent)]
    ProgramInvariant(#[from] ProgramInvariantError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Iso(#[from] hadris_iso::IsoImageError),
}
