//! The Burn Backend external collaborator contract and the one shipped
//! implementation: [`FileBackend`], a stdio-class backend over a plain
//! file, standing in for the "always available without hardware" emulation
//! class the original names.

use crate::error::{EngineError, ResourceError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// MMC profile number, as reported by GET CONFIGURATION / mode sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscProfile(pub u16);

impl DiscProfile {
    pub const CD_R: DiscProfile = DiscProfile(0x09);
    pub const CD_RW: DiscProfile = DiscProfile(0x0A);
    pub const DVD_RW_SEQUENTIAL: DiscProfile = DiscProfile(0x14);
    pub const DVD_RW_RESTRICTED_OVERWRITE: DiscProfile = DiscProfile(0x13);
    pub const DVD_R_DL: DiscProfile = DiscProfile(0x15);
    pub const DVD_PLUS_RW: DiscProfile = DiscProfile(0x1A);
    pub const DVD_PLUS_RAM: DiscProfile = DiscProfile(0x12);
    pub const BD_R_SRM: DiscProfile = DiscProfile(0x41);
    pub const BD_RE: DiscProfile = DiscProfile(0x43);
    pub const NON_REMOVABLE: DiscProfile = DiscProfile(0x01);

    pub fn name(self) -> &'static str {
        match self.0 {
            0x09 => "CD-R",
            0x0A => "CD-RW",
            0x12 => "DVD+RAM",
            0x13 => "DVD-RW restricted overwrite",
            0x14 => "DVD-RW sequential",
            0x15 => "DVD-R/DL sequential",
            0x1A => "DVD+RW",
            0x41 => "BD-R SRM",
            0x43 => "BD-RE",
            0x01 => "non-removable disk",
            _ => "unknown",
        }
    }

    pub fn is_cd(self) -> bool {
        matches!(self.0, 0x09 | 0x0A)
    }

    pub fn is_bd(self) -> bool {
        matches!(self.0, 0x40..=0x43)
    }
}

/// Media status, mirrors the Drive Handle's `status` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscStatus {
    Blank,
    Appendable,
    Full,
    Empty,
    Unsuitable,
}

/// Role bits recorded at acquire time, see [`crate::drive::DriveRole`] for
/// the bitflags wrapper used by `DriveHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    NativeMmc,
    StdioRandomRw,
    StdioSequentialW,
    StdioRandomR,
    Null,
}

/// Result of an MMC-only operation on a backend that doesn't support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmcOnlyResult<T> {
    Value(T),
    NotApplicable,
}

/// Backend poll state, driving the Burn Pipeline's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Spawning,
    Writing,
    ClosingSession,
    ClosingTrack,
    Formatting,
    Idle,
}

/// A snapshot of backend progress, returned by each poll of
/// [`BurnBackend::status`]: current/total sector and FIFO buffer
/// capacity/availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    pub state: BackendState,
    pub sector: u64,
    pub sectors: u64,
    pub buffer_capacity: u32,
    pub buffer_available: u32,
}

/// Write-time options, mirroring the write-options object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub stream_recording_start: u64,
    pub dvd_obs_size: u32,
    pub stdio_fsync_period: u32,
    pub simulate: bool,
    pub multi_session: bool,
    pub track_at_once: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            stream_recording_start: 0,
            dvd_obs_size: 64 * 1024,
            stdio_fsync_period: 0,
            simulate: false,
            multi_session: false,
            track_at_once: false,
        }
    }
}

/// Format/blank request kinds consumed by [`crate::format_control`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRequestKind {
    Blank { fast: bool },
    Format,
}

/// Opaque acquired-target handle as seen by a concrete backend
/// implementation. `hadris-burn`'s own [`crate::drive::DriveHandle`] wraps
/// this plus the role bitset and exclusivity flag the engine tracks.
pub trait BackendHandle: std::fmt::Debug {}

/// The external collaborator contract. Object-safe so
/// [`crate::drive::DriveManager`] can hold a boxed backend without knowing
/// its concrete type.
pub trait BurnBackend {
    type Handle: BackendHandle;

    fn is_mmc_path(&self, path: &str) -> bool;

    fn acquire(&mut self, effective_address: &str, exclusive: bool) -> Result<Self::Handle, EngineError>;
    fn release(&mut self, handle: Self::Handle, eject: bool) -> Result<(), EngineError>;

    fn profile(&self, handle: &Self::Handle) -> DiscProfile;
    fn disc_status(&self, handle: &Self::Handle) -> DiscStatus;
    fn next_writable_address(&self, handle: &Self::Handle) -> u64;
    fn read_capacity(&self, handle: &Self::Handle) -> u64;

    fn read_block(&mut self, handle: &Self::Handle, lba: u64, len: u32) -> Result<Vec<u8>, EngineError>;
    fn write_region(&mut self, handle: &Self::Handle, lba: u64, bytes: &[u8]) -> Result<(), EngineError>;
    fn random_access_write(&mut self, handle: &Self::Handle, offset: u64, bytes: &[u8]) -> Result<(), EngineError>;

    fn format(&mut self, handle: &Self::Handle, size: u64, kind: FormatRequestKind) -> Result<(), EngineError>;
    fn blank(&mut self, handle: &Self::Handle, fast: bool) -> Result<(), EngineError>;

    fn snooze(&mut self, handle: &Self::Handle);
    fn read_speed_list(&self, handle: &Self::Handle) -> MmcOnlyResult<Vec<u32>>;
    fn read_atip(&self, handle: &Self::Handle) -> MmcOnlyResult<Vec<u8>>;

    fn status(&self, handle: &Self::Handle) -> BackendStatus;
    fn cancel_prepared_write(&mut self, handle: &Self::Handle) -> Result<(), EngineError>;
}

/// A [`BackendHandle`] over a plain [`std::fs::File`]. Models "blank" as
/// zero-length/absent and "appendable" via a recorded NWA in a sidecar
/// `.nwa` file, matching the stdio emulation device class.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: File,
    exclusive: bool,
}

impl BackendHandle for FileHandle {}

/// Backend implementation over plain files, standing in for the stdio
/// random-RW device class. MMC-only queries (ATIP, speed list) always
/// answer [`MmcOnlyResult::NotApplicable`].
#[derive(Debug, Default)]
pub struct FileBackend;

impl FileBackend {
    pub fn new() -> Self {
        Self
    }

    fn nwa_sidecar(path: &Path) -> PathBuf {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(".nwa");
        PathBuf::from(sidecar)
    }

    fn read_nwa(path: &Path) -> Option<u64> {
        std::fs::read_to_string(Self::nwa_sidecar(path))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    fn write_nwa(path: &Path, nwa: u64) -> std::io::Result<()> {
        std::fs::write(Self::nwa_sidecar(path), nwa.to_string())
    }
}

impl BurnBackend for FileBackend {
    type Handle = FileHandle;

    fn is_mmc_path(&self, _path: &str) -> bool {
        false
    }

    fn acquire(&mut self, effective_address: &str, exclusive: bool) -> Result<Self::Handle, EngineError> {
        let path = effective_address
            .strip_prefix("stdio:")
            .unwrap_or(effective_address);
        let path = PathBuf::from(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| EngineError::Resource(ResourceError::CannotOpen(e.to_string())))?;
        Ok(FileHandle {
            path,
            file,
            exclusive,
        })
    }

    fn release(&mut self, handle: Self::Handle, eject: bool) -> Result<(), EngineError> {
        if eject && !handle.exclusive {
            // A non-exclusive release does not
            // eject; the caller's diagnostic sink should warn separately.
            return Ok(());
        }
        drop(handle);
        Ok(())
    }

    fn profile(&self, _handle: &Self::Handle) -> DiscProfile {
        DiscProfile::NON_REMOVABLE
    }

    fn disc_status(&self, handle: &Self::Handle) -> DiscStatus {
        match handle.file.metadata() {
            Ok(meta) if meta.len() == 0 => DiscStatus::Blank,
            Ok(_) => DiscStatus::Appendable,
            Err(_) => DiscStatus::Unsuitable,
        }
    }

    fn next_writable_address(&self, handle: &Self::Handle) -> u64 {
        if let Some(nwa) = Self::read_nwa(&handle.path) {
            return nwa;
        }
        match handle.file.metadata() {
            Ok(meta) => meta.len() / 2048,
            Err(_) => 0,
        }
    }

    fn read_capacity(&self, handle: &Self::Handle) -> u64 {
        handle.file.metadata().map(|m| m.len() / 2048).unwrap_or(0)
    }

    fn read_block(&mut self, handle: &Self::Handle, lba: u64, len: u32) -> Result<Vec<u8>, EngineError> {
        let mut file = handle.file.try_clone().map_err(ResourceError::CannotRead)?;
        file.seek(SeekFrom::Start(lba * 2048))
            .map_err(ResourceError::CannotRead)?;
        let mut buf = vec![0u8; len as usize * 2048];
        file.read_exact(&mut buf).map_err(ResourceError::CannotRead)?;
        Ok(buf)
    }

    fn write_region(&mut self, handle: &Self::Handle, lba: u64, bytes: &[u8]) -> Result<(), EngineError> {
        let mut file = handle.file.try_clone().map_err(ResourceError::CannotWrite)?;
        file.seek(SeekFrom::Start(lba * 2048))
            .map_err(ResourceError::CannotWrite)?;
        file.write_all(bytes).map_err(ResourceError::CannotWrite)?;
        Self::write_nwa(&handle.path, lba + (bytes.len() as u64 / 2048))
            .map_err(ResourceError::CannotWrite)?;
        Ok(())
    }

    fn random_access_write(&mut self, handle: &Self::Handle, offset: u64, bytes: &[u8]) -> Result<(), EngineError> {
        let mut file = handle.file.try_clone().map_err(ResourceError::CannotWrite)?;
        file.seek(SeekFrom::Start(offset)).map_err(ResourceError::CannotWrite)?;
        file.write_all(bytes).map_err(ResourceError::CannotWrite)?;
        Ok(())
    }

    fn format(&mut self, handle: &Self::Handle, size: u64, _kind: FormatRequestKind) -> Result<(), EngineError> {
        handle.file.set_len(size).map_err(ResourceError::CannotWrite)?;
        Ok(())
    }

    fn blank(&mut self, handle: &Self::Handle, _fast: bool) -> Result<(), EngineError> {
        handle.file.set_len(0).map_err(ResourceError::CannotWrite)?;
        let _ = std::fs::remove_file(Self::nwa_sidecar(&handle.path));
        Ok(())
    }

    fn snooze(&mut self, _handle: &Self::Handle) {}

    fn read_speed_list(&self, _handle: &Self::Handle) -> MmcOnlyResult<Vec<u32>> {
        MmcOnlyResult::NotApplicable
    }

    fn read_atip(&self, _handle: &Self::Handle) -> MmcOnlyResult<Vec<u8>> {
        MmcOnlyResult::NotApplicable
    }

    fn status(&self, handle: &Self::Handle) -> BackendStatus {
        let sectors = self.read_capacity(handle);
        BackendStatus {
            state: BackendState::Idle,
            sector: sectors,
            sectors,
            buffer_capacity: 100,
            buffer_available: 100,
        }
    }

    fn cancel_prepared_write(&mut self, _handle: &Self::Handle) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_file_reports_blank_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        let mut backend = FileBackend::new();
        let handle = backend.acquire(&path.to_string_lossy(), false).unwrap();
        assert_eq!(backend.disc_status(&handle), DiscStatus::Blank);
        assert_eq!(backend.next_writable_address(&handle), 0);
    }

    #[test]
    fn write_region_advances_next_writable_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        let mut backend = FileBackend::new();
        let handle = backend.acquire(&path.to_string_lossy(), false).unwrap();
        let bytes = vec![0xABu8; 4096];
        backend.write_region(&handle, 0, &bytes).unwrap();
        assert_eq!(backend.next_writable_address(&handle), 2);
    }

    #[test]
    fn mmc_only_queries_are_not_applicable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        let mut backend = FileBackend::new();
        let handle = backend.acquire(&path.to_string_lossy(), false).unwrap();
        assert_eq!(backend.read_atip(&handle), MmcOnlyResult::NotApplicable);
        assert_eq!(backend.read_speed_list(&handle), MmcOnlyResult::NotApplicable);
    }

    #[test]
    fn release_without_exclusivity_does_not_eject() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        let mut backend = FileBackend::new();
        let handle = backend.acquire(&path.to_string_lossy(), false).unwrap();
        assert!(backend.release(handle, true).is_ok());
    }
}
