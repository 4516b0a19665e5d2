//! Drive Handle lifecycle and the arena that enforces the
//! at-most-one-indev/at-most-one-outdev invariant across handles
//! (Component C).

use crate::backend::{BackendStatus, BurnBackend, DiscProfile, DiscStatus};
use crate::error::{EngineError, ProgramInvariantError};
use bitflags::bitflags;

bitflags! {
    /// Role bits, set once at acquire and never changed until release.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DriveRole: u8 {
        const INDEV = 0b01;
        const OUTDEV = 0b10;
    }
}

/// Opaque index into a [`DriveManager`] arena. Preferred over a reference
/// count so the image tree and the drive handles it is attached to do not
/// form a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriveId(usize);

/// One acquired target, matching the Drive Handle entity.
pub struct DriveHandle<B: BurnBackend> {
    pub address: String,
    pub role: DriveRole,
    pub exclusive: bool,
    pub(crate) backend_handle: B::Handle,
}

impl<B: BurnBackend> DriveHandle<B> {
    pub fn profile(&self, backend: &B) -> DiscProfile {
        backend.profile(&self.backend_handle)
    }

    pub fn disc_status(&self, backend: &B) -> DiscStatus {
        backend.disc_status(&self.backend_handle)
    }

    pub fn next_writable_address(&self, backend: &B) -> u64 {
        backend.next_writable_address(&self.backend_handle)
    }

    pub fn read_capacity(&self, backend: &B) -> u64 {
        backend.read_capacity(&self.backend_handle)
    }

    pub fn status(&self, backend: &B) -> BackendStatus {
        backend.status(&self.backend_handle)
    }

    pub fn read_block(&self, backend: &mut B, lba: u64, len: u32) -> Result<Vec<u8>, EngineError> {
        backend.read_block(&self.backend_handle, lba, len)
    }

    pub fn write_region(&self, backend: &mut B, lba: u64, bytes: &[u8]) -> Result<(), EngineError> {
        backend.write_region(&self.backend_handle, lba, bytes)
    }

    pub fn random_access_write(&self, backend: &mut B, offset: u64, bytes: &[u8]) -> Result<(), EngineError> {
        backend.random_access_write(&self.backend_handle, offset, bytes)
    }
}

/// Arena owning every acquired [`DriveHandle`], indexed by [`DriveId`], and
/// enforcing the at-most-one-indev / at-most-one-outdev invariant
/// (which spans handles, so it cannot live on `DriveHandle` itself).
pub struct DriveManager<B: BurnBackend> {
    backend: B,
    slots: Vec<Option<DriveHandle<B>>>,
    free_list: Vec<usize>,
    indev: Option<DriveId>,
    outdev: Option<DriveId>,
}

impl<B: BurnBackend> DriveManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slots: Vec::new(),
            free_list: Vec::new(),
            indev: None,
            outdev: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn get(&self, id: DriveId) -> Option<&DriveHandle<B>> {
        self.slots.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: DriveId) -> Option<&mut DriveHandle<B>> {
        self.slots.get_mut(id.0).and_then(|s| s.as_mut())
    }

    /// Splits the borrow so callers can drive I/O through the backend
    /// while still reading the handle's recorded address/role/profile,
    /// without the handle itself needing a `&mut B` of its own.
    pub fn split_mut(&mut self, id: DriveId) -> Option<(&mut B, &DriveHandle<B>)> {
        let Self { backend, slots, .. } = self;
        let handle = slots.get(id.0)?.as_ref()?;
        Some((backend, handle))
    }

    /// Acquires `effective_address` with the given role bits. Rejects a
    /// request with neither role bit set as a [`ProgramInvariantError`],
    /// and rejects acquiring a second indev/outdev while one is already
    /// held, matching the "FATAL, refuse" policy for simultaneous
    /// re-assessment of two distinct drives.
    pub fn acquire(
        &mut self,
        effective_address: &str,
        role: DriveRole,
        exclusive: bool,
    ) -> Result<DriveId, EngineError> {
        if role.is_empty() {
            return Err(ProgramInvariantError::NoRoleRequested.into());
        }
        if role.contains(DriveRole::INDEV) && self.indev.is_some() {
            return Err(ProgramInvariantError::DualDriveReassessment.into());
        }
        if role.contains(DriveRole::OUTDEV) && self.outdev.is_some() {
            return Err(ProgramInvariantError::DualDriveReassessment.into());
        }

        let backend_handle = self.backend.acquire(effective_address, exclusive)?;
        let handle = DriveHandle {
            address: effective_address.to_string(),
            role,
            exclusive,
            backend_handle,
        };

        let index = if let Some(index) = self.free_list.pop() {
            self.slots[index] = Some(handle);
            index
        } else {
            self.slots.push(Some(handle));
            self.slots.len() - 1
        };

        let id = DriveId(index);
        if role.contains(DriveRole::INDEV) {
            self.indev = Some(id);
        }
        if role.contains(DriveRole::OUTDEV) {
            self.outdev = Some(id);
        }
        Ok(id)
    }

    /// Releases the handle at `id`. `eject` only takes effect when the
    /// handle was acquired with exclusivity; otherwise the medium stays and
    /// the caller is expected to log a warning via the diagnostic sink.
    pub fn release(&mut self, id: DriveId, eject: bool) -> Result<(), EngineError> {
        let handle = self
            .slots
            .get_mut(id.0)
            .and_then(|s| s.take())
            .ok_or(ProgramInvariantError::HandleNotOwned)?;

        if self.indev == Some(id) {
            self.indev = None;
        }
        if self.outdev == Some(id) {
            self.outdev = None;
        }
        self.free_list.push(id.0);

        self.backend.release(handle.backend_handle, eject)
    }

    pub fn indev(&self) -> Option<DriveId> {
        self.indev
    }

    pub fn outdev(&self) -> Option<DriveId> {
        self.outdev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileBackend;

    #[test]
    fn acquire_with_no_role_is_program_invariant_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        let mut mgr = DriveManager::new(FileBackend::new());
        let err = mgr
            .acquire(&path.to_string_lossy(), DriveRole::empty(), false)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ProgramInvariant(ProgramInvariantError::NoRoleRequested)
        ));
    }

    #[test]
    fn second_indev_acquire_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.iso");
        let path_b = dir.path().join("b.iso");
        let mut mgr = DriveManager::new(FileBackend::new());
        mgr.acquire(&path_a.to_string_lossy(), DriveRole::INDEV, false)
            .unwrap();
        let err = mgr
            .acquire(&path_b.to_string_lossy(), DriveRole::INDEV, false)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ProgramInvariant(ProgramInvariantError::DualDriveReassessment)
        ));
    }

    #[test]
    fn indev_and_outdev_may_coincide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        let mut mgr = DriveManager::new(FileBackend::new());
        let id = mgr
            .acquire(&path.to_string_lossy(), DriveRole::INDEV | DriveRole::OUTDEV, false)
            .unwrap();
        assert_eq!(mgr.indev(), Some(id));
        assert_eq!(mgr.outdev(), Some(id));
    }

    #[test]
    fn release_then_reacquire_yields_same_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        let mut mgr = DriveManager::new(FileBackend::new());
        let id = mgr
            .acquire(&path.to_string_lossy(), DriveRole::INDEV, false)
            .unwrap();
        let profile_before = mgr.get(id).unwrap().profile(mgr.backend());
        mgr.release(id, false).unwrap();

        let id2 = mgr
            .acquire(&path.to_string_lossy(), DriveRole::INDEV, false)
            .unwrap();
        let profile_after = mgr.get(id2).unwrap().profile(mgr.backend());
        assert_eq!(profile_before, profile_after);
    }
}
