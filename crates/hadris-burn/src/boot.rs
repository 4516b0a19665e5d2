//! Boot Image Manager (Component H): El Torito staging, isohybrid / GRUB2
//! signature detection, and the non-MBR system-area slots that coexist
//! with El Torito.

use crate::diagnostic::{DiagnosticRecord, DiagnosticSink, Severity};
use bitflags::bitflags;
use hadris_iso::{EmulationType, PlatformId};

bitflags! {
    /// Stable on-media bit layout. Kept packed, unlike most in-process
    /// option sets, because this bitset leaves the process as part of the
    /// El Torito boot catalog.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BootPatchFlags: u16 {
        const BOOT_INFO_TABLE = 1 << 0;
        const MAKE_ISOHYBRID_MBR = 1 << 1;
        const EFI_HFSPLUS_PATCH = 0b1111_1100;
        const APM = 1 << 8;
        const GRUB2_BOOT_INFO = 1 << 9;
    }
}

/// A staged or attached El Torito entry, matching the Boot State entity.
#[derive(Debug, Clone)]
pub struct BootEntry {
    pub binary_path: String,
    pub catalog_path: String,
    pub emulation: EmulationType,
    pub load_size_bytes: u64,
    pub platform_id: PlatformId,
    pub id_string: [u8; 28],
    pub selection_criteria: [u8; 20],
    pub patch_flags: BootPatchFlags,
}

/// Non-MBR system areas that coexist with El Torito in distinct slots.
#[derive(Debug, Clone)]
pub enum SystemAreaSlot {
    ElTorito,
    Mbr,
    Gpt,
    MipsBootFileList(Vec<String>),
    SparcDiscLabel { core_node: Vec<u8> },
}

const MAX_LOAD_SIZE_512_UNITS: u64 = 65535;

/// Holds pending and attached boot images for the current session.
#[derive(Debug, Default)]
pub struct BootManager {
    pub attached: Vec<BootEntry>,
    pub pending: Vec<BootEntry>,
    pub attached_count: u32,
}

impl BootManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives `boot.cat` beside the binary's directory when the caller
    /// left `catalog_path` empty on first attachment.
    fn derive_catalog_path(binary_path: &str) -> String {
        match binary_path.rfind('/') {
            Some(idx) => format!("{}/boot.cat", &binary_path[..idx]),
            None => "boot.cat".to_string(),
        }
    }

    /// Attaches `entry` as the next boot image. The first attachment
    /// discards any pre-existing pending entry unless `keep` is set;
    /// attachment #2+ is always additive.
    pub fn stage(&mut self, mut entry: BootEntry, keep: bool) {
        if entry.catalog_path.is_empty() {
            entry.catalog_path = Self::derive_catalog_path(&entry.binary_path);
        }

        if self.pending.is_empty() || self.attached_count == 0 {
            if !keep {
                self.pending.clear();
            }
        }
        self.pending.push(entry);
    }

    /// Applies EFI defaults (no-emulation, `load_size = ceil(size/512)*512`)
    /// when `platform_id == 0xEF` and the caller asked for
    /// `efi_boot_partition` default behavior.
    pub fn apply_efi_default(entry: &mut BootEntry, file_size: u64, efi_boot_partition_default: bool) {
        if entry.platform_id == PlatformId::UEFI && efi_boot_partition_default {
            entry.emulation = EmulationType::NoEmulation;
            entry.load_size_bytes = file_size.div_ceil(512) * 512;
        }
    }

    /// Clamps `bytes / 512` to 65535 units, emitting a warning via `sink`
    /// when clamped, and returns the recorded 512-byte-unit count.
    pub fn clamp_load_size(load_size_bytes: u64, sink: &dyn DiagnosticSink) -> u16 {
        let units = load_size_bytes.div_ceil(512);
        if units > MAX_LOAD_SIZE_512_UNITS {
            sink.emit(DiagnosticRecord::new(
                Severity::Warning,
                "boot",
                format!(
                    "boot image load size clamped to {MAX_LOAD_SIZE_512_UNITS} blocks (was {units})"
                ),
            ));
            MAX_LOAD_SIZE_512_UNITS as u16
        } else {
            units as u16
        }
    }

    /// Commits all pending entries into `attached`, incrementing the
    /// attached counter.
    pub fn commit(&mut self) {
        self.attached_count += self.pending.len() as u32;
        self.attached.append(&mut self.pending);
    }
}

/// Reads bytes 64..67 of a boot image; `FB C0 78 70` marks isohybrid-ready.
pub fn is_isohybrid_ready(boot_image: &[u8]) -> bool {
    boot_image.len() >= 68 && boot_image[64..68] == [0xFB, 0xC0, 0x78, 0x70]
}

/// Reads the four-byte little-endian word at offset 2548; a match against
/// `(boot_image_lba * 4) + 5` confirms GRUB2 boot-info patching.
pub fn detect_grub2_boot_info(boot_image: &[u8], boot_image_lba: u32) -> bool {
    if boot_image.len() < 2552 {
        return false;
    }
    let word = u32::from_le_bytes(boot_image[2548..2552].try_into().unwrap());
    word == (boot_image_lba as u32).wrapping_mul(4).wrapping_add(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> BootEntry {
        BootEntry {
            binary_path: path.to_string(),
            catalog_path: String::new(),
            emulation: EmulationType::NoEmulation,
            load_size_bytes: 0,
            platform_id: PlatformId::X80X86,
            id_string: [0; 28],
            selection_criteria: [0; 20],
            patch_flags: BootPatchFlags::empty(),
        }
    }

    #[test]
    fn first_attachment_derives_boot_cat_path() {
        let mut mgr = BootManager::new();
        mgr.stage(entry("boot/isolinux.bin"), false);
        assert_eq!(mgr.pending[0].catalog_path, "boot/boot.cat");
    }

    #[test]
    fn efi_default_forces_no_emulation_and_rounds_load_size() {
        let mut e = entry("efi/bootx64.efi");
        e.platform_id = PlatformId::UEFI;
        BootManager::apply_efi_default(&mut e, 40 * 1024 * 1024 + 1, true);
        assert_eq!(e.emulation, EmulationType::NoEmulation);
        assert_eq!(e.load_size_bytes % 512, 0);
    }

    #[test]
    fn load_size_clamps_at_65535_with_warning() {
        let sink = crate::diagnostic::VecSink::new();
        let units = BootManager::clamp_load_size(40 * 1024 * 1024, &sink);
        assert_eq!(units, 65535);
        let records = sink.take();
        assert!(records[0].text.contains("65535 blocks"));
    }

    #[test]
    fn isohybrid_signature_detected() {
        let mut image = vec![0u8; 100];
        image[64..68].copy_from_slice(&[0xFB, 0xC0, 0x78, 0x70]);
        assert!(is_isohybrid_ready(&image));
    }

    #[test]
    fn grub2_boot_info_word_matches_formula() {
        let mut image = vec![0u8; 2600];
        let lba = 123u32;
        let value = lba * 4 + 5;
        image[2548..2552].copy_from_slice(&value.to_le_bytes());
        assert!(detect_grub2_boot_info(&image, lba));
        assert!(!detect_grub2_boot_info(&image, lba + 1));
    }

    #[test]
    fn committing_moves_pending_to_attached() {
        let mut mgr = BootManager::new();
        mgr.stage(entry("a.img"), false);
        mgr.stage(entry("b.img"), true);
        mgr.commit();
        assert_eq!(mgr.attached.len(), 2);
        assert_eq!(mgr.attached_count, 2);
        assert!(mgr.pending.is_empty());
    }
}
