//! Write Options & Session Planner (Component F).

use crate::backend::DiscProfile;
use crate::backend::DiscStatus;
use crate::error::{EngineError, FormatError, PolicyError};
use crate::toc::SessionInfo;
use hadris_iso::PlatformId;

/// SAO (Session-At-Once) vs TAO (Track-At-Once) write mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Sao,
    Tao,
}

/// Chooses [`WriteType`] when the caller did not force one: SAO on blank
/// CD, TAO on appendable; DVD-RW sequential and DVD-R DL reject `-multi`
/// and demand a closed (non-multi) write.
pub fn choose_write_type(
    profile: DiscProfile,
    status: DiscStatus,
    multi: bool,
) -> Result<WriteType, PolicyError> {
    if matches!(
        profile,
        DiscProfile::DVD_RW_SEQUENTIAL | DiscProfile::DVD_R_DL
    ) && multi
    {
        return Err(PolicyError::MultiNotAllowed);
    }

    Ok(match status {
        DiscStatus::Blank if profile.is_cd() => WriteType::Sao,
        DiscStatus::Appendable => WriteType::Tao,
        _ => WriteType::Sao,
    })
}

/// Padding inputs for [`compute_padding`].
#[derive(Debug, Clone, Copy)]
pub struct PaddingConfig {
    pub user_padding_bytes: u64,
    pub profile: DiscProfile,
    pub image_blocks: u64,
    pub no_emul_toc: bool,
    pub alignment: u64,
    pub is_blank: bool,
    pub nwa: u64,
    /// Set when padding is delegated to the image library (libjte, or an
    /// explicit `do_padding_by_libisofs` flag).
    pub padding_delegated: bool,
}

/// Result of the five-step padding formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingResult {
    /// Padding the burner itself should insert.
    pub burner_padding: u64,
    /// Padding the image library should insert instead, when delegated.
    pub library_padding: u64,
    pub alignment: u64,
    /// Image blocks as adjusted by step 3 (pre-NWA blocks counted in).
    pub image_blocks: u64,
}

const SECTOR_SIZE: u64 = 2048;

pub fn compute_padding(cfg: &PaddingConfig) -> PaddingResult {
    // Step 1: round user padding up to 2 KiB.
    let mut padding_blocks = cfg.user_padding_bytes.div_ceil(SECTOR_SIZE);
    let mut image_blocks = cfg.image_blocks;
    let mut alignment = cfg.alignment;

    // Step 2: CD-R/CD-RW sessions must be at least 300 sectors.
    if cfg.profile.is_cd() {
        let total = image_blocks + padding_blocks;
        if total < 300 {
            padding_blocks += 300 - total;
        }
    }

    // Step 3: emulated TOC with no alignment forces 32-block alignment; on
    // blank media, pre-NWA blocks count as image blocks.
    if cfg.no_emul_toc && alignment == 0 {
        alignment = 32;
        if cfg.is_blank {
            image_blocks += cfg.nwa;
        }
    }

    // Step 4: delegated padding moves the count to the library instead of
    // the burner.
    let (burner_padding, library_padding) = if cfg.padding_delegated {
        (0, padding_blocks)
    } else {
        (padding_blocks, 0)
    };

    // Step 5: extend further so (nwa + image + padding) % alignment == 0.
    let mut burner_padding = burner_padding;
    if alignment > 0 {
        let total = cfg.nwa + image_blocks + burner_padding + library_padding;
        let remainder = total % alignment;
        if remainder != 0 {
            let extra = alignment - remainder;
            if cfg.padding_delegated {
                return PaddingResult {
                    burner_padding: 0,
                    library_padding: library_padding + extra,
                    alignment,
                    image_blocks,
                };
            }
            burner_padding += extra;
        }
    }

    PaddingResult {
        burner_padding,
        library_padding,
        alignment,
        image_blocks,
    }
}

/// Where the 32 KiB system-area image comes from, in priority order.
#[derive(Debug, Clone)]
pub enum SystemAreaSource {
    ExplicitPath(std::path::PathBuf),
    DevZero,
    ImageLibraryReported,
}

/// MBR partition-1 alignment tolerance for system-area patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTolerance {
    /// Basic patching requires an exact match.
    Exact,
    /// Isohybrid patching tolerates drift up to `63 * 256` sectors.
    Isohybrid,
}

const SYSTEM_AREA_LEN: usize = 32 * 1024;

/// Reads or synthesizes the 32 KiB system area, validating MBR partition-1
/// alignment against the image end within `tolerance` when `patch` is
/// requested. Disables patching (returns the area unpatched) rather than
/// corrupting the MBR when the check fails.
pub fn build_system_area(
    source: &SystemAreaSource,
    patch: bool,
    tolerance: PatchTolerance,
    image_end_lba: u64,
    image_library_area: impl Fn() -> Result<[u8; SYSTEM_AREA_LEN], EngineError>,
) -> Result<([u8; SYSTEM_AREA_LEN], bool), EngineError> {
    let mut area = match source {
        SystemAreaSource::ExplicitPath(path) => {
            let bytes = std::fs::read(path).map_err(|e| {
                EngineError::Resource(crate::error::ResourceError::CannotRead(e))
            })?;
            let mut buf = [0u8; SYSTEM_AREA_LEN];
            let len = bytes.len().min(SYSTEM_AREA_LEN);
            buf[..len].copy_from_slice(&bytes[..len]);
            buf
        }
        SystemAreaSource::DevZero => [0u8; SYSTEM_AREA_LEN],
        SystemAreaSource::ImageLibraryReported => image_library_area()?,
    };

    if !patch {
        return Ok((area, false));
    }

    let partition_offset =
        u32::from_le_bytes([area[454], area[455], area[456], area[457]]) as u64 * 4;
    let partition_len = u32::from_le_bytes([area[458], area[459], area[460], area[461]]) as u64 * 4;
    let expected_end = partition_offset + partition_len;

    let tolerance_sectors = match tolerance {
        PatchTolerance::Exact => 0,
        PatchTolerance::Isohybrid => 63 * 256,
    };

    let aligned = expected_end.abs_diff(image_end_lba) <= tolerance_sectors;
    if !aligned {
        // Disable patching rather than corrupt the MBR.
        return Ok((area, false));
    }

    let new_len = (image_end_lba - partition_offset) / 4;
    area[458..462].copy_from_slice(&(new_len as u32).to_le_bytes());

    Ok((area, true))
}

/// PVD timestamp set: creation/modification/expiration/effective, plus a
/// UUID string, matching the Session Plan entity.
#[derive(Debug, Clone)]
pub struct PvdTimeSet {
    pub creation: String,
    pub modification: String,
    pub expiration: String,
    pub effective: String,
    pub uuid: String,
}

/// Per-image boot parameters recorded in a [`SessionPlan`].
#[derive(Debug, Clone)]
pub struct PlannedBootImage {
    pub platform_id: PlatformId,
    pub load_size_512_units: u16,
    pub id_string: [u8; 28],
    pub selection_criteria: [u8; 20],
    pub patch_flags: crate::boot::BootPatchFlags,
}

/// Ephemeral bundle produced per write, consumed by one call to
/// [`crate::pipeline::run_pipeline`] and then discarded.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub output_charset: String,
    pub iso_level: u8,
    pub relaxation: RelaxationFlags,
    pub boot_images: Vec<PlannedBootImage>,
    pub partition_offset: u64,
    pub sectors_per_head: u32,
    pub heads_per_cylinder: u32,
    pub system_area: [u8; SYSTEM_AREA_LEN],
    pub appended_partitions: Vec<(u8, std::path::PathBuf)>,
    pub hfsplus_block_size: u32,
    pub pvd_times: PvdTimeSet,
    pub padding: PaddingResult,
    pub stream_recording_start_lba: u64,
    pub write_type: WriteType,
}

bitflags::bitflags! {
    /// Relaxation bit set, one bit per ISO 9660 compliance relaxation the
    /// caller opted into.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RelaxationFlags: u32 {
        const ALLOW_LOWERCASE = 0b0001;
        const ALLOW_LONG_NAMES = 0b0010;
        const OMIT_VERSION_NUMBERS = 0b0100;
        const NO_FORCE_DOTS = 0b1000;
    }
}

pub fn session_start_for_growth(existing_sessions: &[SessionInfo]) -> u64 {
    existing_sessions
        .iter()
        .map(|s| s.start_block + s.block_count)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_sao_on_blank_cd_and_tao_on_appendable() {
        assert_eq!(
            choose_write_type(DiscProfile::CD_R, DiscStatus::Blank, false).unwrap(),
            WriteType::Sao
        );
        assert_eq!(
            choose_write_type(DiscProfile::CD_R, DiscStatus::Appendable, false).unwrap(),
            WriteType::Tao
        );
    }

    #[test]
    fn dvd_rw_sequential_rejects_multi() {
        let err = choose_write_type(DiscProfile::DVD_RW_SEQUENTIAL, DiscStatus::Appendable, true)
            .unwrap_err();
        assert!(matches!(err, PolicyError::MultiNotAllowed));
    }

    #[test]
    fn cd_padding_extends_to_300_sectors() {
        let result = compute_padding(&PaddingConfig {
            user_padding_bytes: 0,
            profile: DiscProfile::CD_R,
            image_blocks: 50,
            no_emul_toc: false,
            alignment: 0,
            is_blank: true,
            nwa: 0,
            padding_delegated: false,
        });
        assert_eq!(50 + result.burner_padding, 300);
    }

    #[test]
    fn alignment_forces_padding_to_satisfy_modulus() {
        let result = compute_padding(&PaddingConfig {
            user_padding_bytes: 0,
            profile: DiscProfile::NON_REMOVABLE,
            image_blocks: 1000,
            no_emul_toc: false,
            alignment: 32,
            is_blank: false,
            nwa: 10,
            padding_delegated: false,
        });
        assert_eq!((10 + 1000 + result.burner_padding) % 32, 0);
    }

    #[test]
    fn no_emul_toc_forces_alignment_32_and_counts_pre_nwa_blocks() {
        let result = compute_padding(&PaddingConfig {
            user_padding_bytes: 0,
            profile: DiscProfile::NON_REMOVABLE,
            image_blocks: 100,
            no_emul_toc: true,
            alignment: 0,
            is_blank: true,
            nwa: 16,
            padding_delegated: false,
        });
        assert_eq!(result.alignment, 32);
        assert_eq!(result.image_blocks, 116);
    }

    #[test]
    fn delegated_padding_moves_count_to_library() {
        let result = compute_padding(&PaddingConfig {
            user_padding_bytes: 4096,
            profile: DiscProfile::NON_REMOVABLE,
            image_blocks: 100,
            no_emul_toc: false,
            alignment: 0,
            is_blank: false,
            nwa: 0,
            padding_delegated: true,
        });
        assert_eq!(result.burner_padding, 0);
        assert_eq!(result.library_padding, 2);
    }

    #[test]
    fn system_area_patch_disabled_on_mismatch() {
        let mut area = [0u8; SYSTEM_AREA_LEN];
        area[454..458].copy_from_slice(&(100u32 / 4).to_le_bytes());
        area[458..462].copy_from_slice(&(50u32 / 4).to_le_bytes());
        let source = SystemAreaSource::ImageLibraryReported;
        let (_area, patched) = build_system_area(
            &source,
            true,
            PatchTolerance::Exact,
            10_000,
            || Ok(area),
        )
        .unwrap();
        assert!(!patched);
    }
}
