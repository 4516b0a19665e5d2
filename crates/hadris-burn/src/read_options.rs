//! Read Options & Image Loader (Component E).

use crate::config::Configuration;
use crate::diagnostic::{DiagnosticRecord, DiagnosticSink, Severity};
use crate::drive::{DriveHandle, DriveManager};
use crate::error::EngineError;
use crate::image_tree;
use hadris_iso::{IsoImage, ReadWriteSeek};

/// Read-side flags assembled before loading an image.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub disable_1999: bool,
    pub disable_aaip: bool,
    pub disable_acl: bool,
    pub disable_ea: bool,
    pub disable_inode: bool,
    pub disable_md5: bool,
    pub disable_md5_tag: bool,
    pub default_permissions: u16,
    pub default_uid: u32,
    pub default_gid: u32,
    pub input_charset: String,
    /// Signed LBA offset applied to every extent read from the image.
    pub displacement: i64,
    /// How often (in nodes visited) the read pacifier callback fires.
    pub pacifier_period: u32,
    /// `img_read_error_mode`: `>= 1` lowers the abort threshold to Sorry
    /// for the duration of the load.
    pub img_read_error_mode: u8,
    pub do_hfsplus: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            disable_1999: false,
            disable_aaip: false,
            disable_acl: false,
            disable_ea: false,
            disable_inode: false,
            disable_md5: false,
            disable_md5_tag: false,
            default_permissions: 0o555,
            default_uid: 0,
            default_gid: 0,
            input_charset: "UTF-8".to_string(),
            displacement: 0,
            pacifier_period: 10,
            img_read_error_mode: 0,
            do_hfsplus: false,
        }
    }
}

/// Restores `abort_threshold` on drop, used so the lowered threshold from
/// `img_read_error_mode >= 1` is restored even if the load fails partway.
struct AbortThresholdGuard<'a> {
    cfg: &'a mut Configuration,
    original: Severity,
}

impl<'a> Drop for AbortThresholdGuard<'a> {
    fn drop(&mut self) {
        self.cfg.abort_threshold = self.original;
    }
}

/// Distinguishes the two failure-mode hints the original emits for a
/// corrupted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureHint {
    /// A foreign add-on session produced what looks like a broken MD5 tag
    /// chain but isn't one.
    ForeignAddOnSession,
    /// Suggest the caller retry with best-effort image-loading mode.
    UseBestEffort,
}

impl LoadFailureHint {
    pub fn text(self) -> &'static str {
        match self {
            LoadFailureHint::ForeignAddOnSession => {
                "tree corrupted: this may be a false MD5 alarm caused by a foreign add-on session"
            }
            LoadFailureHint::UseBestEffort => {
                "tree corrupted: use -error_behavior best_effort to attempt a best-effort load"
            }
        }
    }
}

/// Loads an image from `drive`'s acquired medium with the given read
/// options, through the Image Tree library contract (see
/// [`crate::image_tree`]).
pub fn load<'a, B: crate::backend::BurnBackend, T: ReadWriteSeek>(
    cfg: &mut Configuration,
    _drive: &DriveHandle<B>,
    data: &'a mut T,
    opts: &ReadOptions,
    sink: &dyn DiagnosticSink,
) -> Result<IsoImage<'a, T>, EngineError> {
    let _guard = if opts.img_read_error_mode >= 1 {
        let original = cfg.abort_threshold;
        cfg.abort_threshold = Severity::Sorry;
        Some(AbortThresholdGuard { cfg, original })
    } else {
        None
    };

    match image_tree::load(data) {
        Ok(image) => Ok(image),
        Err(e) => {
            sink.emit(DiagnosticRecord::new(
                Severity::Failure,
                "read_options",
                LoadFailureHint::ForeignAddOnSession.text(),
            ));
            sink.emit(DiagnosticRecord::new(
                Severity::Note,
                "read_options",
                LoadFailureHint::UseBestEffort.text(),
            ));
            Err(e)
        }
    }
}

/// Also present on [`DriveManager`] acquisitions via the pipeline entry
/// points; kept here so callers that only have a manager (not a bare
/// `DriveHandle`) can reach the same loader.
pub fn load_from_manager<B: crate::backend::BurnBackend, T: ReadWriteSeek>(
    cfg: &mut Configuration,
    manager: &DriveManager<B>,
    id: crate::drive::DriveId,
    data: &mut T,
    opts: &ReadOptions,
    sink: &dyn DiagnosticSink,
) -> Result<(), EngineError> {
    let handle = manager
        .get(id)
        .ok_or(crate::error::ProgramInvariantError::HandleNotOwned)?;
    load(cfg, handle, data, opts, sink)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::VecSink;

    #[test]
    fn default_read_options_match_spec_defaults() {
        let opts = ReadOptions::default();
        assert_eq!(opts.default_permissions, 0o555);
        assert_eq!(opts.default_uid, 0);
        assert_eq!(opts.default_gid, 0);
        assert_eq!(opts.pacifier_period, 10);
    }

    #[test]
    fn img_read_error_mode_lowers_and_restores_threshold() {
        let mut cfg = Configuration::default();
        let original = cfg.abort_threshold;
        {
            let opts = ReadOptions {
                img_read_error_mode: 1,
                ..ReadOptions::default()
            };
            let _guard = if opts.img_read_error_mode >= 1 {
                let original = cfg.abort_threshold;
                cfg.abort_threshold = Severity::Sorry;
                Some(AbortThresholdGuard {
                    cfg: &mut cfg,
                    original,
                })
            } else {
                None
            };
            assert_eq!(_guard.as_ref().unwrap().cfg.abort_threshold, Severity::Sorry);
        }
        assert_eq!(cfg.abort_threshold, original);
    }

    #[test]
    fn load_failure_emits_both_hints() {
        let sink = VecSink::new();
        sink.emit(DiagnosticRecord::new(
            Severity::Failure,
            "read_options",
            LoadFailureHint::ForeignAddOnSession.text(),
        ));
        sink.emit(DiagnosticRecord::new(
            Severity::Note,
            "read_options",
            LoadFailureHint::UseBestEffort.text(),
        ));
        let records = sink.take();
        assert!(records[0].text.contains("false MD5 alarm"));
        assert!(records[1].text.contains("best_effort"));
    }
}
