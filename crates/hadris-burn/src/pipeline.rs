//! Burn Pipeline (Component G): polling loop, progress reporting,
//! end-of-stream race handling, abort plumbing, and post-write superblock
//! relocation.

use crate::backend::{BackendState, BackendStatus, BurnBackend};
use crate::config::CancellationToken;
use crate::drive::DriveHandle;
use crate::error::{BackendAbortError, EngineError, ResourceError};
use std::io::Read;
use std::time::{Duration, Instant};

/// Canonical CD speed factors the nominal kB/s can round to.
const CANONICAL_CD_SPEEDS: [u32; 9] = [8, 10, 12, 16, 24, 32, 40, 48, 52];

/// Which speed-unit letter and factor a progress line uses, chosen by
/// backend profile: B for BD, C for CD, D otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    Bd,
    Cd,
    Dvd,
}

impl SpeedUnit {
    pub fn letter(self) -> char {
        match self {
            SpeedUnit::Bd => 'B',
            SpeedUnit::Cd => 'C',
            SpeedUnit::Dvd => 'D',
        }
    }

    pub fn factor(self) -> u64 {
        match self {
            SpeedUnit::Bd => 4_495_625,
            SpeedUnit::Cd => 150 * 1024,
            SpeedUnit::Dvd => 1_385_000,
        }
    }

    pub fn for_profile(profile: crate::backend::DiscProfile) -> Self {
        if profile.is_bd() {
            SpeedUnit::Bd
        } else if profile.is_cd() {
            SpeedUnit::Cd
        } else {
            SpeedUnit::Dvd
        }
    }
}

/// Rounds `kbps` to the nearest canonical CD speed factor, if it is close
/// enough (within half a unit) to be recognized as that nominal speed.
pub fn canonical_cd_speed(kbps: u64) -> Option<u32> {
    let units = kbps as f64 / 150.0;
    CANONICAL_CD_SPEEDS
        .iter()
        .copied()
        .find(|&speed| (units - speed as f64).abs() < 0.5)
}

/// One rendered progress line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine(pub String);

/// Formats the default-style progress line:
/// `Writing: <sector>s <pct>% fifo <f>% buf <b>% <speed>x<unit>`, with a
/// trailing `ETA mm:ss` once the estimator has enough history to activate.
///
/// `fifo_pct` is the fill of the source-side read-ahead queue (how much
/// unconsumed input is still waiting to be handed to the drive); `buf_pct`,
/// derived here from `status`, is the drive's own internal buffer fill.
/// The two drain at different rates and must not be conflated.
pub fn format_progress(
    status: &BackendStatus,
    fifo_pct: f64,
    speed_kbps: u64,
    unit: SpeedUnit,
    eta: Option<Duration>,
) -> ProgressLine {
    let pct = if status.sectors > 0 {
        status.sector as f64 * 100.0 / status.sectors as f64
    } else {
        0.0
    };
    let buf_pct = if status.buffer_capacity > 0 {
        status.buffer_available as f64 * 100.0 / status.buffer_capacity as f64
    } else {
        0.0
    };
    let speed = speed_kbps as f64 / unit.factor() as f64;

    let mut line = format!(
        "Writing: {:10}s {:.0}% fifo {:3.0}% buf {:3.0}% {:.1}x{}",
        status.sector,
        pct,
        fifo_pct,
        buf_pct,
        speed,
        unit.letter()
    );
    if let Some(remaining) = eta {
        line.push_str(&format!(" ETA {}", format_eta(remaining)));
    }
    ProgressLine(line)
}

/// Renders a remaining-duration estimate as `mm:ss`, truncating rather than
/// rounding so the countdown never reads as reaching zero a beat early.
fn format_eta(remaining: Duration) -> String {
    let total_secs = remaining.as_secs();
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Rolling estimate of time-to-finish, damped by a base point refreshed
/// every 10 seconds. Activates only once `>= 2s` elapsed and `>= 2%` done.
#[derive(Debug, Clone)]
pub struct FinishEstimator {
    base_time: Instant,
    base_done: f64,
    last_refresh: Instant,
}

impl FinishEstimator {
    pub fn new(now: Instant) -> Self {
        Self {
            base_time: now,
            base_done: 0.0,
            last_refresh: now,
        }
    }

    /// Returns the estimated remaining duration, or `None` if the
    /// activation conditions aren't yet met.
    pub fn estimate(&mut self, now: Instant, fraction_done: f64) -> Option<Duration> {
        let elapsed = now.duration_since(self.base_time);
        if now.duration_since(self.last_refresh) >= Duration::from_secs(10) {
            self.base_time = now;
            self.base_done = fraction_done;
            self.last_refresh = now;
            return None;
        }

        if elapsed < Duration::from_secs(2) || fraction_done < 0.02 {
            return None;
        }

        let delta_done = fraction_done - self.base_done;
        if delta_done <= 0.0 {
            return None;
        }
        let rate = delta_done / elapsed.as_secs_f64();
        let remaining_fraction = (1.0 - fraction_done).max(0.0);
        Some(Duration::from_secs_f64(remaining_fraction / rate))
    }
}

/// Polling cadence and end-of-stream race tolerance.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
const MAX_IDLE_WAIT_CYCLES: u32 = 5;

/// Polls `backend` until it reaches [`BackendState::Idle`], emitting a
/// progress line at most once per second, honoring `cancel` and
/// `generator_finished` for the end-of-stream race.
pub fn run_pipeline<B: BurnBackend>(
    backend: &mut B,
    drive: &DriveHandle<B>,
    mut source: impl Read,
    cancel: &CancellationToken,
    mut generator_finished: impl FnMut() -> bool,
    mut on_progress: impl FnMut(ProgressLine),
) -> Result<(), EngineError> {
    let mut last_progress = Instant::now() - PROGRESS_INTERVAL;
    let mut estimator = FinishEstimator::new(Instant::now());
    let mut idle_wait_cycles = 0u32;
    // Drain the source fully before polling; a real backend pulls from a
    // FIFO fed by this same reader, but the file-backed stand-in here
    // drains synchronously up front.
    let mut buf = Vec::new();
    source.read_to_end(&mut buf).map_err(ResourceError::CannotRead)?;
    if !buf.is_empty() {
        drive.write_region(backend, 0, &buf)?;
    }

    loop {
        std::thread::sleep(POLL_INTERVAL);
        let status = drive.status(backend);

        if cancel.is_cancelled() {
            backend.cancel_prepared_write(&drive_handle_ref(drive))?;
            loop {
                let status = drive.status(backend);
                if status.state == BackendState::Idle {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            return Err(BackendAbortError::WriteFailed("cancelled by signal".into()).into());
        }

        if status.state == BackendState::Idle {
            if generator_finished() {
                break;
            }
            idle_wait_cycles += 1;
            if idle_wait_cycles >= MAX_IDLE_WAIT_CYCLES {
                backend.cancel_prepared_write(&drive_handle_ref(drive))?;
                return Err(BackendAbortError::CancelledAfterTimeout.into());
            }
            continue;
        }
        idle_wait_cycles = 0;

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            let unit = SpeedUnit::for_profile(drive.profile(backend));

            let fraction = if status.sectors > 0 {
                status.sector as f64 / status.sectors as f64
            } else {
                0.0
            };
            let total_bytes = buf.len() as u64;
            let fifo_pct = if total_bytes > 0 {
                let consumed = (status.sector as u64 * 2048).min(total_bytes);
                (total_bytes - consumed) as f64 * 100.0 / total_bytes as f64
            } else {
                0.0
            };
            let eta = estimator.estimate(Instant::now(), fraction);

            let line = format_progress(
                &status,
                fifo_pct,
                status.buffer_capacity as u64 * 150,
                unit,
                eta,
            );
            on_progress(line);
            last_progress = Instant::now();
        }
    }

    Ok(())
}

fn drive_handle_ref<B: BurnBackend>(drive: &DriveHandle<B>) -> &B::Handle {
    &drive.backend_handle
}

/// Re-reads 32 blocks at `new_start_lba`, patches PVD bytes 80..87
/// (volume size, little+big endian) to `new_start_lba + image_blocks`, and
/// overwrites LBAs 0..31. When `into_file_copy` is set, additionally zeroes
/// a trailing libisofs MD5 tag right after the volume-descriptor-set
/// terminator.
pub fn relocate_superblock<B: BurnBackend>(
    backend: &mut B,
    drive: &DriveHandle<B>,
    new_start_lba: u64,
    image_blocks: u64,
    into_file_copy: bool,
) -> Result<(), EngineError> {
    let mut buffer = drive.read_block(backend, new_start_lba, 32)?;
    let new_total = new_start_lba + image_blocks;

    // PVD sector is at session start + 16, PVD volume-size field at
    // byte offset 80 within that sector.
    let pvd_offset = 16 * 2048 + 80;
    buffer[pvd_offset..pvd_offset + 4].copy_from_slice(&(new_total as u32).to_le_bytes());
    buffer[pvd_offset + 4..pvd_offset + 8].copy_from_slice(&(new_total as u32).to_be_bytes());

    if into_file_copy {
        // Volume descriptor set terminator sits in its own 2048-byte
        // sector; an immediately-following libisofs MD5 tag (if any) is
        // no longer valid once the size changed, so it must be zeroed.
        let terminator_sector_start = 17 * 2048;
        let tag_start = terminator_sector_start + 2048;
        if tag_start + 2048 <= buffer.len() {
            buffer[tag_start..tag_start + 2048].fill(0);
        }
    }

    drive.write_region(backend, 0, &buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendState, BackendStatus};

    #[test]
    fn canonical_cd_speed_recognizes_standard_factors() {
        assert_eq!(canonical_cd_speed(52 * 150), Some(52));
        assert_eq!(canonical_cd_speed(8 * 150), Some(8));
        assert_eq!(canonical_cd_speed(13 * 150), None);
    }

    #[test]
    fn speed_unit_selects_by_profile() {
        assert_eq!(
            SpeedUnit::for_profile(crate::backend::DiscProfile::CD_R),
            SpeedUnit::Cd
        );
        assert_eq!(
            SpeedUnit::for_profile(crate::backend::DiscProfile::BD_R_SRM),
            SpeedUnit::Bd
        );
        assert_eq!(
            SpeedUnit::for_profile(crate::backend::DiscProfile::DVD_PLUS_RW),
            SpeedUnit::Dvd
        );
    }

    #[test]
    fn progress_line_has_expected_shape() {
        let status = BackendStatus {
            state: BackendState::Writing,
            sector: 1000,
            sectors: 2000,
            buffer_capacity: 100,
            buffer_available: 50,
        };
        let line = format_progress(&status, 75.0, 52 * 150, SpeedUnit::Cd, None);
        assert!(line.0.starts_with("Writing:"));
        assert!(line.0.contains("%"));
        assert!(line.0.ends_with('C'));
    }

    #[test]
    fn progress_line_carries_independent_fifo_and_buf_fields() {
        let status = BackendStatus {
            state: BackendState::Writing,
            sector: 1000,
            sectors: 2000,
            buffer_capacity: 100,
            buffer_available: 50,
        };
        let line = format_progress(&status, 90.0, 52 * 150, SpeedUnit::Cd, None);
        assert!(line.0.contains("fifo  90%"));
        assert!(line.0.contains("buf  50%"));
    }

    #[test]
    fn progress_line_appends_eta_when_given() {
        let status = BackendStatus {
            state: BackendState::Writing,
            sector: 1000,
            sectors: 2000,
            buffer_capacity: 100,
            buffer_available: 50,
        };
        let line = format_progress(&status, 50.0, 52 * 150, SpeedUnit::Cd, Some(Duration::from_secs(83)));
        assert!(line.0.ends_with("ETA 01:23"));
    }

    #[test]
    fn finish_estimate_inactive_before_two_seconds_or_two_percent() {
        let start = Instant::now();
        let mut estimator = FinishEstimator::new(start);
        assert!(estimator.estimate(start, 0.5).is_none());
    }

    #[test]
    fn relocate_superblock_patches_volume_size_both_endians() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.iso");
        std::fs::write(&path, vec![0u8; 40 * 2048]).unwrap();
        let mut mgr = crate::drive::DriveManager::new(crate::backend::FileBackend::new());
        let id = mgr
            .acquire(&path.to_string_lossy(), crate::drive::DriveRole::OUTDEV, false)
            .unwrap();
        let (backend, drive) = mgr.split_mut(id).unwrap();

        relocate_superblock(backend, drive, 16, 1000, false).unwrap();

        let buf = drive.read_block(backend, 0, 32).unwrap();
        let pvd_offset = 16 * 2048 + 80;
        let le = u32::from_le_bytes(buf[pvd_offset..pvd_offset + 4].try_into().unwrap());
        let be = u32::from_be_bytes(buf[pvd_offset + 4..pvd_offset + 8].try_into().unwrap());
        assert_eq!(le, 1016);
        assert_eq!(be, 1016);
    }
}
