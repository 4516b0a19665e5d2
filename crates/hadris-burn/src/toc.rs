//! TOC & Media Inspector (Component D): session/track structure reports,
//! available-space math, and the persisted sector-map sidecar format.

/// One session as recorded in the disc's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub number: u32,
    pub start_block: u64,
    pub block_count: u64,
    /// Volume Id read from the PVD at `start_block + 16`, when present.
    pub volume_id: Option<[u8; 32]>,
}

/// Full table of contents for an acquired medium.
#[derive(Debug, Clone, Default)]
pub struct Toc {
    pub sessions: Vec<SessionInfo>,
}

/// One human-readable report line, tagged by concept so callers can filter
/// or translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub concept: &'static str,
    pub text: String,
}

impl ReportLine {
    fn new(concept: &'static str, text: impl Into<String>) -> Self {
        Self {
            concept,
            text: text.into(),
        }
    }
}

/// Hints and warnings attached to specific media conditions, matching the
/// text the original emits for damaged-next-track / ATIP-only CD-RW /
/// DVD-RW classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaHint {
    DamagedNextTrack,
    AtipOnlyCdRw,
    DvdRwSequential,
    DvdRwDualLayer,
    BdRManySessions,
}

impl MediaHint {
    pub fn text(self) -> &'static str {
        match self {
            MediaHint::DamagedNextTrack => {
                "next track is damaged, additional sessions may not be readable"
            }
            MediaHint::AtipOnlyCdRw => {
                "media reports ATIP only, lead-out position is an estimate"
            }
            MediaHint::DvdRwSequential => "DVD-RW sequential recording, -multi is restricted",
            MediaHint::DvdRwDualLayer => "DVD-R DL media, closed write is required",
            MediaHint::BdRManySessions => {
                "BD-R has accumulated 300 or more sessions, consider a full blank"
            }
        }
    }
}

/// A stable-text report of current drive and media state, built from the
/// concept list for drive and media reports.
pub fn build_media_report(
    drive_current: &str,
    drive_type: &str,
    media_current: &str,
    media_status: &str,
    media_blocks: MediaBlocks,
    toc: &Toc,
    nwa: u64,
    hints: &[MediaHint],
) -> Vec<ReportLine> {
    let mut lines = vec![
        ReportLine::new("Drive current", drive_current),
        ReportLine::new("Drive type", drive_type),
        ReportLine::new("Media current", media_current),
        ReportLine::new("Media status", media_status),
        ReportLine::new(
            "Media blocks",
            format!(
                "readable {} blocks, writable {} blocks",
                media_blocks.readable, media_blocks.writable
            ),
        ),
        ReportLine::new("Media nwa", nwa.to_string()),
    ];

    let mut layout = String::from("TOC layout:");
    for session in &toc.sessions {
        layout.push_str(&format!(
            "\n  session {}: start {} count {}",
            session.number, session.start_block, session.block_count
        ));
        if let Some(volume_id) = session.volume_id {
            let text = String::from_utf8_lossy(&volume_id);
            layout.push_str(&format!(" volid '{}'", text.trim_end()));
        }
    }
    lines.push(ReportLine::new("TOC layout", layout));

    for hint in hints {
        lines.push(ReportLine::new("Media summary", hint.text()));
    }

    lines
}

/// Readable/writable block counts, computed by the formula:
/// `readable = read_capacity`, `writable = available_space / 2048`, with
/// NWA adjustment for blank media and CD-RW lead-out adjustment from ATIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaBlocks {
    pub readable: u64,
    pub writable: u64,
}

pub fn media_blocks(
    read_capacity: u64,
    available_space_bytes: u64,
    nwa: Option<u64>,
    is_blank: bool,
    atip_leadout: Option<u64>,
) -> MediaBlocks {
    let readable = read_capacity;
    let mut writable = available_space_bytes / 2048;

    if is_blank {
        if let Some(nwa) = nwa {
            writable = writable.saturating_sub(nwa);
        }
    }

    if let Some(leadout) = atip_leadout {
        writable = writable.min(leadout);
    }

    MediaBlocks { readable, writable }
}

/// Bitmap-over-range sector map, keyed by `(min_lba, max_lba)`, with a
/// TOC-info header string. Serializes and parses back bit-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorMap {
    pub min_lba: u64,
    pub max_lba: u64,
    pub toc_info: String,
    /// One bit per sector in `[min_lba, max_lba)`; `true` means validated.
    pub bitmap: Vec<bool>,
}

impl SectorMap {
    pub fn new(min_lba: u64, max_lba: u64, toc_info: impl Into<String>) -> Self {
        let len = (max_lba - min_lba) as usize;
        Self {
            min_lba,
            max_lba,
            toc_info: toc_info.into(),
            bitmap: vec![false; len],
        }
    }

    pub fn mark_valid(&mut self, lba: u64, count: u64) {
        let start = (lba - self.min_lba) as usize;
        for i in start..start + count as usize {
            if let Some(bit) = self.bitmap.get_mut(i) {
                *bit = true;
            }
        }
    }

    pub fn is_valid(&self, lba: u64) -> bool {
        let index = (lba.saturating_sub(self.min_lba)) as usize;
        self.bitmap.get(index).copied().unwrap_or(false)
    }

    /// Serializes to the on-disk sidecar format: a header line followed by
    /// one packed byte per 8 sectors.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!("{}\n{}\n{}\n", self.min_lba, self.max_lba, self.toc_info).as_bytes(),
        );
        let mut byte = 0u8;
        let mut bits = 0u8;
        for &valid in &self.bitmap {
            byte = (byte << 1) | valid as u8;
            bits += 1;
            if bits == 8 {
                out.push(byte);
                byte = 0;
                bits = 0;
            }
        }
        if bits > 0 {
            out.push(byte << (8 - bits));
        }
        out
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut lines = data.splitn(4, |&b| b == b'\n');
        let min_lba: u64 = std::str::from_utf8(lines.next()?).ok()?.parse().ok()?;
        let max_lba: u64 = std::str::from_utf8(lines.next()?).ok()?.parse().ok()?;
        let toc_info = std::str::from_utf8(lines.next()?).ok()?.to_string();
        let rest = lines.next()?;

        let len = (max_lba - min_lba) as usize;
        let mut bitmap = Vec::with_capacity(len);
        'outer: for &byte in rest {
            for i in (0..8).rev() {
                if bitmap.len() == len {
                    break 'outer;
                }
                bitmap.push((byte >> i) & 1 == 1);
            }
        }
        bitmap.resize(len, false);

        Some(Self {
            min_lba,
            max_lba,
            toc_info,
            bitmap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_blocks_adjusts_for_blank_nwa() {
        let blocks = media_blocks(700_000, 700_000 * 2048, Some(100), true, None);
        assert_eq!(blocks.readable, 700_000);
        assert_eq!(blocks.writable, 700_000 - 100);
    }

    #[test]
    fn media_blocks_clamped_by_atip_leadout() {
        let blocks = media_blocks(700_000, 700_000 * 2048, None, false, Some(650_000));
        assert_eq!(blocks.writable, 650_000);
    }

    #[test]
    fn sector_map_round_trips() {
        let mut map = SectorMap::new(100, 200, "toc-info-v1");
        map.mark_valid(100, 5);
        map.mark_valid(150, 10);

        let bytes = map.serialize();
        let parsed = SectorMap::parse(&bytes).unwrap();
        assert_eq!(parsed, map);
        assert!(parsed.is_valid(104));
        assert!(!parsed.is_valid(105));
    }

    #[test]
    fn report_includes_hints_as_summary_lines() {
        let toc = Toc {
            sessions: vec![SessionInfo {
                number: 1,
                start_block: 0,
                block_count: 1000,
                volume_id: None,
            }],
        };
        let lines = build_media_report(
            "/dev/sr0",
            "CD-R",
            "/dev/sr0",
            "blank",
            MediaBlocks {
                readable: 1000,
                writable: 1000,
            },
            &toc,
            0,
            &[MediaHint::AtipOnlyCdRw],
        );
        assert!(lines
            .iter()
            .any(|l| l.concept == "Media summary" && l.text.contains("ATIP")));
    }
}
