//! MD5 block-chain validation, built around libisofs's on-media tag layout:
//! `(tag_type, recorded_position, range_start, range_size, next_tag_position,
//! md5_hash)`.

use super::spot::{Quality, SpotList};
use crate::diagnostic::{DiagnosticRecord, DiagnosticSink, Severity};
use md5::{Digest, Md5};

/// A decoded libisofs MD5 tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Md5Tag {
    pub tag_type: TagType,
    pub recorded_position: u64,
    pub range_start: u64,
    pub range_size: u64,
    pub next_tag_position: u64,
    pub md5: [u8; 16],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    /// Type 1: closes the chain.
    Session,
    /// Type 2: superblock tag protecting the volume descriptor area.
    Superblock,
    /// Type 3: valid only after a superblock tag has been seen.
    Tree,
    /// Type 4: relocated 64 kB superblock.
    RelocatedSuperblock,
}

impl TagType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TagType::Session),
            2 => Some(TagType::Superblock),
            3 => Some(TagType::Tree),
            4 => Some(TagType::RelocatedSuperblock),
            _ => None,
        }
    }
}

/// Byte length of an encoded tag, fixed layout: 1 byte type, 7 bytes pad,
/// four u64 LE fields, then the 16-byte hash.
pub const TAG_LEN: usize = 56;

/// Decodes a tag from the last [`TAG_LEN`] bytes of a 2048-byte block:
/// `tag_type, position, range_start, range_size, next_tag, md5`. Returns
/// `None` when the bytes don't carry a recognized tag type, which is the
/// common case for most blocks.
pub fn decode_tag(block: &[u8]) -> Option<Md5Tag> {
    if block.len() < TAG_LEN {
        return None;
    }
    let tag = &block[block.len() - TAG_LEN..];
    let tag_type = TagType::from_u8(tag[0])?;
    let recorded_position = u64::from_le_bytes(tag[8..16].try_into().ok()?);
    let range_start = u64::from_le_bytes(tag[16..24].try_into().ok()?);
    let range_size = u64::from_le_bytes(tag[24..32].try_into().ok()?);
    let next_tag_position = u64::from_le_bytes(tag[32..40].try_into().ok()?);
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&tag[40..56]);
    Some(Md5Tag {
        tag_type,
        recorded_position,
        range_start,
        range_size,
        next_tag_position,
        md5,
    })
}

/// Encodes `tag` into a fresh [`TAG_LEN`]-byte buffer, the inverse of
/// [`decode_tag`]. Used by tests to synthesize tagged blocks.
pub fn encode_tag(tag: &Md5Tag) -> [u8; TAG_LEN] {
    let mut out = [0u8; TAG_LEN];
    out[0] = match tag.tag_type {
        TagType::Session => 1,
        TagType::Superblock => 2,
        TagType::Tree => 3,
        TagType::RelocatedSuperblock => 4,
    };
    out[8..16].copy_from_slice(&tag.recorded_position.to_le_bytes());
    out[16..24].copy_from_slice(&tag.range_start.to_le_bytes());
    out[24..32].copy_from_slice(&tag.range_size.to_le_bytes());
    out[32..40].copy_from_slice(&tag.next_tag_position.to_le_bytes());
    out[40..56].copy_from_slice(&tag.md5);
    out
}

/// Per-run MD5 chain state. One instance per verification job.
pub struct Md5Chain {
    hasher: Md5,
    pub md5_start: u64,
    pub next_tag: u64,
    pub chain_broken: bool,
    pub in_track_gap: bool,
    pub was_superblock_tag: bool,
    seen_superblock: bool,
}

impl Md5Chain {
    pub fn new(md5_start: u64) -> Self {
        Self {
            hasher: Md5::new(),
            md5_start,
            next_tag: 0,
            chain_broken: false,
            in_track_gap: false,
            was_superblock_tag: false,
            seen_superblock: false,
        }
    }

    /// Feeds one chunk of block data into the running hash.
    pub fn feed(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn tag_valid_for_state(&self, tag: &Md5Tag, lba: u64) -> bool {
        match tag.tag_type {
            TagType::Superblock => lba < self.md5_start + 32 || self.in_track_gap,
            TagType::RelocatedSuperblock => lba < 32,
            TagType::Tree => self.seen_superblock,
            TagType::Session => true,
        }
    }

    /// Processes a tag found at `lba`, the expected position. Clones the
    /// running hash, finalizes a candidate, and compares against
    /// `tag.md5`. Returns the spot quality the caller should record, plus
    /// whether the tag was consumed (its `range_start` matched expectations).
    pub fn process_tag(&mut self, tag: &Md5Tag, lba: u64, sink: &dyn DiagnosticSink) -> (Quality, bool) {
        if !self.tag_valid_for_state(tag, lba) {
            self.chain_broken = true;
            return (Quality::Md5Mismatch, false);
        }

        if tag.range_start != self.md5_start {
            sink.emit(DiagnosticRecord::new(
                Severity::Warning,
                "check::md5",
                format!(
                    "Found MD5 {:?} tag which covers different data range. Expected: {} Found: {}",
                    tag.tag_type, self.md5_start, tag.range_start
                ),
            ));
            self.chain_broken = true;
            return (Quality::Md5Mismatch, false);
        }

        let candidate: [u8; 16] = self.hasher.clone().finalize().into();
        let quality = if candidate != tag.md5 {
            sink.emit(DiagnosticRecord::new(
                Severity::Warning,
                "check::md5",
                "MD5 mismatch: area is corrupted or md5 does not match",
            ));
            self.chain_broken = true;
            Quality::Md5Mismatch
        } else {
            sink.emit(DiagnosticRecord::new(
                Severity::Update,
                "check::md5",
                "MD5 matches recorded tag",
            ));
            Quality::Md5Match
        };

        match tag.tag_type {
            TagType::Superblock | TagType::RelocatedSuperblock => {
                self.was_superblock_tag = true;
                self.seen_superblock = true;
            }
            TagType::Tree => self.was_superblock_tag = false,
            TagType::Session => {
                // Closes the chain: reset md5_start to the next 32-block
                // boundary and mark subsequent multisession scans as being
                // in a track gap.
                self.md5_start = (lba + 32) & !31;
                self.in_track_gap = true;
            }
        }

        // The range this tag covers is closed; bytes fed from here on
        // belong to the next range, so the running hash restarts clean.
        self.hasher = Md5::new();
        self.next_tag = tag.next_tag_position;
        (quality, true)
    }

    /// Terminates the run: if a tag was still expected, records a
    /// `Md5Mismatch` spot at its LBA since the required tag never appeared.
    pub fn finish(&self, spots: &mut SpotList) {
        if self.next_tag > 0 {
            spots.push(self.next_tag, 1, Quality::Md5Mismatch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::VecSink;

    #[test]
    fn tag_round_trips_through_encode_decode() {
        let original = Md5Tag {
            tag_type: TagType::Tree,
            recorded_position: 12345,
            range_start: 64,
            range_size: 32,
            next_tag_position: 200,
            md5: [0x42u8; 16],
        };
        let mut block = vec![0u8; 2048];
        block[2048 - TAG_LEN..].copy_from_slice(&encode_tag(&original));
        let decoded = decode_tag(&block).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_tag_rejects_unrecognized_type_byte() {
        let block = vec![0u8; 2048];
        assert!(decode_tag(&block).is_none());
    }

    fn tag(tag_type: TagType, range_start: u64, md5: [u8; 16]) -> Md5Tag {
        Md5Tag {
            tag_type,
            recorded_position: 100,
            range_start,
            range_size: 32,
            next_tag_position: 0,
            md5,
        }
    }

    #[test]
    fn chain_break_on_range_mismatch_emits_expected_found_text() {
        let sink = VecSink::new();
        let mut chain = Md5Chain::new(64);
        chain.feed(b"some data");
        let t = tag(TagType::Session, 32, [0u8; 16]);
        let (quality, consumed) = chain.process_tag(&t, 100, &sink);
        assert_eq!(quality, Quality::Md5Mismatch);
        assert!(!consumed);
        assert!(chain.chain_broken);
        let records = sink.take();
        assert!(records[0].text.contains("different data range"));
        assert!(records[0].text.contains("Expected: 64 Found: 32"));
    }

    #[test]
    fn matching_hash_produces_md5_match() {
        let sink = VecSink::new();
        let mut chain = Md5Chain::new(0);
        chain.feed(b"payload");
        let expected: [u8; 16] = Md5::new_with_prefix(b"payload").finalize().into();
        let t = tag(TagType::Superblock, 0, expected);
        let (quality, consumed) = chain.process_tag(&t, 0, &sink);
        assert_eq!(quality, Quality::Md5Match);
        assert!(consumed);
        assert!(!chain.chain_broken);
    }

    #[test]
    fn mismatching_hash_is_warning_and_breaks_chain() {
        let sink = VecSink::new();
        let mut chain = Md5Chain::new(0);
        chain.feed(b"payload");
        let t = tag(TagType::Superblock, 0, [0xFFu8; 16]);
        let (quality, _consumed) = chain.process_tag(&t, 0, &sink);
        assert_eq!(quality, Quality::Md5Mismatch);
        assert!(chain.chain_broken);
    }

    #[test]
    fn session_tag_resets_md5_start_to_next_boundary() {
        let sink = VecSink::new();
        let mut chain = Md5Chain::new(0);
        let expected: [u8; 16] = Md5::new().finalize().into();
        let t = tag(TagType::Session, 0, expected);
        chain.process_tag(&t, 10, &sink);
        assert_eq!(chain.md5_start, 32);
        assert!(chain.in_track_gap);
    }

    #[test]
    fn tree_tag_before_superblock_is_invalid() {
        let sink = VecSink::new();
        let mut chain = Md5Chain::new(0);
        let t = tag(TagType::Tree, 0, [0u8; 16]);
        let (quality, consumed) = chain.process_tag(&t, 0, &sink);
        assert_eq!(quality, Quality::Md5Mismatch);
        assert!(!consumed);
    }

    #[test]
    fn missing_required_tag_is_recorded_at_termination() {
        let mut chain = Md5Chain::new(0);
        chain.next_tag = 500;
        let mut spots = SpotList::new();
        chain.finish(&mut spots);
        assert_eq!(spots.spots()[0].start_lba, 500);
        assert_eq!(spots.spots()[0].quality, Quality::Md5Mismatch);
    }
}
