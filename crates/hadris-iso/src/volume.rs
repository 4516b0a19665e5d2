//! Volume descriptors
//!
//! Every ISO 9660 image starts with a run of 2048-byte volume descriptor
//! sectors at LBA 16, terminated by a Volume Descriptor Set Terminator.

use hadris_io::{Error, Read, Seek, Write};

use crate::{
    directory::RootDirectoryEntry,
    types::{CharsetA, CharsetD, DecDateTime, IsoStr, U16LsbMsb, U32LsbMsb},
    types::{BigEndian, LittleEndian, U32},
};

const SECTOR_SIZE: usize = 2048;
const STANDARD_ID: [u8; 5] = *b"CD001";

/// Volume descriptor type codes, as they appear in byte 0 of every sector
/// in the volume descriptor set.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDescriptorType {
    BootRecord = 0,
    Primary = 1,
    Supplementary = 2,
    Partition = 3,
    Terminator = 255,
}

/// The Primary Volume Descriptor, the mandatory descriptor describing the
/// volume as a whole. Field layout and offsets follow ECMA-119 exactly,
/// since external tools (and this crate's own post-write patching) rely on
/// bytes 80..87 holding the volume space size.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrimaryVolumeDescriptor {
    pub type_code: u8,
    pub id: [u8; 5],
    pub version: u8,
    unused0: u8,
    pub system_id: IsoStr<CharsetA, 32>,
    pub volume_id: IsoStr<CharsetD, 32>,
    unused1: [u8; 8],
    /// Bytes 80..87 of the sector. Patched in place after a successful
    /// growth write to reflect the new total image size.
    pub volume_space_size: U32LsbMsb,
    unused2: [u8; 32],
    pub volume_set_size: U16LsbMsb,
    pub volume_sequence_number: U16LsbMsb,
    pub logical_block_size: U16LsbMsb,
    pub path_table_size: U32LsbMsb,
    pub type_l_path_table: U32<LittleEndian>,
    pub opt_type_l_path_table: U32<LittleEndian>,
    pub type_m_path_table: U32<BigEndian>,
    pub opt_type_m_path_table: U32<BigEndian>,
    pub dir_record: RootDirectoryEntry,
    pub volume_set_id: IsoStr<CharsetA, 128>,
    pub publisher_id: IsoStr<CharsetA, 128>,
    pub preparer_id: IsoStr<CharsetA, 128>,
    pub application_id: IsoStr<CharsetA, 128>,
    pub copyright_file_id: IsoStr<CharsetD, 37>,
    pub abstract_file_id: IsoStr<CharsetD, 37>,
    pub bibliographic_file_id: IsoStr<CharsetD, 37>,
    pub creation_date: DecDateTime,
    pub modification_date: DecDateTime,
    pub expiration_date: DecDateTime,
    pub effective_date: DecDateTime,
    pub file_structure_version: u8,
    reserved3: u8,
    application_used: [u8; 512],
    reserved4: [u8; 653],
}

static_assertions::assert_eq_size!(PrimaryVolumeDescriptor, [u8; SECTOR_SIZE]);

impl PrimaryVolumeDescriptor {
    pub fn new(volume_id: &str, size_sectors: u32) -> Self {
        let mut pvd = Self {
            type_code: VolumeDescriptorType::Primary as u8,
            id: STANDARD_ID,
            version: 1,
            unused0: 0,
            system_id: IsoStr::empty(),
            volume_id: IsoStr::from_str(volume_id).unwrap_or_else(|_| IsoStr::empty()),
            unused1: [0; 8],
            volume_space_size: U32LsbMsb::new(size_sectors),
            unused2: [0; 32],
            volume_set_size: U16LsbMsb::new(1),
            volume_sequence_number: U16LsbMsb::new(1),
            logical_block_size: U16LsbMsb::new(2048),
            path_table_size: U32LsbMsb::new(0),
            type_l_path_table: U32::new(0),
            opt_type_l_path_table: U32::new(0),
            type_m_path_table: U32::new(0),
            opt_type_m_path_table: U32::new(0),
            dir_record: bytemuck::Zeroable::zeroed(),
            volume_set_id: IsoStr::empty(),
            publisher_id: IsoStr::empty(),
            preparer_id: IsoStr::empty(),
            application_id: IsoStr::empty(),
            copyright_file_id: IsoStr::empty(),
            abstract_file_id: IsoStr::empty(),
            bibliographic_file_id: IsoStr::empty(),
            creation_date: DecDateTime::now(),
            modification_date: DecDateTime::now(),
            expiration_date: DecDateTime::now(),
            effective_date: DecDateTime::now(),
            file_structure_version: 1,
            reserved3: 0,
            application_used: [0; 512],
            reserved4: [0; 653],
        };
        pvd.dir_record.header.file_identifier_len = 1;
        pvd
    }
}

/// The Boot Record Volume Descriptor, used by El Torito to point at the
/// boot catalogue.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BootRecordVolumeDescriptor {
    pub type_code: u8,
    pub id: [u8; 5],
    pub version: u8,
    pub boot_system_id: [u8; 32],
    pub boot_id: [u8; 32],
    /// LBA of the boot catalogue, in logical (2048-byte) blocks.
    pub catalog_ptr: U32<LittleEndian>,
    reserved: [u8; 1973],
}

static_assertions::assert_eq_size!(BootRecordVolumeDescriptor, [u8; SECTOR_SIZE]);

const EL_TORITO_ID: &[u8] = b"EL TORITO SPECIFICATION";

impl BootRecordVolumeDescriptor {
    pub fn new(catalog_ptr: u32) -> Self {
        let mut boot_system_id = [0u8; 32];
        boot_system_id[..EL_TORITO_ID.len()].copy_from_slice(EL_TORITO_ID);
        Self {
            type_code: VolumeDescriptorType::BootRecord as u8,
            id: STANDARD_ID,
            version: 1,
            boot_system_id,
            boot_id: [0; 32],
            catalog_ptr: U32::new(catalog_ptr),
            reserved: [0; 1973],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct VolumeDescriptorSetTerminator {
    type_code: u8,
    id: [u8; 5],
    version: u8,
    reserved: [u8; 2041],
}

static_assertions::assert_eq_size!(VolumeDescriptorSetTerminator, [u8; SECTOR_SIZE]);

impl Default for VolumeDescriptorSetTerminator {
    fn default() -> Self {
        Self {
            type_code: VolumeDescriptorType::Terminator as u8,
            id: STANDARD_ID,
            version: 1,
            reserved: [0; 2041],
        }
    }
}

/// One volume descriptor sector. Only the variants this crate needs to
/// produce/consume are modeled; unrecognised sectors are skipped during
/// parsing (matching the "only basic information" scope of [`crate::IsoImage::parse`]).
#[derive(Clone)]
pub enum VolumeDescriptor {
    Primary(PrimaryVolumeDescriptor),
    BootRecord(BootRecordVolumeDescriptor),
}

impl VolumeDescriptor {
    fn to_sector(&self) -> [u8; SECTOR_SIZE] {
        let mut sector = [0u8; SECTOR_SIZE];
        match self {
            VolumeDescriptor::Primary(pvd) => sector.copy_from_slice(bytemuck::bytes_of(pvd)),
            VolumeDescriptor::BootRecord(brvd) => {
                sector.copy_from_slice(bytemuck::bytes_of(brvd))
            }
        }
        sector
    }
}

/// The run of volume descriptors at the start of an ISO 9660 image,
/// starting at LBA 16 and ending with a terminator sector.
#[derive(Clone, Default)]
pub struct VolumeDescriptorList {
    pub(crate) descriptors: Vec<VolumeDescriptor>,
}

impl VolumeDescriptorList {
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    pub fn push(&mut self, descriptor: VolumeDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Total bytes this descriptor set occupies on disk, including the
    /// terminator sector.
    pub fn size_required(&self) -> usize {
        (self.descriptors.len() + 1) * SECTOR_SIZE
    }

    pub fn primary(&self) -> &PrimaryVolumeDescriptor {
        self.descriptors
            .iter()
            .find_map(|d| match d {
                VolumeDescriptor::Primary(pvd) => Some(pvd),
                _ => None,
            })
            .expect("volume descriptor list has no primary volume descriptor")
    }

    pub fn primary_mut(&mut self) -> &mut PrimaryVolumeDescriptor {
        self.descriptors
            .iter_mut()
            .find_map(|d| match d {
                VolumeDescriptor::Primary(pvd) => Some(pvd),
                _ => None,
            })
            .expect("volume descriptor list has no primary volume descriptor")
    }

    pub fn boot_record(&self) -> Option<&BootRecordVolumeDescriptor> {
        self.descriptors.iter().find_map(|d| match d {
            VolumeDescriptor::BootRecord(brvd) => Some(brvd),
            _ => None,
        })
    }

    pub fn boot_record_mut(&mut self) -> Option<&mut BootRecordVolumeDescriptor> {
        self.descriptors.iter_mut().find_map(|d| match d {
            VolumeDescriptor::BootRecord(brvd) => Some(brvd),
            _ => None,
        })
    }

    pub fn write<T: Write + Seek>(&self, data: &mut T) -> Result<(), Error> {
        for descriptor in &self.descriptors {
            data.write_all(&descriptor.to_sector())?;
        }
        data.write_all(bytemuck::bytes_of(&VolumeDescriptorSetTerminator::default()))?;
        Ok(())
    }

    pub fn parse<T: Read + Seek>(data: &mut T) -> Result<Self, Error> {
        let mut descriptors = Vec::new();
        loop {
            let mut sector = [0u8; SECTOR_SIZE];
            data.read_exact(&mut sector)?;
            match sector[0] {
                x if x == VolumeDescriptorType::Primary as u8 => {
                    descriptors.push(VolumeDescriptor::Primary(*bytemuck::from_bytes(&sector)));
                }
                x if x == VolumeDescriptorType::BootRecord as u8 => {
                    descriptors.push(VolumeDescriptor::BootRecord(*bytemuck::from_bytes(
                        &sector,
                    )));
                }
                x if x == VolumeDescriptorType::Terminator as u8 => break,
                _ => {
                    // Supplementary/partition descriptors, or anything this
                    // crate does not yet model: skip, matching the
                    // best-effort read-side scope documented on `parse`.
                    continue;
                }
            }
        }
        Ok(Self { descriptors })
    }
}
