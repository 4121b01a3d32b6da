use core::fmt::Display;

/// Static shape of a raw SPI NAND device, supplied once at construction.
///
/// All size fields must be greater than zero. `bytes_per_page` is the unit
/// of every read/write length check; `oob_bytes` records how much of the
/// page is spare area when the page size includes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceGeometry {
    pub num_dies: u8,
    pub blocks_per_die: u16,
    pub pages_per_block: u16,
    pub bytes_per_page: u16,
    pub oob_bytes: u16,
}

impl DeviceGeometry {
    /// The size of a block in bytes
    pub const fn bytes_per_block(&self) -> u32 {
        self.bytes_per_page as u32 * self.pages_per_block as u32
    }

    /// The size of one die in bytes
    pub const fn bytes_per_die(&self) -> u64 {
        self.bytes_per_block() as u64 * self.blocks_per_die as u64
    }

    /// The total capacity of the device in bytes
    pub const fn capacity(&self) -> u64 {
        self.bytes_per_die() * self.num_dies as u64
    }

    /// Number of blocks across all dies
    pub const fn total_blocks(&self) -> u32 {
        self.blocks_per_die as u32 * self.num_dies as u32
    }
}

/// Location of a page on the device.
///
/// Produced by translating a linear byte offset against a
/// [`DeviceGeometry`]; not meant to be assembled field by field outside of
/// block-sweep loops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalAddress {
    pub die: u8,
    pub block: u16,
    pub page: u16,
}

impl PhysicalAddress {
    /// Translate a linear byte offset into die, block and page.
    ///
    /// Offsets beyond [`DeviceGeometry::capacity`] are not rejected here;
    /// callers validate bounds before translating.
    pub fn from_byte_offset(offset: u64, geometry: &DeviceGeometry) -> Self {
        let bytes_per_block = geometry.bytes_per_block() as u64;
        let bytes_per_die = geometry.bytes_per_die();

        let die = (offset / bytes_per_die) as u8;
        let die_offset = offset % bytes_per_die;
        let block = (die_offset / bytes_per_block) as u16;
        let page = ((die_offset % bytes_per_block) / geometry.bytes_per_page as u64) as u16;

        PhysicalAddress { die, block, page }
    }

    /// First page of a block, the address an erase is issued at.
    pub const fn block_start(die: u8, block: u16) -> Self {
        PhysicalAddress { die, block, page: 0 }
    }

    /// Inverse of [`PhysicalAddress::from_byte_offset`].
    pub fn byte_offset(&self, geometry: &DeviceGeometry) -> u64 {
        self.die as u64 * geometry.bytes_per_die()
            + self.block as u64 * geometry.bytes_per_block() as u64
            + self.page as u64 * geometry.bytes_per_page as u64
    }

    /// The packed row address of this page.
    pub const fn row_address(&self) -> RowAddress {
        RowAddress::new(self.block, self.page)
    }
}

impl Display for PhysicalAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}/{}", self.die, self.block, self.page)
    }
}

/// Packed row address used by erase, program-execute and page-load commands.
///
/// Block occupies bits 6 and up (11 bits), page occupies bits 0 to 5. The
/// packing is part of the wire format and must not change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowAddress(u32);

impl RowAddress {
    const BLOCK_POS: u32 = 6;
    const BLOCK_MASK: u32 = 0x07FF;
    const PAGE_MASK: u32 = 0x003F;

    pub const fn new(block: u16, page: u16) -> Self {
        RowAddress(
            ((block as u32 & Self::BLOCK_MASK) << Self::BLOCK_POS) | (page as u32 & Self::PAGE_MASK),
        )
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// The three address bytes as sent on the wire after the opcode.
    pub const fn to_bytes(&self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }
}

impl Display for RowAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Byte offset within a page, used by cache-read and program-load commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnAddress(u16);

impl ColumnAddress {
    pub const fn new(address: u16) -> Self {
        ColumnAddress(address)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// The two address bytes as sent on the wire after the opcode.
    pub const fn to_bytes(&self) -> [u8; 2] {
        [(self.0 >> 8) as u8, self.0 as u8]
    }
}

impl Display for ColumnAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}
