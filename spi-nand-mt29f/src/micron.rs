use nand_layout::DeviceGeometry;

use crate::SpiNand;

/// Micron MT29F serial NAND family.
///
/// All family members answer read-id with manufacturer 0x2C; the second
/// byte selects the part. The die/block/page shape is passed in at
/// construction so one definition covers every density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mt29f<const ID: u8> {
    geometry: DeviceGeometry,
}

impl<const ID: u8> Mt29f<ID> {
    /// Creates a new instance of the MT29F flash device.
    pub const fn new(geometry: DeviceGeometry) -> Self {
        Mt29f { geometry }
    }
}

impl<const ID: u8> SpiNand for Mt29f<ID> {
    const MANUFACTURER_ID: u8 = 0x2C;
    const DEVICE_ID: u8 = ID;

    fn geometry(&self) -> &DeviceGeometry {
        &self.geometry
    }
}

/// 2Gb part: two dies of 1024 blocks, 64 pages per block.
pub type Mt29f2g01 = Mt29f<0x24>;

impl Mt29f2g01 {
    /// Factory shape. The 2176 byte page includes the 128 spare bytes.
    pub const GEOMETRY: DeviceGeometry = DeviceGeometry {
        num_dies: 2,
        blocks_per_die: 1024,
        pages_per_block: 64,
        bytes_per_page: 2176,
        oob_bytes: 128,
    };

    pub const fn standard() -> Self {
        Self::new(Self::GEOMETRY)
    }
}

// Implement blocking trait
mod blocking {
    use super::Mt29f;
    use crate::cmd_blocking::SpiNandBlocking;
    use embedded_hal::spi::SpiDevice;

    impl<SPI: SpiDevice, const ID: u8> SpiNandBlocking<SPI> for Mt29f<ID> {}
}
