#![no_std]
// Must be first to share macros across crate
pub(crate) mod fmt;

pub mod cmd_blocking;
mod device;
pub mod error;
pub mod micron;

pub use device::SpiNandDevice;

use nand_layout::DeviceGeometry;

/// Status feature register bit masks.
pub mod status {
    /// Operation in progress; the device is busy while set.
    pub const OIP: u8 = 0x01;
    /// Write enable latch.
    pub const WEL: u8 = 0x02;
    /// Last erase did not complete successfully.
    pub const ERASE_FAIL: u8 = 0x04;
    /// Last program did not complete successfully.
    pub const PROGRAM_FAIL: u8 = 0x08;
    /// ECC result of the last page read, three bits.
    pub const ECC_MASK: u8 = 0x70;
    /// Cache read sequence in progress.
    pub const CACHE_READ_BUSY: u8 = 0x80;
}

/// Configuration feature register bit masks.
pub mod config {
    /// Internal ECC enable.
    pub const ECC_ENABLE: u8 = 0x10;
}

/// Core trait that a SPI NAND flash device must implement.
///
/// Carries the die/block/page shape and the command and feature register
/// map. The defaults are the de facto standard SPI NAND opcodes; parts that
/// deviate override the constants and keep the default command
/// implementations in [`crate::cmd_blocking::SpiNandBlocking`].
pub trait SpiNand {
    /// Shape of the die/block/page array, fixed at construction.
    fn geometry(&self) -> &DeviceGeometry;

    /// Expected first byte of the read-id response
    const MANUFACTURER_ID: u8;
    /// Expected second byte of the read-id response
    const DEVICE_ID: u8;

    // Commands
    /// The command to reset the flash device
    const RESET_COMMAND: u8 = 0xFF;
    /// Command to read a feature register
    const GET_FEATURE_COMMAND: u8 = 0x0F;
    /// Command to write a feature register
    const SET_FEATURE_COMMAND: u8 = 0x1F;
    /// The command to read the manufacturer/device ID pair
    const READ_ID_COMMAND: u8 = 0x9F;
    /// Enable writing to the flash device, including erasing
    const WRITE_ENABLE_COMMAND: u8 = 0x06;
    /// Disable writing to the flash device
    const WRITE_DISABLE_COMMAND: u8 = 0x04;
    /// Command to load a page from the array into the cache register
    const PAGE_READ_COMMAND: u8 = 0x13;
    /// Command to clock cache register contents out from a column address
    const READ_FROM_CACHE_COMMAND: u8 = 0x03;
    /// Command to load program data into the cache register
    const PROGRAM_LOAD_COMMAND: u8 = 0x02;
    /// Command to program the cache register into a page of the array
    const PROGRAM_EXECUTE_COMMAND: u8 = 0x10;
    /// Command to erase a block
    const BLOCK_ERASE_COMMAND: u8 = 0xD8;

    // Feature registers
    /// Block protection register, one per die
    const BLOCK_LOCK_REGISTER: u8 = 0xA0;
    /// Configuration register (ECC enable and friends)
    const CONFIGURATION_REGISTER: u8 = 0xB0;
    /// Status register
    const STATUS_REGISTER: u8 = 0xC0;
    /// Die select register on multi-die parts
    const DIE_SELECT_REGISTER: u8 = 0xD0;

    /// Die select register value for the first die
    const DIE_SELECT_DIE0: u8 = 0x00;
    /// Die select register value for the second die
    const DIE_SELECT_DIE1: u8 = 0x40;

    /// How many status polls to issue before giving up on an operation.
    ///
    /// At any practical SPI clock this allows far longer than the slowest
    /// datasheet erase; exhausting it means the device is wedged.
    const READY_POLL_BUDGET: u32 = 100_000;

    /// Die select register value for a die index.
    fn die_select_value(die: u8) -> u8 {
        if die == 0 {
            Self::DIE_SELECT_DIE0
        } else {
            Self::DIE_SELECT_DIE1
        }
    }
}

/// ECC result of the last read, decoded from the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EccStatus {
    /// No errors detected or corrected
    Ok,
    /// Errors corrected, no action recommended
    Corrected,
    /// Errors corrected, rewrite of the block recommended
    Failing,
    /// Errors detected but not corrected
    Failed,
}

/// Identity bytes returned by the read-id command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId {
    manufacturer: u8,
    device: u8,
}

impl DeviceId {
    pub const fn new(manufacturer: u8, device: u8) -> Self {
        DeviceId {
            manufacturer,
            device,
        }
    }

    pub const fn manufacturer(&self) -> u8 {
        self.manufacturer
    }

    pub const fn device(&self) -> u8 {
        self.device
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeviceId {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "DeviceId(mfr: {:02X}, dev: {:02X})",
            self.manufacturer,
            self.device
        );
    }
}
