use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use nand_layout::{
    check_page_multiple, DeviceGeometry, DieBlockIter, ErrorType, NandFlash, PhysicalAddress,
};

use crate::{cmd_blocking::SpiNandBlocking, error::SpiFlashError, DeviceId, EccStatus};

/// Owned session over one SPI NAND device.
///
/// Generic over the SPI peripheral and the flash device definition D, which
/// carries the geometry and command set. Every operation takes `&mut self`:
/// the bus and the die-select state belong to a single owner, and callers
/// that need concurrent access serialize around the whole session.
///
/// [`SpiNandDevice`] implements [`nand_layout::NandFlash`], the seam the
/// append-log layer above builds on.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiNandDevice<SPI, D> {
    pub spi: SPI,
    pub device: D,
}

// Manually implement Debug to avoid bounds on SPI
impl<SPI, D> Debug for SpiNandDevice<SPI, D>
where
    D: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpiNandDevice")
            .field("device", &self.device)
            .finish()
    }
}

impl<SPI, D> SpiNandDevice<SPI, D> {
    /// Create a new [SpiNandDevice] with the given SPI peripheral and flash device.
    pub fn new(spi: SPI, device: D) -> Self {
        SpiNandDevice { spi, device }
    }
}

impl<SPI: SpiDevice, D: SpiNandBlocking<SPI>> SpiNandDevice<SPI, D> {
    /// Power-on bring-up: reset, identity check, ECC on, unlock every die.
    ///
    /// The reset is followed by the power-on settle time (1.25 ms minimum
    /// per datasheet) before the first status poll. An identity mismatch is
    /// fatal; the caller should treat the device as absent.
    ///
    /// Dies are unlocked in descending order so die 0 is left selected.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), SpiFlashError<SPI::Error>> {
        self.device.reset_cmd(&mut self.spi)?;
        delay.delay_ms(2);
        self.device.wait_ready(&mut self.spi)?;

        let id = self.device.read_id_cmd(&mut self.spi)?;
        let expected = DeviceId::new(D::MANUFACTURER_ID, D::DEVICE_ID);
        if id != expected {
            error!(
                "Wrong ID: {:02X} {:02X}, expected: {:02X} {:02X}",
                id.manufacturer(),
                id.device(),
                D::MANUFACTURER_ID,
                D::DEVICE_ID
            );
            return Err(SpiFlashError::DeviceNotFound {
                manufacturer: id.manufacturer(),
                device: id.device(),
            });
        }

        self.device.enable_ecc(&mut self.spi)?;

        for die in (0..self.device.geometry().num_dies).rev() {
            self.device.unlock_die(&mut self.spi, die)?;
        }

        info!("NAND init complete");
        Ok(())
    }

    /// Identity pair read back from the device
    pub fn read_id(&mut self) -> Result<DeviceId, SpiFlashError<SPI::Error>> {
        self.device.read_id_cmd(&mut self.spi)
    }

    /// ECC result of the last page read
    pub fn ecc_status(&mut self) -> Result<EccStatus, SpiFlashError<SPI::Error>> {
        self.device.ecc_status(&mut self.spi)
    }
}

impl<SPI: SpiDevice, D: SpiNandBlocking<SPI>> ErrorType for SpiNandDevice<SPI, D> {
    type Error = SpiFlashError<SPI::Error>;
}

impl<SPI: SpiDevice, D: SpiNandBlocking<SPI>> NandFlash for SpiNandDevice<SPI, D> {
    fn geometry(&self) -> &DeviceGeometry {
        self.device.geometry()
    }

    fn read(&mut self, offset: u64, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let geometry = *self.device.geometry();
        check_page_multiple(&geometry, bytes.len())?;

        trace!("Reading {} bytes from offset {}", bytes.len(), offset);
        let address = PhysicalAddress::from_byte_offset(offset, &geometry);
        let page = geometry.bytes_per_page as usize;
        self.device
            .read_page(&mut self.spi, address, &mut bytes[..page])
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), Self::Error> {
        let geometry = *self.device.geometry();
        check_page_multiple(&geometry, bytes.len())?;

        trace!("Writing {} bytes to offset {}", bytes.len(), offset);
        let address = PhysicalAddress::from_byte_offset(offset, &geometry);
        let page = geometry.bytes_per_page as usize;
        self.device
            .write_page(&mut self.spi, address, &bytes[..page])
    }

    fn erase_block(&mut self, address: PhysicalAddress) -> Result<(), Self::Error> {
        self.device.erase_block(&mut self.spi, address)
    }

    fn chip_erase(&mut self) -> Result<(), Self::Error> {
        info!("Erasing NAND chip");
        let geometry = *self.device.geometry();
        for address in DieBlockIter::new(&geometry) {
            self.device.erase_block(&mut self.spi, address)?;
        }
        info!("Erase complete");
        Ok(())
    }
}
