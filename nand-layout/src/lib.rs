#![no_std]

mod address;
pub mod iter;

pub use address::{ColumnAddress, DeviceGeometry, PhysicalAddress, RowAddress};
pub use iter::DieBlockIter;

pub trait NandFlashError {
    /// Convert a specific NAND flash error into a generic error kind
    fn kind(&self) -> NandFlashErrorKind;
}

/// A trait that NandFlash implementations can use to share an error type.
pub trait ErrorType {
    /// Errors returned by this NAND flash.
    type Error: NandFlashError;
}

/// NAND flash error kinds.
///
/// NAND flash implementations must map their error to those generic error kinds through the
/// [`NandFlashError`] trait.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum NandFlashErrorKind {
    /// The transfer length is not a positive whole number of pages.
    NotAligned,

    /// The device did not answer the identification handshake with the
    /// expected manufacturer/device pair.
    DeviceNotFound,

    /// The device kept reporting an operation in progress for the whole
    /// poll budget.
    Timeout,

    /// Erase or program reported failure in the status register.
    BlockFail,

    /// Error specific to the implementation.
    Other,
}

/// Page-granular NAND storage seam.
///
/// The driver exposes a linear byte address space; implementations translate
/// offsets to the physical die/block/page shape described by
/// [`DeviceGeometry`]. Offsets past [`NandFlash::capacity`] are a caller
/// error and are not checked here.
pub trait NandFlash: ErrorType {
    /// Shape of the attached device.
    fn geometry(&self) -> &DeviceGeometry;

    /// The capacity of the device in bytes.
    fn capacity(&self) -> u64 {
        self.geometry().capacity()
    }

    /// Read whole pages starting at `offset`.
    ///
    /// `bytes.len()` must be a positive multiple of the page size. Exactly
    /// one page is transferred per call; callers loop for longer reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is not page aligned. The
    /// implementation can use the [`check_page_multiple`] helper function.
    fn read(&mut self, offset: u64, bytes: &mut [u8]) -> Result<(), Self::Error>;

    /// Program whole pages starting at `offset`.
    ///
    /// Same length contract as [`NandFlash::read`]. Writing to page 0 of a
    /// block erases that block first, discarding every other page in it.
    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Erase the block containing `address`. Page bits of the row are
    /// ignored by the device.
    fn erase_block(&mut self, address: PhysicalAddress) -> Result<(), Self::Error>;

    /// Erase every block on every die.
    fn chip_erase(&mut self) -> Result<(), Self::Error>;

    /// Iterate over every (die, block) pair in erase order.
    fn die_blocks(&self) -> DieBlockIter {
        DieBlockIter::new(self.geometry())
    }
}

/// Return whether a transfer length is a positive whole number of pages.
pub fn check_page_multiple(
    geometry: &DeviceGeometry,
    length: usize,
) -> Result<(), NandFlashErrorKind> {
    if length == 0 || length % geometry.bytes_per_page as usize != 0 {
        return Err(NandFlashErrorKind::NotAligned);
    }
    Ok(())
}
