use core::fmt::Debug;
use nand_layout::{NandFlashError, NandFlashErrorKind};

/// Error type for the SPI NAND driver.
///
/// Generic over the SPI error type (SE) so transport failures are passed
/// through verbatim, without retry.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpiFlashError<SE> {
    /// Error from the SPI peripheral
    #[error("SpiDevice error: {0}")]
    Spi(SE),
    /// The read-id response did not match the expected part.
    /// Carries the identity bytes the device answered with.
    #[error("device not found, read id {manufacturer:02X} {device:02X}")]
    DeviceNotFound { manufacturer: u8, device: u8 },
    /// Transfer length is not a positive multiple of the page size
    #[error("length not a whole number of pages")]
    NotAligned,
    /// The busy bit stayed set for the whole poll budget
    #[error("timed out waiting for device ready")]
    Timeout,
    /// Block erase failed.
    /// This can happen if the block is protected, write is disabled or the block has failed.
    #[error("erase failed")]
    EraseFailed,
    /// Program failed.
    /// This can happen if write is disabled, the block is protected or the block has failed.
    #[error("program failed")]
    ProgramFailed,
    /// Other error
    #[error("other error. Should not happen")]
    Other,
}

// Convert to the generic NandFlashError kinds
impl<SE: Debug> NandFlashError for SpiFlashError<SE> {
    fn kind(&self) -> NandFlashErrorKind {
        match self {
            SpiFlashError::Spi(_) => NandFlashErrorKind::Other,
            SpiFlashError::DeviceNotFound { .. } => NandFlashErrorKind::DeviceNotFound,
            SpiFlashError::NotAligned => NandFlashErrorKind::NotAligned,
            SpiFlashError::Timeout => NandFlashErrorKind::Timeout,
            SpiFlashError::EraseFailed => NandFlashErrorKind::BlockFail,
            SpiFlashError::ProgramFailed => NandFlashErrorKind::BlockFail,
            SpiFlashError::Other => NandFlashErrorKind::Other,
        }
    }
}

// This impl is only for the check helper functions so `?` converts their
// rejections into the driver error.
impl<SE> From<NandFlashErrorKind> for SpiFlashError<SE> {
    fn from(kind: NandFlashErrorKind) -> Self {
        match kind {
            NandFlashErrorKind::NotAligned => SpiFlashError::NotAligned,
            NandFlashErrorKind::Timeout => SpiFlashError::Timeout,
            _ => SpiFlashError::Other,
        }
    }
}
