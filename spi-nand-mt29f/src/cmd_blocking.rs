use embedded_hal::spi::{Operation, SpiDevice};
use nand_layout::{ColumnAddress, PhysicalAddress, RowAddress};
use utils::{spi_transaction, spi_transfer_in_place, spi_write};

use crate::{config, error::SpiFlashError, status, DeviceId, EccStatus, SpiNand};

const DUMMY_BYTE: u8 = 0x00;

/// Blocking SPI NAND command layer.
/// Contains the low level, mostly single SPI operation commands.
///
/// Compound functions are provided on top: die selection against the
/// die-select feature register, busy polling, and the erase/read/program
/// sequences including the required write enables and failure checks.
///
/// The default implementations follow the standard serial NAND command set
/// and should work unchanged for most parts; look to the [`SpiNand`]
/// constants first when a device deviates.
pub trait SpiNandBlocking<SPI: SpiDevice>: SpiNand {
    // ============= Commands =============

    /// Issue a reset command to the flash device
    fn reset_cmd(&self, spi: &mut SPI) -> Result<(), SpiFlashError<SPI::Error>> {
        spi_write(spi, &[Self::RESET_COMMAND])
    }

    /// Read the manufacturer/device identity pair.
    /// One dummy byte after the opcode, then two data bytes.
    fn read_id_cmd(&self, spi: &mut SPI) -> Result<DeviceId, SpiFlashError<SPI::Error>> {
        let mut id = [0; 2];
        spi_transaction(
            spi,
            &mut [
                Operation::Write(&[Self::READ_ID_COMMAND, DUMMY_BYTE]),
                Operation::Read(&mut id),
            ],
        )?;
        Ok(DeviceId::new(id[0], id[1]))
    }

    /// Read a feature register
    fn get_feature_cmd(
        &self,
        spi: &mut SPI,
        register: u8,
    ) -> Result<u8, SpiFlashError<SPI::Error>> {
        let mut buf = [Self::GET_FEATURE_COMMAND, register, 0];
        spi_transfer_in_place(spi, &mut buf)?;
        Ok(buf[2])
    }

    /// Write a feature register
    fn set_feature_cmd(
        &self,
        spi: &mut SPI,
        register: u8,
        value: u8,
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        spi_write(spi, &[Self::SET_FEATURE_COMMAND, register, value])
    }

    /// Enable writing to the flash device
    fn write_enable_cmd(&self, spi: &mut SPI) -> Result<(), SpiFlashError<SPI::Error>> {
        spi_write(spi, &[Self::WRITE_ENABLE_COMMAND])
    }

    /// Disable writing to the flash device
    fn write_disable_cmd(&self, spi: &mut SPI) -> Result<(), SpiFlashError<SPI::Error>> {
        spi_write(spi, &[Self::WRITE_DISABLE_COMMAND])
    }

    /// Load a page from the array into the device cache register
    fn page_read_cmd(
        &self,
        spi: &mut SPI,
        row: RowAddress,
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        let [r0, r1, r2] = row.to_bytes();
        spi_write(spi, &[Self::PAGE_READ_COMMAND, r0, r1, r2])
    }

    /// Clock bytes out of the cache register starting at a column address.
    /// One dummy byte between the address and the data phase.
    fn read_from_cache_cmd(
        &self,
        spi: &mut SPI,
        column: ColumnAddress,
        buf: &mut [u8],
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        let [c0, c1] = column.to_bytes();
        spi_transaction(
            spi,
            &mut [
                Operation::Write(&[Self::READ_FROM_CACHE_COMMAND, c0, c1, DUMMY_BYTE]),
                Operation::Read(buf),
            ],
        )
    }

    /// Load program data into the cache register at a column address.
    /// Resets the rest of the cache register to 0xFF.
    fn program_load_cmd(
        &self,
        spi: &mut SPI,
        column: ColumnAddress,
        buf: &[u8],
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        let [c0, c1] = column.to_bytes();
        let header = [Self::PROGRAM_LOAD_COMMAND, c0, c1];
        spi_transaction(
            spi,
            &mut [Operation::Write(&header), Operation::Write(buf)],
        )
    }

    /// Program the cache register into the page at the row address
    fn program_execute_cmd(
        &self,
        spi: &mut SPI,
        row: RowAddress,
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        let [r0, r1, r2] = row.to_bytes();
        spi_write(spi, &[Self::PROGRAM_EXECUTE_COMMAND, r0, r1, r2])
    }

    /// Erase the block at the row address. Page bits are ignored by the
    /// device.
    fn block_erase_cmd(
        &self,
        spi: &mut SPI,
        row: RowAddress,
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        let [r0, r1, r2] = row.to_bytes();
        spi_write(spi, &[Self::BLOCK_ERASE_COMMAND, r0, r1, r2])
    }

    // ============= Status functions =============

    /// Check if the busy flag is set
    fn is_busy(&self, spi: &mut SPI) -> Result<bool, SpiFlashError<SPI::Error>> {
        let reg = self.get_feature_cmd(spi, Self::STATUS_REGISTER)?;
        Ok(reg & status::OIP != 0)
    }

    /// Poll the status register until the operation-in-progress bit clears,
    /// returning the final status byte.
    ///
    /// Gives up with [`SpiFlashError::Timeout`] once
    /// [`SpiNand::READY_POLL_BUDGET`] polls have been issued.
    fn wait_ready(&self, spi: &mut SPI) -> Result<u8, SpiFlashError<SPI::Error>> {
        for _ in 0..Self::READY_POLL_BUDGET {
            let reg = self.get_feature_cmd(spi, Self::STATUS_REGISTER)?;
            if reg & status::OIP == 0 {
                return Ok(reg);
            }
        }
        error!("Device stuck busy");
        Err(SpiFlashError::Timeout)
    }

    /// ECC result of the last page read
    fn ecc_status(&self, spi: &mut SPI) -> Result<EccStatus, SpiFlashError<SPI::Error>> {
        let reg = self.get_feature_cmd(spi, Self::STATUS_REGISTER)?;
        Ok(match (reg & status::ECC_MASK) >> 4 {
            0b000 => EccStatus::Ok,
            0b001 => EccStatus::Corrected,
            0b011 | 0b101 => EccStatus::Failing,
            _ => EccStatus::Failed,
        })
    }

    // ============= Die management =============

    /// Make `die` the target of subsequent commands.
    ///
    /// The die-select feature register is the cache: it is read back first
    /// and the select is only written on a mismatch, so repeated operations
    /// on one die cost a register read, not a redundant select.
    fn select_die(&self, spi: &mut SPI, die: u8) -> Result<(), SpiFlashError<SPI::Error>> {
        let target = Self::die_select_value(die);
        let current = self.get_feature_cmd(spi, Self::DIE_SELECT_REGISTER)?;
        if current != target {
            trace!("Die select: {}", die);
            self.set_feature_cmd(spi, Self::DIE_SELECT_REGISTER, target)?;
        }
        Ok(())
    }

    /// Clear the block-protection bits of one die
    fn unlock_die(&self, spi: &mut SPI, die: u8) -> Result<(), SpiFlashError<SPI::Error>> {
        self.select_die(spi, die)?;
        self.write_enable_cmd(spi)?;
        self.set_feature_cmd(spi, Self::BLOCK_LOCK_REGISTER, 0)
    }

    /// Enable the on-die ECC engine
    fn enable_ecc(&self, spi: &mut SPI) -> Result<(), SpiFlashError<SPI::Error>> {
        self.write_enable_cmd(spi)?;
        self.set_feature_cmd(spi, Self::CONFIGURATION_REGISTER, config::ECC_ENABLE)
    }

    // ============= Compound operations =============

    /// Erase the block containing `address`, blocking until the device is
    /// ready again.
    fn erase_block(
        &self,
        spi: &mut SPI,
        address: PhysicalAddress,
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        self.select_die(spi, address.die)?;
        self.write_enable_cmd(spi)?;
        debug!("Block erase: die {} block {}", address.die, address.block);
        self.block_erase_cmd(spi, address.row_address())?;
        let reg = self.wait_ready(spi)?;
        if reg & status::ERASE_FAIL != 0 {
            return Err(SpiFlashError::EraseFailed);
        }
        Ok(())
    }

    /// Read one page into `buf`: load the page into the cache register,
    /// wait until the array read completes, then clock the cache out from
    /// column 0.
    fn read_page(
        &self,
        spi: &mut SPI,
        address: PhysicalAddress,
        buf: &mut [u8],
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        self.select_die(spi, address.die)?;
        trace!("Page read: die {} block {} page {}", address.die, address.block, address.page);
        self.page_read_cmd(spi, address.row_address())?;
        self.wait_ready(spi)?;
        self.read_from_cache_cmd(spi, ColumnAddress::new(0), buf)
    }

    /// Program one page from `buf`.
    ///
    /// Landing on page 0 of a block erases that block first: pages of a
    /// block can only be programmed once after an erase, so a write to its
    /// first page starts the block over. Every other page of that block is
    /// lost. The layer above owns this hazard.
    fn write_page(
        &self,
        spi: &mut SPI,
        address: PhysicalAddress,
        buf: &[u8],
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        self.select_die(spi, address.die)?;
        self.write_enable_cmd(spi)?;

        if address.page == 0 {
            self.erase_block(spi, address)?;
        }

        trace!("Page program: die {} block {} page {}", address.die, address.block, address.page);
        self.program_load_cmd(spi, ColumnAddress::new(0), buf)?;
        self.write_enable_cmd(spi)?;
        self.program_execute_cmd(spi, address.row_address())?;
        let reg = self.wait_ready(spi)?;
        if reg & status::PROGRAM_FAIL != 0 {
            return Err(SpiFlashError::ProgramFailed);
        }
        Ok(())
    }
}

pub mod utils {
    use embedded_hal::spi::{Operation, SpiDevice};

    use super::SpiFlashError;

    /// Wrapper around [SpiDevice::write] that maps errors
    pub fn spi_write<SPI: SpiDevice>(
        spi: &mut SPI,
        buf: &[u8],
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        spi.write(buf).map_err(SpiFlashError::Spi)
    }

    /// Wrapper around [SpiDevice::transfer_in_place] that maps errors
    pub fn spi_transfer_in_place<SPI: SpiDevice>(
        spi: &mut SPI,
        buf: &mut [u8],
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        spi.transfer_in_place(buf).map_err(SpiFlashError::Spi)
    }

    /// Wrapper around [SpiDevice::transaction] that maps errors
    pub fn spi_transaction<SPI: SpiDevice>(
        spi: &mut SPI,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), SpiFlashError<SPI::Error>> {
        spi.transaction(operations).map_err(SpiFlashError::Spi)
    }
}
