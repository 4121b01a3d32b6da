//! Wire-level driver tests against an in-memory MT29F emulator.
//!
//! The emulator implements [`embedded_hal::spi::SpiDevice`] and decodes the
//! actual command frames, so opcode layout, row/column byte order and the
//! write-enable discipline are all exercised for real. Storage is a sparse
//! map keyed by (die, block, page); a missing page reads as erased (0xFF).

use std::collections::HashMap;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};
use nand_layout::{DeviceGeometry, NandFlash, PhysicalAddress};
use spi_nand_mt29f::error::SpiFlashError;
use spi_nand_mt29f::micron::Mt29f2g01;
use spi_nand_mt29f::{EccStatus, SpiNandDevice};
use test_log::test;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BusFault;

impl embedded_hal::spi::Error for BusFault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

struct Mt29fSim {
    geometry: DeviceGeometry,
    id: [u8; 2],
    pages: HashMap<(u8, u16, u16), Vec<u8>>,
    cache: HashMap<u8, Vec<u8>>,
    die_select: u8,
    block_lock: [u8; 2],
    configuration: u8,
    write_enabled: bool,
    stuck_busy: bool,
    fail_after: Option<u32>,
    // counters inspected by tests
    transactions: u32,
    resets: u32,
    die_select_writes: u32,
    erase_counts: HashMap<(u8, u16), u32>,
}

impl Mt29fSim {
    fn new(geometry: DeviceGeometry) -> Self {
        Mt29fSim {
            geometry,
            id: [0x2C, 0x24],
            pages: HashMap::new(),
            cache: HashMap::new(),
            die_select: 0x00,
            // power-on state: block protection bits set on both dies
            block_lock: [0x38; 2],
            configuration: 0,
            write_enabled: false,
            stuck_busy: false,
            fail_after: None,
            transactions: 0,
            resets: 0,
            die_select_writes: 0,
            erase_counts: HashMap::new(),
        }
    }

    fn current_die(&self) -> u8 {
        if self.die_select == 0x40 {
            1
        } else {
            0
        }
    }

    fn page_len(&self) -> usize {
        self.geometry.bytes_per_page as usize
    }

    fn feature(&self, register: u8) -> u8 {
        match register {
            0xA0 => self.block_lock[self.current_die() as usize],
            0xB0 => self.configuration,
            0xC0 => {
                if self.stuck_busy {
                    0x01
                } else {
                    0x00
                }
            }
            0xD0 => self.die_select,
            _ => 0,
        }
    }

    fn set_feature(&mut self, register: u8, value: u8) {
        match register {
            0xA0 => self.block_lock[self.current_die() as usize] = value,
            0xB0 => self.configuration = value,
            0xD0 => {
                self.die_select = value;
                self.die_select_writes += 1;
            }
            _ => {}
        }
    }

    fn row(bytes: &[u8]) -> (u16, u16) {
        let row = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        (((row >> 6) & 0x07FF) as u16, (row & 0x003F) as u16)
    }

    fn erase_block(&mut self, block: u16) {
        let die = self.current_die();
        self.pages.retain(|&(d, b, _), _| !(d == die && b == block));
        *self.erase_counts.entry((die, block)).or_insert(0) += 1;
        self.write_enabled = false;
    }

    fn erases(&self, die: u8, block: u16) -> u32 {
        self.erase_counts.get(&(die, block)).copied().unwrap_or(0)
    }
}

impl ErrorType for Mt29fSim {
    type Error = BusFault;
}

impl SpiDevice for Mt29fSim {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), BusFault> {
        self.transactions += 1;
        if self.fail_after.is_some_and(|n| self.transactions > n) {
            return Err(BusFault);
        }

        // A lone in-place transfer is the get-feature frame.
        if operations.len() == 1 {
            if let Operation::TransferInPlace(buf) = &mut operations[0] {
                assert_eq!(buf[0], 0x0F, "unexpected in-place opcode");
                buf[2] = self.feature(buf[1]);
                return Ok(());
            }
        }

        let header: Vec<u8> = match &operations[0] {
            Operation::Write(frame) => frame.to_vec(),
            _ => panic!("transaction must start with a command write"),
        };

        match header[0] {
            0xFF => {
                assert_eq!(header.len(), 1);
                self.resets += 1;
            }
            0x06 => self.write_enabled = true,
            0x04 => self.write_enabled = false,
            0x1F => self.set_feature(header[1], header[2]),
            0x9F => {
                assert_eq!(header.len(), 2, "read-id takes one dummy byte");
                let id = self.id;
                match &mut operations[1] {
                    Operation::Read(buf) => buf.copy_from_slice(&id),
                    _ => panic!("read-id expects a read phase"),
                }
            }
            0x13 => {
                assert_eq!(header.len(), 4);
                let (block, page) = Self::row(&header[1..4]);
                let die = self.current_die();
                let data = self
                    .pages
                    .get(&(die, block, page))
                    .cloned()
                    .unwrap_or_else(|| vec![0xFF; self.page_len()]);
                self.cache.insert(die, data);
            }
            0x03 => {
                assert_eq!(header.len(), 4, "cache read takes one dummy byte");
                let column = u16::from_be_bytes([header[1], header[2]]) as usize;
                let die = self.current_die();
                let cache = self
                    .cache
                    .get(&die)
                    .cloned()
                    .unwrap_or_else(|| vec![0xFF; self.page_len()]);
                match &mut operations[1] {
                    Operation::Read(buf) => buf.copy_from_slice(&cache[column..column + buf.len()]),
                    _ => panic!("cache read expects a read phase"),
                }
            }
            0x02 => {
                assert_eq!(header.len(), 3, "program load has no dummy byte");
                let column = u16::from_be_bytes([header[1], header[2]]) as usize;
                let data = match &operations[1] {
                    Operation::Write(payload) => payload.to_vec(),
                    _ => panic!("program load expects a data write"),
                };
                let mut cache = vec![0xFF; self.page_len()];
                cache[column..column + data.len()].copy_from_slice(&data);
                self.cache.insert(self.current_die(), cache);
            }
            0x10 => {
                assert_eq!(header.len(), 4);
                assert!(self.write_enabled, "program execute without write enable");
                let (block, page) = Self::row(&header[1..4]);
                let die = self.current_die();
                let cache = self
                    .cache
                    .get(&die)
                    .cloned()
                    .unwrap_or_else(|| vec![0xFF; self.page_len()]);
                self.pages.insert((die, block, page), cache);
                self.write_enabled = false;
            }
            0xD8 => {
                assert_eq!(header.len(), 4);
                assert!(self.write_enabled, "block erase without write enable");
                let (block, _page) = Self::row(&header[1..4]);
                self.erase_block(block);
            }
            other => panic!("unexpected opcode {other:#04x}"),
        }
        Ok(())
    }
}

// Small shape so whole-device sweeps stay cheap.
const SMALL: DeviceGeometry = DeviceGeometry {
    num_dies: 2,
    blocks_per_die: 4,
    pages_per_block: 4,
    bytes_per_page: 32,
    oob_bytes: 0,
};

const PAGE: usize = 32;

fn new_flash(geometry: DeviceGeometry) -> SpiNandDevice<Mt29fSim, Mt29f2g01> {
    SpiNandDevice::new(Mt29fSim::new(geometry), Mt29f2g01::new(geometry))
}

#[test]
fn init_configures_device() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();

    assert_eq!(flash.spi.resets, 1);
    assert_ne!(flash.spi.configuration & 0x10, 0, "ECC not enabled");
    assert_eq!(flash.spi.block_lock, [0, 0], "dies left locked");
    // unlock order is die 1 then die 0: one select each, die 0 left active
    assert_eq!(flash.spi.die_select_writes, 2);
    assert_eq!(flash.spi.die_select, 0x00);
}

#[test]
fn init_rejects_unknown_id() {
    let mut flash = new_flash(SMALL);
    flash.spi.id = [0x2C, 0x36];

    let err = flash.init(&mut NoDelay).unwrap_err();
    assert!(matches!(
        err,
        SpiFlashError::DeviceNotFound {
            manufacturer: 0x2C,
            device: 0x36
        }
    ));
}

#[test]
fn unaligned_lengths_are_rejected_without_bus_traffic() {
    let mut flash = new_flash(SMALL);

    let mut buf = [0u8; PAGE + 1];
    assert!(matches!(
        flash.read(0, &mut buf),
        Err(SpiFlashError::NotAligned)
    ));
    assert!(matches!(
        flash.write(0, &buf),
        Err(SpiFlashError::NotAligned)
    ));
    assert!(matches!(
        flash.read(0, &mut []),
        Err(SpiFlashError::NotAligned)
    ));
    assert_eq!(flash.spi.transactions, 0);
}

#[test]
fn write_to_page_zero_erases_the_block_first() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();

    let first = [0xA1u8; PAGE];
    let second = [0xB2u8; PAGE];

    flash.write(0, &first).unwrap();
    assert_eq!(flash.spi.erases(0, 0), 1);

    // page 1 of the same block: no fresh erase
    flash.write(PAGE as u64, &second).unwrap();
    assert_eq!(flash.spi.erases(0, 0), 1);

    let mut buf = [0u8; PAGE];
    flash.read(0, &mut buf).unwrap();
    assert_eq!(buf, first);
    flash.read(PAGE as u64, &mut buf).unwrap();
    assert_eq!(buf, second);
}

#[test]
fn rewriting_page_zero_discards_the_rest_of_the_block() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();

    flash.write(0, &[0xA1u8; PAGE]).unwrap();
    flash.write(PAGE as u64, &[0xB2u8; PAGE]).unwrap();

    // landing on page 0 again starts the block over
    flash.write(0, &[0xC3u8; PAGE]).unwrap();
    assert_eq!(flash.spi.erases(0, 0), 2);

    let mut buf = [0u8; PAGE];
    flash.read(PAGE as u64, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; PAGE]);
}

#[test]
fn read_transfers_exactly_one_page() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();

    flash.write(0, &[0xA1u8; PAGE]).unwrap();
    flash.write(PAGE as u64, &[0xB2u8; PAGE]).unwrap();

    // multi-page buffers are accepted but only the first page is filled;
    // callers loop for longer reads
    let mut buf = [0u8; 2 * PAGE];
    flash.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..PAGE], &[0xA1; PAGE]);
    assert_eq!(&buf[PAGE..], &[0u8; PAGE]);
}

#[test]
fn die_select_is_issued_only_on_change() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();
    let after_init = flash.spi.die_select_writes;

    let die1 = SMALL.bytes_per_die();
    let mut buf = [0u8; PAGE];

    // two operations on die 1: one select between them, not two
    flash.read(die1, &mut buf).unwrap();
    flash.read(die1 + PAGE as u64, &mut buf).unwrap();
    assert_eq!(flash.spi.die_select_writes, after_init + 1);

    // back to die 0
    flash.read(0, &mut buf).unwrap();
    assert_eq!(flash.spi.die_select_writes, after_init + 2);
}

#[test]
fn writes_land_on_the_selected_die() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();

    let die1 = SMALL.bytes_per_die();
    flash.write(die1, &[0x5Au8; PAGE]).unwrap();

    assert_eq!(flash.spi.erases(1, 0), 1);
    assert_eq!(flash.spi.erases(0, 0), 0);
    assert!(flash.spi.pages.contains_key(&(1, 0, 0)));

    let mut buf = [0u8; PAGE];
    flash.read(die1, &mut buf).unwrap();
    assert_eq!(buf, [0x5A; PAGE]);
}

#[test]
fn block_boundary_write_erases_the_next_block() {
    // full-size shape: offset 139264 is exactly one block of bytes
    let geometry = Mt29f2g01::GEOMETRY;
    let mut flash = new_flash(geometry);
    flash.init(&mut NoDelay).unwrap();

    let data = vec![0x55u8; geometry.bytes_per_page as usize];
    flash.write(139_264, &data).unwrap();

    assert_eq!(flash.spi.erases(0, 1), 1);
    assert_eq!(flash.spi.erases(0, 0), 0);
}

#[test]
fn write_read_roundtrip_reference_geometry() {
    let geometry = Mt29f2g01::GEOMETRY;
    let mut flash = new_flash(geometry);
    flash.init(&mut NoDelay).unwrap();

    let page = geometry.bytes_per_page as usize;
    let data = vec![0xAAu8; page];
    flash.write(0, &data).unwrap();
    assert_eq!(flash.spi.erases(0, 0), 1);

    let mut buf = vec![0u8; page];
    flash.read(0, &mut buf).unwrap();
    assert_eq!(buf, data);
    assert_eq!(flash.ecc_status().unwrap(), EccStatus::Ok);
}

#[test]
fn erase_block_by_address() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();

    flash
        .erase_block(PhysicalAddress::block_start(1, 2))
        .unwrap();
    assert_eq!(flash.spi.erases(1, 2), 1);
}

#[test]
fn chip_erase_visits_every_block_once() {
    let mut flash = new_flash(SMALL);
    flash.init(&mut NoDelay).unwrap();

    flash.write(0, &[0x77u8; PAGE]).unwrap();
    let baseline = flash.spi.erases(0, 0);

    flash.chip_erase().unwrap();
    for die in 0..SMALL.num_dies {
        for block in 0..SMALL.blocks_per_die {
            let expected = if (die, block) == (0, 0) { baseline + 1 } else { 1 };
            assert_eq!(flash.spi.erases(die, block), expected);
        }
    }
    assert!(flash.spi.pages.is_empty());

    // erasing an already erased device is the same sweep again
    flash.chip_erase().unwrap();
    assert_eq!(flash.spi.erases(1, 3), 2);

    let mut buf = [0u8; PAGE];
    flash.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; PAGE]);
}

#[test]
fn stuck_busy_device_times_out() {
    let mut flash = new_flash(SMALL);
    flash.spi.stuck_busy = true;

    let err = flash.init(&mut NoDelay).unwrap_err();
    assert!(matches!(err, SpiFlashError::Timeout));
}

#[test]
fn transport_errors_pass_through() {
    let mut flash = new_flash(SMALL);
    flash.spi.fail_after = Some(1);

    let err = flash.init(&mut NoDelay).unwrap_err();
    assert!(matches!(err, SpiFlashError::Spi(BusFault)));
}
