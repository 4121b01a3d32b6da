use crate::{DeviceGeometry, PhysicalAddress};

/// Iterate every (die, block) pair of a device, die-major, as a full-chip
/// erase visits them.
pub struct DieBlockIter {
    num_dies: u8,
    blocks_per_die: u16,
    die: u8,
    block: u16,
}

impl DieBlockIter {
    pub fn new(geometry: &DeviceGeometry) -> Self {
        DieBlockIter {
            num_dies: geometry.num_dies,
            blocks_per_die: geometry.blocks_per_die,
            die: 0,
            block: 0,
        }
    }
}

impl Iterator for DieBlockIter {
    type Item = PhysicalAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.die >= self.num_dies {
            return None;
        }
        let address = PhysicalAddress::block_start(self.die, self.block);
        self.block += 1;
        if self.block >= self.blocks_per_die {
            self.block = 0;
            self.die += 1;
        }
        Some(address)
    }
}
