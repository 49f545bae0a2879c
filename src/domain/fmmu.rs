use crate::register::datalink::FmmuRegister;
use crate::slave_config::SlaveConfigIndex;
use crate::Direction;

/// Mapping of one sync manager's process data into a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmmuConfig {
    slave_config: SlaveConfigIndex,
    sync_index: u8,
    direction: Direction,
    logical_domain_offset: u32,
    data_size: usize,
}

impl FmmuConfig {
    pub(crate) fn new(
        slave_config: SlaveConfigIndex,
        sync_index: u8,
        direction: Direction,
        logical_domain_offset: u32,
        data_size: usize,
    ) -> Self {
        Self {
            slave_config,
            sync_index,
            direction,
            logical_domain_offset,
            data_size,
        }
    }

    pub fn slave_config(&self) -> SlaveConfigIndex {
        self.slave_config
    }

    pub fn sync_index(&self) -> u8 {
        self.sync_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Offset relative to the domain's logical base address.
    pub fn logical_domain_offset(&self) -> u32 {
        self.logical_domain_offset
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub(crate) fn domain_range(&self) -> core::ops::Range<usize> {
        let start = self.logical_domain_offset as usize;
        start..start + self.data_size
    }

    /// Register image that configures this mapping in the slave.
    pub fn config_page(
        &self,
        logical_base_address: u32,
        physical_start_address: u16,
    ) -> FmmuRegister<[u8; 16]> {
        let mut page = FmmuRegister::zeroed();
        page.set_logical_start_address(logical_base_address.wrapping_add(self.logical_domain_offset));
        page.set_length(self.data_size as u16);
        page.set_logical_start_bit(0);
        page.set_logical_end_bit(7);
        page.set_physical_start_address(physical_start_address);
        page.set_physical_start_bit(0);
        if self.direction == Direction::Input {
            page.set_read_enable(true);
        } else {
            page.set_write_enable(true);
        }
        page.set_enable(true);
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_page_layout() {
        let fmmu = FmmuConfig::new(SlaveConfigIndex(0), 3, Direction::Input, 0x10, 6);
        let page = fmmu.config_page(0x0001_0000, 0x1100).into_inner();
        assert_eq!(
            page,
            [
                0x10, 0x00, 0x01, 0x00, // logical start address
                0x06, 0x00, // length
                0x00, 0x07, // start and end bit
                0x00, 0x11, // physical start address
                0x00, // physical start bit
                0x01, // read
                0x01, 0x00, // enable
                0x00, 0x00,
            ]
        );

        let fmmu = FmmuConfig::new(SlaveConfigIndex(0), 2, Direction::Output, 0, 2);
        assert_eq!(fmmu.config_page(0, 0x1000).into_inner()[11], 0x02);
    }
}
