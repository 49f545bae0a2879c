use crate::config::{MAX_FMMUS, MAX_SYNC_MANAGERS};
use crate::domain::Domain;
use crate::error::Error;
use crate::request::{foe::FoeRequest, reg::RegRequest, sdo::SdoRequest, RequestHandle};
use crate::Direction;
use alloc::vec::Vec;
use log::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlaveConfigIndex(pub(crate) usize);

impl SlaveConfigIndex {
    pub fn get(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoEntry {
    pub index: u16,
    pub subindex: u8,
    pub bit_length: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pdo {
    pub index: u16,
    pub entries: Vec<PdoEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncConfig {
    pub direction: Direction,
    pub physical_start_address: u16,
    pub pdos: Vec<Pdo>,
}

impl SyncConfig {
    /// Process data size in bytes, rounded up.
    pub fn total_size(&self) -> usize {
        let bits: usize = self
            .pdos
            .iter()
            .flat_map(|pdo| pdo.entries.iter())
            .map(|entry| entry.bit_length as usize)
            .sum();
        (bits + 7) / 8
    }
}

/// Byte offset of a registered PDO entry inside a domain's process data,
/// plus the bit inside that byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoEntryOffset {
    pub byte: u32,
    pub bit: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FmmuSlot {
    domain_index: usize,
    sync_index: u8,
    logical_domain_offset: u32,
}

/// Expected slave at a bus position together with its process data layout
/// and the requests that belong to its configuration.
#[derive(Debug)]
pub struct SlaveConfig {
    index: SlaveConfigIndex,
    alias: u16,
    position: u16,
    vendor_id: u32,
    product_code: u32,
    pub allow_overlapping_pdos: bool,
    sync_configs: heapless::Vec<SyncConfig, MAX_SYNC_MANAGERS>,
    fmmus: heapless::Vec<FmmuSlot, MAX_FMMUS>,
    sdo_requests: Vec<RequestHandle<SdoRequest>>,
    reg_requests: Vec<RequestHandle<RegRequest>>,
    foe_requests: Vec<RequestHandle<FoeRequest>>,
}

impl SlaveConfig {
    fn new(
        index: SlaveConfigIndex,
        alias: u16,
        position: u16,
        vendor_id: u32,
        product_code: u32,
    ) -> Self {
        Self {
            index,
            alias,
            position,
            vendor_id,
            product_code,
            allow_overlapping_pdos: false,
            sync_configs: heapless::Vec::new(),
            fmmus: heapless::Vec::new(),
            sdo_requests: Vec::new(),
            reg_requests: Vec::new(),
            foe_requests: Vec::new(),
        }
    }

    pub fn index(&self) -> SlaveConfigIndex {
        self.index
    }

    pub fn alias(&self) -> u16 {
        self.alias
    }

    pub fn position(&self) -> u16 {
        self.position
    }

    pub fn vendor_id(&self) -> u32 {
        self.vendor_id
    }

    pub fn product_code(&self) -> u32 {
        self.product_code
    }

    /// Configures a sync manager and returns it for adding PDOs.
    pub fn sync_manager(
        &mut self,
        sync_index: u8,
        direction: Direction,
        physical_start_address: u16,
    ) -> Result<&mut SyncConfig, Error> {
        let index = sync_index as usize;
        if index >= MAX_SYNC_MANAGERS {
            error!(
                "Config {}:{}: Invalid sync manager index {}.",
                self.alias, self.position, sync_index
            );
            return Err(Error::InvalidSlaveConfig);
        }
        while self.sync_configs.len() <= index {
            // bounded by the index check above
            let _ = self.sync_configs.push(SyncConfig::default());
        }
        let sync = &mut self.sync_configs[index];
        sync.direction = direction;
        sync.physical_start_address = physical_start_address;
        Ok(sync)
    }

    pub fn sync_config(&self, sync_index: u8) -> Option<&SyncConfig> {
        self.sync_configs.get(sync_index as usize)
    }

    pub fn fmmu_count(&self) -> usize {
        self.fmmus.len()
    }

    /// Domain offset of the FMMU covering `sync_index` in the given domain.
    pub fn fmmu_offset(&self, domain_index: usize, sync_index: u8) -> Option<u32> {
        self.fmmus
            .iter()
            .find(|fmmu| fmmu.domain_index == domain_index && fmmu.sync_index == sync_index)
            .map(|fmmu| fmmu.logical_domain_offset)
    }

    /// Makes sure an FMMU maps `sync_index` into `domain` and returns its
    /// domain offset.
    pub fn prepare_fmmu(&mut self, domain: &mut Domain<'_>, sync_index: u8) -> Result<u32, Error> {
        if let Some(offset) = self.fmmu_offset(domain.index(), sync_index) {
            return Ok(offset);
        }
        if self.fmmus.is_full() {
            error!("Config {}:{}: FMMU limit reached!", self.alias, self.position);
            return Err(Error::FmmuLimitReached);
        }
        let sync = self
            .sync_config(sync_index)
            .ok_or(Error::InvalidSlaveConfig)?;
        let direction = sync.direction;
        let size = sync.total_size();
        let offset = domain.add_fmmu_config(
            self.index,
            self.allow_overlapping_pdos,
            sync_index,
            direction,
            size,
        )?;
        let slot = FmmuSlot {
            domain_index: domain.index(),
            sync_index,
            logical_domain_offset: offset,
        };
        self.fmmus.push(slot).map_err(|_| Error::FmmuLimitReached)?;
        Ok(offset)
    }

    /// Registers the PDO entry `index:subindex` in `domain`. The entry may
    /// start at any bit.
    pub fn reg_pdo_entry(
        &mut self,
        index: u16,
        subindex: u8,
        domain: &mut Domain<'_>,
    ) -> Result<PdoEntryOffset, Error> {
        let (sync_index, bit_offset) = self.find_entry(index, subindex).ok_or_else(|| {
            error!(
                "Config {}:{}: PDO entry 0x{:04X}:{:02X} is not mapped.",
                self.alias, self.position, index, subindex
            );
            Error::PdoEntryNotMapped { index, subindex }
        })?;
        self.entry_offset(sync_index, bit_offset, domain)
    }

    /// Like [`SlaveConfig::reg_pdo_entry`], but the entry has to start on a
    /// byte boundary.
    pub fn reg_pdo_entry_aligned(
        &mut self,
        index: u16,
        subindex: u8,
        domain: &mut Domain<'_>,
    ) -> Result<u32, Error> {
        let (sync_index, bit_offset) = self
            .find_entry(index, subindex)
            .ok_or(Error::PdoEntryNotMapped { index, subindex })?;
        if bit_offset % 8 != 0 {
            error!(
                "Config {}:{}: PDO entry 0x{:04X}:{:02X} does not byte-align.",
                self.alias, self.position, index, subindex
            );
            return Err(Error::PdoEntryNotByteAligned { index, subindex });
        }
        Ok(self.entry_offset(sync_index, bit_offset, domain)?.byte)
    }

    /// Registers a PDO entry addressed by its position in the sync manager.
    pub fn reg_pdo_entry_pos(
        &mut self,
        sync_index: u8,
        pdo_pos: usize,
        entry_pos: usize,
        domain: &mut Domain<'_>,
    ) -> Result<PdoEntryOffset, Error> {
        if sync_index as usize >= MAX_SYNC_MANAGERS {
            error!(
                "Config {}:{}: Invalid syncmanager position {}.",
                self.alias, self.position, sync_index
            );
            return Err(Error::InvalidSlaveConfig);
        }
        let out_of_range = Error::PdoEntryOutOfRange {
            sync_index,
            pdo_pos,
            entry_pos,
        };
        let sync = self.sync_config(sync_index).ok_or(out_of_range.clone())?;
        let mut bit_offset = 0;
        for (pp, pdo) in sync.pdos.iter().enumerate() {
            for (ep, entry) in pdo.entries.iter().enumerate() {
                if pp == pdo_pos && ep == entry_pos {
                    return self.entry_offset(sync_index, bit_offset, domain);
                }
                bit_offset += entry.bit_length as usize;
            }
        }
        error!(
            "Config {}:{}: PDO entry specification {}/{}/{} out of range.",
            self.alias, self.position, sync_index, pdo_pos, entry_pos
        );
        Err(out_of_range)
    }

    fn find_entry(&self, index: u16, subindex: u8) -> Option<(u8, usize)> {
        for (sync_index, sync) in self.sync_configs.iter().enumerate() {
            let mut bit_offset = 0;
            for entry in sync.pdos.iter().flat_map(|pdo| pdo.entries.iter()) {
                if entry.index == index && entry.subindex == subindex {
                    return Some((sync_index as u8, bit_offset));
                }
                bit_offset += entry.bit_length as usize;
            }
        }
        None
    }

    fn entry_offset(
        &mut self,
        sync_index: u8,
        bit_offset: usize,
        domain: &mut Domain<'_>,
    ) -> Result<PdoEntryOffset, Error> {
        let sync_offset = self.prepare_fmmu(domain, sync_index)?;
        Ok(PdoEntryOffset {
            byte: sync_offset + (bit_offset / 8) as u32,
            bit: (bit_offset % 8) as u8,
        })
    }

    pub fn add_sdo_request(&mut self, request: RequestHandle<SdoRequest>) -> Result<(), Error> {
        self.sdo_requests.try_reserve(1)?;
        self.sdo_requests.push(request);
        Ok(())
    }

    pub fn add_reg_request(&mut self, request: RequestHandle<RegRequest>) -> Result<(), Error> {
        self.reg_requests.try_reserve(1)?;
        self.reg_requests.push(request);
        Ok(())
    }

    pub fn add_foe_request(&mut self, request: RequestHandle<FoeRequest>) -> Result<(), Error> {
        self.foe_requests.try_reserve(1)?;
        self.foe_requests.push(request);
        Ok(())
    }

    pub fn sdo_requests(&self) -> &[RequestHandle<SdoRequest>] {
        &self.sdo_requests
    }

    pub fn reg_requests(&self) -> &[RequestHandle<RegRequest>] {
        &self.reg_requests
    }

    pub fn foe_requests(&self) -> &[RequestHandle<FoeRequest>] {
        &self.foe_requests
    }
}

/// Owner of all slave configurations of a master.
#[derive(Debug, Default)]
pub struct SlaveConfigs {
    configs: Vec<SlaveConfig>,
}

impl SlaveConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the configuration for `alias:position`, creating it if needed.
    /// An existing configuration with a different identity is an error.
    pub fn slave_config(
        &mut self,
        alias: u16,
        position: u16,
        vendor_id: u32,
        product_code: u32,
    ) -> Result<SlaveConfigIndex, Error> {
        if let Some(config) = self
            .configs
            .iter()
            .find(|config| config.alias == alias && config.position == position)
        {
            if config.vendor_id != vendor_id || config.product_code != product_code {
                error!(
                    "Slave type mismatch. Slave was configured as 0x{:08X}/0x{:08X} before. Now configuring with 0x{:08X}/0x{:08X}.",
                    config.vendor_id, config.product_code, vendor_id, product_code
                );
                return Err(Error::SlaveConfigMismatch { alias, position });
            }
            return Ok(config.index);
        }

        self.configs.try_reserve(1)?;
        let index = SlaveConfigIndex(self.configs.len());
        debug!(
            "Creating slave configuration for {}:{}, 0x{:08X}/0x{:08X}.",
            alias, position, vendor_id, product_code
        );
        self.configs
            .push(SlaveConfig::new(index, alias, position, vendor_id, product_code));
        Ok(index)
    }

    pub fn get(&self, index: SlaveConfigIndex) -> Option<&SlaveConfig> {
        self.configs.get(index.0)
    }

    pub fn get_mut(&mut self, index: SlaveConfigIndex) -> Option<&mut SlaveConfig> {
        self.configs.get_mut(index.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlaveConfig> {
        self.configs.iter()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainSettings;

    fn entry(index: u16, subindex: u8, bit_length: u8) -> PdoEntry {
        PdoEntry {
            index,
            subindex,
            bit_length,
        }
    }

    fn digital_io(config: &mut SlaveConfig) {
        config
            .sync_manager(2, Direction::Output, 0x0f00)
            .unwrap()
            .pdos
            .push(Pdo {
                index: 0x1600,
                entries: vec![entry(0x7000, 1, 1), entry(0x7000, 2, 7), entry(0x7010, 1, 16)],
            });
        config
            .sync_manager(3, Direction::Input, 0x1000)
            .unwrap()
            .pdos
            .push(Pdo {
                index: 0x1a00,
                entries: vec![entry(0x6000, 1, 8), entry(0x6000, 2, 8)],
            });
    }

    #[test]
    fn sync_size_is_rounded_up() {
        let sync = SyncConfig {
            direction: Direction::Input,
            physical_start_address: 0x1000,
            pdos: vec![Pdo {
                index: 0x1a00,
                entries: vec![entry(0x6000, 1, 1), entry(0x6000, 2, 8)],
            }],
        };
        assert_eq!(sync.total_size(), 2);
    }

    #[test]
    fn identity_mismatch_is_rejected() {
        let mut configs = SlaveConfigs::new();
        let first = configs.slave_config(0, 1, 0x2, 0x0444_2c52).unwrap();
        assert_eq!(configs.slave_config(0, 1, 0x2, 0x0444_2c52).unwrap(), first);
        assert_eq!(
            configs.slave_config(0, 1, 0x2, 0x1234),
            Err(Error::SlaveConfigMismatch {
                alias: 0,
                position: 1
            })
        );
        assert_eq!(configs.len(), 1);
    }

    #[test]
    fn pdo_entries_map_to_domain_offsets() {
        let mut configs = SlaveConfigs::new();
        let index = configs.slave_config(0, 0, 0x2, 0x1).unwrap();
        let config = configs.get_mut(index).unwrap();
        digital_io(config);
        let mut domain = Domain::new(0, DomainSettings::default());

        let offset = config.reg_pdo_entry(0x7000, 2, &mut domain).unwrap();
        assert_eq!(offset, PdoEntryOffset { byte: 0, bit: 1 });
        assert_eq!(
            config.reg_pdo_entry_aligned(0x7000, 2, &mut domain),
            Err(Error::PdoEntryNotByteAligned {
                index: 0x7000,
                subindex: 2
            })
        );
        assert_eq!(config.reg_pdo_entry_aligned(0x7010, 1, &mut domain), Ok(1));
        assert_eq!(config.reg_pdo_entry_aligned(0x6000, 2, &mut domain), Ok(4));
        assert_eq!(
            config.reg_pdo_entry_pos(3, 0, 0, &mut domain),
            Ok(PdoEntryOffset { byte: 3, bit: 0 })
        );
        assert_eq!(config.fmmu_count(), 2);
        assert_eq!(domain.size(), 5);
        assert_eq!(
            config.reg_pdo_entry(0x6001, 1, &mut domain),
            Err(Error::PdoEntryNotMapped {
                index: 0x6001,
                subindex: 1
            })
        );
        assert!(matches!(
            config.reg_pdo_entry_pos(3, 1, 0, &mut domain),
            Err(Error::PdoEntryOutOfRange { .. })
        ));
    }

    #[test]
    fn fmmu_limit() {
        let mut configs = SlaveConfigs::new();
        let index = configs.slave_config(0, 0, 0x2, 0x1).unwrap();
        let config = configs.get_mut(index).unwrap();
        config
            .sync_manager(2, Direction::Input, 0x1000)
            .unwrap()
            .pdos
            .push(Pdo {
                index: 0x1a00,
                entries: vec![entry(0x6000, 1, 8)],
            });
        let mut domains: Vec<Domain<'_>> = (0..=MAX_FMMUS)
            .map(|i| Domain::new(i, DomainSettings::default()))
            .collect();
        for domain in domains.iter_mut().take(MAX_FMMUS) {
            assert_eq!(config.prepare_fmmu(domain, 2), Ok(0));
        }
        // already prepared FMMUs are found again
        assert_eq!(config.prepare_fmmu(&mut domains[0], 2), Ok(0));
        assert_eq!(
            config.prepare_fmmu(&mut domains[MAX_FMMUS], 2),
            Err(Error::FmmuLimitReached)
        );
    }
}
