//! Process data domains: a block of logical memory exchanged cyclically
//! with the slaves through one or more logical datagrams.

pub mod datagram_pair;
pub mod fmmu;

pub use datagram_pair::DatagramPair;
pub use fmmu::FmmuConfig;

use crate::config::{DomainSettings, MAX_NUM_DEVICES};
use crate::datagram::{Datagram, DatagramQueue, DeviceIndex};
use crate::error::Error;
use crate::slave_config::{PdoEntryOffset, SlaveConfigIndex, SlaveConfigs};
use crate::{Direction, EtherCatSystemTime};
use alloc::vec::Vec;
use core::fmt;
use datagram_pair::UsedDirections;
use log::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WcState {
    /// No process data was exchanged.
    Zero,
    /// Some of the registered process data was exchanged.
    Incomplete,
    /// All registered process data was exchanged.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainState {
    pub working_counter: u16,
    pub wc_state: WcState,
    pub redundancy_active: bool,
}

/// Registration of one PDO entry for [`Domain::reg_pdo_entry_list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoEntryReg {
    pub alias: u16,
    pub position: u16,
    pub vendor_id: u32,
    pub product_code: u32,
    pub index: u16,
    pub subindex: u8,
    /// Accept entries that do not start on a byte boundary.
    pub bit_position: bool,
}

#[derive(Debug)]
enum DomainMemory<'a> {
    Internal(Vec<u8>),
    External(&'a mut [u8]),
}

impl<'a> DomainMemory<'a> {
    fn as_slice(&self) -> &[u8] {
        match self {
            DomainMemory::Internal(data) => data,
            DomainMemory::External(data) => data,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            DomainMemory::Internal(data) => data,
            DomainMemory::External(data) => data,
        }
    }
}

#[derive(Debug)]
pub struct Domain<'a> {
    index: usize,
    settings: DomainSettings,
    fmmu_configs: Vec<FmmuConfig>,
    data_size: usize,
    memory: DomainMemory<'a>,
    logical_base_address: Option<u32>,
    datagram_pairs: Vec<DatagramPair>,
    /// Allocation watermarks for inputs and outputs.
    offset_used: [u32; 2],
    sc_in_work: Option<SlaveConfigIndex>,
    working_counter: [u16; MAX_NUM_DEVICES],
    expected_working_counter: u16,
    working_counter_changes: u32,
    notify_time: EtherCatSystemTime,
    redundancy_active: bool,
}

impl<'a> Domain<'a> {
    pub fn new(index: usize, settings: DomainSettings) -> Self {
        Self {
            index,
            settings,
            fmmu_configs: Vec::new(),
            data_size: 0,
            memory: DomainMemory::Internal(Vec::new()),
            logical_base_address: None,
            datagram_pairs: Vec::new(),
            offset_used: [0; 2],
            sc_in_work: None,
            working_counter: [0; MAX_NUM_DEVICES],
            expected_working_counter: 0,
            working_counter_changes: 0,
            notify_time: EtherCatSystemTime(0),
            redundancy_active: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn settings(&self) -> &DomainSettings {
        &self.settings
    }

    /// Process data size in bytes.
    pub fn size(&self) -> usize {
        self.data_size
    }

    pub fn is_finished(&self) -> bool {
        self.logical_base_address.is_some()
    }

    pub fn logical_base_address(&self) -> Option<u32> {
        self.logical_base_address
    }

    pub fn expected_working_counter(&self) -> u16 {
        self.expected_working_counter
    }

    pub fn fmmu_count(&self) -> usize {
        self.fmmu_configs.len()
    }

    pub fn find_fmmu(&self, pos: usize) -> Option<&FmmuConfig> {
        self.fmmu_configs.get(pos)
    }

    pub fn fmmu_configs(&self) -> &[FmmuConfig] {
        &self.fmmu_configs
    }

    pub fn datagram_pairs(&self) -> &[DatagramPair] {
        &self.datagram_pairs
    }

    pub fn datagram_pairs_mut(&mut self) -> &mut [DatagramPair] {
        &mut self.datagram_pairs
    }

    /// All datagrams of the domain in the order they are queued.
    pub fn datagrams_mut(&mut self) -> impl Iterator<Item = &mut Datagram> {
        self.datagram_pairs
            .iter_mut()
            .flat_map(|pair| pair.datagrams_mut())
    }

    /// The process data image. Empty until the domain is finished, unless
    /// external memory was supplied.
    pub fn data(&self) -> &[u8] {
        let data = self.memory.as_slice();
        &data[..self.data_size.min(data.len())]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        let size = self.data_size;
        let data = self.memory.as_mut_slice();
        let len = size.min(data.len());
        &mut data[..len]
    }

    /// Places the process data in caller owned memory. Any internally
    /// allocated image is released.
    pub fn set_external_memory(&mut self, memory: &'a mut [u8]) -> Result<(), Error> {
        if self.is_finished() && memory.len() < self.data_size {
            return Err(Error::ExternalMemoryTooSmall {
                size: memory.len(),
                required: self.data_size,
            });
        }
        self.memory = DomainMemory::External(memory);
        Ok(())
    }

    /// Reserves `size` bytes for an FMMU and returns their domain offset.
    pub(crate) fn add_fmmu_config(
        &mut self,
        slave_config: SlaveConfigIndex,
        allow_overlapping_pdos: bool,
        sync_index: u8,
        direction: Direction,
        size: usize,
    ) -> Result<u32, Error> {
        if self.is_finished() {
            return Err(Error::DomainAlreadyFinished);
        }
        let slot = direction.slot().ok_or(Error::InvalidSlaveConfig)?;
        self.fmmu_configs.try_reserve(1)?;

        let offset = if allow_overlapping_pdos && self.sc_in_work == Some(slave_config) {
            self.offset_used[slot]
        } else {
            let offset = self.offset_used[0].max(self.offset_used[1]);
            self.offset_used = [offset; 2];
            offset
        };
        self.offset_used[slot] += size as u32;
        self.data_size = self.offset_used[0].max(self.offset_used[1]) as usize;
        self.sc_in_work = Some(slave_config);

        self.fmmu_configs
            .push(FmmuConfig::new(slave_config, sync_index, direction, offset, size));
        debug!(
            "Domain {}: Added {} bytes at {}.",
            self.index, size, offset
        );
        Ok(offset)
    }

    /// Registers a list of PDO entries and returns their offsets in order.
    pub fn reg_pdo_entry_list(
        &mut self,
        configs: &mut SlaveConfigs,
        regs: &[PdoEntryReg],
    ) -> Result<Vec<PdoEntryOffset>, Error> {
        let mut offsets = Vec::new();
        offsets.try_reserve_exact(regs.len())?;
        for reg in regs {
            let index =
                configs.slave_config(reg.alias, reg.position, reg.vendor_id, reg.product_code)?;
            let config = configs.get_mut(index).ok_or(Error::InvalidSlaveConfig)?;
            let offset = if reg.bit_position {
                config.reg_pdo_entry(reg.index, reg.subindex, self)?
            } else {
                PdoEntryOffset {
                    byte: config.reg_pdo_entry_aligned(reg.index, reg.subindex, self)?,
                    bit: 0,
                }
            };
            offsets.push(offset);
        }
        Ok(offsets)
    }

    /// Places the domain at `logical_base_address` and splits it into
    /// datagrams. No FMMU may be added afterwards.
    pub fn finish(&mut self, logical_base_address: u32) -> Result<(), Error> {
        if self.is_finished() {
            return Err(Error::DomainAlreadyFinished);
        }

        match &mut self.memory {
            DomainMemory::Internal(data) => {
                data.clear();
                data.try_reserve_exact(self.data_size)?;
                data.resize(self.data_size, 0);
            }
            DomainMemory::External(data) => {
                if data.len() < self.data_size {
                    return Err(Error::ExternalMemoryTooSmall {
                        size: data.len(),
                        required: self.data_size,
                    });
                }
            }
        }

        match build_datagram_pairs(
            &self.fmmu_configs,
            self.data_size,
            &self.settings,
            logical_base_address,
        ) {
            Ok(pairs) => {
                self.expected_working_counter = pairs
                    .iter()
                    .fold(0u16, |wc, pair| wc.wrapping_add(pair.expected_working_counter()));
                self.datagram_pairs = pairs;
            }
            Err(err) => {
                if let DomainMemory::Internal(data) = &mut self.memory {
                    *data = Vec::new();
                }
                return Err(err);
            }
        }
        self.logical_base_address = Some(logical_base_address);

        info!(
            "Domain {}: Logical address 0x{:08x}, {} byte, expected working counter {}.",
            self.index, logical_base_address, self.data_size, self.expected_working_counter
        );
        for pair in self.datagram_pairs.iter() {
            info!(
                "  Datagram {}-{}: Logical offset 0x{:08x}, {} byte, type {:?}.",
                self.index,
                pair.domain_offset(),
                pair.logical_address(),
                pair.size(),
                pair.datagram(DeviceIndex::Main).map(|d| d.command_type()),
            );
        }
        Ok(())
    }

    /// Hands the domain's datagrams to `queue`, loaded with the current
    /// process data.
    pub fn queue<Q: DatagramQueue>(&mut self, queue: &mut Q) {
        let Self {
            memory,
            datagram_pairs,
            data_size,
            ..
        } = self;
        let data = memory.as_slice();
        let data = &data[..(*data_size).min(data.len())];
        for pair in datagram_pairs.iter_mut() {
            let start = pair.domain_offset().min(data.len());
            let end = (start + pair.size()).min(data.len());
            pair.queue(&data[start..end], |datagram| queue.queue_datagram(datagram));
        }
    }

    /// Evaluates the datagrams of the last cycle. Received input data is
    /// copied into the process data image and the working counters are
    /// summed up.
    pub fn process(&mut self, now: EtherCatSystemTime) {
        let num_devices = self.settings.num_devices.clamp(1, MAX_NUM_DEVICES);
        let mut wc_sum = [0u16; MAX_NUM_DEVICES];

        let Self {
            memory,
            datagram_pairs,
            fmmu_configs,
            data_size,
            ..
        } = self;
        let data = memory.as_mut_slice();
        let len = (*data_size).min(data.len());
        let data = &mut data[..len];

        for pair in datagram_pairs.iter_mut() {
            let mut pair_wcs = [0u16; MAX_NUM_DEVICES];
            let pair_wc = pair.process(&mut pair_wcs);
            let pair_range = pair.domain_offset()..pair.domain_offset() + pair.size();

            let mut counted = true;
            if num_devices > 1 {
                let mut wc = pair_wc;
                for fmmu in fmmu_configs.iter() {
                    if fmmu.direction() != Direction::Input {
                        continue;
                    }
                    let range = fmmu.domain_range();
                    if range.start < pair_range.start || range.start >= pair_range.end {
                        continue;
                    }
                    let relative = range.start - pair_range.start..range.end - pair_range.start;
                    if !pair.reconcile_inputs(relative, wc) {
                        wc = 0;
                        counted = false;
                    }
                }
            }

            if !pair.any_received() {
                continue;
            }
            if let Some(main) = pair.datagram(DeviceIndex::Main) {
                let start = pair_range.start.min(data.len());
                let end = pair_range.end.min(data.len());
                data[start..end].copy_from_slice(&main.data()[..end - start]);
            }

            if counted {
                for (sum, wc) in wc_sum.iter_mut().zip(pair_wcs.iter()).take(num_devices) {
                    *sum = sum.wrapping_add(*wc);
                }
            }
        }

        let redundancy = wc_sum[1..num_devices].iter().any(|wc| *wc > 0);
        if redundancy != self.redundancy_active {
            if redundancy {
                warn!("Domain {}: Redundant link in use!", self.index);
            } else {
                info!("Domain {}: Redundant link unused again.", self.index);
            }
            self.redundancy_active = redundancy;
        }

        let mut wc_change = false;
        let mut wc_total = 0u16;
        for (current, sum) in self
            .working_counter
            .iter_mut()
            .zip(wc_sum.iter())
            .take(num_devices)
        {
            if *current != *sum {
                wc_change = true;
                *current = *sum;
            }
            wc_total = wc_total.wrapping_add(*sum);
        }

        if wc_change {
            self.working_counter_changes += 1;
        }
        if self.working_counter_changes > 0
            && now.elapsed_since(self.notify_time) > self.settings.wc_notify_interval_ns
        {
            self.notify_time = now;
            let per_device = DeviceWorkingCounters(&self.working_counter[..num_devices]);
            if self.working_counter_changes == 1 {
                info!(
                    "Domain {}: Working counter changed to {}/{}{}.",
                    self.index, wc_total, self.expected_working_counter, per_device
                );
            } else {
                info!(
                    "Domain {}: {} working counter changes - now {}/{}{}.",
                    self.index,
                    self.working_counter_changes,
                    wc_total,
                    self.expected_working_counter,
                    per_device
                );
            }
            self.working_counter_changes = 0;
        }
    }

    pub fn state(&self) -> DomainState {
        let num_devices = self.settings.num_devices.clamp(1, MAX_NUM_DEVICES);
        let working_counter = self.working_counter[..num_devices]
            .iter()
            .fold(0u16, |total, wc| total.wrapping_add(*wc));
        let wc_state = if working_counter == 0 {
            WcState::Zero
        } else if working_counter == self.expected_working_counter {
            WcState::Complete
        } else {
            WcState::Incomplete
        };
        DomainState {
            working_counter,
            wc_state,
            redundancy_active: self.redundancy_active,
        }
    }

    /// Working counter of the last cycle on one device.
    pub fn working_counter(&self, device: usize) -> u16 {
        self.working_counter.get(device).copied().unwrap_or(0)
    }
}

/// Formats per-device working counters as " (a+b)" when there is more than
/// one device.
struct DeviceWorkingCounters<'a>(&'a [u16]);

impl fmt::Display for DeviceWorkingCounters<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() < 2 {
            return Ok(());
        }
        f.write_str(" (")?;
        for (i, wc) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}", wc)?;
        }
        f.write_str(")")
    }
}

/// Whether `fmmus[pos]` is the first FMMU of its slave configuration and
/// direction within the datagram.
fn shall_count(fmmus: &[&FmmuConfig], pos: usize) -> bool {
    let current = fmmus[pos];
    !fmmus[..pos].iter().any(|fmmu| {
        fmmu.slave_config() == current.slave_config() && fmmu.direction() == current.direction()
    })
}

fn emplace_datagram_pair(
    fmmus: &[FmmuConfig],
    settings: &DomainSettings,
    logical_base_address: u32,
    domain_offset: usize,
    size: usize,
) -> Result<DatagramPair, Error> {
    let span = domain_offset..domain_offset + size;
    let mut members = Vec::new();
    members.try_reserve(fmmus.len())?;
    members.extend(
        fmmus
            .iter()
            .filter(|fmmu| span.contains(&fmmu.domain_range().start)),
    );

    let mut used = UsedDirections::default();
    for (pos, fmmu) in members.iter().enumerate() {
        if !shall_count(&members, pos) {
            continue;
        }
        match fmmu.direction() {
            Direction::Input => used.inputs += 1,
            Direction::Output => used.outputs += 1,
            _ => {}
        }
    }
    DatagramPair::new(
        logical_base_address,
        domain_offset,
        size,
        used,
        settings.num_devices,
    )
}

/// Domain offsets where a datagram may end: FMMU ends that no other FMMU
/// region spans. Sorted, without duplicates.
fn datagram_boundaries(fmmus: &[FmmuConfig], data_size: usize) -> Result<Vec<usize>, Error> {
    let mut boundaries = Vec::new();
    boundaries.try_reserve(fmmus.len())?;
    for fmmu in fmmus.iter() {
        let end = fmmu.domain_range().end;
        let spanned = fmmus.iter().any(|other| {
            let range = other.domain_range();
            range.start < end && end < range.end
        });
        if end > 0 && end < data_size && !spanned {
            boundaries.push(end);
        }
    }
    boundaries.sort_unstable();
    boundaries.dedup();
    Ok(boundaries)
}

/// Cuts the domain into datagrams of at most `max_datagram_size` bytes.
/// Each datagram is filled up to the last boundary that still fits.
fn build_datagram_pairs(
    fmmus: &[FmmuConfig],
    data_size: usize,
    settings: &DomainSettings,
    logical_base_address: u32,
) -> Result<Vec<DatagramPair>, Error> {
    let max = settings.max_datagram_size;
    if let Some(fmmu) = fmmus.iter().find(|fmmu| fmmu.data_size() > max) {
        error!(
            "FMMU size {}B exceeds maximum data size {}B",
            fmmu.data_size(),
            max
        );
        return Err(Error::FmmuTooLarge {
            size: fmmu.data_size(),
            max,
        });
    }

    let mut boundaries = datagram_boundaries(fmmus, data_size)?.into_iter().peekable();
    let mut pairs = Vec::new();
    let mut datagram_offset = 0usize;

    while data_size - datagram_offset > max {
        let mut cut = None;
        while let Some(boundary) = boundaries.next_if(|b| b - datagram_offset <= max) {
            cut = Some(boundary);
        }
        let Some(cut) = cut else {
            error!(
                "No datagram boundary within {}B after domain offset {}",
                max, datagram_offset
            );
            return Err(Error::NoDatagramBoundary {
                offset: datagram_offset,
                max,
            });
        };
        pairs.try_reserve(1)?;
        pairs.push(emplace_datagram_pair(
            fmmus,
            settings,
            logical_base_address,
            datagram_offset,
            cut - datagram_offset,
        )?);
        datagram_offset = cut;
    }

    if data_size > datagram_offset {
        pairs.try_reserve(1)?;
        pairs.push(emplace_datagram_pair(
            fmmus,
            settings,
            logical_base_address,
            datagram_offset,
            data_size - datagram_offset,
        )?);
    }
    Ok(pairs)
}
