use crate::config::MAX_NUM_DEVICES;
use crate::datagram::{Datagram, DeviceIndex};
use crate::error::Error;
use alloc::vec::Vec;

/// Number of distinct (slave configuration, direction) pairs a datagram
/// serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct UsedDirections {
    pub inputs: u16,
    pub outputs: u16,
}

/// One contiguous piece of a domain, sent as one logical datagram per
/// network device.
#[derive(Debug)]
pub struct DatagramPair {
    domain_offset: usize,
    datagrams: heapless::Vec<Datagram, MAX_NUM_DEVICES>,
    /// Main link output data as it was last queued.
    send_buffer: Vec<u8>,
    expected_working_counter: u16,
}

impl DatagramPair {
    pub(crate) fn new(
        logical_base_address: u32,
        domain_offset: usize,
        size: usize,
        used: UsedDirections,
        num_devices: usize,
    ) -> Result<Self, Error> {
        let logical_address = logical_base_address.wrapping_add(domain_offset as u32);
        let num_devices = num_devices.clamp(1, MAX_NUM_DEVICES);
        let mut datagrams = heapless::Vec::new();
        for device in 0..num_devices {
            let mut datagram = Datagram::new();
            match (used.inputs > 0, used.outputs > 0) {
                (true, true) => datagram.lrw(logical_address, size)?,
                (false, true) => datagram.lwr(logical_address, size)?,
                _ => datagram.lrd(logical_address, size)?,
            }
            datagram.set_device_index(DeviceIndex::from_index(device));
            datagrams.push(datagram).map_err(|_| Error::NoMemory)?;
        }

        let mut send_buffer = Vec::new();
        if num_devices > 1 {
            send_buffer.try_reserve_exact(size)?;
            send_buffer.resize(size, 0);
        }

        Ok(Self {
            domain_offset,
            datagrams,
            send_buffer,
            expected_working_counter: used.inputs + used.outputs,
        })
    }

    pub fn domain_offset(&self) -> usize {
        self.domain_offset
    }

    pub fn size(&self) -> usize {
        self.datagrams.first().map(|d| d.size()).unwrap_or(0)
    }

    pub fn logical_address(&self) -> u32 {
        self.datagrams
            .first()
            .map(|d| d.command().logical_address())
            .unwrap_or(0)
    }

    pub fn expected_working_counter(&self) -> u16 {
        self.expected_working_counter
    }

    pub fn num_devices(&self) -> usize {
        self.datagrams.len()
    }

    pub fn datagram(&self, device: DeviceIndex) -> Option<&Datagram> {
        self.datagrams.get(device.index())
    }

    pub fn datagram_mut(&mut self, device: DeviceIndex) -> Option<&mut Datagram> {
        self.datagrams.get_mut(device.index())
    }

    pub fn datagrams_mut(&mut self) -> impl Iterator<Item = &mut Datagram> {
        self.datagrams.iter_mut()
    }

    pub fn any_received(&self) -> bool {
        self.datagrams.iter().any(|datagram| datagram.is_received())
    }

    pub(crate) fn send_buffer(&self) -> &[u8] {
        &self.send_buffer
    }

    /// Loads the outgoing process data and hands all datagrams to `queue`,
    /// main link first.
    pub(crate) fn queue<F: FnMut(&mut Datagram)>(&mut self, data: &[u8], mut queue: F) {
        let Some((main, backups)) = self.datagrams.split_first_mut() else {
            return;
        };
        let len = data.len().min(main.size());
        main.data_mut()[..len].copy_from_slice(&data[..len]);
        if !backups.is_empty() {
            self.send_buffer[..len].copy_from_slice(&data[..len]);
        }
        queue(main);
        for backup in backups.iter_mut() {
            backup.data_mut()[..len].copy_from_slice(&data[..len]);
            queue(backup);
        }
    }

    /// Working counters of the datagrams that came back, per device.
    /// Returns their sum.
    pub(crate) fn process(&self, wc: &mut [u16; MAX_NUM_DEVICES]) -> u16 {
        let mut pair_wc = 0u16;
        for (device, datagram) in self.datagrams.iter().enumerate() {
            wc[device] = if datagram.is_received() {
                datagram.working_counter()
            } else {
                0
            };
            pair_wc = pair_wc.wrapping_add(wc[device]);
        }
        pair_wc
    }

    /// Decides which link's copy of the input range `range` (relative to
    /// this pair) is authoritative and moves it into the main datagram.
    /// Returns false if neither link changed the data and the pair is not
    /// complete, in which case its working counter must count as zero.
    pub(crate) fn reconcile_inputs(
        &mut self,
        range: core::ops::Range<usize>,
        pair_wc: u16,
    ) -> bool {
        let expected = self.expected_working_counter;
        let Some((main, backups)) = self.datagrams.split_first_mut() else {
            return true;
        };
        if backups.is_empty() {
            return true;
        }
        let end = range.end.min(main.size()).min(self.send_buffer.len());
        let range = range.start.min(end)..end;
        let sent = &self.send_buffer[range.clone()];

        if main.data()[range.clone()] != *sent {
            return true;
        }
        // first backup link that delivered new data wins
        if let Some(backup) = backups
            .iter()
            .find(|backup| backup.data()[range.clone()] != *sent)
        {
            main.data_mut()[range.clone()].copy_from_slice(&backup.data()[range]);
            return true;
        }
        pair_wc == expected
    }
}
