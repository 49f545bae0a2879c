use crate::frame::MAX_PDU_DATAGRAM;

/// Number of network devices a domain can send over (main link plus backups).
pub const MAX_NUM_DEVICES: usize = 2;
/// FMMUs a single slave configuration can hold.
pub const MAX_FMMUS: usize = 16;
pub const MAX_SYNC_MANAGERS: usize = 16;
/// Capacity of each per-slave external request queue.
pub const MAX_PENDING_REQUESTS: usize = 16;

/// Interval between working counter change notices, in nanoseconds.
pub const WC_NOTIFY_INTERVAL_NS: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSettings {
    /// Upper bound on the payload of one logical datagram.
    pub max_datagram_size: usize,
    pub num_devices: usize,
    pub wc_notify_interval_ns: u64,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_PDU_DATAGRAM,
            num_devices: 1,
            wc_notify_interval_ns: WC_NOTIFY_INTERVAL_NS,
        }
    }
}

impl DomainSettings {
    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size.max(1);
        self
    }

    pub fn with_num_devices(mut self, num_devices: usize) -> Self {
        self.num_devices = num_devices.clamp(1, MAX_NUM_DEVICES);
        self
    }

    pub fn with_wc_notify_interval_ns(mut self, interval: u64) -> Self {
        self.wc_notify_interval_ns = interval;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsmSettings {
    /// Serve EoE IP parameter requests.
    pub eoe: bool,
    /// Never fetch the SDO dictionary on its own.
    pub skip_sdo_dictionary: bool,
    /// Allow the shortened SAFEOP to OP reconfiguration after a sync manager watchdog.
    pub quick_op: bool,
}

impl Default for FsmSettings {
    fn default() -> Self {
        Self {
            eoe: true,
            skip_sdo_dictionary: false,
            quick_op: true,
        }
    }
}
