#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod al_state;
pub mod config;
pub mod datagram;
pub mod domain;
mod error;
pub mod frame;
pub mod fsm;
pub mod master;
pub mod register;
pub mod request;
pub mod slave;
pub mod slave_config;

pub use al_state::{AlState, SlaveState};
pub use datagram::{Datagram, DatagramQueue, DatagramState, DeviceIndex};
pub use domain::{Domain, DomainState, WcState};
pub use error::Error;
pub use fsm::{slave::SlaveFsm, FsmError};
pub use master::MasterSignals;
pub use slave::Slave;
pub use slave_config::{SlaveConfig, SlaveConfigIndex, SlaveConfigs};

/// Monotonic time in nanoseconds, supplied by the caller on every cyclic entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EtherCatSystemTime(pub u64);

impl EtherCatSystemTime {
    pub fn elapsed_since(&self, earlier: EtherCatSystemTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Data flow direction, seen from the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Invalid,
    /// Master writes, slave reads.
    Output,
    /// Slave writes, master reads.
    Input,
    Both,
}

impl Direction {
    /// Slot used for per-direction bookkeeping in a domain. Only plain
    /// inputs and outputs have one.
    pub(crate) fn slot(&self) -> Option<usize> {
        match self {
            Direction::Input => Some(0),
            Direction::Output => Some(1),
            _ => None,
        }
    }
}
