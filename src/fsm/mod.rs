//! Slave state machines. [`slave::SlaveFsm`] decides what a slave does
//! next and drives the protocol state machines behind the traits below,
//! one datagram per cycle.

pub mod change;
pub mod slave;

use crate::datagram::Datagram;
use crate::request::{
    eoe::EoeRequest, foe::FoeRequest, sdo::SdoRequest, soe::SoeRequest, RequestHandle,
};
use crate::slave::Slave;
use crate::EtherCatSystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// The datagram did not come back or came back in an unexpected state.
    DatagramState,
    WorkingCounter { expected: u16, received: u16 },
    Timeout,
    NoMemory,
    /// SDO abort code, FoE error code and the like.
    Aborted(u32),
    Protocol(&'static str),
}

impl From<crate::Error> for FsmError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::NoMemory => FsmError::NoMemory,
            _ => FsmError::Protocol("invalid request"),
        }
    }
}

/// Outcome of one step: `WouldBlock` while busy, otherwise finished.
pub type FsmResult = nb::Result<(), FsmError>;

/// A protocol state machine driven by the slave state machine.
///
/// After `exec` returned `Err(nb::Error::WouldBlock)` it prepared `datagram`
/// for sending. The caller hands back the same datagram, carrying the
/// response, on the next call. Once finished, further calls return the
/// same result again without touching the datagram.
pub trait SubFsm {
    fn exec(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> FsmResult;

    /// Drops any transfer in progress.
    fn reset(&mut self) {}
}

pub trait CoeFsm: SubFsm {
    fn transfer(&mut self, slave: &Slave, request: RequestHandle<SdoRequest>);
    fn dictionary(&mut self, slave: &Slave);
}

pub trait FoeFsm: SubFsm {
    fn transfer(&mut self, slave: &Slave, request: RequestHandle<FoeRequest>);
}

pub trait SoeFsm: SubFsm {
    fn transfer(&mut self, slave: &Slave, request: RequestHandle<SoeRequest>);
}

pub trait EoeFsm: SubFsm {
    fn set_ip_param(&mut self, slave: &Slave, request: RequestHandle<EoeRequest>);
}

/// AL state change handling. Only error acknowledgement is driven from
/// the slave state machine.
pub trait ChangeFsm: SubFsm {
    fn ack(&mut self, slave: &Slave);
}

pub trait ConfigFsm: SubFsm {
    /// Full configuration towards the slave's requested state.
    fn start(&mut self, slave: &Slave);
    /// Shortened SAFEOP to OP transition.
    fn quick_start(&mut self, slave: &Slave);
}

pub trait ScanFsm: SubFsm {
    fn start(&mut self, slave: &Slave);
}

/// The protocol state machines one [`slave::SlaveFsm`] delegates to.
pub trait SubFsms {
    type Coe: CoeFsm;
    type Foe: FoeFsm;
    type Soe: SoeFsm;
    type Eoe: EoeFsm;
    type Change: ChangeFsm;
    type Config: ConfigFsm;
    type Scan: ScanFsm;

    fn coe(&mut self) -> &mut Self::Coe;
    fn foe(&mut self) -> &mut Self::Foe;
    fn soe(&mut self) -> &mut Self::Soe;
    fn eoe(&mut self) -> &mut Self::Eoe;
    fn change(&mut self) -> &mut Self::Change;
    fn config(&mut self) -> &mut Self::Config;
    fn scan(&mut self) -> &mut Self::Scan;

    fn reset_all(&mut self) {
        self.coe().reset();
        self.foe().reset();
        self.soe().reset();
        self.eoe().reset();
        self.change().reset();
        self.config().reset();
        self.scan().reset();
    }
}
