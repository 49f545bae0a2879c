use super::{impl_request, RequestState};
use heapless::String;

pub const EOE_NAME_SIZE: usize = 32;

/// IP parameters to push to a slave's Ethernet-over-EtherCAT interface.
/// Parameters left at `None` are not sent.
#[derive(Debug, Clone, Default)]
pub struct EoeRequest {
    pub mac_address: Option<[u8; 6]>,
    pub ip_address: Option<[u8; 4]>,
    pub subnet_mask: Option<[u8; 4]>,
    pub gateway: Option<[u8; 4]>,
    pub dns: Option<[u8; 4]>,
    pub name: Option<String<EOE_NAME_SIZE>>,
    state: RequestState,
    result: u16,
}

impl_request!(EoeRequest);

impl EoeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> u16 {
        self.result
    }

    pub fn set_result(&mut self, result: u16) {
        self.result = result;
    }

    pub fn queue(&mut self) {
        self.state = RequestState::Queued;
        self.result = 0;
    }
}
