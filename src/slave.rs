use crate::al_state::{AlState, SlaveState};
use crate::config::MAX_PENDING_REQUESTS;
use crate::datagram::DeviceIndex;
use crate::request::{
    dict::DictRequest, eoe::EoeRequest, foe::FoeRequest, reg::RegRequest, sdo::SdoRequest,
    soe::SoeRequest, Request, RequestHandle, RequestState,
};
use crate::slave_config::SlaveConfigIndex;
use bitfield::*;
use heapless::Deque;

bitfield! {
    /// Mailbox protocols a slave announces in its SII.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct MailboxProtocols(u16);
    impl Debug;
    pub aoe, set_aoe: 0;
    pub eoe, set_eoe: 1;
    pub coe, set_coe: 2;
    pub foe, set_foe: 3;
    pub soe, set_soe: 4;
    pub voe, set_voe: 5;
}

impl MailboxProtocols {
    /// SII word address.
    pub const ADDRESS: u16 = 0x001C;
    pub const SIZE: usize = 2;
}

/// Parts of the SII image the slave state machine looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiiInfo {
    pub mailbox_protocols: MailboxProtocols,
    /// The SII carries a general category.
    pub has_general: bool,
    /// SDO information service, from the general category's CoE details.
    pub enable_sdo_info: bool,
}

impl SiiInfo {
    pub fn supports_sdo_info(&self) -> bool {
        self.mailbox_protocols.coe() && !(self.has_general && !self.enable_sdo_info)
    }
}

type Queue<T> = Deque<RequestHandle<T>, MAX_PENDING_REQUESTS>;

/// A slave found on the bus.
#[derive(Debug)]
pub struct Slave {
    pub ring_position: u16,
    pub station_address: u16,
    pub effective_alias: u16,
    pub device_index: DeviceIndex,
    pub current_state: SlaveState,
    pub requested_state: AlState,
    /// Last AL status code read from the slave.
    pub last_al_error: u16,
    /// Set when an error acknowledgement failed. Blocks any further
    /// configuration until cleared.
    pub error_flag: bool,
    pub scan_required: bool,
    pub force_config: bool,
    /// Present once the slave was scanned.
    pub sii: Option<SiiInfo>,
    pub sdo_dictionary_fetched: bool,
    pub valid_mbox_data: bool,
    pub config: Option<SlaveConfigIndex>,
    pub(crate) sdo_requests: Queue<SdoRequest>,
    pub(crate) reg_requests: Queue<RegRequest>,
    pub(crate) foe_requests: Queue<FoeRequest>,
    pub(crate) soe_requests: Queue<SoeRequest>,
    pub(crate) eoe_requests: Queue<EoeRequest>,
    pub(crate) dict_requests: Queue<DictRequest>,
}

fn enqueue<T: Request>(
    queue: &mut Queue<T>,
    request: RequestHandle<T>,
) -> Result<(), RequestHandle<T>> {
    if queue.is_full() {
        return Err(request);
    }
    request.borrow_mut().set_state(RequestState::Queued);
    queue.push_back(request)
}

impl Slave {
    pub fn new(ring_position: u16, station_address: u16) -> Self {
        Self {
            ring_position,
            station_address,
            effective_alias: 0,
            device_index: DeviceIndex::Main,
            current_state: SlaveState::new(AlState::Invalid),
            requested_state: AlState::PreOperational,
            last_al_error: 0,
            error_flag: false,
            scan_required: true,
            force_config: false,
            sii: None,
            sdo_dictionary_fetched: false,
            valid_mbox_data: false,
            config: None,
            sdo_requests: Deque::new(),
            reg_requests: Deque::new(),
            foe_requests: Deque::new(),
            soe_requests: Deque::new(),
            eoe_requests: Deque::new(),
            dict_requests: Deque::new(),
        }
    }

    pub fn request_state(&mut self, state: AlState) {
        self.requested_state = state;
        self.error_flag = false;
    }

    pub fn has_ack_err(&self) -> bool {
        self.current_state.ack_err()
    }

    pub fn is_init(&self) -> bool {
        self.current_state.is_init()
    }

    pub fn supports_sdo_info(&self) -> bool {
        self.sii.map(|sii| sii.supports_sdo_info()).unwrap_or(false)
    }

    /// The queue_* methods mark the request queued. A full queue hands the
    /// request back untouched.
    pub fn queue_sdo_request(
        &mut self,
        request: RequestHandle<SdoRequest>,
    ) -> Result<(), RequestHandle<SdoRequest>> {
        enqueue(&mut self.sdo_requests, request)
    }

    pub fn queue_reg_request(
        &mut self,
        request: RequestHandle<RegRequest>,
    ) -> Result<(), RequestHandle<RegRequest>> {
        enqueue(&mut self.reg_requests, request)
    }

    pub fn queue_foe_request(
        &mut self,
        request: RequestHandle<FoeRequest>,
    ) -> Result<(), RequestHandle<FoeRequest>> {
        enqueue(&mut self.foe_requests, request)
    }

    pub fn queue_soe_request(
        &mut self,
        request: RequestHandle<SoeRequest>,
    ) -> Result<(), RequestHandle<SoeRequest>> {
        enqueue(&mut self.soe_requests, request)
    }

    pub fn queue_eoe_request(
        &mut self,
        request: RequestHandle<EoeRequest>,
    ) -> Result<(), RequestHandle<EoeRequest>> {
        enqueue(&mut self.eoe_requests, request)
    }

    pub fn queue_dict_request(
        &mut self,
        request: RequestHandle<DictRequest>,
    ) -> Result<(), RequestHandle<DictRequest>> {
        enqueue(&mut self.dict_requests, request)
    }

    /// Requests of all kinds still waiting in the slave's queues.
    pub fn pending_requests(&self) -> usize {
        self.sdo_requests.len()
            + self.reg_requests.len()
            + self.foe_requests.len()
            + self.soe_requests.len()
            + self.eoe_requests.len()
            + self.dict_requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::new_handle;

    #[test]
    fn sdo_info_support() {
        let mut sii = SiiInfo::default();
        assert!(!sii.supports_sdo_info());
        sii.mailbox_protocols.set_coe(true);
        assert!(sii.supports_sdo_info());
        sii.has_general = true;
        assert!(!sii.supports_sdo_info());
        sii.enable_sdo_info = true;
        assert!(sii.supports_sdo_info());
        assert!(MailboxProtocols(0x000C).foe());
    }

    #[test]
    fn full_queue_returns_request() {
        let mut slave = Slave::new(0, 0x1001);
        for _ in 0..MAX_PENDING_REQUESTS {
            slave
                .queue_reg_request(new_handle(RegRequest::new(2).unwrap()))
                .unwrap();
        }
        let rejected = new_handle(RegRequest::new(2).unwrap());
        let returned = slave.queue_reg_request(rejected.clone()).unwrap_err();
        assert!(alloc::rc::Rc::ptr_eq(&rejected, &returned));
        assert_eq!(returned.borrow().state(), RequestState::Init);
        assert_eq!(slave.pending_requests(), MAX_PENDING_REQUESTS);
    }
}
