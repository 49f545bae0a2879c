//! Per-slave request dispatcher.
//!
//! [`SlaveFsm`] is stepped once per cycle with a fresh datagram. In
//! [`State::Ready`] it looks for work in a fixed order (scan, error
//! acknowledge, configuration, configuration SDOs, dictionary, SDO,
//! register, FoE, SoE, EoE) and hands the first match to a protocol state
//! machine, which runs its first step right away.

use super::{
    ChangeFsm, CoeFsm, ConfigFsm, EoeFsm, FoeFsm, FsmError, FsmResult, ScanFsm, SoeFsm, SubFsm,
    SubFsms,
};
use crate::al_state::{AlState, SlaveState};
use crate::config::FsmSettings;
use crate::datagram::Datagram;
use crate::master::MasterSignals;
use crate::register::application::AlStatusCode;
use crate::request::{
    dict::DictRequest, eoe::EoeRequest, foe::FoeRequest, reg::RegRequest, sdo::SdoRequest,
    soe::SoeRequest, Request, RequestHandle, RequestState,
};
use crate::slave::Slave;
use crate::slave_config::SlaveConfig;
use crate::{Direction, EtherCatSystemTime};
use alloc::rc::Rc;
use log::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    Ready,
    Scan,
    Acknowledge,
    Config,
    DictRequest,
    SdoRequest,
    RegRequest,
    FoeRequest,
    SoeRequest,
    EoeRequest,
}

#[derive(Debug)]
enum DictSource {
    /// Automatic fetch after the slave came up.
    Internal,
    External(RequestHandle<DictRequest>),
}

/// Whether a pending configuration may take the shortened SAFEOP to OP
/// path. A sync manager watchdog usually means the cyclic traffic was
/// interrupted while the slave kept its configuration.
pub fn quick_config_applies(settings: &FsmSettings, slave: &Slave) -> bool {
    settings.quick_op
        && !slave.force_config
        && slave.current_state == SlaveState::new(AlState::SafeOperational)
        && slave.requested_state == AlState::Operational
        && slave.last_al_error == AlStatusCode::SyncManagerWatchdog as u16
}

fn finished(result: FsmResult) -> Option<Result<(), FsmError>> {
    match result {
        Err(nb::Error::WouldBlock) => None,
        Ok(()) => Some(Ok(())),
        Err(nb::Error::Other(err)) => Some(Err(err)),
    }
}

#[derive(Debug)]
pub struct SlaveFsm<S: SubFsms> {
    ring_position: u16,
    state: State,
    subs: S,
    signals: Rc<MasterSignals>,
    settings: FsmSettings,
    sdo_request: Option<RequestHandle<SdoRequest>>,
    reg_request: Option<RequestHandle<RegRequest>>,
    foe_request: Option<RequestHandle<FoeRequest>>,
    soe_request: Option<RequestHandle<SoeRequest>>,
    eoe_request: Option<RequestHandle<EoeRequest>>,
    dict_request: Option<DictSource>,
    int_dict_request: DictRequest,
    datagram_used: bool,
}

impl<S: SubFsms> SlaveFsm<S> {
    pub fn new(
        ring_position: u16,
        subs: S,
        signals: Rc<MasterSignals>,
        settings: FsmSettings,
    ) -> Self {
        Self {
            ring_position,
            state: State::Idle,
            subs,
            signals,
            settings,
            sdo_request: None,
            reg_request: None,
            foe_request: None,
            soe_request: None,
            eoe_request: None,
            dict_request: None,
            int_dict_request: DictRequest::new(),
            datagram_used: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    /// Whether the last [`exec`](Self::exec) left a datagram to be sent.
    pub fn datagram_used(&self) -> bool {
        self.datagram_used
    }

    pub fn settings(&self) -> &FsmSettings {
        &self.settings
    }

    pub fn subs(&self) -> &S {
        &self.subs
    }

    pub fn subs_mut(&mut self) -> &mut S {
        &mut self.subs
    }

    pub fn set_ready(&mut self) {
        if self.state == State::Idle {
            debug!("Slave {}: Ready for requests.", self.ring_position);
            self.state = State::Ready;
        }
    }

    /// Stops request processing. Refused while an operation is running.
    pub fn set_unready(&mut self) -> bool {
        match self.state {
            State::Idle => true,
            State::Ready => {
                debug!("Slave {}: Unready for requests.", self.ring_position);
                self.state = State::Idle;
                true
            }
            _ => false,
        }
    }

    /// Runs one step. Returns `true` if `datagram` has to be sent.
    pub fn exec(
        &mut self,
        slave: &mut Slave,
        config: Option<&SlaveConfig>,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        match self.state {
            State::Idle => {}
            State::Ready => self.state_ready(slave, config, datagram, sys_time),
            State::Scan => {
                let result = self.subs.scan().exec(slave, datagram, sys_time);
                self.on_scan_result(slave, result);
            }
            State::Acknowledge => {
                let result = self.subs.change().exec(slave, datagram, sys_time);
                self.on_ack_result(slave, result);
            }
            State::Config => {
                let result = self.subs.config().exec(slave, datagram, sys_time);
                self.on_config_result(slave, result);
            }
            State::DictRequest => {
                let result = self.subs.coe().exec(slave, datagram, sys_time);
                self.on_dict_result(slave, result);
            }
            State::SdoRequest => {
                let result = self.subs.coe().exec(slave, datagram, sys_time);
                self.on_sdo_result(slave, result);
            }
            State::RegRequest => self.state_reg_request(slave, datagram),
            State::FoeRequest => {
                let result = self.subs.foe().exec(slave, datagram, sys_time);
                self.on_foe_result(slave, result);
            }
            State::SoeRequest => {
                let result = self.subs.soe().exec(slave, datagram, sys_time);
                self.on_soe_result(slave, result);
            }
            State::EoeRequest => {
                let result = self.subs.eoe().exec(slave, datagram, sys_time);
                self.on_eoe_result(slave, result);
            }
        }

        self.datagram_used = !matches!(self.state, State::Idle | State::Ready);
        if self.datagram_used {
            datagram.set_device_index(slave.device_index);
        }
        self.datagram_used
    }

    /// Fails every request in flight, resets the protocol state machines
    /// and goes idle.
    pub fn clear(&mut self) {
        if self.state != State::Idle {
            debug!("Slave {}: Unready for requests.", self.ring_position);
        }
        if let Some(request) = self.sdo_request.take() {
            self.complete(&request, RequestState::Failure);
        }
        if let Some(request) = self.reg_request.take() {
            self.complete(&request, RequestState::Failure);
        }
        if let Some(request) = self.foe_request.take() {
            self.complete(&request, RequestState::Failure);
        }
        if let Some(request) = self.soe_request.take() {
            self.complete(&request, RequestState::Failure);
        }
        if let Some(request) = self.eoe_request.take() {
            self.complete(&request, RequestState::Failure);
        }
        match self.dict_request.take() {
            Some(DictSource::External(request)) => self.complete(&request, RequestState::Failure),
            Some(DictSource::Internal) => {
                self.int_dict_request.set_state(RequestState::Failure);
                self.wake();
            }
            None => {}
        }
        if self.state == State::Config {
            self.signals.config_busy.end();
        }
        self.subs.reset_all();
        self.state = State::Idle;
        self.datagram_used = false;
    }

    fn wake(&self) {
        self.signals.request_queue.wake_all();
    }

    fn complete<R: Request>(&self, request: &RequestHandle<R>, state: RequestState) {
        request.borrow_mut().set_state(state);
        self.wake();
    }

    fn state_ready(
        &mut self,
        slave: &mut Slave,
        config: Option<&SlaveConfig>,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) {
        if self.action_scan(slave, datagram, sys_time) {
            return;
        }
        if self.action_acknowledge(slave, datagram, sys_time) {
            return;
        }
        if self.action_config(slave, datagram, sys_time) {
            return;
        }
        if self.action_config_sdo(slave, config, datagram, sys_time) {
            return;
        }
        if self.action_dict(slave, datagram, sys_time) {
            return;
        }
        if self.action_sdo(slave, datagram, sys_time) {
            return;
        }
        if self.action_reg(slave, config, datagram) {
            return;
        }
        if self.action_foe(slave, config, datagram, sys_time) {
            return;
        }
        if self.action_soe(slave, datagram, sys_time) {
            return;
        }
        if self.settings.eoe {
            self.action_eoe(slave, datagram, sys_time);
        }
    }

    fn action_scan(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        if !slave.scan_required {
            return false;
        }
        debug!(
            "Slave {}: Scanning on {:?} link.",
            slave.ring_position, slave.device_index
        );
        self.state = State::Scan;
        self.subs.scan().start(slave);
        let result = self.subs.scan().exec(slave, datagram, sys_time);
        self.on_scan_result(slave, result);
        true
    }

    fn on_scan_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        if let Err(err) = outcome {
            warn!("Slave {}: Scan failed: {:?}", slave.ring_position, err);
        }
        // Mailbox contents are assumed valid even if the scan could not clear them.
        slave.valid_mbox_data = true;
        slave.scan_required = false;
        self.state = State::Idle;
    }

    fn action_acknowledge(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        if slave.error_flag || !slave.has_ack_err() {
            return false;
        }
        self.state = State::Acknowledge;
        self.subs.change().ack(slave);
        let result = self.subs.change().exec(slave, datagram, sys_time);
        self.on_ack_result(slave, result);
        true
    }

    fn on_ack_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        if let Err(err) = outcome {
            slave.error_flag = true;
            error!(
                "Slave {}: Failed to acknowledge state change: {:?}",
                slave.ring_position, err
            );
        }
        self.state = State::Ready;
    }

    fn action_config(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        if slave.error_flag {
            return false;
        }
        if slave.current_state == SlaveState::from(slave.requested_state) && !slave.force_config {
            return false;
        }
        debug!(
            "Slave {}: Changing state from {} to {}{}.",
            slave.ring_position,
            slave.current_state,
            slave.requested_state,
            if slave.force_config { " (forced)" } else { "" }
        );
        self.signals.config_busy.begin();
        self.state = State::Config;
        if quick_config_applies(&self.settings, slave) {
            self.subs.config().quick_start(slave);
        } else {
            self.subs.config().start(slave);
        }
        let result = self.subs.config().exec(slave, datagram, sys_time);
        self.on_config_result(slave, result);
        true
    }

    fn on_config_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        if let Err(err) = outcome {
            warn!(
                "Slave {}: Failed to configure: {:?}",
                slave.ring_position, err
            );
        }
        slave.force_config = false;
        self.signals.config_busy.end();
        self.state = State::Ready;
    }

    fn action_config_sdo(
        &mut self,
        slave: &mut Slave,
        config: Option<&SlaveConfig>,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        let Some(config) = config else {
            return false;
        };
        for request in config.sdo_requests() {
            {
                let mut req = request.borrow_mut();
                if req.state() != RequestState::Queued {
                    continue;
                }
                if req.timed_out(sys_time) {
                    debug!("Slave {}: Internal SDO request timed out.", slave.ring_position);
                    req.set_state(RequestState::Failure);
                    self.wake();
                    continue;
                }
                if slave.has_ack_err() {
                    warn!(
                        "Slave {}: Aborting SDO request, slave has error flag set.",
                        slave.ring_position
                    );
                    req.set_state(RequestState::Failure);
                    self.wake();
                    continue;
                }
                if slave.is_init() {
                    warn!(
                        "Slave {}: Aborting SDO request, slave is in INIT.",
                        slave.ring_position
                    );
                    req.set_state(RequestState::Failure);
                    self.wake();
                    continue;
                }
                req.set_state(RequestState::Busy);
                debug!(
                    "Slave {}: Processing internal SDO request 0x{:04X}:{:02X}.",
                    slave.ring_position,
                    req.index(),
                    req.subindex()
                );
            }
            self.start_sdo(slave, request.clone(), datagram, sys_time);
            return true;
        }
        false
    }

    fn action_dict(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        if let Some(request) = slave.dict_requests.pop_front() {
            if slave.sii.is_none() {
                debug!(
                    "Slave {}: Not scanned yet, nothing to upload.",
                    slave.ring_position
                );
                self.complete(&request, RequestState::Success);
                self.state = State::Ready;
                return true;
            }
            if !slave.supports_sdo_info() {
                info!(
                    "Slave {}: Aborting dictionary request, slave does not support SDO Info.",
                    slave.ring_position
                );
                self.complete(&request, RequestState::Success);
                self.state = State::Ready;
                return true;
            }
            if slave.sdo_dictionary_fetched {
                debug!(
                    "Slave {}: Aborting dictionary request, dictionary already uploaded.",
                    slave.ring_position
                );
                self.complete(&request, RequestState::Success);
                self.state = State::Ready;
                return true;
            }
            if slave.has_ack_err() {
                warn!(
                    "Slave {}: Aborting dictionary request, slave has error flag set.",
                    slave.ring_position
                );
                self.complete(&request, RequestState::Failure);
                self.state = State::Idle;
                return true;
            }
            if slave.is_init() {
                warn!(
                    "Slave {}: Aborting dictionary request, slave is in INIT.",
                    slave.ring_position
                );
                self.complete(&request, RequestState::Failure);
                self.state = State::Idle;
                return true;
            }
            request.borrow_mut().set_state(RequestState::Busy);
            debug!("Slave {}: Processing dictionary request.", slave.ring_position);
            self.dict_request = Some(DictSource::External(request));
        } else {
            if self.settings.skip_sdo_dictionary
                || slave.sii.is_none()
                || slave.sdo_dictionary_fetched
                || slave.is_init()
                || slave.current_state.al_state() == AlState::Invalid
                || slave.has_ack_err()
                || !slave.supports_sdo_info()
            {
                return false;
            }
            self.int_dict_request.set_state(RequestState::Busy);
            debug!("Slave {}: Fetching SDO dictionary.", slave.ring_position);
            self.dict_request = Some(DictSource::Internal);
        }

        self.state = State::DictRequest;
        self.subs.coe().dictionary(slave);
        let result = self.subs.coe().exec(slave, datagram, sys_time);
        self.on_dict_result(slave, result);
        true
    }

    fn on_dict_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        let source = self.dict_request.take();
        let state = match outcome {
            Ok(()) => {
                debug!("Slave {}: Fetched SDO dictionary.", slave.ring_position);
                slave.sdo_dictionary_fetched = true;
                RequestState::Success
            }
            Err(err) => {
                error!(
                    "Slave {}: Failed to process dictionary request: {:?}",
                    slave.ring_position, err
                );
                if matches!(source, Some(DictSource::Internal)) {
                    // no automatic retry
                    slave.sdo_dictionary_fetched = true;
                }
                RequestState::Failure
            }
        };
        match source {
            Some(DictSource::External(request)) => request.borrow_mut().set_state(state),
            Some(DictSource::Internal) => self.int_dict_request.set_state(state),
            None => {}
        }
        self.wake();
        self.state = State::Ready;
    }

    fn action_sdo(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        let Some(request) = slave.sdo_requests.pop_front() else {
            return false;
        };
        if slave.has_ack_err() {
            warn!(
                "Slave {}: Aborting SDO request, slave has error flag set.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }
        if slave.is_init() {
            warn!(
                "Slave {}: Aborting SDO request, slave is in INIT.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }
        request.borrow_mut().set_state(RequestState::Busy);
        debug!("Slave {}: Processing SDO request.", slave.ring_position);
        self.start_sdo(slave, request, datagram, sys_time);
        true
    }

    fn start_sdo(
        &mut self,
        slave: &mut Slave,
        request: RequestHandle<SdoRequest>,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) {
        self.state = State::SdoRequest;
        self.subs.coe().transfer(slave, request.clone());
        self.sdo_request = Some(request);
        let result = self.subs.coe().exec(slave, datagram, sys_time);
        self.on_sdo_result(slave, result);
    }

    fn on_sdo_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        let state = match outcome {
            Ok(()) => {
                debug!("Slave {}: Finished SDO request.", slave.ring_position);
                RequestState::Success
            }
            Err(err) => {
                error!(
                    "Slave {}: Failed to process SDO request: {:?}",
                    slave.ring_position, err
                );
                RequestState::Failure
            }
        };
        if let Some(request) = self.sdo_request.take() {
            self.complete(&request, state);
        }
        self.state = State::Ready;
    }

    fn action_reg(
        &mut self,
        slave: &mut Slave,
        config: Option<&SlaveConfig>,
        datagram: &mut Datagram,
    ) -> bool {
        let internal = config.and_then(|config| {
            config
                .reg_requests()
                .iter()
                .find(|request| request.borrow().state() == RequestState::Queued)
                .cloned()
        });
        let Some(request) = internal.or_else(|| slave.reg_requests.pop_front()) else {
            return false;
        };
        if slave.has_ack_err() {
            warn!(
                "Slave {}: Aborting register request, slave has error flag set.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }

        let prepared = {
            let mut req = request.borrow_mut();
            let (address, size) = (req.address(), req.transfer_size());
            debug!(
                "Slave {}: Processing register request {:?} 0x{:04X}+{}.",
                slave.ring_position,
                req.direction(),
                address,
                size
            );
            req.set_state(RequestState::Busy);
            match req.direction() {
                Direction::Input => datagram
                    .fprd(slave.station_address, address, size)
                    .map(|_| datagram.zero()),
                Direction::Output => datagram
                    .fpwr(slave.station_address, address, size)
                    .map(|_| datagram.data_mut().copy_from_slice(req.transfer_data())),
                Direction::Both => datagram
                    .fprw(slave.station_address, address, size)
                    .map(|_| datagram.data_mut().copy_from_slice(req.transfer_data())),
                Direction::Invalid => {
                    warn!(
                        "Slave {}: Aborting register request, unknown direction.",
                        slave.ring_position
                    );
                    drop(req);
                    self.complete(&request, RequestState::Failure);
                    self.state = State::Idle;
                    return true;
                }
            }
        };
        if let Err(err) = prepared {
            error!(
                "Slave {}: Failed to prepare register request: {:?}",
                slave.ring_position, err
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Ready;
            return true;
        }
        self.reg_request = Some(request);
        self.state = State::RegRequest;
        true
    }

    fn state_reg_request(&mut self, slave: &mut Slave, datagram: &mut Datagram) {
        let Some(request) = self.reg_request.take() else {
            self.state = State::Ready;
            return;
        };
        let state = {
            let mut req = request.borrow_mut();
            let expected = if req.direction() == Direction::Both { 3 } else { 1 };
            if !datagram.is_received() {
                error!(
                    "Slave {}: Failed to receive register request datagram: {:?}",
                    slave.ring_position,
                    datagram.state()
                );
                RequestState::Failure
            } else if datagram.working_counter() == expected {
                if req.direction() != Direction::Output {
                    let size = req.transfer_size().min(datagram.size());
                    req.transfer_data_mut()[..size].copy_from_slice(&datagram.data()[..size]);
                }
                debug!("Slave {}: Register request successful.", slave.ring_position);
                RequestState::Success
            } else {
                error!(
                    "Slave {}: Register request failed (working counter is {}).",
                    slave.ring_position,
                    datagram.working_counter()
                );
                RequestState::Failure
            }
        };
        self.complete(&request, state);
        self.state = State::Ready;
    }

    fn action_foe(
        &mut self,
        slave: &mut Slave,
        config: Option<&SlaveConfig>,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        let internal = config.and_then(|config| {
            config
                .foe_requests()
                .iter()
                .find(|request| request.borrow().state() == RequestState::Queued)
                .cloned()
        });
        let Some(request) = internal.or_else(|| slave.foe_requests.pop_front()) else {
            return false;
        };
        if slave.has_ack_err() {
            warn!(
                "Slave {}: Aborting FoE request, slave has error flag set.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }
        request.borrow_mut().set_state(RequestState::Busy);
        debug!("Slave {}: Processing FoE request.", slave.ring_position);
        self.state = State::FoeRequest;
        self.subs.foe().transfer(slave, request.clone());
        self.foe_request = Some(request);
        let result = self.subs.foe().exec(slave, datagram, sys_time);
        self.on_foe_result(slave, result);
        true
    }

    fn on_foe_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        let Some(request) = self.foe_request.take() else {
            self.state = State::Ready;
            return;
        };
        let state = match outcome {
            Ok(()) => {
                debug!(
                    "Slave {}: Successfully transferred {} bytes of FoE data.",
                    slave.ring_position,
                    request.borrow().data_size()
                );
                RequestState::Success
            }
            Err(err) => {
                error!(
                    "Slave {}: Failed to handle FoE request: {:?}",
                    slave.ring_position, err
                );
                RequestState::Failure
            }
        };
        self.complete(&request, state);
        self.state = State::Ready;
    }

    fn action_soe(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        let Some(request) = slave.soe_requests.pop_front() else {
            return false;
        };
        if slave.has_ack_err() {
            warn!(
                "Slave {}: Aborting SoE request, slave has error flag set.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }
        if slave.is_init() {
            warn!(
                "Slave {}: Aborting SoE request, slave is in INIT.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }
        request.borrow_mut().set_state(RequestState::Busy);
        debug!("Slave {}: Processing SoE request.", slave.ring_position);
        self.state = State::SoeRequest;
        self.subs.soe().transfer(slave, request.clone());
        self.soe_request = Some(request);
        let result = self.subs.soe().exec(slave, datagram, sys_time);
        self.on_soe_result(slave, result);
        true
    }

    fn on_soe_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        let state = match outcome {
            Ok(()) => {
                debug!("Slave {}: Finished SoE request.", slave.ring_position);
                RequestState::Success
            }
            Err(err) => {
                error!(
                    "Slave {}: Failed to process SoE request: {:?}",
                    slave.ring_position, err
                );
                RequestState::Failure
            }
        };
        if let Some(request) = self.soe_request.take() {
            self.complete(&request, state);
        }
        self.state = State::Ready;
    }

    fn action_eoe(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> bool {
        let Some(request) = slave.eoe_requests.pop_front() else {
            return false;
        };
        if slave.has_ack_err() {
            warn!(
                "Slave {}: Aborting EoE request, slave has error flag set.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }
        if slave.is_init() {
            warn!(
                "Slave {}: Aborting EoE request, slave is in INIT.",
                slave.ring_position
            );
            self.complete(&request, RequestState::Failure);
            self.state = State::Idle;
            return false;
        }
        request.borrow_mut().set_state(RequestState::Busy);
        debug!("Slave {}: Processing EoE request.", slave.ring_position);
        self.state = State::EoeRequest;
        self.subs.eoe().set_ip_param(slave, request.clone());
        self.eoe_request = Some(request);
        let result = self.subs.eoe().exec(slave, datagram, sys_time);
        self.on_eoe_result(slave, result);
        true
    }

    fn on_eoe_result(&mut self, slave: &mut Slave, result: FsmResult) {
        let Some(outcome) = finished(result) else {
            return;
        };
        let state = match outcome {
            Ok(()) => {
                debug!("Slave {}: Finished EoE request.", slave.ring_position);
                RequestState::Success
            }
            Err(err) => {
                error!(
                    "Slave {}: Failed to process EoE request: {:?}",
                    slave.ring_position, err
                );
                RequestState::Failure
            }
        };
        if let Some(request) = self.eoe_request.take() {
            self.complete(&request, state);
        }
        self.state = State::Ready;
    }
}

impl<S: SubFsms> Drop for SlaveFsm<S> {
    fn drop(&mut self) {
        self.clear();
    }
}
