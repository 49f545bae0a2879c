use ethercat_master_core::config::{DomainSettings, FsmSettings};
use ethercat_master_core::domain::PdoEntryReg;
use ethercat_master_core::frame::CommandType;
use ethercat_master_core::fsm::change::AlStateAcknowledger;
use ethercat_master_core::fsm::*;
use ethercat_master_core::request::{
    eoe::EoeRequest, foe::FoeRequest, new_handle, reg::RegRequest, sdo::SdoRequest,
    soe::SoeRequest, Request, RequestHandle, RequestState,
};
use ethercat_master_core::slave_config::{Pdo, PdoEntry};
use ethercat_master_core::*;
use std::rc::Rc;

const VENDOR_ID: u32 = 0x0000_0002;
const EL1002: u32 = 0x03ea_3052;
const EL2002: u32 = 0x07d2_3052;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two slaves on a simulated bus: a 2 byte input terminal at position 0 and
/// a 2 byte output terminal at position 1.
struct Bus {
    inputs: [u8; 2],
    outputs: [u8; 2],
    link_up: bool,
    input_offset: usize,
    output_offset: usize,
}

impl DatagramQueue for Bus {
    fn queue_datagram(&mut self, datagram: &mut Datagram) {
        datagram.set_state(DatagramState::Queued);
        if !self.link_up || datagram.device_index() != DeviceIndex::Main {
            return;
        }
        assert_eq!(datagram.command_type(), CommandType::LRW);
        let mut frame = datagram.data().to_vec();
        self.outputs
            .copy_from_slice(&frame[self.output_offset..self.output_offset + 2]);
        frame[self.input_offset..self.input_offset + 2].copy_from_slice(&self.inputs);
        datagram.receive(&frame, 2);
    }
}

fn configure(configs: &mut SlaveConfigs, position: u16, product: u32, direction: Direction) {
    let index = configs.slave_config(0, position, VENDOR_ID, product).unwrap();
    let config = configs.get_mut(index).unwrap();
    let (sync_index, pdo_index, entry_index) = match direction {
        Direction::Input => (3, 0x1a00, 0x6000),
        _ => (2, 0x1600, 0x7000),
    };
    let sync = config
        .sync_manager(sync_index, direction, 0x1000 + sync_index as u16 * 0x80)
        .unwrap();
    sync.pdos.push(Pdo {
        index: pdo_index,
        entries: vec![
            PdoEntry {
                index: entry_index,
                subindex: 1,
                bit_length: 8,
            },
            PdoEntry {
                index: entry_index,
                subindex: 2,
                bit_length: 8,
            },
        ],
    });
}

fn entry(position: u16, product_code: u32, index: u16) -> PdoEntryReg {
    PdoEntryReg {
        alias: 0,
        position,
        vendor_id: VENDOR_ID,
        product_code,
        index,
        subindex: 1,
        bit_position: false,
    }
}

#[test]
fn process_data_cycle() {
    init_logger();
    let mut configs = SlaveConfigs::new();
    configure(&mut configs, 0, EL1002, Direction::Input);
    configure(&mut configs, 1, EL2002, Direction::Output);

    let mut domain = Domain::new(0, DomainSettings::default());
    let offsets = domain
        .reg_pdo_entry_list(
            &mut configs,
            &[entry(0, EL1002, 0x6000), entry(1, EL2002, 0x7000)],
        )
        .unwrap();
    domain.finish(0x0001_0000).unwrap();
    assert_eq!(domain.size(), 4);
    assert_eq!(domain.expected_working_counter(), 2);

    let input_offset = offsets[0].byte as usize;
    let output_offset = offsets[1].byte as usize;
    let mut bus = Bus {
        inputs: [0x5a, 0xa5],
        outputs: [0; 2],
        link_up: true,
        input_offset,
        output_offset,
    };

    domain.data_mut()[output_offset..output_offset + 2].copy_from_slice(&[0x12, 0x34]);
    domain.queue(&mut bus);
    domain.process(EtherCatSystemTime(1_000_000));

    assert_eq!(bus.outputs, [0x12, 0x34]);
    assert_eq!(&domain.data()[input_offset..input_offset + 2], &[0x5a, 0xa5]);
    let state = domain.state();
    assert_eq!(state.working_counter, 2);
    assert_eq!(state.wc_state, WcState::Complete);
    assert!(!state.redundancy_active);

    // a lost frame leaves the last inputs in place
    bus.link_up = false;
    bus.inputs = [0, 0];
    domain.queue(&mut bus);
    domain.process(EtherCatSystemTime(2_000_000));
    assert_eq!(&domain.data()[input_offset..input_offset + 2], &[0x5a, 0xa5]);
    assert_eq!(domain.state().wc_state, WcState::Zero);
}

/// Main and backup link each deliver their own copy of the input terminal's
/// data, as after a ring break where both halves still see the slave.
struct RedundantBus {
    main_inputs: [u8; 2],
    backup_inputs: [u8; 2],
    input_offset: usize,
}

impl DatagramQueue for RedundantBus {
    fn queue_datagram(&mut self, datagram: &mut Datagram) {
        datagram.set_state(DatagramState::Queued);
        let inputs = match datagram.device_index() {
            DeviceIndex::Main => self.main_inputs,
            _ => self.backup_inputs,
        };
        let mut frame = datagram.data().to_vec();
        frame[self.input_offset..self.input_offset + 2].copy_from_slice(&inputs);
        datagram.receive(&frame, 1);
    }
}

#[test]
fn redundant_links_prefer_main_inputs() {
    init_logger();
    let mut configs = SlaveConfigs::new();
    configure(&mut configs, 0, EL1002, Direction::Input);
    configure(&mut configs, 1, EL2002, Direction::Output);

    let mut domain = Domain::new(0, DomainSettings::default().with_num_devices(2));
    let offsets = domain
        .reg_pdo_entry_list(
            &mut configs,
            &[entry(0, EL1002, 0x6000), entry(1, EL2002, 0x7000)],
        )
        .unwrap();
    domain.finish(0x0001_0000).unwrap();
    let input_offset = offsets[0].byte as usize;

    let mut bus = RedundantBus {
        main_inputs: [0x11, 0x22],
        backup_inputs: [0x33, 0x44],
        input_offset,
    };
    domain.queue(&mut bus);
    domain.process(EtherCatSystemTime(1_000_000));
    assert_eq!(&domain.data()[input_offset..input_offset + 2], &[0x11, 0x22]);
    let state = domain.state();
    assert_eq!(state.wc_state, WcState::Complete);
    assert!(state.redundancy_active);

    // main link returns what was sent, backup carries the new inputs
    bus.main_inputs = [0x11, 0x22];
    bus.backup_inputs = [0x55, 0x66];
    domain.queue(&mut bus);
    domain.process(EtherCatSystemTime(2_000_000));
    assert_eq!(&domain.data()[input_offset..input_offset + 2], &[0x55, 0x66]);
}

/// Protocol state machines that finish on the spot.
#[derive(Debug, Default)]
struct Instant;

impl SubFsm for Instant {
    fn exec(
        &mut self,
        _slave: &mut Slave,
        _datagram: &mut Datagram,
        _sys_time: EtherCatSystemTime,
    ) -> FsmResult {
        Ok(())
    }
}

impl CoeFsm for Instant {
    fn transfer(&mut self, _slave: &Slave, request: RequestHandle<SdoRequest>) {
        request.borrow_mut().set_data(&[0x01, 0x02]).unwrap();
    }

    fn dictionary(&mut self, _slave: &Slave) {}
}

impl FoeFsm for Instant {
    fn transfer(&mut self, _slave: &Slave, _request: RequestHandle<FoeRequest>) {}
}

impl SoeFsm for Instant {
    fn transfer(&mut self, _slave: &Slave, _request: RequestHandle<SoeRequest>) {}
}

impl EoeFsm for Instant {
    fn set_ip_param(&mut self, _slave: &Slave, _request: RequestHandle<EoeRequest>) {}
}

impl ConfigFsm for Instant {
    fn start(&mut self, slave: &Slave) {
        assert!(!slave.error_flag);
    }

    fn quick_start(&mut self, _slave: &Slave) {}
}

impl ScanFsm for Instant {
    fn start(&mut self, _slave: &Slave) {}
}

#[derive(Debug, Default)]
struct Subs {
    coe: Instant,
    foe: Instant,
    soe: Instant,
    eoe: Instant,
    change: AlStateAcknowledger,
    config: Instant,
    scan: Instant,
}

impl SubFsms for Subs {
    type Coe = Instant;
    type Foe = Instant;
    type Soe = Instant;
    type Eoe = Instant;
    type Change = AlStateAcknowledger;
    type Config = Instant;
    type Scan = Instant;

    fn coe(&mut self) -> &mut Instant {
        &mut self.coe
    }
    fn foe(&mut self) -> &mut Instant {
        &mut self.foe
    }
    fn soe(&mut self) -> &mut Instant {
        &mut self.soe
    }
    fn eoe(&mut self) -> &mut Instant {
        &mut self.eoe
    }
    fn change(&mut self) -> &mut AlStateAcknowledger {
        &mut self.change
    }
    fn config(&mut self) -> &mut Instant {
        &mut self.config
    }
    fn scan(&mut self) -> &mut Instant {
        &mut self.scan
    }
}

/// Answers the register accesses of an error acknowledge.
fn answer(datagram: &mut Datagram, al_status: u8) {
    let command = datagram.command();
    assert_eq!(command.adp, 0x1001);
    match (command.c_type, command.ado) {
        (CommandType::FPRD, 0x0134) => datagram.receive(&[0x1b, 0x00], 1),
        (CommandType::FPWR, 0x0120) => datagram.receive(&[], 1),
        (CommandType::FPRD, 0x0130) => datagram.receive(&[al_status, 0x00], 1),
        (CommandType::FPRD, 0x0010) => datagram.receive(&[0x01, 0x10], 1),
        other => panic!("unexpected datagram {:?}", other),
    }
}

#[test]
fn slave_acknowledges_error_then_serves_requests() {
    init_logger();
    let signals = Rc::new(MasterSignals::new());
    let mut fsm = SlaveFsm::new(0, Subs::default(), signals.clone(), FsmSettings::default());
    let mut slave = Slave::new(0, 0x1001);
    slave.scan_required = false;
    slave.current_state = SlaveState::with_ack_err(AlState::SafeOperational);
    slave.requested_state = AlState::SafeOperational;
    let mut datagram = Datagram::new();
    let mut now = EtherCatSystemTime(0);

    let sdo = new_handle(SdoRequest::new(0x1018, 1, 4).unwrap());
    sdo.borrow_mut().read(now);
    slave.queue_sdo_request(sdo.clone()).unwrap();
    let reg = new_handle(RegRequest::new(2).unwrap());
    reg.borrow_mut().read(0x0010, 2);
    slave.queue_reg_request(reg.clone()).unwrap();

    // not ready yet
    assert!(!fsm.exec(&mut slave, None, &mut datagram, now));
    fsm.set_ready();

    // status code, acknowledge, and state read while the error is still set
    let mut status = 0x14;
    for _ in 0..4 {
        assert!(fsm.exec(&mut slave, None, &mut datagram, now));
        assert_eq!(fsm.state(), fsm::slave::State::Acknowledge);
        let is_state_read = datagram.command().ado == 0x0130;
        answer(&mut datagram, status);
        if is_state_read {
            status = 0x04;
        }
        now = EtherCatSystemTime(now.0 + 1_000_000);
    }
    assert!(!fsm.exec(&mut slave, None, &mut datagram, now));
    assert!(fsm.is_ready());
    assert_eq!(slave.current_state, SlaveState::new(AlState::SafeOperational));
    assert_eq!(slave.last_al_error, 0x001b);
    assert!(!slave.error_flag);
    assert_eq!(sdo.borrow().state(), RequestState::Queued);

    // the SDO transfer finishes within its first step
    assert!(!fsm.exec(&mut slave, None, &mut datagram, now));
    assert_eq!(sdo.borrow().state(), RequestState::Success);
    assert_eq!(sdo.borrow().data(), &[0x01, 0x02]);

    let generation = signals.request_queue.generation();
    assert!(fsm.exec(&mut slave, None, &mut datagram, now));
    assert_eq!(datagram.command_type(), CommandType::FPRD);
    answer(&mut datagram, 0x04);
    assert!(!fsm.exec(&mut slave, None, &mut datagram, now));
    assert_eq!(reg.borrow().state(), RequestState::Success);
    assert_eq!(reg.borrow().data(), &[0x01, 0x10]);
    assert!(signals.request_queue.has_woken_since(generation));
    assert_eq!(slave.pending_requests(), 0);
}
