use super::{ChangeFsm, FsmError, FsmResult, SubFsm};
use crate::al_state::SlaveState;
use crate::datagram::{Datagram, DatagramState};
use crate::register::application::{AlControl, AlStatus, AlStatusCode, AlStatusCodeRegister};
use crate::slave::Slave;
use crate::EtherCatSystemTime;
use log::*;

const RETRIES: u8 = 3;
const AL_STATE_CHANGE_TIMEOUT_NS: u64 = 5_000_000_000;
/// Only the state byte and the error flag are needed while polling.
const AL_STATUS_READ_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Start,
    Code,
    Ack,
    CheckAck,
    End,
    Error(FsmError),
}

/// Acknowledges a slave's AL error: reads the AL status code, writes back
/// the current state with the acknowledge bit and waits until the slave
/// cleared its error flag.
#[derive(Debug)]
pub struct AlStateAcknowledger {
    state: State,
    retries: u8,
    check_started: Option<EtherCatSystemTime>,
}

impl Default for AlStateAcknowledger {
    fn default() -> Self {
        Self::new()
    }
}

impl AlStateAcknowledger {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            retries: RETRIES,
            check_started: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            State::Start | State::Code | State::Ack | State::CheckAck
        )
    }

    fn fail(&mut self, err: FsmError) -> FsmResult {
        self.state = State::Error(err.clone());
        Err(nb::Error::Other(err))
    }

    fn retry(&mut self, datagram: &Datagram) -> bool {
        if datagram.state() == DatagramState::TimedOut && self.retries > 0 {
            self.retries -= 1;
            true
        } else {
            false
        }
    }

    fn check_reception(&mut self, slave: &Slave, datagram: &Datagram, what: &str) -> FsmResult {
        if datagram.state() != DatagramState::Received {
            error!(
                "Slave {}: Failed to receive {} datagram: {:?}.",
                slave.ring_position,
                what,
                datagram.state()
            );
            return self.fail(FsmError::DatagramState);
        }
        if datagram.working_counter() != 1 {
            error!(
                "Slave {}: Reception of {} datagram failed: working counter {}.",
                slave.ring_position,
                what,
                datagram.working_counter()
            );
            return self.fail(FsmError::WorkingCounter {
                expected: 1,
                received: datagram.working_counter(),
            });
        }
        Ok(())
    }

    fn prepare_read_code(slave: &Slave, datagram: &mut Datagram) -> Result<(), FsmError> {
        datagram.fprd(
            slave.station_address,
            AlStatusCodeRegister::ADDRESS,
            AlStatusCodeRegister::SIZE,
        )?;
        datagram.zero();
        Ok(())
    }

    fn prepare_write_current(slave: &Slave, datagram: &mut Datagram) -> Result<(), FsmError> {
        let mut control = AlControl::new();
        control.set_state(slave.current_state.al_state() as u8);
        control.set_acknowledge(true);
        datagram.fpwr(slave.station_address, AlControl::ADDRESS, AlControl::SIZE)?;
        datagram.data_mut().copy_from_slice(&control.0);
        Ok(())
    }

    fn prepare_read_state(slave: &Slave, datagram: &mut Datagram) -> Result<(), FsmError> {
        datagram.fprd(slave.station_address, AlStatus::ADDRESS, AL_STATUS_READ_SIZE)?;
        datagram.zero();
        Ok(())
    }

    fn prepare<F>(&mut self, prepare: F, slave: &Slave, datagram: &mut Datagram) -> FsmResult
    where
        F: FnOnce(&Slave, &mut Datagram) -> Result<(), FsmError>,
    {
        match prepare(slave, datagram) {
            Ok(()) => Err(nb::Error::WouldBlock),
            Err(err) => self.fail(err),
        }
    }

    fn log_status_code(slave: &mut Slave, datagram: &Datagram) {
        if datagram.working_counter() != 1 {
            warn!(
                "Slave {}: Reception of AL status code datagram failed: working counter {}.",
                slave.ring_position,
                datagram.working_counter()
            );
            slave.last_al_error = 0;
            return;
        }
        let code = AlStatusCodeRegister(datagram.data()).code();
        slave.last_al_error = code;
        match AlStatusCode::try_from(code) {
            Ok(message) => error!(
                "Slave {}: AL status message 0x{:04X}: {:?}.",
                slave.ring_position, code, message
            ),
            Err(_) => error!(
                "Slave {}: Unknown AL status code 0x{:04X}.",
                slave.ring_position, code
            ),
        }
    }
}

impl SubFsm for AlStateAcknowledger {
    fn exec(
        &mut self,
        slave: &mut Slave,
        datagram: &mut Datagram,
        sys_time: EtherCatSystemTime,
    ) -> FsmResult {
        match self.state.clone() {
            State::Idle | State::End => Ok(()),
            State::Error(err) => Err(nb::Error::Other(err)),
            State::Start => {
                self.retries = RETRIES;
                self.state = State::Code;
                self.prepare(Self::prepare_read_code, slave, datagram)
            }
            State::Code => {
                if self.retry(datagram) {
                    return self.prepare(Self::prepare_read_code, slave, datagram);
                }
                if datagram.state() != DatagramState::Received {
                    error!(
                        "Slave {}: Failed to receive AL status code datagram: {:?}.",
                        slave.ring_position,
                        datagram.state()
                    );
                    return self.fail(FsmError::DatagramState);
                }
                Self::log_status_code(slave, datagram);

                self.retries = RETRIES;
                self.state = State::Ack;
                self.prepare(Self::prepare_write_current, slave, datagram)
            }
            State::Ack => {
                if self.retry(datagram) {
                    return self.prepare(Self::prepare_write_current, slave, datagram);
                }
                self.check_reception(slave, datagram, "state ack")?;

                self.check_started = None;
                self.retries = RETRIES;
                self.state = State::CheckAck;
                self.prepare(Self::prepare_read_state, slave, datagram)
            }
            State::CheckAck => {
                if self.retry(datagram) {
                    return self.prepare(Self::prepare_read_state, slave, datagram);
                }
                self.check_reception(slave, datagram, "state ack check")?;

                let started = *self.check_started.get_or_insert(sys_time);
                let raw = AlStatus(datagram.data()).raw_state();
                slave.current_state = SlaveState::from_raw(raw);
                if !slave.current_state.ack_err() {
                    info!(
                        "Slave {}: Acknowledged state {}.",
                        slave.ring_position, slave.current_state
                    );
                    self.state = State::End;
                    return Ok(());
                }

                if sys_time.elapsed_since(started) >= AL_STATE_CHANGE_TIMEOUT_NS {
                    error!(
                        "Slave {}: Timeout while acknowledging state {}.",
                        slave.ring_position, slave.current_state
                    );
                    return self.fail(FsmError::Timeout);
                }

                self.retries = RETRIES;
                self.prepare(Self::prepare_read_state, slave, datagram)
            }
        }
    }

    fn reset(&mut self) {
        self.state = State::Idle;
        self.check_started = None;
    }
}

impl ChangeFsm for AlStateAcknowledger {
    fn ack(&mut self, _slave: &Slave) {
        self.state = State::Start;
        self.retries = RETRIES;
        self.check_started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::al_state::AlState;
    use crate::frame::CommandType;

    fn error_slave() -> Slave {
        let mut slave = Slave::new(3, 0x1003);
        slave.current_state = SlaveState::with_ack_err(AlState::SafeOperational);
        slave
    }

    #[test]
    fn acknowledges_error() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut slave = error_slave();
        let mut fsm = AlStateAcknowledger::new();
        let mut datagram = Datagram::new();
        let t = EtherCatSystemTime(0);

        fsm.ack(&slave);
        assert!(fsm.is_busy());
        assert_eq!(fsm.exec(&mut slave, &mut datagram, t), Err(nb::Error::WouldBlock));
        assert_eq!(datagram.command_type(), CommandType::FPRD);
        assert_eq!(datagram.command().adp, 0x1003);
        assert_eq!(datagram.command().ado, 0x0134);

        datagram.receive(&[0x1B, 0x00], 1);
        assert_eq!(fsm.exec(&mut slave, &mut datagram, t), Err(nb::Error::WouldBlock));
        assert_eq!(slave.last_al_error, 0x001B);
        assert_eq!(datagram.command_type(), CommandType::FPWR);
        assert_eq!(datagram.command().ado, 0x0120);
        assert_eq!(datagram.data(), &[0x14, 0x00]);

        datagram.receive(&[], 1);
        assert_eq!(fsm.exec(&mut slave, &mut datagram, t), Err(nb::Error::WouldBlock));
        assert_eq!(datagram.command_type(), CommandType::FPRD);
        assert_eq!(datagram.command().ado, 0x0130);

        // still flagged, poll again
        datagram.receive(&[0x14, 0x00], 1);
        assert_eq!(fsm.exec(&mut slave, &mut datagram, t), Err(nb::Error::WouldBlock));

        datagram.receive(&[0x04, 0x00], 1);
        assert_eq!(fsm.exec(&mut slave, &mut datagram, t), Ok(()));
        assert_eq!(slave.current_state, SlaveState::new(AlState::SafeOperational));
        assert!(!fsm.is_busy());
        assert_eq!(fsm.exec(&mut slave, &mut datagram, t), Ok(()));
    }

    #[test]
    fn timed_out_datagrams_are_retried() {
        let mut slave = error_slave();
        let mut fsm = AlStateAcknowledger::new();
        let mut datagram = Datagram::new();
        let t = EtherCatSystemTime(0);

        fsm.ack(&slave);
        let _ = fsm.exec(&mut slave, &mut datagram, t);
        for _ in 0..RETRIES {
            datagram.set_state(DatagramState::TimedOut);
            assert_eq!(fsm.exec(&mut slave, &mut datagram, t), Err(nb::Error::WouldBlock));
            assert_eq!(datagram.command().ado, 0x0134);
        }
        datagram.set_state(DatagramState::TimedOut);
        assert_eq!(
            fsm.exec(&mut slave, &mut datagram, t),
            Err(nb::Error::Other(FsmError::DatagramState))
        );
    }

    #[test]
    fn unanswered_ack_fails() {
        let mut slave = error_slave();
        let mut fsm = AlStateAcknowledger::new();
        let mut datagram = Datagram::new();
        let t = EtherCatSystemTime(0);

        fsm.ack(&slave);
        let _ = fsm.exec(&mut slave, &mut datagram, t);
        datagram.receive(&[0x00, 0x00], 1);
        let _ = fsm.exec(&mut slave, &mut datagram, t);
        datagram.receive(&[], 0);
        assert_eq!(
            fsm.exec(&mut slave, &mut datagram, t),
            Err(nb::Error::Other(FsmError::WorkingCounter {
                expected: 1,
                received: 0
            }))
        );
    }

    #[test]
    fn error_flag_that_stays_times_out() {
        let mut slave = error_slave();
        let mut fsm = AlStateAcknowledger::new();
        let mut datagram = Datagram::new();

        fsm.ack(&slave);
        let _ = fsm.exec(&mut slave, &mut datagram, EtherCatSystemTime(0));
        datagram.receive(&[0x00, 0x00], 1);
        let _ = fsm.exec(&mut slave, &mut datagram, EtherCatSystemTime(0));
        datagram.receive(&[], 1);
        let _ = fsm.exec(&mut slave, &mut datagram, EtherCatSystemTime(0));

        datagram.receive(&[0x14, 0x00], 1);
        assert_eq!(
            fsm.exec(&mut slave, &mut datagram, EtherCatSystemTime(1_000)),
            Err(nb::Error::WouldBlock)
        );
        datagram.receive(&[0x14, 0x00], 1);
        assert_eq!(
            fsm.exec(
                &mut slave,
                &mut datagram,
                EtherCatSystemTime(1_000 + AL_STATE_CHANGE_TIMEOUT_NS)
            ),
            Err(nb::Error::Other(FsmError::Timeout))
        );
    }
}
