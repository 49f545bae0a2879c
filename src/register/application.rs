use bitfield::*;
use num_enum::TryFromPrimitive;

const AL_CONTROL: u16 = 0x0120;
const AL_STATUS: u16 = 0x0130;
const AL_STATUS_CODE: u16 = 0x0134;

bitfield! {
    #[derive(Debug, Clone)]
    pub struct AlControl([u8]);
    pub u8, state, set_state: 3, 0;
    pub acknowledge, set_acknowledge: 4;
    pub u8, appl_specific, set_appl_specific: 8*2-1, 8;
}

impl AlControl<[u8; 2]> {
    pub const ADDRESS: u16 = AL_CONTROL;
    pub const SIZE: usize = 2;

    pub fn new() -> Self {
        Self([0; Self::SIZE])
    }
}

bitfield! {
    #[derive(Debug, Clone)]
    pub struct AlStatus([u8]);
    pub u8, state, _: 3, 0;
    pub change_err, _: 4;
    pub u8, appl_specific, _: 8*2-1, 8;
    pub u16, al_status_code, _: 8*6-1, 8*4;
}

impl AlStatus<[u8; 6]> {
    pub const ADDRESS: u16 = AL_STATUS;
    pub const SIZE: usize = 6;

    pub fn new() -> Self {
        Self([0; Self::SIZE])
    }
}

impl<B: AsRef<[u8]>> AlStatus<B> {
    /// Raw state byte, including the error flag.
    pub fn raw_state(&self) -> u8 {
        self.0.as_ref()[0]
    }

    pub fn get_al_status_code(&self) -> Option<AlStatusCode> {
        AlStatusCode::try_from(self.al_status_code()).ok()
    }
}

bitfield! {
    #[derive(Debug, Clone)]
    pub struct AlStatusCodeRegister([u8]);
    pub u16, code, _: 8*2-1, 0;
}

impl AlStatusCodeRegister<[u8; 2]> {
    pub const ADDRESS: u16 = AL_STATUS_CODE;
    pub const SIZE: usize = 2;
}

#[derive(Debug, Clone, Copy, TryFromPrimitive, PartialEq, Eq)]
#[repr(u16)]
pub enum AlStatusCode {
    NoError = 0,
    UnspecifiedError = 0x0001,
    NoMemory = 0x0002,
    InvalidDeviceSetup = 0x0003,
    InvalidRevision = 0x0004,
    InvalidRequestedStateChange = 0x0011,
    UnknownRequestedStateChange = 0x0012,
    BootstrapNotSupported = 0x0013,
    NoValidFirmware = 0x0014,
    InvalidMailboxConfiguration = 0x0015,
    InvalidSyncManagerConfiguration = 0x0017,
    NoValidInputsAvailable = 0x0018,
    NoValidOutputs = 0x0019,
    SynchronizationError = 0x001A,
    SyncManagerWatchdog = 0x001B,
    InvalidSyncManagerTypes = 0x001C,
    InvalidOutputConfiguration = 0x001D,
    InvalidInputConfiguration = 0x001E,
    InvalidWatchdogConfiguration = 0x001F,
    SlaveNeedsColdStart = 0x0020,
    SlaveNeedsInit = 0x0021,
    SlaveNeedsPreop = 0x0022,
    SlaveNeedsSafeop = 0x0023,
    InvalidInputMapping = 0x0024,
    InvalidOutputMapping = 0x0025,
    InconsistentSettings = 0x0026,
    FreerunNotSupported = 0x0027,
    SynchronizationNotSupported = 0x0028,
    FreerunNeeds3BufferMode = 0x0029,
    BackgroundWatchDog = 0x002A,
    NoValidInputsAndOutputs = 0x002B,
    FatalSyncError = 0x002C,
    NoSyncError = 0x002D,
    InvalidDcSyncConfiguration = 0x0030,
    InvalidDcLatchConfiguration = 0x0031,
    PllError = 0x0032,
    DcSyncIoError = 0x0033,
    DcSyncTimeoutError = 0x0034,
    DcInvalidSyncCycleTime = 0x0035,
    MbxAoe = 0x0041,
    MbxEoe = 0x0042,
    MbxCoe = 0x0043,
    MbxFoe = 0x0044,
    MbxSoe = 0x0045,
    MbxVoe = 0x004F,
    EepromNoAccess = 0x0050,
    EepromError = 0x0051,
    SlaveRestartedLocally = 0x0060,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn al_control_ack_bit() {
        let mut control = AlControl::new();
        control.set_state(0x04);
        control.set_acknowledge(true);
        assert_eq!(control.0, [0x14, 0x00]);
    }

    #[test]
    fn al_status_code_is_read_little_endian() {
        let status = AlStatus([0x14, 0x00, 0x00, 0x00, 0x1B, 0x00]);
        assert!(status.change_err());
        assert_eq!(status.state(), 0x04);
        assert_eq!(
            status.get_al_status_code(),
            Some(AlStatusCode::SyncManagerWatchdog)
        );
    }
}
