use crate::error::Error;
use crate::frame::CommandType;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    pub c_type: CommandType,
    pub adp: u16,
    pub ado: u16,
}

impl Default for Command {
    fn default() -> Self {
        Command::new(CommandType::NOP, 0, 0)
    }
}

impl Command {
    pub fn new(c_type: CommandType, adp: u16, ado: u16) -> Self {
        Self { c_type, adp, ado }
    }

    pub fn new_configured(c_type: CommandType, station_address: u16, register: u16) -> Self {
        Self::new(c_type, station_address, register)
    }

    pub fn new_logical(c_type: CommandType, logical_address: u32) -> Self {
        let adp = (logical_address & 0x0000_ffff) as u16;
        let ado = (logical_address >> 16) as u16;
        Self::new(c_type, adp, ado)
    }

    pub fn logical_address(&self) -> u32 {
        (self.adp as u32) | ((self.ado as u32) << 16)
    }
}

/// Network device a datagram travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceIndex {
    #[default]
    Main,
    /// Backup link, numbered from 1.
    Backup(u8),
}

impl DeviceIndex {
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            DeviceIndex::Main
        } else {
            DeviceIndex::Backup(index as u8)
        }
    }

    pub fn index(&self) -> usize {
        match self {
            DeviceIndex::Main => 0,
            DeviceIndex::Backup(index) => *index as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatagramState {
    #[default]
    Init,
    Queued,
    Sent,
    Received,
    TimedOut,
    Error,
}

/// A single EtherCAT command together with its payload.
///
/// The same instance carries the outgoing request and, once the frame
/// came back, the response data and working counter.
#[derive(Debug, Clone, Default)]
pub struct Datagram {
    command: Command,
    data: Vec<u8>,
    working_counter: u16,
    state: DatagramState,
    device_index: DeviceIndex,
}

impl Datagram {
    pub fn new() -> Self {
        Self::default()
    }

    fn prealloc(&mut self, size: usize) -> Result<(), Error> {
        self.data.clear();
        self.data.try_reserve_exact(size)?;
        self.data.resize(size, 0);
        Ok(())
    }

    fn init(&mut self, command: Command, size: usize) -> Result<(), Error> {
        self.prealloc(size)?;
        self.command = command;
        self.working_counter = 0;
        self.state = DatagramState::Init;
        Ok(())
    }

    pub fn fprd(&mut self, station_address: u16, register: u16, size: usize) -> Result<(), Error> {
        let command = Command::new_configured(CommandType::FPRD, station_address, register);
        self.init(command, size)
    }

    pub fn fpwr(&mut self, station_address: u16, register: u16, size: usize) -> Result<(), Error> {
        let command = Command::new_configured(CommandType::FPWR, station_address, register);
        self.init(command, size)
    }

    pub fn fprw(&mut self, station_address: u16, register: u16, size: usize) -> Result<(), Error> {
        let command = Command::new_configured(CommandType::FPRW, station_address, register);
        self.init(command, size)
    }

    pub fn lrd(&mut self, logical_address: u32, size: usize) -> Result<(), Error> {
        self.init(Command::new_logical(CommandType::LRD, logical_address), size)
    }

    pub fn lwr(&mut self, logical_address: u32, size: usize) -> Result<(), Error> {
        self.init(Command::new_logical(CommandType::LWR, logical_address), size)
    }

    pub fn lrw(&mut self, logical_address: u32, size: usize) -> Result<(), Error> {
        self.init(Command::new_logical(CommandType::LRW, logical_address), size)
    }

    pub fn zero(&mut self) {
        self.data.fill(0);
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn command_type(&self) -> CommandType {
        self.command.c_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn working_counter(&self) -> u16 {
        self.working_counter
    }

    pub fn set_working_counter(&mut self, wkc: u16) {
        self.working_counter = wkc;
    }

    pub fn state(&self) -> DatagramState {
        self.state
    }

    pub fn set_state(&mut self, state: DatagramState) {
        self.state = state;
    }

    pub fn is_received(&self) -> bool {
        self.state == DatagramState::Received
    }

    pub fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    pub fn set_device_index(&mut self, device_index: DeviceIndex) {
        self.device_index = device_index;
    }

    /// Stores a response that came back from the network. Bytes beyond
    /// the datagram size are ignored.
    pub fn receive(&mut self, data: &[u8], wkc: u16) {
        let len = data.len().min(self.data.len());
        self.data[..len].copy_from_slice(&data[..len]);
        self.working_counter = wkc;
        self.state = DatagramState::Received;
    }
}

/// Sink that puts datagrams on the wire for the next frame.
pub trait DatagramQueue {
    fn queue_datagram(&mut self, datagram: &mut Datagram);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_address_is_split_into_adp_and_ado() {
        let command = Command::new_logical(CommandType::LRW, 0x0001_0010);
        assert_eq!(command.adp, 0x0010);
        assert_eq!(command.ado, 0x0001);
        assert_eq!(command.logical_address(), 0x0001_0010);
    }

    #[test]
    fn new_command_resets_response() {
        let mut datagram = Datagram::new();
        datagram.fprd(0x1001, 0x0130, 2).unwrap();
        datagram.receive(&[0x12, 0x00, 0xff], 1);
        assert!(datagram.is_received());
        assert_eq!(datagram.data(), &[0x12, 0x00]);

        datagram.fpwr(0x1001, 0x0120, 4).unwrap();
        assert_eq!(datagram.state(), DatagramState::Init);
        assert_eq!(datagram.working_counter(), 0);
        assert_eq!(datagram.data(), &[0, 0, 0, 0]);
        assert_eq!(datagram.command_type(), CommandType::FPWR);
    }
}
