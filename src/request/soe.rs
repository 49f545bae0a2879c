use super::{alloc_buffer, impl_request, RequestState};
use crate::error::Error;
use crate::Direction;
use alloc::vec::Vec;

/// Read or write of one servo drive IDN over SoE.
#[derive(Debug, Clone)]
pub struct SoeRequest {
    drive_no: u8,
    idn: u16,
    data: Vec<u8>,
    data_size: usize,
    direction: Direction,
    state: RequestState,
    error_code: u16,
}

impl_request!(SoeRequest);

impl SoeRequest {
    pub fn new(drive_no: u8, idn: u16, size: usize) -> Result<Self, Error> {
        Ok(Self {
            drive_no,
            idn,
            data: alloc_buffer(size)?,
            data_size: 0,
            direction: Direction::Invalid,
            state: RequestState::Init,
            error_code: 0,
        })
    }

    pub fn drive_no(&self) -> u8 {
        self.drive_no
    }

    pub fn idn(&self) -> u16 {
        self.idn
    }

    pub fn set_idn(&mut self, drive_no: u8, idn: u16) {
        self.drive_no = drive_no;
        self.idn = idn;
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_size]
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn set_data_size(&mut self, size: usize) {
        self.data_size = size.min(self.data.len());
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn error_code(&self) -> u16 {
        self.error_code
    }

    pub fn set_error_code(&mut self, error_code: u16) {
        self.error_code = error_code;
    }

    pub fn read(&mut self) {
        self.direction = Direction::Input;
        self.state = RequestState::Queued;
        self.error_code = 0;
    }

    pub fn write(&mut self) {
        self.direction = Direction::Output;
        self.state = RequestState::Queued;
        self.error_code = 0;
    }
}
