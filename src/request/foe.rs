use super::{alloc_buffer, impl_request, RequestState};
use crate::error::Error;
use crate::{Direction, EtherCatSystemTime};
use alloc::vec::Vec;
use heapless::String;

pub const FOE_FILE_NAME_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoeResult {
    #[default]
    Idle,
    Busy,
    Ready,
    /// Error code reported by the slave.
    OpCode(u32),
    Timeout,
    ProtocolError,
}

/// File read from or written to a slave over FoE.
#[derive(Debug, Clone)]
pub struct FoeRequest {
    file_name: String<FOE_FILE_NAME_SIZE>,
    password: u32,
    buffer: Vec<u8>,
    data_size: usize,
    issue_timeout_ms: u32,
    direction: Direction,
    state: RequestState,
    issued_at: EtherCatSystemTime,
    result: FoeResult,
}

impl_request!(FoeRequest);

impl FoeRequest {
    pub fn new(size: usize) -> Result<Self, Error> {
        Ok(Self {
            file_name: String::new(),
            password: 0,
            buffer: alloc_buffer(size)?,
            data_size: 0,
            issue_timeout_ms: 0,
            direction: Direction::Invalid,
            state: RequestState::Init,
            issued_at: EtherCatSystemTime(0),
            result: FoeResult::Idle,
        })
    }

    /// Selects the file. Names longer than the internal buffer are truncated.
    pub fn set_file(&mut self, file_name: &str, password: u32) {
        self.file_name.clear();
        for c in file_name.chars() {
            if self.file_name.push(c).is_err() {
                break;
            }
        }
        self.password = password;
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn password(&self) -> u32 {
        self.password
    }

    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.issue_timeout_ms = timeout_ms;
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.data_size]
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn set_data_size(&mut self, size: usize) {
        self.data_size = size.min(self.buffer.len());
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn result(&self) -> FoeResult {
        self.result
    }

    pub fn set_result(&mut self, result: FoeResult) {
        self.result = result;
    }

    pub fn read(&mut self, now: EtherCatSystemTime) {
        self.data_size = 0;
        self.direction = Direction::Input;
        self.state = RequestState::Queued;
        self.result = FoeResult::Busy;
        self.issued_at = now;
    }

    /// Schedules a write of the first `size` buffer bytes. A size larger
    /// than the buffer fails the request right away.
    pub fn write(&mut self, size: usize, now: EtherCatSystemTime) {
        if size > self.buffer.len() {
            log::error!(
                "Request to write {} bytes to FoE buffer of size {}.",
                size,
                self.buffer.len()
            );
            self.state = RequestState::Failure;
            return;
        }
        self.data_size = size;
        self.direction = Direction::Output;
        self.state = RequestState::Queued;
        self.result = FoeResult::Busy;
        self.issued_at = now;
    }

    pub fn timed_out(&self, now: EtherCatSystemTime) -> bool {
        self.issue_timeout_ms != 0
            && now.elapsed_since(self.issued_at) > self.issue_timeout_ms as u64 * 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[test]
    fn oversized_write_fails() {
        let mut request = FoeRequest::new(8).unwrap();
        request.set_file("firmware.efw", 0x1234);
        request.write(16, EtherCatSystemTime(0));
        assert_eq!(request.state(), RequestState::Failure);

        request.write(8, EtherCatSystemTime(0));
        assert_eq!(request.state(), RequestState::Queued);
        assert_eq!(request.file_name(), "firmware.efw");
        assert_eq!(request.result(), FoeResult::Busy);
    }
}
