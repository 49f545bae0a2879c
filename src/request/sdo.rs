use super::{alloc_buffer, impl_request, RequestState};
use crate::error::Error;
use crate::{Direction, EtherCatSystemTime};
use alloc::vec::Vec;

/// Default time a slave may take to answer an SDO transfer.
pub const SDO_RESPONSE_TIMEOUT_MS: u32 = 1000;

/// CoE upload or download of one object dictionary entry.
#[derive(Debug, Clone)]
pub struct SdoRequest {
    index: u16,
    subindex: u8,
    complete_access: bool,
    data: Vec<u8>,
    data_size: usize,
    issue_timeout_ms: u32,
    response_timeout_ms: u32,
    direction: Direction,
    state: RequestState,
    issued_at: EtherCatSystemTime,
    abort_code: u32,
}

impl_request!(SdoRequest);

impl SdoRequest {
    pub fn new(index: u16, subindex: u8, size: usize) -> Result<Self, Error> {
        Ok(Self {
            index,
            subindex,
            complete_access: false,
            data: alloc_buffer(size)?,
            data_size: 0,
            issue_timeout_ms: 0,
            response_timeout_ms: SDO_RESPONSE_TIMEOUT_MS,
            direction: Direction::Invalid,
            state: RequestState::Init,
            issued_at: EtherCatSystemTime(0),
            abort_code: 0,
        })
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn subindex(&self) -> u8 {
        self.subindex
    }

    pub fn set_index(&mut self, index: u16, subindex: u8) {
        self.index = index;
        self.subindex = subindex;
        self.complete_access = false;
    }

    pub fn complete_access(&self) -> bool {
        self.complete_access
    }

    pub fn set_complete_access(&mut self, complete_access: bool) {
        self.complete_access = complete_access;
    }

    /// Time after which a still queued request is given up. Zero disables it.
    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.issue_timeout_ms = timeout_ms;
    }

    pub fn issue_timeout_ms(&self) -> u32 {
        self.issue_timeout_ms
    }

    pub fn response_timeout_ms(&self) -> u32 {
        self.response_timeout_ms
    }

    pub fn set_response_timeout(&mut self, timeout_ms: u32) {
        self.response_timeout_ms = timeout_ms;
    }

    /// Transferred bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_size]
    }

    /// Whole buffer, for filling in download data.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn set_data_size(&mut self, size: usize) {
        self.data_size = size.min(self.data.len());
    }

    /// Replaces the transfer data, growing the buffer if needed.
    pub fn set_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > self.data.len() {
            self.data.try_reserve_exact(data.len() - self.data.len())?;
            self.data.resize(data.len(), 0);
        }
        self.data[..data.len()].copy_from_slice(data);
        self.data_size = data.len();
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn abort_code(&self) -> u32 {
        self.abort_code
    }

    pub fn set_abort_code(&mut self, abort_code: u32) {
        self.abort_code = abort_code;
    }

    /// Schedules an upload (slave to master).
    pub fn read(&mut self, now: EtherCatSystemTime) {
        self.issue(Direction::Input, now);
    }

    /// Schedules a download of the current data (master to slave).
    pub fn write(&mut self, now: EtherCatSystemTime) {
        self.issue(Direction::Output, now);
    }

    fn issue(&mut self, direction: Direction, now: EtherCatSystemTime) {
        self.direction = direction;
        self.state = RequestState::Queued;
        self.abort_code = 0;
        self.issued_at = now;
    }

    pub fn issued_at(&self) -> EtherCatSystemTime {
        self.issued_at
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
    fn issue_timeout() {
        let mut request = SdoRequest::new(0x6040, 0, 2).unwrap();
        request.read(EtherCatSystemTime(1_000_000));
        assert_eq!(request.state(), RequestState::Queued);
        assert!(!request.timed_out(EtherCatSystemTime(500_000_000)));

        request.set_timeout(100);
        assert!(!request.timed_out(EtherCatSystemTime(101_000_000)));
        assert!(request.timed_out(EtherCatSystemTime(101_000_001)));
    }

    #[test]
    fn set_data_grows_buffer() {
        let mut request = SdoRequest::new(0x1c12, 1, 2).unwrap();
        request.set_data(&[1, 2, 3, 4]).unwrap();
        assert_eq!(request.data(), &[1, 2, 3, 4]);
        request.set_data_size(1);
        assert_eq!(request.data(), &[1]);
    }
}
