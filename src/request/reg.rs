use super::{alloc_buffer, impl_request, RequestState};
use crate::error::Error;
use crate::Direction;
use alloc::vec::Vec;

/// Raw access to slave registers by configured station address.
#[derive(Debug, Clone)]
pub struct RegRequest {
    data: Vec<u8>,
    direction: Direction,
    address: u16,
    transfer_size: usize,
    state: RequestState,
}

impl_request!(RegRequest);

impl RegRequest {
    pub fn new(size: usize) -> Result<Self, Error> {
        Ok(Self {
            data: alloc_buffer(size)?,
            direction: Direction::Invalid,
            address: 0,
            transfer_size: 0,
            state: RequestState::Init,
        })
    }

    pub fn mem_size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn transfer_size(&self) -> usize {
        self.transfer_size
    }

    /// Bytes that take part in the current transfer.
    pub fn transfer_data(&self) -> &[u8] {
        &self.data[..self.transfer_size]
    }

    pub(crate) fn transfer_data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.transfer_size]
    }

    pub fn read(&mut self, address: u16, size: usize) {
        self.issue(Direction::Input, address, size);
    }

    pub fn write(&mut self, address: u16, size: usize) {
        self.issue(Direction::Output, address, size);
    }

    pub fn read_write(&mut self, address: u16, size: usize) {
        self.issue(Direction::Both, address, size);
    }

    fn issue(&mut self, direction: Direction, address: u16, size: usize) {
        self.direction = direction;
        self.address = address;
        self.transfer_size = size.min(self.data.len());
        self.state = RequestState::Queued;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[test]
    fn transfer_is_clamped_to_buffer() {
        let mut request = RegRequest::new(4).unwrap();
        assert_eq!(request.direction(), Direction::Invalid);
        assert_eq!(request.state(), RequestState::Init);

        request.read_write(0x0910, 8);
        assert_eq!(request.transfer_size(), 4);
        assert_eq!(request.direction(), Direction::Both);
        assert_eq!(request.state(), RequestState::Queued);

        request.write(0x0120, 2);
        assert_eq!(request.transfer_data().len(), 2);
        assert_eq!(request.address(), 0x0120);
    }
}
