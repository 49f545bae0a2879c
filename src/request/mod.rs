//! Requests that applications hand to a slave and that the slave state
//! machine serves in the background.

pub mod dict;
pub mod eoe;
pub mod foe;
pub mod reg;
pub mod sdo;
pub mod soe;

use crate::error::Error;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

/// Shared reference to a request. The application keeps one to poll the
/// state, the slave queue and state machine hold the others.
pub type RequestHandle<T> = Rc<RefCell<T>>;

pub fn new_handle<T>(request: T) -> RequestHandle<T> {
    Rc::new(RefCell::new(request))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestState {
    #[default]
    Init,
    Queued,
    Busy,
    Success,
    Failure,
}

/// Request state as shown to applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalRequestState {
    Unused,
    Busy,
    Success,
    Error,
}

impl RequestState {
    pub fn external(&self) -> ExternalRequestState {
        match self {
            RequestState::Init => ExternalRequestState::Unused,
            RequestState::Queued | RequestState::Busy => ExternalRequestState::Busy,
            RequestState::Success => ExternalRequestState::Success,
            RequestState::Failure => ExternalRequestState::Error,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RequestState::Success | RequestState::Failure)
    }
}

pub trait Request {
    fn state(&self) -> RequestState;
    fn set_state(&mut self, state: RequestState);

    fn external_state(&self) -> ExternalRequestState {
        self.state().external()
    }
}

macro_rules! impl_request {
    ($($request: ty),*) => {
        $(
            impl crate::request::Request for $request {
                fn state(&self) -> crate::request::RequestState {
                    self.state
                }

                fn set_state(&mut self, state: crate::request::RequestState) {
                    self.state = state;
                }
            }
        )*
    };
}
pub(crate) use impl_request;

pub(crate) fn alloc_buffer(size: usize) -> Result<Vec<u8>, Error> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(size)?;
    buffer.resize(size, 0);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_state_translation() {
        assert_eq!(RequestState::Init.external(), ExternalRequestState::Unused);
        assert_eq!(RequestState::Queued.external(), ExternalRequestState::Busy);
        assert_eq!(RequestState::Busy.external(), ExternalRequestState::Busy);
        assert_eq!(RequestState::Success.external(), ExternalRequestState::Success);
        assert_eq!(RequestState::Failure.external(), ExternalRequestState::Error);
    }
}
