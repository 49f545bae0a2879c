use super::{impl_request, RequestState};

/// Asks for the slave's SDO dictionary to be uploaded.
#[derive(Debug, Clone, Default)]
pub struct DictRequest {
    state: RequestState,
}

impl_request!(DictRequest);

impl DictRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self) {
        self.state = RequestState::Queued;
    }
}
