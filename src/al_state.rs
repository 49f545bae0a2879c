use bit_field::BitField;
use core::fmt;
use num_enum::FromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash, FromPrimitive)]
#[repr(u8)]
pub enum AlState {
    #[num_enum(default)]
    Invalid = 0x0,
    Init = 0x1,
    PreOperational = 0x2,
    Bootstrap = 0x3,
    SafeOperational = 0x4,
    Operational = 0x8,
}

impl Default for AlState {
    fn default() -> Self {
        AlState::Invalid
    }
}

impl fmt::Display for AlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlState::Invalid => "(unknown)",
            AlState::Init => "INIT",
            AlState::PreOperational => "PREOP",
            AlState::Bootstrap => "BOOT",
            AlState::SafeOperational => "SAFEOP",
            AlState::Operational => "OP",
        };
        f.write_str(name)
    }
}

/// AL state as reported by a slave, including the error/acknowledge flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlaveState {
    al_state: AlState,
    ack_err: bool,
}

impl SlaveState {
    pub const ACK_ERR: u8 = 0x10;

    pub fn new(al_state: AlState) -> Self {
        Self {
            al_state,
            ack_err: false,
        }
    }

    pub fn with_ack_err(al_state: AlState) -> Self {
        Self {
            al_state,
            ack_err: true,
        }
    }

    pub fn from_raw(raw: u8) -> Self {
        Self {
            al_state: AlState::from(raw.get_bits(0..4)),
            ack_err: raw.get_bit(4),
        }
    }

    pub fn raw(&self) -> u8 {
        let mut raw = self.al_state as u8;
        raw.set_bit(4, self.ack_err);
        raw
    }

    pub fn al_state(&self) -> AlState {
        self.al_state
    }

    pub fn ack_err(&self) -> bool {
        self.ack_err
    }

    pub fn is_init(&self) -> bool {
        self.al_state == AlState::Init
    }
}

impl From<AlState> for SlaveState {
    fn from(al_state: AlState) -> Self {
        Self::new(al_state)
    }
}

impl fmt::Display for SlaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ack_err {
            write!(f, "{} + ERROR", self.al_state)
        } else {
            write!(f, "{}", self.al_state)
        }
    }
}
