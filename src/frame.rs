use num_enum::FromPrimitive;

pub const ETHERNET_FRAME_SIZE_WITHOUT_FCS: usize = 1514;
pub const ETHERNET_HEADER_LENGTH: usize = 14;
pub const ETHERCAT_HEADER_LENGTH: usize = 2;
pub const ETHERCATPDU_HEADER_LENGTH: usize = 10;
pub const WKC_LENGTH: usize = 2;

/// Largest payload a single datagram can carry in one Ethernet frame.
pub const MAX_PDU_DATAGRAM: usize = ETHERNET_FRAME_SIZE_WITHOUT_FCS
    - ETHERNET_HEADER_LENGTH
    - ETHERCAT_HEADER_LENGTH
    - ETHERCATPDU_HEADER_LENGTH
    - WKC_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum CommandType {
    /// No operation
    NOP = 0x00,
    /// Auto Increment Read
    APRD,
    /// Auto Increment Write
    APWR,
    /// Auto Increment Read Write
    APRW,
    /// Configured Address Read
    FPRD,
    /// Configured Address Write
    FPWR,
    /// Configured Address Read Write
    FPRW,
    /// Broadcast Read
    BRD,
    /// Broadcast Write
    BWR,
    /// Broadcast Read Write
    BRW,
    /// Logical Memory Read
    LRD,
    /// Logical Memory Write
    LWR,
    /// Logical Memory Read Write
    LRW,
    /// Auto Increment Read Multiple Write
    ARMW,
    /// Configured Read Multiple Write
    FRMW,
    #[num_enum(default)]
    Invalid,
}

impl CommandType {
    /// Working counter increment a single addressed slave contributes
    /// when it executes the command completely.
    pub fn single_slave_wkc(&self) -> u16 {
        match self {
            CommandType::APRW | CommandType::FPRW | CommandType::BRW | CommandType::LRW => 3,
            CommandType::NOP | CommandType::Invalid => 0,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_payload_fits_one_frame() {
        assert_eq!(MAX_PDU_DATAGRAM, 1486);
    }

    #[test]
    fn command_codes() {
        assert_eq!(CommandType::from(0x04), CommandType::FPRD);
        assert_eq!(CommandType::from(0x0C), CommandType::LRW);
        assert_eq!(CommandType::from(0x42), CommandType::Invalid);
        assert_eq!(CommandType::FPRW.single_slave_wkc(), 3);
    }
}
