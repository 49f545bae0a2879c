use alloc::collections::TryReserveError;
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    NoMemory,
    FmmuTooLarge { size: usize, max: usize },
    NoDatagramBoundary { offset: usize, max: usize },
    FmmuLimitReached,
    PdoEntryNotMapped { index: u16, subindex: u8 },
    PdoEntryNotByteAligned { index: u16, subindex: u8 },
    PdoEntryOutOfRange { sync_index: u8, pdo_pos: usize, entry_pos: usize },
    DomainAlreadyFinished,
    ExternalMemoryTooSmall { size: usize, required: usize },
    SlaveConfigMismatch { alias: u16, position: u16 },
    InvalidSlaveConfig,
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::NoMemory
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoMemory => f.write_str("out of memory"),
            Error::FmmuTooLarge { size, max } => {
                write!(f, "FMMU of {} bytes exceeds the datagram limit of {}", size, max)
            }
            Error::NoDatagramBoundary { offset, max } => write!(
                f,
                "overlapping FMMUs at domain offset {} leave no datagram boundary within {} bytes",
                offset, max
            ),
            Error::FmmuLimitReached => f.write_str("FMMU limit reached"),
            Error::PdoEntryNotMapped { index, subindex } => {
                write!(f, "PDO entry 0x{:04X}:{:02X} is not mapped", index, subindex)
            }
            Error::PdoEntryNotByteAligned { index, subindex } => write!(
                f,
                "PDO entry 0x{:04X}:{:02X} does not start on a byte boundary",
                index, subindex
            ),
            Error::PdoEntryOutOfRange {
                sync_index,
                pdo_pos,
                entry_pos,
            } => write!(
                f,
                "no PDO entry at position {}/{} of sync manager {}",
                pdo_pos, entry_pos, sync_index
            ),
            Error::DomainAlreadyFinished => f.write_str("domain already finished"),
            Error::ExternalMemoryTooSmall { size, required } => write!(
                f,
                "external memory of {} bytes is smaller than the domain ({} bytes)",
                size, required
            ),
            Error::SlaveConfigMismatch { alias, position } => write!(
                f,
                "slave {}:{} was configured with a different identity",
                alias, position
            ),
            Error::InvalidSlaveConfig => f.write_str("invalid slave configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    #[test]
    fn allocation_failure_is_no_memory() {
        let mut data: Vec<u8> = Vec::new();
        let err = data.try_reserve_exact(usize::MAX).unwrap_err();
        assert_eq!(Error::from(err), Error::NoMemory);
    }

    #[test]
    fn display_names_the_entry() {
        let err = Error::PdoEntryNotMapped {
            index: 0x6000,
            subindex: 1,
        };
        assert_eq!(err.to_string(), "PDO entry 0x6000:01 is not mapped");
    }
}
