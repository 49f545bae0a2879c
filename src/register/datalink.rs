use bitfield::*;

bitfield! {
    #[derive(Debug, Clone)]
    pub struct FmmuRegister([u8]);
    pub u32, logical_start_address, set_logical_start_address: 8*4-1, 8*0;
    pub u16, length, set_length: 8*6-1, 8*4;
    pub u8, logical_start_bit, set_logical_start_bit: 8*6+2, 8*6;
    pub u8, logical_end_bit, set_logical_end_bit: 8*7+2, 8*7;
    pub u16, physical_start_address, set_physical_start_address: 8*10-1, 8*8;
    pub u8, physical_start_bit, set_physical_start_bit: 8*10+2, 8*10;
    pub read_enable, set_read_enable: 8*11;
    pub write_enable, set_write_enable: 8*11+1;
    pub enable, set_enable: 8*12;
}

impl<B: AsRef<[u8]>> FmmuRegister<B> {
    pub const ADDRESS_BASE: u16 = 0x0600;
    pub const SIZE: usize = 16;

    pub fn new(buf: B) -> Option<Self> {
        if buf.as_ref().len() < Self::SIZE {
            None
        } else {
            Some(Self(buf))
        }
    }

    /// Register address of the FMMU with the given index.
    pub fn address(index: u8) -> u16 {
        Self::ADDRESS_BASE + (index as u16) * (Self::SIZE as u16)
    }

    pub fn into_inner(self) -> B {
        self.0
    }
}

impl FmmuRegister<[u8; 16]> {
    pub fn zeroed() -> Self {
        Self([0; 16])
    }
}
