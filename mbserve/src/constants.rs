/// Default TCP port for Modbus
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Largest number of entries any table of the register store may hold
pub const MAX_TABLE_SIZE: usize = 65535;

pub(crate) mod coil {
    /// u16 representation of COIL == ON when performing write single coil
    pub(crate) const ON: u16 = 0xFF00;
    /// u16 representation of COIL == OFF when performing write single coil
    pub(crate) const OFF: u16 = 0x0000;
}

/// Per-function quantity limits of the Modbus application protocol
pub mod limits {
    /// Maximum count allowed in a read coils/discrete inputs request
    pub const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Maximum count allowed in a read holding/input registers request
    pub const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
    /// Maximum count allowed in a `write multiple coils` request
    pub const MAX_WRITE_COILS_COUNT: u16 = 0x07B0;
    /// Maximum count allowed in a `write multiple registers` request
    pub const MAX_WRITE_REGISTERS_COUNT: u16 = 0x007B;
    /// Maximum write count allowed in a `read/write multiple registers` request
    pub const MAX_READ_WRITE_WRITE_COUNT: u16 = 0x0079;
}

pub(crate) mod exceptions {
    pub(crate) const ILLEGAL_FUNCTION: u8 = 0x01;
    pub(crate) const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub(crate) const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub(crate) const SERVER_DEVICE_FAILURE: u8 = 0x04;
}
