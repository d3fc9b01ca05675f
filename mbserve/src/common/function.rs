use std::fmt::{Display, Formatter};

mod constants {
    pub(crate) const READ_COILS: u8 = 1;
    pub(crate) const READ_DISCRETE_INPUTS: u8 = 2;
    pub(crate) const READ_HOLDING_REGISTERS: u8 = 3;
    pub(crate) const READ_INPUT_REGISTERS: u8 = 4;
    pub(crate) const WRITE_SINGLE_COIL: u8 = 5;
    pub(crate) const WRITE_SINGLE_REGISTER: u8 = 6;
    pub(crate) const WRITE_MULTIPLE_COILS: u8 = 15;
    pub(crate) const WRITE_MULTIPLE_REGISTERS: u8 = 16;
    pub(crate) const MASK_WRITE_REGISTER: u8 = 22;
    pub(crate) const READ_WRITE_MULTIPLE_REGISTERS: u8 = 23;
}

/// Function codes the server knows how to process
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum FunctionCode {
    ReadCoils = constants::READ_COILS,
    ReadDiscreteInputs = constants::READ_DISCRETE_INPUTS,
    ReadHoldingRegisters = constants::READ_HOLDING_REGISTERS,
    ReadInputRegisters = constants::READ_INPUT_REGISTERS,
    WriteSingleCoil = constants::WRITE_SINGLE_COIL,
    WriteSingleRegister = constants::WRITE_SINGLE_REGISTER,
    WriteMultipleCoils = constants::WRITE_MULTIPLE_COILS,
    WriteMultipleRegisters = constants::WRITE_MULTIPLE_REGISTERS,
    MaskWriteRegister = constants::MASK_WRITE_REGISTER,
    ReadWriteMultipleRegisters = constants::READ_WRITE_MULTIPLE_REGISTERS,
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FunctionCode::ReadCoils => "READ COILS",
            FunctionCode::ReadDiscreteInputs => "READ DISCRETE INPUTS",
            FunctionCode::ReadHoldingRegisters => "READ HOLDING REGISTERS",
            FunctionCode::ReadInputRegisters => "READ INPUT REGISTERS",
            FunctionCode::WriteSingleCoil => "WRITE SINGLE COIL",
            FunctionCode::WriteSingleRegister => "WRITE SINGLE REGISTER",
            FunctionCode::WriteMultipleCoils => "WRITE MULTIPLE COILS",
            FunctionCode::WriteMultipleRegisters => "WRITE MULTIPLE REGISTERS",
            FunctionCode::MaskWriteRegister => "MASK WRITE REGISTER",
            FunctionCode::ReadWriteMultipleRegisters => "READ/WRITE MULTIPLE REGISTERS",
        };
        write!(f, "{name} ({:#04X})", self.get_value())
    }
}

impl FunctionCode {
    pub(crate) const fn get_value(self) -> u8 {
        self as u8
    }

    pub(crate) const fn as_error(self) -> u8 {
        self.get_value() | 0x80
    }

    pub(crate) fn get(value: u8) -> Option<Self> {
        match value {
            constants::READ_COILS => Some(FunctionCode::ReadCoils),
            constants::READ_DISCRETE_INPUTS => Some(FunctionCode::ReadDiscreteInputs),
            constants::READ_HOLDING_REGISTERS => Some(FunctionCode::ReadHoldingRegisters),
            constants::READ_INPUT_REGISTERS => Some(FunctionCode::ReadInputRegisters),
            constants::WRITE_SINGLE_COIL => Some(FunctionCode::WriteSingleCoil),
            constants::WRITE_SINGLE_REGISTER => Some(FunctionCode::WriteSingleRegister),
            constants::WRITE_MULTIPLE_COILS => Some(FunctionCode::WriteMultipleCoils),
            constants::WRITE_MULTIPLE_REGISTERS => Some(FunctionCode::WriteMultipleRegisters),
            constants::MASK_WRITE_REGISTER => Some(FunctionCode::MaskWriteRegister),
            constants::READ_WRITE_MULTIPLE_REGISTERS => {
                Some(FunctionCode::ReadWriteMultipleRegisters)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_sets_the_high_bit() {
        assert_eq!(FunctionCode::ReadHoldingRegisters.as_error(), 0x83);
        assert_eq!(FunctionCode::ReadWriteMultipleRegisters.as_error(), 0x97);
    }

    #[test]
    fn unsupported_codes_are_not_recognized() {
        assert_eq!(FunctionCode::get(0x07), None);
        assert_eq!(FunctionCode::get(0x2B), None);
        assert_eq!(FunctionCode::get(0x83), None);
        assert_eq!(FunctionCode::get(0x10), Some(FunctionCode::WriteMultipleRegisters));
    }
}
