use crate::common::cursor::WriteCursor;
use crate::common::serialize::{serialize_bits, serialize_registers};
use crate::common::traits::{Loggable, Serialize};
use crate::decode::AppDecodeLevel;
use crate::error::InternalError;
use crate::types::{AddressRange, Indexed};

/// Body of a read coils or read discrete inputs response
pub(crate) struct BitResponse<'a> {
    range: AddressRange,
    values: &'a [bool],
}

/// Body of a response that carries registers
pub(crate) struct RegisterResponse<'a> {
    range: AddressRange,
    values: &'a [u16],
}

impl<'a> BitResponse<'a> {
    pub(crate) fn new(range: AddressRange, values: &'a [bool]) -> Self {
        Self { range, values }
    }
}

impl<'a> RegisterResponse<'a> {
    pub(crate) fn new(range: AddressRange, values: &'a [u16]) -> Self {
        Self { range, values }
    }
}

impl Serialize for BitResponse<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        serialize_bits(self.values, cursor)
    }
}

impl Loggable for BitResponse<'_> {
    fn log(&self, level: AppDecodeLevel, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{}", self.range)?;
        }
        if level.data_values() {
            for (offset, value) in self.values.iter().enumerate() {
                let index = self.range.start + offset as u16;
                write!(f, "\n{}", Indexed::new(index, *value))?;
            }
        }
        Ok(())
    }
}

impl Serialize for RegisterResponse<'_> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        serialize_registers(self.values, cursor)
    }
}

impl Loggable for RegisterResponse<'_> {
    fn log(&self, level: AppDecodeLevel, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{}", self.range)?;
        }
        if level.data_values() {
            for (offset, value) in self.values.iter().enumerate() {
                let index = self.range.start + offset as u16;
                write!(f, "\n{}", Indexed::new(index, *value))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(body: &dyn Serialize) -> Vec<u8> {
        let mut buffer = [0u8; 256];
        let mut cursor = WriteCursor::new(&mut buffer);
        body.serialize(&mut cursor).unwrap();
        let length = cursor.position();
        buffer[..length].to_vec()
    }

    #[test]
    fn bit_response_packs_values_lsb_first() {
        let range = AddressRange::try_from(0, 10).unwrap();
        let values = [
            true, false, true, true, false, false, true, true, true, false,
        ];
        assert_eq!(
            serialize(&BitResponse::new(range, &values)),
            vec![0x02, 0xCD, 0x01]
        );
    }

    #[test]
    fn register_response_writes_big_endian_values() {
        let range = AddressRange::try_from(100, 3).unwrap();
        assert_eq!(
            serialize(&RegisterResponse::new(range, &[100, 101, 0xCAFE])),
            vec![0x06, 0x00, 0x64, 0x00, 0x65, 0xCA, 0xFE]
        );
    }
}
