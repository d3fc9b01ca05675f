use crate::common::cursor::WriteCursor;
use crate::common::traits::{Loggable, Serialize};
use crate::decode::AppDecodeLevel;
use crate::error::InternalError;
use crate::exception::ExceptionCode;
use crate::types::{coil_to_u16, AddressRange, Indexed};

pub(crate) fn calc_bytes_for_bits(num_bits: usize) -> Result<u8, InternalError> {
    let count = (num_bits + 7) / 8;
    u8::try_from(count).map_err(|_| InternalError::BadByteCount(count))
}

pub(crate) fn calc_bytes_for_registers(num_registers: usize) -> Result<u8, InternalError> {
    let count = 2 * num_registers;
    u8::try_from(count).map_err(|_| InternalError::BadByteCount(count))
}

/// write a byte count followed by the bits packed LSB first
pub(crate) fn serialize_bits(values: &[bool], cursor: &mut WriteCursor) -> Result<(), InternalError> {
    cursor.write_u8(calc_bytes_for_bits(values.len())?)?;

    for chunk in values.chunks(8) {
        let mut acc: u8 = 0;
        for (count, bit) in chunk.iter().enumerate() {
            if *bit {
                acc |= 1 << count;
            }
        }
        cursor.write_u8(acc)?;
    }

    Ok(())
}

/// write a byte count followed by the registers in big endian
pub(crate) fn serialize_registers(
    values: &[u16],
    cursor: &mut WriteCursor,
) -> Result<(), InternalError> {
    cursor.write_u8(calc_bytes_for_registers(values.len())?)?;

    for value in values {
        cursor.write_u16_be(*value)?;
    }

    Ok(())
}

impl Serialize for ExceptionCode {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u8((*self).into())
    }
}

impl Serialize for AddressRange {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.start)?;
        cursor.write_u16_be(self.count)
    }
}

impl Loggable for AddressRange {
    fn log(&self, level: AppDecodeLevel, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{self}")?;
        }
        Ok(())
    }
}

impl Serialize for Indexed<bool> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(coil_to_u16(self.value))
    }
}

impl Loggable for Indexed<bool> {
    fn log(&self, level: AppDecodeLevel, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{self}")?;
        }
        Ok(())
    }
}

impl Serialize for Indexed<u16> {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.index)?;
        cursor.write_u16_be(self.value)
    }
}

impl Loggable for Indexed<u16> {
    fn log(&self, level: AppDecodeLevel, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{self}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_address_range() {
        let range = AddressRange::try_from(3, 512).unwrap();
        let mut buffer = [0u8; 4];
        let mut cursor = WriteCursor::new(&mut buffer);
        range.serialize(&mut cursor).unwrap();
        assert_eq!(buffer, [0x00, 0x03, 0x02, 0x00]);
    }

    #[test]
    fn packs_bits_least_significant_first() {
        let mut buffer = [0u8; 3];
        let mut cursor = WriteCursor::new(&mut buffer);
        let bits = [true, false, true, true, false, false, true, true, true];
        serialize_bits(&bits, &mut cursor).unwrap();
        assert_eq!(buffer, [0x02, 0xCD, 0x01]);
    }

    #[test]
    fn serializes_registers_big_endian() {
        let mut buffer = [0u8; 5];
        let mut cursor = WriteCursor::new(&mut buffer);
        serialize_registers(&[0xCAFE, 0x0064], &mut cursor).unwrap();
        assert_eq!(buffer, [0x04, 0xCA, 0xFE, 0x00, 0x64]);
    }

    #[test]
    fn byte_count_must_fit_in_u8() {
        assert_eq!(calc_bytes_for_registers(127), Ok(254));
        assert_eq!(
            calc_bytes_for_registers(128),
            Err(InternalError::BadByteCount(256))
        );
        assert_eq!(calc_bytes_for_bits(2040), Ok(255));
        assert_eq!(calc_bytes_for_bits(2041), Err(InternalError::BadByteCount(256)));
    }
}
