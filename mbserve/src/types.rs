use crate::decode::AppDecodeLevel;
use crate::error::{AduParseError, InvalidRange, RequestError};

use scursor::ReadCursor;

/// Modbus unit identifier, just a type-safe wrapper around `u8`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

/// Start and count tuple carried by requests
///
/// Cannot be constructed with a count of zero or a range that overflows `u16`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    /// Starting address of the range
    pub start: u16,
    /// Count of elements in the range
    pub count: u16,
}

/// Value and its address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Indexed<T> {
    /// Address of the value
    pub index: u16,
    /// Associated value
    pub value: T,
}

/// Zero-copy iterator over the packed bits of a write multiple coils request
#[derive(Debug, Copy, Clone)]
pub(crate) struct BitIterator<'a> {
    bytes: &'a [u8],
    range: AddressRange,
    pos: u16,
}

/// Zero-copy iterator over the registers of a write request
#[derive(Debug, Copy, Clone)]
pub(crate) struct RegisterIterator<'a> {
    bytes: &'a [u8],
    range: AddressRange,
    pos: u16,
}

pub(crate) struct BitIteratorDisplay<'a> {
    iterator: BitIterator<'a>,
    level: AppDecodeLevel,
}

pub(crate) struct RegisterIteratorDisplay<'a> {
    iterator: RegisterIterator<'a>,
    level: AppDecodeLevel,
}

impl UnitId {
    /// Create a new UnitId
    pub const fn new(value: u8) -> Self {
        Self { value }
    }
}

/// `0xFF` is the unit id recommended for Modbus/TCP servers that are not gateways
impl Default for UnitId {
    fn default() -> Self {
        Self { value: 0xFF }
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

impl AddressRange {
    /// Create a new address range
    pub fn try_from(start: u16, count: u16) -> Result<Self, InvalidRange> {
        if count == 0 {
            return Err(InvalidRange::CountOfZero);
        }

        let max_start = u16::MAX - (count - 1);

        if start > max_start {
            return Err(InvalidRange::AddressOverflow(start, count));
        }

        Ok(Self { start, count })
    }

    /// quantity errors take precedence over an address overflow
    pub(crate) fn try_from_limited(
        start: u16,
        count: u16,
        limit: u16,
    ) -> Result<Self, InvalidRange> {
        check_count(count, limit)?;
        Self::try_from(start, count)
    }
}

pub(crate) fn check_count(count: u16, limit: u16) -> Result<u16, InvalidRange> {
    if count == 0 {
        return Err(InvalidRange::CountOfZero);
    }
    if count > limit {
        return Err(InvalidRange::CountTooLargeForType(count, limit));
    }
    Ok(count)
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "start: {:#06X} qty: {}", self.start, self.count)
    }
}

impl<T> Indexed<T> {
    /// Create a new indexed value
    pub fn new(index: u16, value: T) -> Self {
        Indexed { index, value }
    }
}

impl std::fmt::Display for Indexed<bool> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "idx: {:#06X} value: {}", self.index, self.value as i32)
    }
}

impl std::fmt::Display for Indexed<u16> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "idx: {:#06X} value: {:#06X}", self.index, self.value)
    }
}

pub(crate) fn coil_from_u16(value: u16) -> Result<bool, AduParseError> {
    match value {
        crate::constants::coil::ON => Ok(true),
        crate::constants::coil::OFF => Ok(false),
        _ => Err(AduParseError::UnknownCoilState(value)),
    }
}

pub(crate) fn coil_to_u16(value: bool) -> u16 {
    if value {
        crate::constants::coil::ON
    } else {
        crate::constants::coil::OFF
    }
}

impl<'a> BitIterator<'a> {
    /// consume the byte count and the packed bits that must follow it
    ///
    /// The byte count is validated before `start` and `count` are checked as a range.
    pub(crate) fn parse_all(
        start: u16,
        count: u16,
        cursor: &mut ReadCursor<'a>,
    ) -> Result<Self, RequestError> {
        let expected = crate::common::bits::num_bytes_for_bits(count);
        let byte_count = cursor.read_u8()? as usize;
        if byte_count != expected {
            return Err(AduParseError::ByteCountMismatch(expected, byte_count).into());
        }
        let bytes = cursor.read_bytes(byte_count)?;
        cursor.expect_empty()?;
        Ok(Self {
            bytes,
            range: AddressRange::try_from(start, count)?,
            pos: 0,
        })
    }

    pub(crate) fn range(&self) -> AddressRange {
        self.range
    }

    pub(crate) fn values(self) -> Vec<bool> {
        self.map(|x| x.value).collect()
    }
}

impl<'a> RegisterIterator<'a> {
    /// consume the byte count and the registers that must follow it
    pub(crate) fn parse_all(
        start: u16,
        count: u16,
        cursor: &mut ReadCursor<'a>,
    ) -> Result<Self, RequestError> {
        let expected = 2 * count as usize;
        let byte_count = cursor.read_u8()? as usize;
        if byte_count != expected {
            return Err(AduParseError::ByteCountMismatch(expected, byte_count).into());
        }
        let bytes = cursor.read_bytes(byte_count)?;
        cursor.expect_empty()?;
        Ok(Self {
            bytes,
            range: AddressRange::try_from(start, count)?,
            pos: 0,
        })
    }

    pub(crate) fn range(&self) -> AddressRange {
        self.range
    }

    pub(crate) fn values(self) -> Vec<u16> {
        self.map(|x| x.value).collect()
    }
}

impl Iterator for BitIterator<'_> {
    type Item = Indexed<bool>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == self.range.count {
            return None;
        }
        let byte = self.pos / 8;
        let bit = (self.pos % 8) as u8;

        let value = self.bytes.get(byte as usize)?;
        let index = self.range.start + self.pos;
        self.pos += 1;
        Some(Indexed::new(index, (*value & (1 << bit)) != 0))
    }

    // lets collect() size the vector up front
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.range.count - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl Iterator for RegisterIterator<'_> {
    type Item = Indexed<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == self.range.count {
            return None;
        }

        let pos = 2 * (self.pos as usize);
        match self.bytes.get(pos..pos + 2) {
            Some([high, low]) => {
                let index = self.range.start + self.pos;
                self.pos += 1;
                Some(Indexed::new(index, u16::from_be_bytes([*high, *low])))
            }
            _ => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.range.count - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl<'a> BitIteratorDisplay<'a> {
    pub(crate) fn new(level: AppDecodeLevel, iterator: BitIterator<'a>) -> Self {
        Self { iterator, level }
    }
}

impl std::fmt::Display for BitIteratorDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.iterator.range)?;

        if self.level.data_values() {
            for x in self.iterator {
                write!(f, "\n{x}")?;
            }
        }

        Ok(())
    }
}

impl<'a> RegisterIteratorDisplay<'a> {
    pub(crate) fn new(level: AppDecodeLevel, iterator: RegisterIterator<'a>) -> Self {
        Self { iterator, level }
    }
}

impl std::fmt::Display for RegisterIteratorDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.iterator.range)?;

        if self.level.data_values() {
            for x in self.iterator {
                write!(f, "\n{x}")?;
            }
        }

        Ok(())
    }
}
