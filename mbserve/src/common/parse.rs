use crate::common::traits::Parse;
use crate::error::RequestError;
use crate::types::{coil_from_u16, AddressRange, Indexed};

use scursor::ReadCursor;

impl AddressRange {
    pub(crate) fn parse_limited(cursor: &mut ReadCursor, limit: u16) -> Result<Self, RequestError> {
        let start = cursor.read_u16_be()?;
        let count = cursor.read_u16_be()?;
        Ok(AddressRange::try_from_limited(start, count, limit)?)
    }
}

impl Parse for Indexed<bool> {
    fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError> {
        let index = cursor.read_u16_be()?;
        let value = coil_from_u16(cursor.read_u16_be()?)?;
        Ok(Indexed::new(index, value))
    }
}

impl Parse for Indexed<u16> {
    fn parse(cursor: &mut ReadCursor) -> Result<Self, RequestError> {
        Ok(Indexed::new(cursor.read_u16_be()?, cursor.read_u16_be()?))
    }
}
