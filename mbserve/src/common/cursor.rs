use crate::error::InternalError;

/// cursor used to serialize responses into a fixed buffer
pub(crate) struct WriteCursor<'a> {
    dest: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    pub(crate) fn new(dest: &'a mut [u8]) -> Self {
        Self { dest, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.dest.len() - self.pos
    }

    pub(crate) fn seek_from_current(&mut self, count: usize) -> Result<(), InternalError> {
        if self.remaining() < count {
            return Err(InternalError::BadSeekOperation);
        }
        self.pos += count;
        Ok(())
    }

    pub(crate) fn seek_from_start(&mut self, pos: usize) -> Result<(), InternalError> {
        if self.dest.len() < pos {
            return Err(InternalError::BadSeekOperation);
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn write_u8(&mut self, value: u8) -> Result<(), InternalError> {
        match self.dest.get_mut(self.pos) {
            Some(x) => {
                *x = value;
                self.pos += 1;
                Ok(())
            }
            None => Err(InternalError::InsufficientWriteSpace(1, 0)),
        }
    }

    pub(crate) fn write_u16_be(&mut self, value: u16) -> Result<(), InternalError> {
        // all or nothing
        if self.remaining() < 2 {
            return Err(InternalError::InsufficientWriteSpace(2, self.remaining()));
        }
        let [high, low] = value.to_be_bytes();
        self.write_u8(high)?;
        self.write_u8(low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_u16_does_not_write_partial_values() {
        let mut buffer = [0u8; 3];
        let mut cursor = WriteCursor::new(&mut buffer);
        cursor.write_u16_be(0x0102).unwrap();
        assert_eq!(
            cursor.write_u16_be(0x0304),
            Err(InternalError::InsufficientWriteSpace(2, 1))
        );
        assert_eq!(cursor.position(), 2);
        assert_eq!(buffer, [0x01, 0x02, 0x00]);
    }
}
