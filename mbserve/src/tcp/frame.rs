use crate::common::buffer::ReadBuffer;
use crate::common::cursor::WriteCursor;
use crate::common::frame::{Frame, FrameHeader, FunctionField, TxId};
use crate::common::phys::{format_bytes, PhysLayer};
use crate::common::traits::Serialize;
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::types::UnitId;

pub(crate) mod constants {
    use crate::common::frame::constants::MAX_PDU_LENGTH;

    pub(crate) const HEADER_LENGTH: usize = 7;
    pub(crate) const MAX_FRAME_LENGTH: usize = HEADER_LENGTH + MAX_PDU_LENGTH;
    // the length field counts the unit id as well as the PDU
    pub(crate) const MAX_LENGTH_FIELD: usize = MAX_PDU_LENGTH + 1;
}

#[derive(Clone, Copy)]
struct MbapHeader {
    tx_id: TxId,
    pdu_length: usize,
    unit_id: UnitId,
}

#[derive(Clone, Copy)]
enum ParseState {
    Begin,
    Header(MbapHeader),
}

/// Incremental parser of MBAP frames
pub(crate) struct MbapParser {
    state: ParseState,
}

impl MbapParser {
    pub(crate) fn new() -> Self {
        Self {
            state: ParseState::Begin,
        }
    }

    fn parse_header(cursor: &mut ReadBuffer) -> Result<MbapHeader, RequestError> {
        let tx_id = TxId::new(cursor.read_u16_be()?);
        let protocol_id = cursor.read_u16_be()?;
        let length = cursor.read_u16_be()? as usize;
        let unit_id = UnitId::new(cursor.read_u8()?);

        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        if length > constants::MAX_LENGTH_FIELD {
            return Err(
                FrameParseError::MbapLengthTooBig(length, constants::MAX_LENGTH_FIELD).into(),
            );
        }

        // the unit id is always part of the length
        if length == 0 {
            return Err(FrameParseError::MbapLengthZero.into());
        }

        Ok(MbapHeader {
            tx_id,
            pdu_length: length - 1,
            unit_id,
        })
    }

    fn parse_body(header: &MbapHeader, cursor: &mut ReadBuffer) -> Result<Frame, RequestError> {
        let mut frame = Frame::new(FrameHeader::new(header.unit_id, header.tx_id));
        if !frame.set(cursor.read(header.pdu_length)?) {
            return Err(InternalError::AduTooBig(header.pdu_length).into());
        }
        Ok(frame)
    }

    /// Ok(None) means more data is required; consumed bytes are removed from the buffer
    pub(crate) fn parse(
        &mut self,
        cursor: &mut ReadBuffer,
        level: FrameDecodeLevel,
    ) -> Result<Option<Frame>, RequestError> {
        loop {
            match self.state {
                ParseState::Begin => {
                    if cursor.len() < constants::HEADER_LENGTH {
                        return Ok(None);
                    }
                    self.state = ParseState::Header(Self::parse_header(cursor)?);
                }
                ParseState::Header(header) => {
                    if cursor.len() < header.pdu_length {
                        return Ok(None);
                    }

                    let frame = Self::parse_body(&header, cursor)?;
                    self.state = ParseState::Begin;

                    if level.enabled() {
                        tracing::info!(
                            "MBAP RX - {}",
                            MbapDisplay::new(level, frame.header, frame.payload())
                        );
                    }

                    return Ok(Some(frame));
                }
            }
        }
    }
}

/// Formats MBAP frames into a buffer sized for the largest frame
pub(crate) struct MbapFormatter {
    buffer: [u8; constants::MAX_FRAME_LENGTH],
}

impl MbapFormatter {
    pub(crate) fn new() -> Self {
        Self {
            buffer: [0; constants::MAX_FRAME_LENGTH],
        }
    }

    pub(crate) fn format(
        &mut self,
        header: FrameHeader,
        function: FunctionField,
        body: &dyn Serialize,
        level: FrameDecodeLevel,
    ) -> Result<&[u8], InternalError> {
        let total_length = {
            let mut cursor = WriteCursor::new(self.buffer.as_mut());
            cursor.write_u16_be(header.tx_id.to_u16())?;
            cursor.write_u16_be(0)?;
            cursor.seek_from_current(2)?; // length is written once the body size is known
            cursor.write_u8(header.unit_id.value)?;

            let start = cursor.position();
            cursor.write_u8(function.get_value())?;
            body.serialize(&mut cursor)?;
            let pdu_length = cursor.position() - start;
            let total_length = cursor.position();

            let length_field = u16::try_from(pdu_length + 1)
                .map_err(|_| InternalError::AduTooBig(pdu_length))?;
            cursor.seek_from_start(4)?;
            cursor.write_u16_be(length_field)?;

            total_length
        };

        let frame = &self.buffer[..total_length];

        if level.enabled() {
            tracing::info!(
                "MBAP TX - {}",
                MbapDisplay::new(level, header, &frame[constants::HEADER_LENGTH..])
            );
        }

        Ok(frame)
    }
}

/// Reads whole frames from a connection
pub(crate) struct FramedReader {
    parser: MbapParser,
    buffer: ReadBuffer,
}

impl FramedReader {
    pub(crate) fn tcp() -> Self {
        Self {
            parser: MbapParser::new(),
            buffer: ReadBuffer::new(constants::MAX_FRAME_LENGTH),
        }
    }

    pub(crate) async fn next_frame(
        &mut self,
        io: &mut PhysLayer,
        level: DecodeLevel,
    ) -> Result<Frame, RequestError> {
        loop {
            match self.parser.parse(&mut self.buffer, level.frame)? {
                Some(frame) => return Ok(frame),
                None => {
                    self.buffer.read_some(io, level.physical).await?;
                }
            }
        }
    }
}

struct MbapDisplay<'a> {
    level: FrameDecodeLevel,
    header: FrameHeader,
    pdu: &'a [u8],
}

impl<'a> MbapDisplay<'a> {
    fn new(level: FrameDecodeLevel, header: FrameHeader, pdu: &'a [u8]) -> Self {
        MbapDisplay { level, header, pdu }
    }
}

impl std::fmt::Display for MbapDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "tx_id: {} unit: {} len: {}",
            self.header.tx_id,
            self.header.unit_id,
            self.pdu.len()
        )?;
        if self.level.payload_enabled() {
            format_bytes(f, self.pdu)?;
        }
        Ok(())
    }
}
