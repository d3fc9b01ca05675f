use crate::common::function::FunctionCode;
use crate::common::traits::{Loggable, LoggableDisplay};
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::exception::ExceptionCode;
use crate::tcp::frame::MbapFormatter;
use crate::types::UnitId;

pub(crate) mod constants {
    /// function code plus data, the largest PDU that fits in any Modbus frame
    pub(crate) const MAX_PDU_LENGTH: usize = 253;
}

/// MBAP transaction identifier, echoed back in every response
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) struct TxId {
    value: u16,
}

impl TxId {
    pub(crate) fn new(value: u16) -> Self {
        TxId { value }
    }

    pub(crate) fn to_u16(self) -> u16 {
        self.value
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) struct FrameHeader {
    pub(crate) unit_id: UnitId,
    pub(crate) tx_id: TxId,
}

impl FrameHeader {
    pub(crate) fn new(unit_id: UnitId, tx_id: TxId) -> Self {
        FrameHeader { unit_id, tx_id }
    }
}

/// A received frame: the header and a copy of its PDU
pub(crate) struct Frame {
    pub(crate) header: FrameHeader,
    length: usize,
    pdu: [u8; constants::MAX_PDU_LENGTH],
}

impl Frame {
    pub(crate) fn new(header: FrameHeader) -> Frame {
        Frame {
            header,
            length: 0,
            pdu: [0; constants::MAX_PDU_LENGTH],
        }
    }

    pub(crate) fn set(&mut self, src: &[u8]) -> bool {
        match self.pdu.get_mut(0..src.len()) {
            Some(dest) => {
                dest.copy_from_slice(src);
                self.length = src.len();
                true
            }
            None => false,
        }
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.pdu[0..self.length]
    }
}

/// The function code byte written at the start of a response PDU
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FunctionField {
    Valid(FunctionCode),
    Exception(FunctionCode),
    UnknownFunction(u8),
}

impl FunctionField {
    pub(crate) fn get_value(self) -> u8 {
        match self {
            FunctionField::Valid(x) => x.get_value(),
            FunctionField::Exception(x) => x.as_error(),
            FunctionField::UnknownFunction(x) => x | 0x80,
        }
    }
}

impl std::fmt::Display for FunctionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionField::Valid(x) => write!(f, "{x}"),
            FunctionField::Exception(x) => write!(f, "{x} exception"),
            FunctionField::UnknownFunction(x) => write!(f, "unknown function ({x:#04X})"),
        }
    }
}

/// Formats complete response frames into an internal buffer
pub(crate) struct FrameWriter {
    formatter: MbapFormatter,
}

impl FrameWriter {
    pub(crate) fn tcp() -> Self {
        Self {
            formatter: MbapFormatter::new(),
        }
    }

    pub(crate) fn format_reply<T>(
        &mut self,
        header: FrameHeader,
        function: FunctionCode,
        body: &T,
        level: DecodeLevel,
    ) -> Result<&[u8], RequestError>
    where
        T: Loggable,
    {
        let frame = self.formatter.format(
            header,
            FunctionField::Valid(function),
            body,
            level.frame,
        )?;

        if level.app.enabled() {
            tracing::info!(
                "PDU TX - {} {}",
                function,
                LoggableDisplay::new(body, level.app)
            );
        }

        Ok(frame)
    }

    pub(crate) fn format_ex(
        &mut self,
        header: FrameHeader,
        function: FunctionField,
        ex: ExceptionCode,
        level: DecodeLevel,
    ) -> Result<&[u8], RequestError> {
        let frame = self.formatter.format(header, function, &ex, level.frame)?;

        if level.app.enabled() {
            tracing::warn!(
                "PDU TX - {} - Modbus exception {:?} ({:#04X})",
                function,
                ex,
                u8::from(ex)
            );
        }

        Ok(frame)
    }
}
