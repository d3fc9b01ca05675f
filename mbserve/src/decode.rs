/// Controls how much of the received and transmitted traffic is logged, per layer
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeLevel {
    /// Controls the decoding of the application layer (function code and data)
    pub app: AppDecodeLevel,
    /// Controls the decoding of the MBAP header and raw PDU bytes
    pub frame: FrameDecodeLevel,
    /// Controls the logging of physical layer reads and writes
    pub physical: PhysDecodeLevel,
}

/// Controls how requests and responses are decoded at the INFO log level
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AppDecodeLevel {
    /// Decode nothing
    #[default]
    Nothing,
    /// Decode the function code only
    FunctionCode,
    /// Decode the function code and the general description of the data
    DataHeaders,
    /// Decode the function code, the general description of the data and the actual data values
    DataValues,
}

/// Controls how MBAP frames are decoded at the INFO log level
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FrameDecodeLevel {
    /// Decode nothing
    #[default]
    Nothing,
    /// Decode the MBAP header
    Header,
    /// Decode the header and the raw PDU as hexadecimal
    Payload,
}

/// Controls how data read from and written to the socket is logged
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PhysDecodeLevel {
    /// Log nothing
    #[default]
    Nothing,
    /// Log only the length of data that is sent and received
    Length,
    /// Log the length and the actual data that is sent and received
    Data,
}

impl DecodeLevel {
    /// construct a `DecodeLevel` with nothing enabled
    pub fn nothing() -> Self {
        Self::default()
    }

    /// construct a `DecodeLevel` from its fields
    pub fn new(app: AppDecodeLevel, frame: FrameDecodeLevel, physical: PhysDecodeLevel) -> Self {
        DecodeLevel {
            app,
            frame,
            physical,
        }
    }
}

impl AppDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        !matches!(self, AppDecodeLevel::Nothing)
    }

    pub(crate) fn data_headers(&self) -> bool {
        matches!(self, AppDecodeLevel::DataHeaders | AppDecodeLevel::DataValues)
    }

    pub(crate) fn data_values(&self) -> bool {
        matches!(self, AppDecodeLevel::DataValues)
    }
}

impl FrameDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        !matches!(self, FrameDecodeLevel::Nothing)
    }

    pub(crate) fn payload_enabled(&self) -> bool {
        matches!(self, FrameDecodeLevel::Payload)
    }
}

impl PhysDecodeLevel {
    pub(crate) fn enabled(&self) -> bool {
        !matches!(self, PhysDecodeLevel::Nothing)
    }

    pub(crate) fn data_enabled(&self) -> bool {
        matches!(self, PhysDecodeLevel::Data)
    }
}
