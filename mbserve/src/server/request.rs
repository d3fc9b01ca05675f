use crate::common::cursor::WriteCursor;
use crate::common::frame::{FrameHeader, FrameWriter, FunctionField};
use crate::common::function::FunctionCode;
use crate::common::traits::{Loggable, Parse, Serialize};
use crate::constants::limits;
use crate::decode::{AppDecodeLevel, DecodeLevel};
use crate::error::{InternalError, RequestError, StoreError};
use crate::exception::ExceptionCode;
use crate::server::response::{BitResponse, RegisterResponse};
use crate::store::{BitTable, RegisterTable, RegisterStore};
use crate::types::{
    check_count, AddressRange, BitIterator, BitIteratorDisplay, Indexed, RegisterIterator,
    RegisterIteratorDisplay,
};

use scursor::ReadCursor;

/// Coils carried by a write multiple coils request
#[derive(Debug, Copy, Clone)]
pub(crate) struct WriteCoils<'a> {
    pub(crate) range: AddressRange,
    pub(crate) iterator: BitIterator<'a>,
}

/// Registers carried by a write multiple registers request
#[derive(Debug, Copy, Clone)]
pub(crate) struct WriteRegisters<'a> {
    pub(crate) range: AddressRange,
    pub(crate) iterator: RegisterIterator<'a>,
}

/// Mask write register request, echoed back verbatim on success
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct MaskWrite {
    pub(crate) address: u16,
    pub(crate) and_mask: u16,
    pub(crate) or_mask: u16,
}

/// Read/write multiple registers request
#[derive(Debug, Copy, Clone)]
pub(crate) struct ReadWriteRegisters<'a> {
    pub(crate) read_range: AddressRange,
    pub(crate) write: WriteRegisters<'a>,
}

#[derive(Debug)]
pub(crate) enum Request<'a> {
    ReadCoils(AddressRange),
    ReadDiscreteInputs(AddressRange),
    ReadHoldingRegisters(AddressRange),
    ReadInputRegisters(AddressRange),
    WriteSingleCoil(Indexed<bool>),
    WriteSingleRegister(Indexed<u16>),
    WriteMultipleCoils(WriteCoils<'a>),
    WriteMultipleRegisters(WriteRegisters<'a>),
    MaskWriteRegister(MaskWrite),
    ReadWriteMultipleRegisters(ReadWriteRegisters<'a>),
}

impl<'a> Request<'a> {
    pub(crate) fn get_function(&self) -> FunctionCode {
        match self {
            Request::ReadCoils(_) => FunctionCode::ReadCoils,
            Request::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Request::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Request::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Request::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Request::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Request::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Request::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
            Request::MaskWriteRegister(_) => FunctionCode::MaskWriteRegister,
            Request::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
        }
    }

    /// Execute the request against the store and format the response frame.
    ///
    /// Store errors become exception responses, so the only errors returned are internal ones.
    pub(crate) fn get_reply<'b>(
        &self,
        header: FrameHeader,
        store: &mut RegisterStore,
        writer: &'b mut FrameWriter,
        level: DecodeLevel,
    ) -> Result<&'b [u8], RequestError> {
        fn write_result<T>(
            function: FunctionCode,
            header: FrameHeader,
            writer: &mut FrameWriter,
            result: Result<T, StoreError>,
            level: DecodeLevel,
        ) -> Result<&[u8], RequestError>
        where
            T: Loggable,
        {
            match result {
                Ok(response) => writer.format_reply(header, function, &response, level),
                Err(err) => {
                    tracing::warn!("{} failed: {}", function, err);
                    writer.format_ex(
                        header,
                        FunctionField::Exception(function),
                        ExceptionCode::from(err),
                        level,
                    )
                }
            }
        }

        let function = self.get_function();

        match self {
            Request::ReadCoils(range) => {
                let result = store
                    .read_bits(BitTable::Coils, range.start, range.count as usize)
                    .map(|values| BitResponse::new(*range, values));
                write_result(function, header, writer, result, level)
            }
            Request::ReadDiscreteInputs(range) => {
                let result = store
                    .read_bits(BitTable::DiscreteInputs, range.start, range.count as usize)
                    .map(|values| BitResponse::new(*range, values));
                write_result(function, header, writer, result, level)
            }
            Request::ReadHoldingRegisters(range) => {
                let result = store
                    .read_registers(
                        RegisterTable::HoldingRegisters,
                        range.start,
                        range.count as usize,
                    )
                    .map(|values| RegisterResponse::new(*range, values));
                write_result(function, header, writer, result, level)
            }
            Request::ReadInputRegisters(range) => {
                let result = store
                    .read_registers(
                        RegisterTable::InputRegisters,
                        range.start,
                        range.count as usize,
                    )
                    .map(|values| RegisterResponse::new(*range, values));
                write_result(function, header, writer, result, level)
            }
            Request::WriteSingleCoil(request) => {
                let result = store
                    .write_bits(BitTable::Coils, request.index, &[request.value])
                    .map(|_| *request);
                write_result(function, header, writer, result, level)
            }
            Request::WriteSingleRegister(request) => {
                let result = store
                    .write_registers(
                        RegisterTable::HoldingRegisters,
                        request.index,
                        &[request.value],
                    )
                    .map(|_| *request);
                write_result(function, header, writer, result, level)
            }
            Request::WriteMultipleCoils(items) => {
                let values = items.iterator.values();
                let result = store
                    .write_bits(BitTable::Coils, items.range.start, &values)
                    .map(|_| items.range);
                write_result(function, header, writer, result, level)
            }
            Request::WriteMultipleRegisters(items) => {
                let values = items.iterator.values();
                let result = store
                    .write_registers(RegisterTable::HoldingRegisters, items.range.start, &values)
                    .map(|_| items.range);
                write_result(function, header, writer, result, level)
            }
            Request::MaskWriteRegister(request) => {
                let result = store
                    .mask_write_register(request.address, request.and_mask, request.or_mask)
                    .map(|_| *request);
                write_result(function, header, writer, result, level)
            }
            Request::ReadWriteMultipleRegisters(request) => {
                let read = request.read_range;
                let values = request.write.iterator.values();

                // the read range is checked before writing so that a failed request changes nothing
                let result = store
                    .read_registers(
                        RegisterTable::HoldingRegisters,
                        read.start,
                        read.count as usize,
                    )
                    .map(|_| ())
                    .and_then(|_| {
                        store.write_registers(
                            RegisterTable::HoldingRegisters,
                            request.write.range.start,
                            &values,
                        )
                    });

                let result = match result {
                    Ok(()) => store
                        .read_registers(
                            RegisterTable::HoldingRegisters,
                            read.start,
                            read.count as usize,
                        )
                        .map(|values| RegisterResponse::new(read, values)),
                    Err(err) => Err(err),
                };
                write_result(function, header, writer, result, level)
            }
        }
    }

    pub(crate) fn parse(
        function: FunctionCode,
        cursor: &mut ReadCursor<'a>,
    ) -> Result<Self, RequestError> {
        match function {
            FunctionCode::ReadCoils => {
                let x = Request::ReadCoils(AddressRange::parse_limited(
                    cursor,
                    limits::MAX_READ_COILS_COUNT,
                )?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadDiscreteInputs => {
                let x = Request::ReadDiscreteInputs(AddressRange::parse_limited(
                    cursor,
                    limits::MAX_READ_COILS_COUNT,
                )?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadHoldingRegisters => {
                let x = Request::ReadHoldingRegisters(AddressRange::parse_limited(
                    cursor,
                    limits::MAX_READ_REGISTERS_COUNT,
                )?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadInputRegisters => {
                let x = Request::ReadInputRegisters(AddressRange::parse_limited(
                    cursor,
                    limits::MAX_READ_REGISTERS_COUNT,
                )?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::WriteSingleCoil => {
                let x = Request::WriteSingleCoil(Indexed::<bool>::parse(cursor)?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::WriteSingleRegister => {
                let x = Request::WriteSingleRegister(Indexed::<u16>::parse(cursor)?);
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::WriteMultipleCoils => {
                let start = cursor.read_u16_be()?;
                let count = check_count(cursor.read_u16_be()?, limits::MAX_WRITE_COILS_COUNT)?;
                let iterator = BitIterator::parse_all(start, count, cursor)?;
                Ok(Request::WriteMultipleCoils(WriteCoils {
                    range: iterator.range(),
                    iterator,
                }))
            }
            FunctionCode::WriteMultipleRegisters => {
                let start = cursor.read_u16_be()?;
                let count = check_count(cursor.read_u16_be()?, limits::MAX_WRITE_REGISTERS_COUNT)?;
                let iterator = RegisterIterator::parse_all(start, count, cursor)?;
                Ok(Request::WriteMultipleRegisters(WriteRegisters {
                    range: iterator.range(),
                    iterator,
                }))
            }
            FunctionCode::MaskWriteRegister => {
                let x = Request::MaskWriteRegister(MaskWrite {
                    address: cursor.read_u16_be()?,
                    and_mask: cursor.read_u16_be()?,
                    or_mask: cursor.read_u16_be()?,
                });
                cursor.expect_empty()?;
                Ok(x)
            }
            FunctionCode::ReadWriteMultipleRegisters => {
                let read_start = cursor.read_u16_be()?;
                let read_count = cursor.read_u16_be()?;
                let write_start = cursor.read_u16_be()?;
                let write_count = cursor.read_u16_be()?;

                // every quantity is validated before either range is
                let read_count = check_count(read_count, limits::MAX_READ_REGISTERS_COUNT)?;
                let write_count = check_count(write_count, limits::MAX_READ_WRITE_WRITE_COUNT)?;
                let iterator = RegisterIterator::parse_all(write_start, write_count, cursor)?;

                Ok(Request::ReadWriteMultipleRegisters(ReadWriteRegisters {
                    read_range: AddressRange::try_from(read_start, read_count)?,
                    write: WriteRegisters {
                        range: iterator.range(),
                        iterator,
                    },
                }))
            }
        }
    }
}

impl Serialize for MaskWrite {
    fn serialize(&self, cursor: &mut WriteCursor) -> Result<(), InternalError> {
        cursor.write_u16_be(self.address)?;
        cursor.write_u16_be(self.and_mask)?;
        cursor.write_u16_be(self.or_mask)
    }
}

impl Loggable for MaskWrite {
    fn log(&self, level: AppDecodeLevel, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if level.data_headers() {
            write!(f, "{self}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for MaskWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "addr: {:#06X} and_mask: {:#06X} or_mask: {:#06X}",
            self.address, self.and_mask, self.or_mask
        )
    }
}

pub(crate) struct RequestDisplay<'a, 'b> {
    request: &'a Request<'b>,
    level: AppDecodeLevel,
}

impl<'a, 'b> RequestDisplay<'a, 'b> {
    pub(crate) fn new(level: AppDecodeLevel, request: &'a Request<'b>) -> Self {
        Self { request, level }
    }
}

impl std::fmt::Display for RequestDisplay<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.request.get_function())?;

        if self.level.data_headers() {
            match self.request {
                Request::ReadCoils(range) => write!(f, " {range}")?,
                Request::ReadDiscreteInputs(range) => write!(f, " {range}")?,
                Request::ReadHoldingRegisters(range) => write!(f, " {range}")?,
                Request::ReadInputRegisters(range) => write!(f, " {range}")?,
                Request::WriteSingleCoil(request) => write!(f, " {request}")?,
                Request::WriteSingleRegister(request) => write!(f, " {request}")?,
                Request::WriteMultipleCoils(items) => write!(
                    f,
                    " {}",
                    BitIteratorDisplay::new(self.level, items.iterator)
                )?,
                Request::WriteMultipleRegisters(items) => write!(
                    f,
                    " {}",
                    RegisterIteratorDisplay::new(self.level, items.iterator)
                )?,
                Request::MaskWriteRegister(request) => write!(f, " {request}")?,
                Request::ReadWriteMultipleRegisters(request) => write!(
                    f,
                    " read: ({}) write: {}",
                    request.read_range,
                    RegisterIteratorDisplay::new(self.level, request.write.iterator)
                )?,
            }
        }

        Ok(())
    }
}
