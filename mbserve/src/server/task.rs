use scursor::ReadCursor;
use tokio::sync::mpsc::Receiver;

use crate::common::frame::{Frame, FrameWriter, FunctionField};
use crate::common::function::FunctionCode;
use crate::common::phys::PhysLayer;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::exception::ExceptionCode;
use crate::server::request::{Request, RequestDisplay};
use crate::server::types::UnitIdFilter;
use crate::store::SharedStore;
use crate::tcp::frame::FramedReader;

/// Lifecycle of a session with a single client
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    AwaitingRequest,
    Processing,
    Closed,
}

/// Serves requests from one client, one at a time, until the connection closes
pub(crate) struct SessionTask<'a> {
    io: PhysLayer,
    store: SharedStore,
    filter: UnitIdFilter,
    reader: FramedReader,
    writer: FrameWriter,
    shutdown: &'a mut Receiver<()>,
    decode: DecodeLevel,
    state: SessionState,
}

impl<'a> SessionTask<'a> {
    pub(crate) fn new(
        io: PhysLayer,
        store: SharedStore,
        filter: UnitIdFilter,
        decode: DecodeLevel,
        shutdown: &'a mut Receiver<()>,
    ) -> Self {
        Self {
            io,
            store,
            filter,
            reader: FramedReader::tcp(),
            writer: FrameWriter::tcp(),
            shutdown,
            decode,
            state: SessionState::AwaitingRequest,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run until the session closes, returning the reason
    pub(crate) async fn run(&mut self) -> RequestError {
        loop {
            if let Err(err) = self.run_one().await {
                self.set_state(SessionState::Closed);
                return err;
            }
        }
    }

    async fn run_one(&mut self) -> Result<(), RequestError> {
        tokio::select! {
            frame = self.reader.next_frame(&mut self.io, self.decode) => {
                let frame = frame?;
                self.set_state(SessionState::Processing);
                self.handle_frame(frame).await?;
                self.set_state(SessionState::AwaitingRequest);
                Ok(())
            }
            _ = self.shutdown.recv() => {
                Err(RequestError::Shutdown)
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), RequestError> {
        if !self.filter.accepts(frame.header.unit_id) {
            tracing::warn!(
                "ignoring request for unit id: {}",
                frame.header.unit_id
            );
            return Ok(());
        }

        let mut cursor = ReadCursor::new(frame.payload());

        let function = match cursor.read_u8() {
            Err(_) => {
                tracing::warn!("received request without a function code");
                return Ok(());
            }
            Ok(value) => match FunctionCode::get(value) {
                Some(x) => x,
                None => {
                    tracing::warn!("received unknown function code: {:#04X}", value);
                    let reply = self.writer.format_ex(
                        frame.header,
                        FunctionField::UnknownFunction(value),
                        ExceptionCode::IllegalFunction,
                        self.decode,
                    )?;
                    self.io.write(reply, self.decode.physical).await?;
                    return Ok(());
                }
            },
        };

        let request = match Request::parse(function, &mut cursor) {
            Ok(x) => x,
            Err(err) => match err.as_exception() {
                Some(ex) => {
                    tracing::warn!("error parsing {}: {}", function, err);
                    let reply = self.writer.format_ex(
                        frame.header,
                        FunctionField::Exception(function),
                        ex,
                        self.decode,
                    )?;
                    self.io.write(reply, self.decode.physical).await?;
                    return Ok(());
                }
                None => return Err(err),
            },
        };

        if self.decode.app.enabled() {
            tracing::info!("PDU RX - {}", RequestDisplay::new(self.decode.app, &request));
        }

        // the lock is released before the reply is written
        let reply = {
            let mut store = match self.store.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            request.get_reply(frame.header, &mut store, &mut self.writer, self.decode)?
        };

        self.io.write(reply, self.decode.physical).await?;
        Ok(())
    }
}
