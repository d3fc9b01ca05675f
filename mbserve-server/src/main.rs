//! Command-line Modbus/TCP server whose holding registers are seeded to their own address

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use mbserve::*;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("unable to allocate the register store: {0}")]
    Store(#[from] StoreError),
    #[error("unable to start the server: {0}")]
    Server(#[from] ServerError),
    #[error("unable to wait for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(name = "mbserve-server")]
#[command(about = "Serves an in-memory Modbus register map over TCP, one client at a time")]
#[command(version)]
struct Cli {
    #[arg(short = 'a', long, default_value = "0.0.0.0:502", help = "Socket address to listen on")]
    address: SocketAddr,

    #[arg(short = 'u', long, help = "Only answer this unit id (answers every unit id if omitted)")]
    unit_id: Option<u8>,

    #[arg(long, help = "Stop after the first client disconnects")]
    once: bool,

    #[arg(long, default_value_t = constants::MAX_TABLE_SIZE, help = "Number of coils")]
    coils: usize,

    #[arg(long, default_value_t = constants::MAX_TABLE_SIZE, help = "Number of discrete inputs")]
    discrete_inputs: usize,

    #[arg(long, default_value_t = constants::MAX_TABLE_SIZE, help = "Number of holding registers")]
    holding_registers: usize,

    #[arg(long, default_value_t = constants::MAX_TABLE_SIZE, help = "Number of input registers")]
    input_registers: usize,

    #[arg(long, value_enum, default_value_t = AppLevel::FunctionCode, help = "Decoding of requests and responses")]
    decode_app: AppLevel,

    #[arg(long, value_enum, default_value_t = FrameLevel::Nothing, help = "Decoding of MBAP frames")]
    decode_frame: FrameLevel,

    #[arg(long, value_enum, default_value_t = PhysLevel::Nothing, help = "Logging of socket reads and writes")]
    decode_phys: PhysLevel,

    #[arg(long, default_value = "info", help = "Maximum log level (error, warn, info, debug, trace)")]
    log_level: tracing::Level,
}

#[derive(Copy, Clone, ValueEnum)]
enum AppLevel {
    Nothing,
    FunctionCode,
    DataHeaders,
    DataValues,
}

#[derive(Copy, Clone, ValueEnum)]
enum FrameLevel {
    Nothing,
    Header,
    Payload,
}

#[derive(Copy, Clone, ValueEnum)]
enum PhysLevel {
    Nothing,
    Length,
    Data,
}

impl From<AppLevel> for AppDecodeLevel {
    fn from(level: AppLevel) -> Self {
        match level {
            AppLevel::Nothing => AppDecodeLevel::Nothing,
            AppLevel::FunctionCode => AppDecodeLevel::FunctionCode,
            AppLevel::DataHeaders => AppDecodeLevel::DataHeaders,
            AppLevel::DataValues => AppDecodeLevel::DataValues,
        }
    }
}

impl From<FrameLevel> for FrameDecodeLevel {
    fn from(level: FrameLevel) -> Self {
        match level {
            FrameLevel::Nothing => FrameDecodeLevel::Nothing,
            FrameLevel::Header => FrameDecodeLevel::Header,
            FrameLevel::Payload => FrameDecodeLevel::Payload,
        }
    }
}

impl From<PhysLevel> for PhysDecodeLevel {
    fn from(level: PhysLevel) -> Self {
        match level {
            PhysLevel::Nothing => PhysDecodeLevel::Nothing,
            PhysLevel::Length => PhysDecodeLevel::Length,
            PhysLevel::Data => PhysDecodeLevel::Data,
        }
    }
}

impl Cli {
    fn sizes(&self) -> StoreSizes {
        StoreSizes::new(
            self.coils,
            self.discrete_inputs,
            self.holding_registers,
            self.input_registers,
        )
    }

    fn config(&self) -> ServerConfig {
        let unit_filter = match self.unit_id {
            Some(id) => UnitIdFilter::Specific(UnitId::new(id)),
            None => UnitIdFilter::Any,
        };
        let policy = if self.once {
            ConnectionPolicy::Once
        } else {
            ConnectionPolicy::Sequential
        };

        ServerConfig::new(self.address)
            .with_unit_filter(unit_filter)
            .with_policy(policy)
            .with_decode(DecodeLevel::new(
                self.decode_app.into(),
                self.decode_frame.into(),
                self.decode_phys.into(),
            ))
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let mut store = RegisterStore::create(cli.sizes())?;
    store.seed_identity_holding_registers();
    let sizes = store.sizes();

    let mut server = spawn_tcp_server_task(cli.config(), store.wrap()).await?;
    tracing::info!(
        "serving on {} (coils: {} discrete inputs: {} holding registers: {} input registers: {})",
        server.local_addr(),
        sizes.coils,
        sizes.discrete_inputs,
        sizes.holding_registers,
        sizes.input_registers
    );

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            true
        }
        _ = server.wait() => false,
    };

    if interrupted {
        tracing::info!("received ctrl-c, shutting down");
        server.shutdown().await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_with_tracing() {
        let cli = Cli::try_parse_from(["mbserve-server", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, tracing::Level::DEBUG);

        let cli = Cli::try_parse_from(["mbserve-server"]).unwrap();
        assert_eq!(cli.log_level, tracing::Level::INFO);

        assert!(Cli::try_parse_from(["mbserve-server", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn default_tables_cover_the_address_space() {
        let cli = Cli::try_parse_from(["mbserve-server", "--once", "-u", "7"]).unwrap();
        assert_eq!(cli.sizes(), StoreSizes::full());

        let config = cli.config();
        assert_eq!(config.policy, ConnectionPolicy::Once);
        assert_eq!(config.unit_filter, UnitIdFilter::Specific(UnitId::new(7)));
    }
}
