use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{RequestError, ServerError};
use crate::server::listener::Listener;
use crate::server::task::SessionTask;
use crate::store::SharedStore;

pub(crate) mod listener;
pub(crate) mod request;
pub(crate) mod response;
pub(crate) mod task;
pub(crate) mod types;

// re-export to the public API
pub use types::*;

// pause after a failed accept so that persistent errors (e.g. out of descriptors) don't spin
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// A handle to the server async task. The task is shutdown when the handle is dropped.
#[derive(Debug)]
pub struct ServerHandle {
    tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Address the server is listening on
    ///
    /// Reports the port the OS picked when the server was bound to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the server task to complete on its own
    ///
    /// This only happens with [ConnectionPolicy::Once] after the client disconnects.
    /// Cancel safe.
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(err) = task.await {
                tracing::error!("server task failed: {}", err);
            }
            self.task = None;
        }
    }

    /// Stop the server, closing any connected client, and wait for the task to exit
    pub async fn shutdown(self) {
        let ServerHandle { tx, task, .. } = self;
        drop(tx);
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!("server task failed: {}", err);
            }
        }
    }
}

/// Binds the listening socket and spawns the server task onto the runtime.
/// This method can only be called from within the runtime context.
///
/// Clients are served one at a time. While a client is connected, other connection attempts
/// wait in the listen backlog.
///
/// * `config` - Listen address, unit id filter, connection policy and decode level
/// * `store` - Register store shared with the application
pub async fn spawn_tcp_server_task(
    config: ServerConfig,
    store: SharedStore,
) -> Result<ServerHandle, ServerError> {
    let listener = Listener::bind(config.address).await?;
    let local_addr = listener.local_addr();

    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(async move {
        ServerTask::new(listener, store, config)
            .run(rx)
            .instrument(tracing::info_span!("Modbus-Server-TCP", "listen" = ?local_addr))
            .await
    });

    Ok(ServerHandle {
        tx,
        task: Some(task),
        local_addr,
    })
}

struct ServerTask {
    listener: Listener,
    store: SharedStore,
    config: ServerConfig,
}

impl ServerTask {
    fn new(listener: Listener, store: SharedStore, config: ServerConfig) -> Self {
        Self {
            listener,
            store,
            config,
        }
    }

    async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        loop {
            let connection = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("server shutdown");
                    return;
                }
                result = self.listener.accept() => {
                    match result {
                        Ok(connection) => connection,
                        Err(err) => {
                            tracing::error!("{}", err);
                            tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                            continue;
                        }
                    }
                }
            };

            let peer = connection.peer;
            tracing::info!("accepted connection from: {}", peer);

            let reason = SessionTask::new(
                connection.phys,
                self.store.clone(),
                self.config.unit_filter,
                self.config.decode,
                &mut shutdown,
            )
            .run()
            .instrument(tracing::info_span!("Session", "remote" = ?peer))
            .await;

            if reason == RequestError::Shutdown {
                tracing::info!("server shutdown");
                return;
            }

            tracing::info!("closed connection from {}: {}", peer, reason);

            if self.config.policy == ConnectionPolicy::Once {
                tracing::info!("client disconnected, no further connections will be served");
                return;
            }
        }
    }
}
