//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP on localhost.

use crate::handler::RpcHandler;
use crate::types::{ListTasksRequest, TaskRequest};
use cadence_core::application::TaskScheduler;
use cadence_core::error::{AppError, Result};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9527;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, scheduler: TaskScheduler) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(scheduler)),
        }
    }

    /// Start the JSON-RPC server, returning its handle and bound address
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to build server on {}: {}", addr, e)))?;
        let local_addr = server.local_addr()?;

        let module = self.module()?;
        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((server.start(module), local_addr))
    }

    fn module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("scheduler.tasks.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListTasksRequest = if params.is_object() {
                        params.parse()?
                    } else {
                        ListTasksRequest::default()
                    };
                    handler.list_tasks(req).await
                }
            })
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method("scheduler.task.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: TaskRequest = params.parse()?;
                    handler.task(req).await
                }
            })
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.health.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.health().await }
            })
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(module)
    }
}
