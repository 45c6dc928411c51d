//! 外部工具提供者（MCP server）网关
//!
//! - **gateway**: ExternalToolGateway（探测、目录、代理调用）
//! - **provider**: 提供者记录与健康状态
//! - **transport**: 传输 trait 与 HTTP JSON-RPC 实现
//! - **mock**: 测试用传输

pub mod gateway;
pub mod mock;
pub mod provider;
pub mod transport;

pub use gateway::{ExternalToolGateway, GatewayReport};
pub use mock::{MockTransport, MockTransportFactory};
pub use provider::{ExternalProviderRecord, HealthStatus, ProviderTool, ServerStatus};
pub use transport::{
    normalize_response, HttpJsonRpcTransport, HttpTransportFactory, ProviderTransport, RemoteTool,
    TransportFactory,
};
