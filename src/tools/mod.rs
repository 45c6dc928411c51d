//! 工具层：Tool / BrowserAction trait、注册表、执行器与内置工具

pub mod browser;
pub mod echo;
pub mod executor;
pub mod registry;
pub mod schema;

pub use browser::{ContentAction, EvaluateAction, NavigateAction, ScrollAction};
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{
    ActionError, BrowserAction, Tool, ToolDescriptor, ToolHandler, ToolRegistry, DEFAULT_SESSION,
};
pub use schema::tool_call_schema_json;
