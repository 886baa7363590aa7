pub mod app_info;
pub mod cancellation;
pub mod client;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod function_call;
pub mod functions;
pub mod html;
pub mod local_model;
pub mod message;
pub mod store;
pub mod transcript;
pub mod ui;
pub mod utils;

pub use app_info::{AppContext, AppInfo, Application};
pub use conversation::{Conversation, TurnOutcome};
pub use errors::{AgentError, ClientError, FunctionError, ToolError};
pub use functions::{Capabilities, ExecutorTiming, FunctionManager};
