//! 核心模块
//!
//! 包含桥接层的基础设施：
//! - `error` - 错误类型与 C 状态码映射
//! - `logging` - tracing 订阅者初始化
//! - `version` - 库版本
//! - `macros` - 通用宏

pub mod error;
pub mod logging;
pub mod version;
#[macro_use]
pub mod macros;

pub use error::{errno, status_of, BridgeError, BridgeResult, STATUS_FAILURE, STATUS_SUCCESS};
pub use logging::init_logging;
pub use version::{version, version_string, VERSION};
