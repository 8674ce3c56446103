//! 统一错误处理模块
//!
//! 桥接层的所有操作都返回 [`BridgeResult`]。
//!
//! ## 错误分层
//!
//! - **运行时故障** (`scripting::RuntimeFault`): 由嵌入式运行时后端产生的原始故障
//! - **桥接错误** (`BridgeError`): 面向调用方的错误种类，每种对应一个 C 状态码
//!
//! 运行时故障只能经由 `scripting::bridge::translate_fault` 转换为 `BridgeError`。

use thiserror::Error;

/// 成功状态码
pub const STATUS_SUCCESS: i32 = 0;
/// 通用失败哨兵值（转换失败、运行时故障）
pub const STATUS_FAILURE: i32 = -1;

/// POSIX 错误码
pub mod errno {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENOTSUP: i32 = 95;
}

/// 桥接层错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Runtime fault in {context}: {message}")]
    RuntimeFault { context: String, message: String },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Device already open on this runtime context")]
    AlreadyOpen,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// 创建参数错误
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// 创建转换错误
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::ConversionFailed(msg.into())
    }

    /// 映射为 C 状态码
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => errno::EINVAL,
            Self::NotFound(_) => errno::ENOENT,
            Self::Unsupported(_) => errno::ENOTSUP,
            Self::ResourceExhausted(_) => errno::ENOMEM,
            Self::AlreadyOpen => errno::EBUSY,
            Self::ConversionFailed(_) | Self::RuntimeFault { .. } => STATUS_FAILURE,
            Self::Io(err) if err.kind() == std::io::ErrorKind::NotFound => errno::ENOENT,
            Self::Io(_) => errno::EIO,
        }
    }

    /// 是否为参数校验类错误（未触及运行时）
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// 桥接层结果类型
pub type BridgeResult<T> = Result<T, BridgeError>;

/// 将结果折叠为 C 状态码
pub fn status_of<T>(result: &BridgeResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_SUCCESS,
        Err(err) => err.status_code(),
    }
}
