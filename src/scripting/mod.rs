//! 嵌入式运行时模块
//!
//! - `runtime` - 运行时与会话 trait
//! - `context` - 进程运行时守卫
//! - `bridge` - 可调用对象解析与故障转换
//! - `value` - 脚本值
//! - `simulated` - 进程内模拟板卡
//! - `python` - pyo3 后端（`python` feature）

pub mod bridge;
pub mod context;
pub mod runtime;
pub mod simulated;
pub mod value;

#[cfg(feature = "python")]
pub mod python;

pub use bridge::{release_callable, require_attr, resolve_callable, translate_fault};
pub use context::RuntimeContext;
pub use runtime::{EmbeddedRuntime, RuntimeFault, RuntimeSession};
pub use simulated::{
    ImuConfig, ReferenceStats, SensorReadings, SimObject, SimulatedBoard, SimulatedRuntime,
};
pub use value::ScriptValue;

#[cfg(feature = "python")]
pub use python::PythonRuntime;
