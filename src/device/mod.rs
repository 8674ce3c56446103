//! 设备模块
//!
//! - `types` - 像素、姿态、摇杆事件等数据类型
//! - `marshal` - 数据类型与脚本值之间的编组
//! - `handle` - 运行时引用集合与方法表
//! - `lifecycle` - 打开与关闭
//! - `ops` - LED、传感器与摇杆操作

pub mod handle;
pub mod lifecycle;
pub mod marshal;
mod ops;
pub mod types;

pub use handle::{DeviceHandle, DeviceMethod, JoystickMethod};
pub use lifecycle::SenseHat;
pub use marshal::{FromScriptValue, ToScriptValue};
pub use types::{
    JoystickAction, JoystickDirection, JoystickEvent, Orientation, PixelColor, PixelMatrix,
    RawVector, Rotation,
};
