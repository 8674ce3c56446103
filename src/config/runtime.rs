use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 导入的 Python 模块名（`sense_emu` 可用于桌面模拟器）
    pub module_name: String,

    /// 设备类属性名
    pub device_class: String,

    /// 设备实例上的摇杆属性名
    pub joystick_attribute: String,

    /// 关闭设备时是否终止解释器
    pub finalize_on_close: bool,
}

impl_default!(RuntimeConfig {
    module_name: "sense_hat".to_string(),
    device_class: "SenseHat".to_string(),
    joystick_attribute: "stick".to_string(),
    finalize_on_close: true,
});

impl RuntimeConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        let fields = [
            ("module_name", &self.module_name),
            ("device_class", &self.device_class),
            ("joystick_attribute", &self.joystick_attribute),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "runtime.{} must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}
