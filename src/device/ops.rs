//! 设备操作
//!
//! 每个操作的流程相同：先校验参数（失败时不触及运行时），
//! 再在持锁期间编组参数、调用已解析的方法并编组结果。

use super::handle::{DeviceMethod, JoystickMethod};
use super::lifecycle::SenseHat;
use super::marshal::{FromScriptValue, ToScriptValue};
use super::types::{JoystickEvent, Orientation, PixelColor, PixelMatrix, RawVector, Rotation};
use crate::core::{BridgeError, BridgeResult};
use crate::scripting::{translate_fault, EmbeddedRuntime, ScriptValue};
use std::fs::File;
use std::path::Path;

fn coordinate(value: i32, name: &str) -> BridgeResult<i64> {
    if (0..PixelMatrix::SIDE as i32).contains(&value) {
        Ok(i64::from(value))
    } else {
        Err(BridgeError::invalid_argument(format!(
            "{} must be between 0 and 7, got {}",
            name, value
        )))
    }
}

fn ignore(_: ScriptValue) -> BridgeResult<()> {
    Ok(())
}

impl<R: EmbeddedRuntime> SenseHat<R> {
    /// 以实例为接收者调用设备方法
    fn invoke<T>(
        &self,
        method: DeviceMethod,
        args: impl FnOnce() -> BridgeResult<Vec<ScriptValue>>,
        finish: impl FnOnce(ScriptValue) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        let handle = self.handle()?;
        self.context.runtime().with_lock(|session| {
            let args = args()?;
            let callable = handle.method(method)?;
            let instance = handle.instance()?;
            let result = session
                .call(callable, Some(instance), &args)
                .map_err(|fault| translate_fault(method.name(), fault))?;
            finish(result)
        })
    }

    /// 调用摇杆绑定方法
    fn invoke_joystick<T>(
        &self,
        method: JoystickMethod,
        args: Vec<ScriptValue>,
        finish: impl FnOnce(ScriptValue) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        let handle = self.handle()?;
        self.context.runtime().with_lock(|session| {
            let callable = handle.joystick_method(method)?;
            let result = session
                .call(callable, None, &args)
                .map_err(|fault| translate_fault(method.name(), fault))?;
            finish(result)
        })
    }

    fn read_float(&self, method: DeviceMethod) -> BridgeResult<f64> {
        self.invoke(method, || Ok(Vec::new()), |value| f64::from_script_value(&value))
    }

    fn read_orientation(&self, method: DeviceMethod) -> BridgeResult<Orientation> {
        self.invoke(method, || Ok(Vec::new()), |value| {
            Orientation::from_script_value(&value)
        })
    }

    fn read_raw(&self, method: DeviceMethod) -> BridgeResult<RawVector> {
        self.invoke(method, || Ok(Vec::new()), |value| {
            RawVector::from_script_value(&value)
        })
    }

    fn flip(
        &self,
        method: DeviceMethod,
        redraw: bool,
        out: Option<&mut PixelMatrix>,
    ) -> BridgeResult<()> {
        let mut out = out;
        if let Some(out) = out.as_deref_mut() {
            *out = PixelMatrix::default();
        }
        self.invoke(
            method,
            || Ok(vec![ScriptValue::Bool(redraw)]),
            |value| match out {
                Some(out) => {
                    *out = PixelMatrix::from_script_value(&value)?;
                    Ok(())
                }
                None => Ok(()),
            },
        )
    }

    // LED 矩阵

    /// 设置显示旋转
    pub fn set_rotation(&self, rotation: Rotation, redraw: bool) -> BridgeResult<()> {
        self.invoke(
            DeviceMethod::SetRotation,
            || {
                Ok(vec![
                    ScriptValue::from(rotation.degrees()),
                    ScriptValue::Bool(redraw),
                ])
            },
            ignore,
        )
    }

    /// 水平翻转；`out` 接收翻转后的图像
    pub fn flip_horizontal(&self, redraw: bool, out: Option<&mut PixelMatrix>) -> BridgeResult<()> {
        self.flip(DeviceMethod::FlipH, redraw, out)
    }

    /// 垂直翻转；`out` 接收翻转后的图像
    pub fn flip_vertical(&self, redraw: bool, out: Option<&mut PixelMatrix>) -> BridgeResult<()> {
        self.flip(DeviceMethod::FlipV, redraw, out)
    }

    /// 写入整幅图像；`None` 表示全黑
    pub fn set_pixels(&self, pixels: Option<&PixelMatrix>) -> BridgeResult<()> {
        let pixels = pixels.copied().unwrap_or_default();
        pixels.validate()?;
        self.invoke(
            DeviceMethod::SetPixels,
            || Ok(vec![pixels.to_script_value()?]),
            ignore,
        )
    }

    /// 读取整幅图像（量化后的值）
    pub fn get_pixels(&self) -> BridgeResult<PixelMatrix> {
        self.invoke(DeviceMethod::GetPixels, || Ok(Vec::new()), |value| {
            PixelMatrix::from_script_value(&value)
        })
    }

    /// 设置单个像素；`None` 表示黑色
    pub fn set_pixel(&self, x: i32, y: i32, color: Option<PixelColor>) -> BridgeResult<()> {
        let x = coordinate(x, "x")?;
        let y = coordinate(y, "y")?;
        let color = color.unwrap_or(PixelColor::BLACK);
        color.validate()?;
        self.invoke(
            DeviceMethod::SetPixel,
            || {
                Ok(vec![
                    ScriptValue::Int(x),
                    ScriptValue::Int(y),
                    color.to_script_value()?,
                ])
            },
            ignore,
        )
    }

    /// 读取单个像素（量化后的值：红、蓝取高 5 位，绿取高 6 位）
    pub fn get_pixel(&self, x: i32, y: i32) -> BridgeResult<PixelColor> {
        let x = coordinate(x, "x")?;
        let y = coordinate(y, "y")?;
        self.invoke(
            DeviceMethod::GetPixel,
            || Ok(vec![ScriptValue::Int(x), ScriptValue::Int(y)]),
            |value| PixelColor::from_script_value(&value),
        )
    }

    /// 从 8x8 图像文件加载；`out` 接收加载的图像
    ///
    /// 路径必须指向可打开的文件，否则返回 `NotFound`。
    pub fn load_image(
        &self,
        path: impl AsRef<Path>,
        redraw: bool,
        out: Option<&mut PixelMatrix>,
    ) -> BridgeResult<()> {
        let mut out = out;
        if let Some(out) = out.as_deref_mut() {
            *out = PixelMatrix::default();
        }

        let path = path.as_ref();
        let path_str = path
            .to_str()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BridgeError::invalid_argument("image path must be non-empty UTF-8"))?;
        if let Err(err) = File::open(path) {
            return Err(BridgeError::NotFound(format!("{}: {}", path_str, err)));
        }

        self.invoke(
            DeviceMethod::LoadImage,
            || {
                Ok(vec![
                    ScriptValue::from(path_str),
                    ScriptValue::Bool(redraw),
                ])
            },
            |value| match out {
                Some(out) => {
                    *out = PixelMatrix::from_script_value(&value)?;
                    Ok(())
                }
                None => Ok(()),
            },
        )
    }

    /// 以单色填充；`None` 表示黑色
    pub fn clear(&self, color: Option<PixelColor>) -> BridgeResult<()> {
        let color = color.unwrap_or(PixelColor::BLACK);
        color.validate()?;
        self.invoke(
            DeviceMethod::Clear,
            || Ok(vec![color.to_script_value()?]),
            ignore,
        )
    }

    /// 滚动显示文本
    ///
    /// 文字颜色默认白色，背景默认黑色。
    pub fn show_message(
        &self,
        text: &str,
        scroll_speed: f64,
        text_color: Option<PixelColor>,
        back_color: Option<PixelColor>,
    ) -> BridgeResult<()> {
        if text.is_empty() {
            return Err(BridgeError::invalid_argument("message must not be empty"));
        }
        if scroll_speed.is_nan() || scroll_speed < 0.0 {
            return Err(BridgeError::invalid_argument(format!(
                "scroll speed must be non-negative, got {}",
                scroll_speed
            )));
        }
        let text_color = text_color.unwrap_or(PixelColor::WHITE);
        let back_color = back_color.unwrap_or(PixelColor::BLACK);
        text_color.validate()?;
        back_color.validate()?;

        self.invoke(
            DeviceMethod::ShowMessage,
            || {
                Ok(vec![
                    ScriptValue::from(text),
                    ScriptValue::Float(scroll_speed),
                    text_color.to_script_value()?,
                    back_color.to_script_value()?,
                ])
            },
            ignore,
        )
    }

    /// 显示单个字符
    pub fn show_letter(
        &self,
        letter: &str,
        text_color: Option<PixelColor>,
        back_color: Option<PixelColor>,
    ) -> BridgeResult<()> {
        if letter.chars().count() != 1 {
            return Err(BridgeError::invalid_argument(format!(
                "expected exactly one character, got {:?}",
                letter
            )));
        }
        let text_color = text_color.unwrap_or(PixelColor::WHITE);
        let back_color = back_color.unwrap_or(PixelColor::BLACK);
        text_color.validate()?;
        back_color.validate()?;

        self.invoke(
            DeviceMethod::ShowLetter,
            || {
                Ok(vec![
                    ScriptValue::from(letter),
                    text_color.to_script_value()?,
                    back_color.to_script_value()?,
                ])
            },
            ignore,
        )
    }

    pub fn gamma_reset(&self) -> BridgeResult<()> {
        self.invoke(DeviceMethod::GammaReset, || Ok(Vec::new()), ignore)
    }

    // 环境传感器

    /// 相对湿度（%）
    pub fn get_humidity(&self) -> BridgeResult<f64> {
        self.read_float(DeviceMethod::GetHumidity)
    }

    /// 气压（毫巴）
    pub fn get_pressure(&self) -> BridgeResult<f64> {
        self.read_float(DeviceMethod::GetPressure)
    }

    /// 温度（摄氏度）
    pub fn get_temperature(&self) -> BridgeResult<f64> {
        self.read_float(DeviceMethod::GetTemperature)
    }

    pub fn get_temperature_from_humidity(&self) -> BridgeResult<f64> {
        self.read_float(DeviceMethod::GetTemperatureFromHumidity)
    }

    pub fn get_temperature_from_pressure(&self) -> BridgeResult<f64> {
        self.read_float(DeviceMethod::GetTemperatureFromPressure)
    }

    // IMU

    pub fn get_orientation(&self) -> BridgeResult<Orientation> {
        self.read_orientation(DeviceMethod::GetOrientation)
    }

    pub fn get_orientation_degrees(&self) -> BridgeResult<Orientation> {
        self.read_orientation(DeviceMethod::GetOrientationDegrees)
    }

    pub fn get_orientation_radians(&self) -> BridgeResult<Orientation> {
        self.read_orientation(DeviceMethod::GetOrientationRadians)
    }

    /// 磁北方向（度）
    pub fn get_compass(&self) -> BridgeResult<f64> {
        self.read_float(DeviceMethod::GetCompass)
    }

    pub fn get_compass_raw(&self) -> BridgeResult<RawVector> {
        self.read_raw(DeviceMethod::GetCompassRaw)
    }

    pub fn get_gyroscope(&self) -> BridgeResult<Orientation> {
        self.read_orientation(DeviceMethod::GetGyroscope)
    }

    pub fn get_gyroscope_raw(&self) -> BridgeResult<RawVector> {
        self.read_raw(DeviceMethod::GetGyroscopeRaw)
    }

    pub fn get_accelerometer(&self) -> BridgeResult<Orientation> {
        self.read_orientation(DeviceMethod::GetAccelerometer)
    }

    pub fn get_accelerometer_raw(&self) -> BridgeResult<RawVector> {
        self.read_raw(DeviceMethod::GetAccelerometerRaw)
    }

    /// 启用或停用罗盘、陀螺仪、加速度计
    pub fn set_imu_config(
        &self,
        compass_enabled: bool,
        gyro_enabled: bool,
        accel_enabled: bool,
    ) -> BridgeResult<()> {
        self.invoke(
            DeviceMethod::SetImuConfig,
            || {
                Ok(vec![
                    ScriptValue::Bool(compass_enabled),
                    ScriptValue::Bool(gyro_enabled),
                    ScriptValue::Bool(accel_enabled),
                ])
            },
            ignore,
        )
    }

    // 摇杆

    /// 取出自上次调用以来排队的全部事件，返回事件数
    ///
    /// `out` 为 `None` 时事件被丢弃，但仍返回数量。
    pub fn get_events(&self, out: Option<&mut Vec<JoystickEvent>>) -> BridgeResult<usize> {
        let mut out = out;
        if let Some(out) = out.as_deref_mut() {
            out.clear();
        }

        self.invoke_joystick(JoystickMethod::GetEvents, Vec::new(), |value| {
            let items = value.as_array().ok_or_else(|| {
                BridgeError::conversion(format!(
                    "get_events must return a sequence, got {}",
                    value.type_name()
                ))
            })?;

            if let Some(out) = out {
                let mut events = Vec::new();
                events.try_reserve_exact(items.len()).map_err(|_| {
                    BridgeError::ResourceExhausted(format!(
                        "cannot allocate {} joystick events",
                        items.len()
                    ))
                })?;
                for item in items {
                    events.push(JoystickEvent::from_script_value(item)?);
                }
                *out = events;
            }
            Ok(items.len())
        })
    }

    /// 等待下一个摇杆事件；`flush` 为真时先丢弃已排队事件
    pub fn wait_for_event(&self, flush: bool) -> BridgeResult<JoystickEvent> {
        self.invoke_joystick(
            JoystickMethod::WaitForEvent,
            vec![ScriptValue::Bool(flush)],
            |value| JoystickEvent::from_script_value(&value),
        )
    }
}
