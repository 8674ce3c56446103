//! 设备句柄
//!
//! 保存打开设备期间持有的全部运行时引用：模块、设备类、实例、
//! 27 个设备方法、摇杆对象及其 2 个方法。

use crate::config::RuntimeConfig;
use crate::core::{BridgeError, BridgeResult};
use crate::scripting::{release_callable, require_attr, resolve_callable, translate_fault};
use crate::scripting::RuntimeSession;

/// 设备类上解析的方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceMethod {
    Clear,
    FlipH,
    FlipV,
    GammaReset,
    GetAccelerometer,
    GetAccelerometerRaw,
    GetCompass,
    GetCompassRaw,
    GetGyroscope,
    GetGyroscopeRaw,
    GetHumidity,
    GetOrientation,
    GetOrientationDegrees,
    GetOrientationRadians,
    GetPixel,
    GetPixels,
    GetPressure,
    GetTemperature,
    GetTemperatureFromHumidity,
    GetTemperatureFromPressure,
    LoadImage,
    SetImuConfig,
    SetPixel,
    SetPixels,
    SetRotation,
    ShowLetter,
    ShowMessage,
}

impl DeviceMethod {
    pub const COUNT: usize = 27;

    pub const ALL: [DeviceMethod; Self::COUNT] = [
        DeviceMethod::Clear,
        DeviceMethod::FlipH,
        DeviceMethod::FlipV,
        DeviceMethod::GammaReset,
        DeviceMethod::GetAccelerometer,
        DeviceMethod::GetAccelerometerRaw,
        DeviceMethod::GetCompass,
        DeviceMethod::GetCompassRaw,
        DeviceMethod::GetGyroscope,
        DeviceMethod::GetGyroscopeRaw,
        DeviceMethod::GetHumidity,
        DeviceMethod::GetOrientation,
        DeviceMethod::GetOrientationDegrees,
        DeviceMethod::GetOrientationRadians,
        DeviceMethod::GetPixel,
        DeviceMethod::GetPixels,
        DeviceMethod::GetPressure,
        DeviceMethod::GetTemperature,
        DeviceMethod::GetTemperatureFromHumidity,
        DeviceMethod::GetTemperatureFromPressure,
        DeviceMethod::LoadImage,
        DeviceMethod::SetImuConfig,
        DeviceMethod::SetPixel,
        DeviceMethod::SetPixels,
        DeviceMethod::SetRotation,
        DeviceMethod::ShowLetter,
        DeviceMethod::ShowMessage,
    ];

    /// 库中的属性名
    pub fn name(&self) -> &'static str {
        match self {
            DeviceMethod::Clear => "clear",
            DeviceMethod::FlipH => "flip_h",
            DeviceMethod::FlipV => "flip_v",
            DeviceMethod::GammaReset => "gamma_reset",
            DeviceMethod::GetAccelerometer => "get_accelerometer",
            DeviceMethod::GetAccelerometerRaw => "get_accelerometer_raw",
            DeviceMethod::GetCompass => "get_compass",
            DeviceMethod::GetCompassRaw => "get_compass_raw",
            DeviceMethod::GetGyroscope => "get_gyroscope",
            DeviceMethod::GetGyroscopeRaw => "get_gyroscope_raw",
            DeviceMethod::GetHumidity => "get_humidity",
            DeviceMethod::GetOrientation => "get_orientation",
            DeviceMethod::GetOrientationDegrees => "get_orientation_degrees",
            DeviceMethod::GetOrientationRadians => "get_orientation_radians",
            DeviceMethod::GetPixel => "get_pixel",
            DeviceMethod::GetPixels => "get_pixels",
            DeviceMethod::GetPressure => "get_pressure",
            DeviceMethod::GetTemperature => "get_temperature",
            DeviceMethod::GetTemperatureFromHumidity => "get_temperature_from_humidity",
            DeviceMethod::GetTemperatureFromPressure => "get_temperature_from_pressure",
            DeviceMethod::LoadImage => "load_image",
            DeviceMethod::SetImuConfig => "set_imu_config",
            DeviceMethod::SetPixel => "set_pixel",
            DeviceMethod::SetPixels => "set_pixels",
            DeviceMethod::SetRotation => "set_rotation",
            DeviceMethod::ShowLetter => "show_letter",
            DeviceMethod::ShowMessage => "show_message",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// 摇杆对象上解析的方法（绑定方法，调用时无接收者）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoystickMethod {
    GetEvents,
    WaitForEvent,
}

impl JoystickMethod {
    pub const COUNT: usize = 2;

    pub const ALL: [JoystickMethod; Self::COUNT] =
        [JoystickMethod::GetEvents, JoystickMethod::WaitForEvent];

    pub fn name(&self) -> &'static str {
        match self {
            JoystickMethod::GetEvents => "get_events",
            JoystickMethod::WaitForEvent => "wait_for_event",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// 运行时引用集合
pub struct DeviceHandle<O> {
    module: Option<O>,
    device_class: Option<O>,
    instance: Option<O>,
    methods: [Option<O>; DeviceMethod::COUNT],
    joystick: Option<O>,
    joystick_methods: [Option<O>; JoystickMethod::COUNT],
}

impl<O> DeviceHandle<O> {
    pub fn empty() -> Self {
        Self {
            module: None,
            device_class: None,
            instance: None,
            methods: std::array::from_fn(|_| None),
            joystick: None,
            joystick_methods: std::array::from_fn(|_| None),
        }
    }

    /// 依次导入模块、取设备类、构造实例、解析全部方法与摇杆
    ///
    /// 失败时已获取的引用保留在句柄中，由调用方通过 [`DeviceHandle::release_all`] 释放。
    pub fn populate(
        &mut self,
        session: &dyn RuntimeSession<Object = O>,
        config: &RuntimeConfig,
    ) -> BridgeResult<()> {
        let module = session
            .import_module(&config.module_name)
            .map_err(|fault| translate_fault("import module", fault))?;
        let module = self.module.insert(module);

        let class = require_attr(session, module, &config.device_class)?;
        let class = self.device_class.insert(class);

        let instance = session
            .construct(class)
            .map_err(|fault| translate_fault("construct device", fault))?;
        let instance = self.instance.insert(instance);

        for method in DeviceMethod::ALL {
            self.methods[method.index()] = Some(resolve_callable(session, class, method.name())?);
        }

        let joystick = require_attr(session, instance, &config.joystick_attribute)?;
        let joystick = self.joystick.insert(joystick);

        for method in JoystickMethod::ALL {
            self.joystick_methods[method.index()] =
                Some(resolve_callable(session, joystick, method.name())?);
        }

        tracing::debug!(
            target: "sensehat",
            "Resolved {} device methods and {} joystick methods",
            DeviceMethod::COUNT,
            JoystickMethod::COUNT
        );
        Ok(())
    }

    /// 按逆序释放全部引用（尽力而为）
    ///
    /// 空槽位跳过；返回遇到的第一个错误。
    pub fn release_all(&mut self, session: &dyn RuntimeSession<Object = O>) -> BridgeResult<()> {
        let mut first_error = None;
        let mut record = |result: BridgeResult<()>| {
            if let Err(err) = result {
                tracing::warn!(target: "sensehat", "Release failed: {}", err);
                first_error.get_or_insert(err);
            }
        };

        for slot in self.joystick_methods.iter_mut().rev() {
            if slot.is_some() {
                record(release_callable(session, slot));
            }
        }
        if self.joystick.is_some() {
            record(release_callable(session, &mut self.joystick));
        }
        for slot in self.methods.iter_mut().rev() {
            if slot.is_some() {
                record(release_callable(session, slot));
            }
        }
        for slot in [
            &mut self.instance,
            &mut self.device_class,
            &mut self.module,
        ] {
            if slot.is_some() {
                record(release_callable(session, slot));
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn instance(&self) -> BridgeResult<&O> {
        self.instance
            .as_ref()
            .ok_or_else(|| BridgeError::NotFound("device instance".to_string()))
    }

    pub fn method(&self, method: DeviceMethod) -> BridgeResult<&O> {
        self.methods[method.index()]
            .as_ref()
            .ok_or_else(|| BridgeError::NotFound(format!("callable '{}'", method.name())))
    }

    pub fn joystick_method(&self, method: JoystickMethod) -> BridgeResult<&O> {
        self.joystick_methods[method.index()]
            .as_ref()
            .ok_or_else(|| BridgeError::NotFound(format!("callable '{}'", method.name())))
    }

    /// 当前持有的引用数
    pub fn held_references(&self) -> usize {
        let roots = [
            &self.module,
            &self.device_class,
            &self.instance,
            &self.joystick,
        ];
        roots.iter().filter(|slot| slot.is_some()).count()
            + self.methods.iter().filter(|slot| slot.is_some()).count()
            + self.joystick_methods.iter().filter(|slot| slot.is_some()).count()
    }
}
