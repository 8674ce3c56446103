//! C ABI
//!
//! `SenseHAT_*` 函数返回 POSIX 风格的状态码：成功为 0，参数错误为 `EINVAL`，
//! 文件不存在为 `ENOENT`，不支持为 `ENOTSUP`，内存不足为 `ENOMEM`，
//! 运行时故障与转换失败为 -1。
//!
//! 输出参数在函数执行前清零。实例指针为空时返回 `EINVAL`。
//! 每个进程同时至多一个实例，重复打开返回 `EBUSY`。

#![allow(non_snake_case)]

use crate::config::BridgeConfig;
use crate::core::{init_logging, status_of, BridgeError, BridgeResult, STATUS_FAILURE};
use crate::device::{
    JoystickEvent, Orientation, PixelColor, PixelMatrix, RawVector, Rotation, SenseHat,
};
use crate::scripting::RuntimeContext;
use std::ffi::{c_char, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "python")]
type Backend = crate::scripting::PythonRuntime;
#[cfg(not(feature = "python"))]
type Backend = crate::scripting::SimulatedRuntime;

#[cfg(feature = "python")]
fn new_backend() -> BridgeResult<Backend> {
    crate::scripting::PythonRuntime::new()
}

#[cfg(not(feature = "python"))]
fn new_backend() -> BridgeResult<Backend> {
    tracing::warn!(
        target: "sensehat::ffi",
        "Built without the `python` feature; driving the simulated board, not real hardware"
    );
    Ok(crate::scripting::SimulatedRuntime::new())
}

static INSTANCE_OPEN: AtomicBool = AtomicBool::new(false);

/// 进程内唯一实例的占用标记，析构时归还
struct InstanceClaim;

impl InstanceClaim {
    fn acquire() -> BridgeResult<Self> {
        INSTANCE_OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InstanceClaim)
            .map_err(|_| BridgeError::AlreadyOpen)
    }
}

impl Drop for InstanceClaim {
    fn drop(&mut self) {
        INSTANCE_OPEN.store(false, Ordering::Release);
    }
}

/// 不透明实例
pub struct SenseHatInstance {
    device: SenseHat<Backend>,
    claim: InstanceClaim,
}

fn guarded(name: &str, f: impl FnOnce() -> BridgeResult<()>) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => {
            if let Err(err) = &result {
                tracing::debug!(target: "sensehat::ffi", "{} failed: {}", name, err);
            }
            status_of(&result)
        }
        Err(_) => {
            tracing::error!(target: "sensehat::ffi", "{} panicked", name);
            STATUS_FAILURE
        }
    }
}

unsafe fn device<'a>(instance: *const SenseHatInstance) -> BridgeResult<&'a SenseHat<Backend>> {
    instance
        .as_ref()
        .map(|instance| &instance.device)
        .ok_or_else(|| BridgeError::invalid_argument("instance must not be null"))
}

unsafe fn output<'a, T: Default>(ptr: *mut T, name: &str) -> BridgeResult<&'a mut T> {
    let out = ptr
        .as_mut()
        .ok_or_else(|| BridgeError::invalid_argument(format!("{} must not be null", name)))?;
    *out = T::default();
    Ok(out)
}

unsafe fn optional_matrix<'a>(ptr: *mut PixelColor) -> Option<&'a mut PixelMatrix> {
    // PixelMatrix 为 repr(transparent) 的 [PixelColor; 64]
    let matrix = (ptr as *mut PixelMatrix).as_mut()?;
    *matrix = PixelMatrix::default();
    Some(matrix)
}

unsafe fn string_arg<'a>(ptr: *const c_char, name: &str) -> BridgeResult<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::invalid_argument(format!(
            "{} must not be null",
            name
        )));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BridgeError::invalid_argument(format!("{} must be valid UTF-8", name)))
}

/// 库版本（0xMMMMmmpp）
#[no_mangle]
pub extern "C" fn SenseHAT_Version() -> u32 {
    crate::core::version()
}

/// 创建实例
///
/// # Safety
/// `instance` 必须为空或指向可写的句柄存储。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_Open(instance: *mut *mut SenseHatInstance) -> i32 {
    guarded("SenseHAT_Open", || {
        let slot = instance
            .as_mut()
            .ok_or_else(|| BridgeError::invalid_argument("instance must not be null"))?;
        *slot = ptr::null_mut();
        let claim = InstanceClaim::acquire()?;

        let mut config = BridgeConfig::load_or_default();
        config.apply_env_overrides();
        config
            .validate()
            .map_err(|e| BridgeError::invalid_argument(e.to_string()))?;
        init_logging(&config.logging);

        let context = Arc::new(RuntimeContext::with_config(new_backend()?, config.runtime));
        let device = SenseHat::open(context)?;
        *slot = Box::into_raw(Box::new(SenseHatInstance { device, claim }));
        Ok(())
    })
}

/// 关闭实例并将句柄置空；句柄已为空时无操作
///
/// # Safety
/// `*instance` 必须为空或由 [`SenseHAT_Open`] 返回且尚未关闭。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_Close(instance: *mut *mut SenseHatInstance) -> i32 {
    guarded("SenseHAT_Close", || {
        let slot = instance
            .as_mut()
            .ok_or_else(|| BridgeError::invalid_argument("instance must not be null"))?;
        if slot.is_null() {
            return Ok(());
        }
        let boxed = Box::from_raw(*slot);
        *slot = ptr::null_mut();
        let SenseHatInstance { device, claim } = *boxed;
        let closed = device.close();
        drop(claim);
        closed
    })
}

/// # Safety
/// `instance` 必须为空或有效实例。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDSetRotation(
    instance: *const SenseHatInstance,
    rotation: i32,
    redraw: bool,
) -> i32 {
    guarded("SenseHAT_LEDSetRotation", || {
        let device = device(instance)?;
        device.set_rotation(Rotation::try_from(rotation)?, redraw)
    })
}

/// # Safety
/// `pixels` 必须为空或指向 64 个像素的可写数组。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDFlipHorizontal(
    instance: *const SenseHatInstance,
    redraw: bool,
    pixels: *mut PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDFlipHorizontal", || {
        let out = optional_matrix(pixels);
        device(instance)?.flip_horizontal(redraw, out)
    })
}

/// # Safety
/// `pixels` 必须为空或指向 64 个像素的可写数组。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDFlipVertical(
    instance: *const SenseHatInstance,
    redraw: bool,
    pixels: *mut PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDFlipVertical", || {
        let out = optional_matrix(pixels);
        device(instance)?.flip_vertical(redraw, out)
    })
}

/// 空 `pixels` 表示全黑
///
/// # Safety
/// `pixels` 必须为空或指向 64 个像素。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDSetPixels(
    instance: *const SenseHatInstance,
    pixels: *const PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDSetPixels", || {
        let pixels = (pixels as *const PixelMatrix).as_ref();
        device(instance)?.set_pixels(pixels)
    })
}

/// # Safety
/// `pixels` 必须指向 64 个像素的可写数组。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDGetPixels(
    instance: *const SenseHatInstance,
    pixels: *mut PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDGetPixels", || {
        let out = output(pixels as *mut PixelMatrix, "pixels")?;
        *out = device(instance)?.get_pixels()?;
        Ok(())
    })
}

/// 空 `color` 表示黑色
///
/// # Safety
/// `color` 必须为空或指向有效像素。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDSetPixel(
    instance: *const SenseHatInstance,
    x: i32,
    y: i32,
    color: *const PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDSetPixel", || {
        device(instance)?.set_pixel(x, y, color.as_ref().copied())
    })
}

/// # Safety
/// `color` 必须指向可写像素。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDGetPixel(
    instance: *const SenseHatInstance,
    x: i32,
    y: i32,
    color: *mut PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDGetPixel", || {
        let out = output(color, "color")?;
        *out = device(instance)?.get_pixel(x, y)?;
        Ok(())
    })
}

/// # Safety
/// `path` 必须为 NUL 结尾字符串；`pixels` 必须为空或指向 64 个像素的可写数组。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDLoadImage(
    instance: *const SenseHatInstance,
    path: *const c_char,
    redraw: bool,
    pixels: *mut PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDLoadImage", || {
        let out = optional_matrix(pixels);
        let device = device(instance)?;
        let path = string_arg(path, "path")?;
        device.load_image(path, redraw, out)
    })
}

/// 空 `color` 表示黑色
///
/// # Safety
/// `color` 必须为空或指向有效像素。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDClear(
    instance: *const SenseHatInstance,
    color: *const PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDClear", || {
        device(instance)?.clear(color.as_ref().copied())
    })
}

/// # Safety
/// `message` 必须为 NUL 结尾字符串；颜色指针必须为空或指向有效像素。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDShowMessage(
    instance: *const SenseHatInstance,
    message: *const c_char,
    scroll_speed: f64,
    text_color: *const PixelColor,
    back_color: *const PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDShowMessage", || {
        let device = device(instance)?;
        let message = string_arg(message, "message")?;
        device.show_message(
            message,
            scroll_speed,
            text_color.as_ref().copied(),
            back_color.as_ref().copied(),
        )
    })
}

/// # Safety
/// `letter` 必须为 NUL 结尾字符串；颜色指针必须为空或指向有效像素。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDShowLetter(
    instance: *const SenseHatInstance,
    letter: *const c_char,
    text_color: *const PixelColor,
    back_color: *const PixelColor,
) -> i32 {
    guarded("SenseHAT_LEDShowLetter", || {
        let device = device(instance)?;
        let letter = string_arg(letter, "letter")?;
        device.show_letter(
            letter,
            text_color.as_ref().copied(),
            back_color.as_ref().copied(),
        )
    })
}

/// # Safety
/// `instance` 必须为空或有效实例。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_LEDGammaReset(instance: *const SenseHatInstance) -> i32 {
    guarded("SenseHAT_LEDGammaReset", || device(instance)?.gamma_reset())
}

macro_rules! ffi_reading {
    ($($name:ident => $method:ident: $ty:ty),* $(,)?) => {
        $(
            /// # Safety
            /// 输出指针必须为空或可写。
            #[no_mangle]
            pub unsafe extern "C" fn $name(
                instance: *const SenseHatInstance,
                value: *mut $ty,
            ) -> i32 {
                guarded(stringify!($name), || {
                    let out = output(value, "value")?;
                    *out = device(instance)?.$method()?;
                    Ok(())
                })
            }
        )*
    };
}

ffi_reading! {
    SenseHAT_GetHumidity => get_humidity: f64,
    SenseHAT_GetTemperature => get_temperature: f64,
    SenseHAT_GetPressure => get_pressure: f64,
    SenseHAT_GetCompass => get_compass: f64,
    SenseHAT_GetTemperatureFromHumidity => get_temperature_from_humidity: f64,
    SenseHAT_GetTemperatureFromPressure => get_temperature_from_pressure: f64,
    SenseHAT_GetAccelerometer => get_accelerometer: Orientation,
    SenseHAT_GetGyroscope => get_gyroscope: Orientation,
    SenseHAT_GetOrientation => get_orientation: Orientation,
    SenseHAT_GetOrientationDegrees => get_orientation_degrees: Orientation,
    SenseHAT_GetOrientationRadians => get_orientation_radians: Orientation,
    SenseHAT_GetAccelerometerRaw => get_accelerometer_raw: RawVector,
    SenseHAT_GetCompassRaw => get_compass_raw: RawVector,
    SenseHAT_GetGyroscopeRaw => get_gyroscope_raw: RawVector,
}

/// # Safety
/// `instance` 必须为空或有效实例。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_SetIMUConfiguration(
    instance: *const SenseHatInstance,
    enable_compass: bool,
    enable_gyroscope: bool,
    enable_accelerometer: bool,
) -> i32 {
    guarded("SenseHAT_SetIMUConfiguration", || {
        device(instance)?.set_imu_config(enable_compass, enable_gyroscope, enable_accelerometer)
    })
}

/// 取出排队的摇杆事件
///
/// `events` 非空且有事件时，`*events` 指向新分配的数组，须用 [`SenseHAT_FreeEvents`] 释放。
///
/// # Safety
/// `count` 必须可写；`events` 必须为空或可写。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_GetEvents(
    instance: *const SenseHatInstance,
    count: *mut i32,
    events: *mut *mut JoystickEvent,
) -> i32 {
    guarded("SenseHAT_GetEvents", || {
        let count = output(count, "count")?;
        let mut events = events.as_mut();
        if let Some(slot) = events.as_deref_mut() {
            *slot = ptr::null_mut();
        }
        let device = device(instance)?;

        match events {
            Some(slot) => {
                let mut drained = Vec::new();
                let n = device.get_events(Some(&mut drained))?;
                *count = i32::try_from(n).map_err(|_| {
                    BridgeError::ResourceExhausted(format!("{} events exceed the count range", n))
                })?;
                if !drained.is_empty() {
                    *slot = Box::into_raw(drained.into_boxed_slice()) as *mut JoystickEvent;
                }
            }
            None => {
                let n = device.get_events(None)?;
                *count = i32::try_from(n).unwrap_or(i32::MAX);
            }
        }
        Ok(())
    })
}

/// 释放 [`SenseHAT_GetEvents`] 返回的数组
///
/// # Safety
/// `events` 与 `count` 必须与 `SenseHAT_GetEvents` 返回的值一致，且只能释放一次。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_FreeEvents(events: *mut JoystickEvent, count: i32) {
    let Ok(len) = usize::try_from(count) else {
        return;
    };
    if events.is_null() || len == 0 {
        return;
    }
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(events, len)));
}

/// # Safety
/// `event` 必须可写。
#[no_mangle]
pub unsafe extern "C" fn SenseHAT_WaitForEvent(
    instance: *const SenseHatInstance,
    flush: bool,
    event: *mut JoystickEvent,
) -> i32 {
    guarded("SenseHAT_WaitForEvent", || {
        let out = output(event, "event")?;
        *out = device(instance)?.wait_for_event(flush)?;
        Ok(())
    })
}
