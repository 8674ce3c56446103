//! 模拟板卡运行时
//!
//! 在进程内模拟 `sense_hat` 模块的对象图（模块 → 设备类 → 实例 → 摇杆），
//! 行为与真实库一致：
//! - LED 以 RGB565 存储，读回值被量化
//! - 旋转使用 `rot90` 像素映射，`set_rotation(redraw)` 保持逻辑图像
//! - 摇杆事件队列，`get_events` 清空队列
//!
//! 同时记录每个对象引用的获取/释放、锁次数与调用次数，并支持故障注入，
//! 作为设备层测试的替身。

use super::runtime::{EmbeddedRuntime, RuntimeFault, RuntimeSession};
use super::value::ScriptValue;
use crate::core::{BridgeError, BridgeResult};
use crate::device::marshal::{FromScriptValue, ToScriptValue};
use crate::device::types::{JoystickEvent, Orientation, PixelColor, PixelMatrix, RawVector};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEVICE_CLASS: &str = "SenseHat";
const STICK_ATTRIBUTE: &str = "stick";

const DEVICE_METHODS: [&str; 27] = [
    "clear",
    "flip_h",
    "flip_v",
    "gamma_reset",
    "get_accelerometer",
    "get_accelerometer_raw",
    "get_compass",
    "get_compass_raw",
    "get_gyroscope",
    "get_gyroscope_raw",
    "get_humidity",
    "get_orientation",
    "get_orientation_degrees",
    "get_orientation_radians",
    "get_pixel",
    "get_pixels",
    "get_pressure",
    "get_temperature",
    "get_temperature_from_humidity",
    "get_temperature_from_pressure",
    "load_image",
    "set_imu_config",
    "set_pixel",
    "set_pixels",
    "set_rotation",
    "show_letter",
    "show_message",
];

const STICK_METHODS: [&str; 2] = ["get_events", "wait_for_event"];

const MODULES: [&str; 2] = ["sense_hat", "sense_emu"];

/// 出厂 gamma 表
pub const DEFAULT_GAMMA: [u8; 32] = [
    0, 0, 0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 14, 15, 17, 18, 20, 21, 23,
    25, 27, 29, 31,
];

const SIDE: usize = PixelMatrix::SIDE;

/// 模拟对象引用
#[derive(Debug)]
pub struct SimObject {
    id: u64,
    kind: SimKind,
}

#[derive(Debug, Clone)]
enum SimKind {
    Module,
    DeviceClass,
    Device,
    Joystick,
    Method { name: String, target: Target },
    Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Device,
    Joystick,
}

/// 引用账本快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceStats {
    pub acquired: usize,
    pub released: usize,
    pub live: usize,
    /// 对已释放对象的重复释放次数
    pub invalid_releases: usize,
}

/// IMU 传感器开关
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuConfig {
    pub compass: bool,
    pub gyroscope: bool,
    pub accelerometer: bool,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            compass: true,
            gyroscope: true,
            accelerometer: true,
        }
    }
}

/// 传感器读数，姿态以弧度存储
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    pub humidity: f64,
    pub pressure: f64,
    pub temperature_from_humidity: f64,
    pub temperature_from_pressure: f64,
    pub compass: f64,
    pub orientation_radians: Orientation,
    pub accelerometer_raw: RawVector,
    pub compass_raw: RawVector,
    pub gyroscope_raw: RawVector,
}

impl Default for SensorReadings {
    fn default() -> Self {
        Self {
            humidity: 45.0,
            pressure: 1013.25,
            temperature_from_humidity: 24.5,
            temperature_from_pressure: 23.75,
            compass: 90.0,
            orientation_radians: Orientation::new(0.1, -0.2, 1.5),
            accelerometer_raw: RawVector::new(0.0, 0.0, 1.0),
            compass_raw: RawVector::new(20.0, -5.0, 40.0),
            gyroscope_raw: RawVector::new(0.0, 0.0, 0.0),
        }
    }
}

struct BoardState {
    initialized: bool,
    fail_initialize: bool,
    fail_import: bool,
    initialize_count: usize,
    finalize_count: usize,

    missing: HashSet<String>,
    uncallable: HashSet<String>,
    failing: HashSet<String>,

    next_id: u64,
    live: HashSet<u64>,
    acquired: usize,
    released: usize,
    invalid_releases: usize,
    lock_count: usize,
    call_count: usize,

    framebuffer: [PixelColor; PixelMatrix::LEN],
    rotation: i64,
    gamma: [u8; 32],
    imu: ImuConfig,
    readings: SensorReadings,
    pending: VecDeque<ScriptValue>,
    scheduled: VecDeque<ScriptValue>,
    last_message: Option<String>,
    last_letter: Option<String>,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            initialized: false,
            fail_initialize: false,
            fail_import: false,
            initialize_count: 0,
            finalize_count: 0,
            missing: HashSet::new(),
            uncallable: HashSet::new(),
            failing: HashSet::new(),
            next_id: 1,
            live: HashSet::new(),
            acquired: 0,
            released: 0,
            invalid_releases: 0,
            lock_count: 0,
            call_count: 0,
            framebuffer: [PixelColor::BLACK; PixelMatrix::LEN],
            rotation: 0,
            gamma: DEFAULT_GAMMA,
            imu: ImuConfig::default(),
            readings: SensorReadings::default(),
            pending: VecDeque::new(),
            scheduled: VecDeque::new(),
            last_message: None,
            last_letter: None,
        }
    }
}

fn fault(kind: &str, message: impl Into<String>) -> RuntimeFault {
    RuntimeFault::new(kind, message)
}

fn value_error(err: BridgeError) -> RuntimeFault {
    fault("ValueError", err.to_string())
}

fn encode<T: ToScriptValue>(value: &T) -> Result<ScriptValue, RuntimeFault> {
    value.to_script_value().map_err(value_error)
}

/// 逻辑坐标到物理帧缓冲偏移的映射
fn physical_index(rotation: i64, x: usize, y: usize) -> usize {
    let last = SIDE - 1;
    match rotation {
        90 => x * SIDE + (last - y),
        180 => (last - y) * SIDE + (last - x),
        270 => (last - x) * SIDE + y,
        _ => y * SIDE + x,
    }
}

fn to_degrees(orientation: Orientation) -> Orientation {
    let convert = |radians: f64| {
        let degrees = radians.to_degrees();
        if degrees < 0.0 {
            degrees + 360.0
        } else {
            degrees
        }
    };
    Orientation::new(
        convert(orientation.pitch),
        convert(orientation.roll),
        convert(orientation.yaw),
    )
}

struct Args<'a> {
    method: &'a str,
    values: &'a [ScriptValue],
}

impl<'a> Args<'a> {
    fn get(&self, index: usize) -> Option<&'a ScriptValue> {
        self.values.get(index)
    }

    fn missing(&self, name: &str) -> RuntimeFault {
        fault(
            "TypeError",
            format!("{}() missing required argument: '{}'", self.method, name),
        )
    }

    fn wrong_type(&self, name: &str, expected: &str, got: &ScriptValue) -> RuntimeFault {
        fault(
            "TypeError",
            format!(
                "{}() argument '{}' must be {}, not {}",
                self.method,
                name,
                expected,
                got.type_name()
            ),
        )
    }

    fn int(&self, index: usize, name: &str) -> Result<i64, RuntimeFault> {
        let value = self.get(index).ok_or_else(|| self.missing(name))?;
        value
            .as_int()
            .ok_or_else(|| self.wrong_type(name, "int", value))
    }

    fn bool_or(&self, index: usize, name: &str, default: bool) -> Result<bool, RuntimeFault> {
        match self.get(index) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.wrong_type(name, "bool", value)),
        }
    }

    fn number_or(&self, index: usize, name: &str, default: f64) -> Result<f64, RuntimeFault> {
        match self.get(index) {
            None => Ok(default),
            Some(ScriptValue::Float(f)) => Ok(*f),
            Some(ScriptValue::Int(i)) => Ok(*i as f64),
            Some(value) => Err(self.wrong_type(name, "a number", value)),
        }
    }

    fn str(&self, index: usize, name: &str) -> Result<&'a str, RuntimeFault> {
        let value = self.get(index).ok_or_else(|| self.missing(name))?;
        value
            .as_str()
            .ok_or_else(|| self.wrong_type(name, "str", value))
    }

    fn color_or(
        &self,
        index: usize,
        name: &str,
        default: PixelColor,
    ) -> Result<PixelColor, RuntimeFault> {
        match self.get(index) {
            None => Ok(default),
            Some(value) => PixelColor::from_script_value(value).map_err(|_| {
                fault(
                    "ValueError",
                    format!("{}() {} must be 3 ints in 0..=255", self.method, name),
                )
            }),
        }
    }
}

impl BoardState {
    fn acquire(&mut self, kind: SimKind) -> SimObject {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        self.acquired += 1;
        SimObject { id, kind }
    }

    fn check_live(&self, object: &SimObject) -> Result<(), RuntimeFault> {
        if self.live.contains(&object.id) {
            Ok(())
        } else {
            Err(fault(
                "ReferenceError",
                format!("object {} used after release", object.id),
            ))
        }
    }

    fn stats(&self) -> ReferenceStats {
        ReferenceStats {
            acquired: self.acquired,
            released: self.released,
            live: self.live.len(),
            invalid_releases: self.invalid_releases,
        }
    }

    fn logical(&self) -> PixelMatrix {
        let mut matrix = PixelMatrix::default();
        for y in 0..SIDE {
            for x in 0..SIDE {
                matrix.0[y * SIDE + x] = self.framebuffer[physical_index(self.rotation, x, y)];
            }
        }
        matrix
    }

    fn draw(&mut self, logical: &PixelMatrix) {
        for y in 0..SIDE {
            for x in 0..SIDE {
                self.framebuffer[physical_index(self.rotation, x, y)] =
                    logical.0[y * SIDE + x].quantized();
            }
        }
    }

    fn fill(&mut self, color: PixelColor) {
        self.framebuffer = [color.quantized(); PixelMatrix::LEN];
    }

    fn coordinate(args: &Args<'_>, index: usize, name: &str) -> Result<usize, RuntimeFault> {
        let value = args.int(index, name)?;
        usize::try_from(value)
            .ok()
            .filter(|v| *v < SIDE)
            .ok_or_else(|| fault("ValueError", format!("{} must be between 0 and 7", name)))
    }

    fn flip(&mut self, horizontal: bool, redraw: bool) -> Result<ScriptValue, RuntimeFault> {
        let current = self.logical();
        let mut flipped = PixelMatrix::default();
        for y in 0..SIDE {
            for x in 0..SIDE {
                let source = if horizontal {
                    y * SIDE + (SIDE - 1 - x)
                } else {
                    (SIDE - 1 - y) * SIDE + x
                };
                flipped.0[y * SIDE + x] = current.0[source];
            }
        }
        if redraw {
            self.draw(&flipped);
        }
        encode(&flipped)
    }

    fn set_rotation(&mut self, rotation: i64, redraw: bool) -> Result<(), RuntimeFault> {
        if !matches!(rotation, 0 | 90 | 180 | 270) {
            return Err(fault(
                "ValueError",
                "Rotation must be 0, 90, 180 or 270 degrees",
            ));
        }
        if redraw {
            let current = self.logical();
            self.rotation = rotation;
            self.draw(&current);
        } else {
            self.rotation = rotation;
        }
        Ok(())
    }

    fn load_image(&mut self, path: &str, redraw: bool) -> Result<ScriptValue, RuntimeFault> {
        let image = image::open(path).map_err(|e| fault("OSError", e.to_string()))?;
        let rgb = image.to_rgb8();
        if rgb.width() as usize != SIDE || rgb.height() as usize != SIDE {
            return Err(fault(
                "ValueError",
                format!(
                    "image must be 8x8 pixels, got {}x{}",
                    rgb.width(),
                    rgb.height()
                ),
            ));
        }

        let mut matrix = PixelMatrix::default();
        for (slot, pixel) in matrix.pixels_mut().iter_mut().zip(rgb.pixels()) {
            *slot = PixelColor::new(
                i32::from(pixel[0]),
                i32::from(pixel[1]),
                i32::from(pixel[2]),
            );
        }
        if redraw {
            self.draw(&matrix);
        }
        encode(&matrix)
    }

    fn set_imu(&mut self, compass: bool, gyroscope: bool, accelerometer: bool) {
        self.imu = ImuConfig {
            compass,
            gyroscope,
            accelerometer,
        };
    }

    fn call_device(
        &mut self,
        method: &str,
        values: &[ScriptValue],
    ) -> Result<ScriptValue, RuntimeFault> {
        let args = Args { method, values };
        let readings = self.readings;
        match method {
            "set_rotation" => {
                let rotation = args.int(0, "r")?;
                let redraw = args.bool_or(1, "redraw", true)?;
                self.set_rotation(rotation, redraw)?;
                Ok(ScriptValue::Null)
            }
            "flip_h" => {
                let redraw = args.bool_or(0, "redraw", true)?;
                self.flip(true, redraw)
            }
            "flip_v" => {
                let redraw = args.bool_or(0, "redraw", true)?;
                self.flip(false, redraw)
            }
            "set_pixels" => {
                let value = args.get(0).ok_or_else(|| args.missing("pixel_list"))?;
                let matrix = PixelMatrix::from_script_value(value).map_err(value_error)?;
                self.draw(&matrix);
                Ok(ScriptValue::Null)
            }
            "get_pixels" => encode(&self.logical()),
            "set_pixel" => {
                let x = Self::coordinate(&args, 0, "x")?;
                let y = Self::coordinate(&args, 1, "y")?;
                let value = args.get(2).ok_or_else(|| args.missing("pixel"))?;
                let color = PixelColor::from_script_value(value).map_err(value_error)?;
                self.framebuffer[physical_index(self.rotation, x, y)] = color.quantized();
                Ok(ScriptValue::Null)
            }
            "get_pixel" => {
                let x = Self::coordinate(&args, 0, "x")?;
                let y = Self::coordinate(&args, 1, "y")?;
                encode(&self.framebuffer[physical_index(self.rotation, x, y)])
            }
            "load_image" => {
                let path = args.str(0, "file_path")?;
                let redraw = args.bool_or(1, "redraw", true)?;
                self.load_image(path, redraw)
            }
            "clear" => {
                let color = args.color_or(0, "colour", PixelColor::BLACK)?;
                self.fill(color);
                Ok(ScriptValue::Null)
            }
            "show_message" => {
                let text = args.str(0, "text_string")?;
                args.number_or(1, "scroll_speed", 0.1)?;
                args.color_or(2, "text_colour", PixelColor::WHITE)?;
                let back = args.color_or(3, "back_colour", PixelColor::BLACK)?;
                self.last_message = Some(text.to_string());
                self.fill(back);
                Ok(ScriptValue::Null)
            }
            "show_letter" => {
                let letter = args.str(0, "s")?;
                if letter.chars().count() != 1 {
                    return Err(fault("ValueError", "Only one character may be passed"));
                }
                args.color_or(1, "text_colour", PixelColor::WHITE)?;
                let back = args.color_or(2, "back_colour", PixelColor::BLACK)?;
                self.last_letter = Some(letter.to_string());
                self.fill(back);
                Ok(ScriptValue::Null)
            }
            "gamma_reset" => {
                self.gamma = DEFAULT_GAMMA;
                Ok(ScriptValue::Null)
            }
            "get_humidity" => Ok(ScriptValue::Float(readings.humidity)),
            "get_pressure" => Ok(ScriptValue::Float(readings.pressure)),
            "get_temperature" | "get_temperature_from_humidity" => {
                Ok(ScriptValue::Float(readings.temperature_from_humidity))
            }
            "get_temperature_from_pressure" => {
                Ok(ScriptValue::Float(readings.temperature_from_pressure))
            }
            "get_orientation_radians" => encode(&readings.orientation_radians),
            "get_orientation" | "get_orientation_degrees" => {
                encode(&to_degrees(readings.orientation_radians))
            }
            "get_compass" => {
                self.set_imu(true, false, false);
                Ok(ScriptValue::Float(readings.compass))
            }
            "get_compass_raw" => {
                self.set_imu(true, false, false);
                encode(&readings.compass_raw)
            }
            "get_gyroscope" => {
                self.set_imu(false, true, false);
                encode(&to_degrees(readings.orientation_radians))
            }
            "get_gyroscope_raw" => {
                self.set_imu(false, true, false);
                encode(&readings.gyroscope_raw)
            }
            "get_accelerometer" => {
                self.set_imu(false, false, true);
                encode(&to_degrees(readings.orientation_radians))
            }
            "get_accelerometer_raw" => {
                self.set_imu(false, false, true);
                encode(&readings.accelerometer_raw)
            }
            "set_imu_config" => {
                let compass = args.bool_or(0, "compass_enabled", true)?;
                let gyroscope = args.bool_or(1, "gyro_enabled", true)?;
                let accelerometer = args.bool_or(2, "accel_enabled", true)?;
                self.set_imu(compass, gyroscope, accelerometer);
                Ok(ScriptValue::Null)
            }
            other => Err(fault(
                "AttributeError",
                format!("'SenseHat' object has no attribute '{}'", other),
            )),
        }
    }

    fn call_stick(
        &mut self,
        method: &str,
        values: &[ScriptValue],
    ) -> Result<ScriptValue, RuntimeFault> {
        let args = Args { method, values };
        match method {
            "get_events" => Ok(ScriptValue::Array(self.pending.drain(..).collect())),
            "wait_for_event" => {
                if args.bool_or(0, "emptybuffer", false)? {
                    self.pending.clear();
                }
                self.pending
                    .pop_front()
                    .or_else(|| self.scheduled.pop_front())
                    .ok_or_else(|| fault("RuntimeError", "no joystick event available"))
            }
            other => Err(fault(
                "AttributeError",
                format!("'SenseStick' object has no attribute '{}'", other),
            )),
        }
    }
}

/// 模拟板卡的共享句柄，测试通过它观察与驱动板卡状态
#[derive(Clone, Default)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reference_stats(&self) -> ReferenceStats {
        self.lock().stats()
    }

    pub fn lock_count(&self) -> usize {
        self.lock().lock_count
    }

    pub fn call_count(&self) -> usize {
        self.lock().call_count
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn initialize_count(&self) -> usize {
        self.lock().initialize_count
    }

    pub fn finalize_count(&self) -> usize {
        self.lock().finalize_count
    }

    pub fn set_failing_initialize(&self, fail: bool) {
        self.lock().fail_initialize = fail;
    }

    /// 物理帧缓冲（未旋转）
    pub fn framebuffer(&self) -> PixelMatrix {
        PixelMatrix(self.lock().framebuffer)
    }

    /// 当前旋转下的逻辑图像
    pub fn display(&self) -> PixelMatrix {
        self.lock().logical()
    }

    pub fn rotation(&self) -> i64 {
        self.lock().rotation
    }

    pub fn gamma(&self) -> [u8; 32] {
        self.lock().gamma
    }

    pub fn set_gamma(&self, gamma: [u8; 32]) {
        self.lock().gamma = gamma;
    }

    pub fn imu_config(&self) -> ImuConfig {
        self.lock().imu
    }

    pub fn readings(&self) -> SensorReadings {
        self.lock().readings
    }

    pub fn set_readings(&self, readings: SensorReadings) {
        self.lock().readings = readings;
    }

    /// 追加一个待取事件
    pub fn push_event(&self, event: JoystickEvent) -> BridgeResult<()> {
        let value = event.to_script_value()?;
        self.lock().pending.push_back(value);
        Ok(())
    }

    /// 追加一个原始事件值（可为任意形状）
    pub fn push_raw_event(&self, value: ScriptValue) {
        self.lock().pending.push_back(value);
    }

    /// 安排一个稍后到达的事件，供 `wait_for_event` 使用
    pub fn schedule_event(&self, event: JoystickEvent) -> BridgeResult<()> {
        let value = event.to_script_value()?;
        self.lock().scheduled.push_back(value);
        Ok(())
    }

    pub fn pending_events(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn last_message(&self) -> Option<String> {
        self.lock().last_message.clone()
    }

    pub fn last_letter(&self) -> Option<String> {
        self.lock().last_letter.clone()
    }
}

/// 模拟运行时
#[derive(Clone, Default)]
pub struct SimulatedRuntime {
    board: SimulatedBoard,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board(&self) -> SimulatedBoard {
        self.board.clone()
    }

    /// 使属性不存在
    pub fn without_attribute(self, name: &str) -> Self {
        self.board.lock().missing.insert(name.to_string());
        self
    }

    /// 使属性存在但不可调用
    pub fn with_uncallable_attribute(self, name: &str) -> Self {
        self.board.lock().uncallable.insert(name.to_string());
        self
    }

    /// 使调用（或构造）失败
    pub fn with_failing_call(self, name: &str) -> Self {
        self.board.lock().failing.insert(name.to_string());
        self
    }

    pub fn with_failing_import(self) -> Self {
        self.board.lock().fail_import = true;
        self
    }

    pub fn with_failing_initialize(self) -> Self {
        self.board.lock().fail_initialize = true;
        self
    }
}

impl EmbeddedRuntime for SimulatedRuntime {
    type Object = SimObject;

    fn initialize(&self) -> Result<(), RuntimeFault> {
        let mut state = self.board.lock();
        if state.fail_initialize {
            return Err(fault("SystemError", "interpreter failed to start"));
        }
        if !state.initialized {
            state.initialized = true;
            state.initialize_count += 1;
        }
        Ok(())
    }

    fn finalize(&self) -> Result<(), RuntimeFault> {
        let mut state = self.board.lock();
        if state.initialized {
            state.initialized = false;
            state.finalize_count += 1;
        }
        Ok(())
    }

    fn with_lock<T>(&self, f: impl FnOnce(&dyn RuntimeSession<Object = SimObject>) -> T) -> T {
        let mut guard = self.board.lock();
        guard.lock_count += 1;
        let session = SimulatedSession {
            state: RefCell::new(guard),
        };
        f(&session)
    }
}

struct SimulatedSession<'a> {
    state: RefCell<MutexGuard<'a, BoardState>>,
}

impl RuntimeSession for SimulatedSession<'_> {
    type Object = SimObject;

    fn import_module(&self, name: &str) -> Result<SimObject, RuntimeFault> {
        let mut state = self.state.borrow_mut();
        if !state.initialized {
            return Err(fault("SystemError", "interpreter is not initialized"));
        }
        if state.fail_import || !MODULES.contains(&name) {
            return Err(fault(
                "ModuleNotFoundError",
                format!("No module named '{}'", name),
            ));
        }
        Ok(state.acquire(SimKind::Module))
    }

    fn get_attr(
        &self,
        container: &SimObject,
        name: &str,
    ) -> Result<Option<SimObject>, RuntimeFault> {
        let mut state = self.state.borrow_mut();
        state.check_live(container)?;
        if state.missing.contains(name) {
            return Ok(None);
        }
        if state.uncallable.contains(name) {
            return Ok(Some(state.acquire(SimKind::Attribute)));
        }

        let kind = match (&container.kind, name) {
            (SimKind::Module, DEVICE_CLASS) => Some(SimKind::DeviceClass),
            (SimKind::DeviceClass, method) if DEVICE_METHODS.contains(&method) => {
                Some(SimKind::Method {
                    name: method.to_string(),
                    target: Target::Device,
                })
            }
            (SimKind::Device, STICK_ATTRIBUTE) => Some(SimKind::Joystick),
            (SimKind::Joystick, method) if STICK_METHODS.contains(&method) => {
                Some(SimKind::Method {
                    name: method.to_string(),
                    target: Target::Joystick,
                })
            }
            _ => None,
        };
        Ok(kind.map(|kind| state.acquire(kind)))
    }

    fn is_callable(&self, object: &SimObject) -> bool {
        matches!(object.kind, SimKind::DeviceClass | SimKind::Method { .. })
    }

    fn construct(&self, class: &SimObject) -> Result<SimObject, RuntimeFault> {
        let mut state = self.state.borrow_mut();
        state.check_live(class)?;
        match class.kind {
            SimKind::DeviceClass if state.failing.contains(DEVICE_CLASS) => {
                Err(fault("OSError", "Cannot detect RPi-Sense FB device"))
            }
            SimKind::DeviceClass => Ok(state.acquire(SimKind::Device)),
            _ => Err(fault("TypeError", "object is not callable")),
        }
    }

    fn call(
        &self,
        callable: &SimObject,
        receiver: Option<&SimObject>,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, RuntimeFault> {
        let mut state = self.state.borrow_mut();
        state.check_live(callable)?;
        state.call_count += 1;

        let (name, target) = match &callable.kind {
            SimKind::Method { name, target } => (name.as_str(), *target),
            _ => return Err(fault("TypeError", "object is not callable")),
        };
        if state.failing.contains(name) {
            return Err(fault("RuntimeError", format!("{} failed", name)));
        }

        match (target, receiver) {
            (Target::Device, Some(instance)) => {
                state.check_live(instance)?;
                if !matches!(instance.kind, SimKind::Device) {
                    return Err(fault(
                        "TypeError",
                        format!("{}() requires a 'SenseHat' instance", name),
                    ));
                }
                state.call_device(name, args)
            }
            (Target::Device, None) => Err(fault(
                "TypeError",
                format!("{}() missing required argument: 'self'", name),
            )),
            (Target::Joystick, None) => state.call_stick(name, args),
            (Target::Joystick, Some(_)) => Err(fault(
                "TypeError",
                format!("{}() got an unexpected receiver", name),
            )),
        }
    }

    fn release(&self, object: SimObject) -> Result<(), RuntimeFault> {
        let mut state = self.state.borrow_mut();
        if state.live.remove(&object.id) {
            state.released += 1;
            Ok(())
        } else {
            state.invalid_releases += 1;
            Err(fault(
                "ReferenceError",
                format!("object {} released twice", object.id),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_maps_match_rot90() {
        assert_eq!(physical_index(0, 1, 0), 1);
        assert_eq!(physical_index(90, 0, 0), 7);
        assert_eq!(physical_index(180, 0, 0), 63);
        assert_eq!(physical_index(270, 0, 0), 56);
        assert_eq!(physical_index(90, 7, 7), 56);
    }

    #[test]
    fn test_rotation_maps_are_permutations() {
        for rotation in [0, 90, 180, 270] {
            let mut seen = HashSet::new();
            for y in 0..SIDE {
                for x in 0..SIDE {
                    assert!(seen.insert(physical_index(rotation, x, y)));
                }
            }
            assert_eq!(seen.len(), PixelMatrix::LEN);
        }
    }

    #[test]
    fn test_redraw_keeps_logical_image() {
        let mut state = BoardState::default();
        let mut image = PixelMatrix::default();
        image.set(1, 0, PixelColor::new(248, 0, 0));
        state.draw(&image);

        state.set_rotation(90, true).unwrap();
        assert_eq!(state.logical(), image);
        assert_eq!(state.framebuffer[physical_index(90, 1, 0)], image.0[1]);

        state.set_rotation(180, false).unwrap();
        assert_ne!(state.logical(), image);
    }

    #[test]
    fn test_invalid_rotation_is_value_error() {
        let mut state = BoardState::default();
        let err = state.set_rotation(45, true).unwrap_err();
        assert_eq!(err.kind, "ValueError");
        assert_eq!(state.rotation, 0);
    }

    #[test]
    fn test_flip_horizontal() {
        let mut state = BoardState::default();
        let mut image = PixelMatrix::default();
        image.set(0, 3, PixelColor::new(0, 252, 0));
        state.draw(&image);

        let flipped = state.flip(true, false).unwrap();
        let flipped = PixelMatrix::from_script_value(&flipped).unwrap();
        assert_eq!(flipped.get(7, 3), Some(PixelColor::new(0, 252, 0)));
        assert_eq!(state.logical(), image);

        state.flip(false, true).unwrap();
        assert_eq!(state.logical().get(0, 4), Some(PixelColor::new(0, 252, 0)));
    }

    #[test]
    fn test_orientation_degrees_wrap() {
        let degrees = to_degrees(Orientation::new(-std::f64::consts::FRAC_PI_2, 0.0, 0.5));
        assert!((degrees.pitch - 270.0).abs() < 1e-9);
        assert_eq!(degrees.roll, 0.0);
    }

    #[test]
    fn test_stick_queue() {
        let mut state = BoardState::default();
        let event = ScriptValue::Array(vec![
            ScriptValue::Float(1.0),
            ScriptValue::from("up"),
            ScriptValue::from("pressed"),
        ]);
        state.pending.push_back(event.clone());
        state.scheduled.push_back(event.clone());

        let flushed = state
            .call_stick("wait_for_event", &[ScriptValue::Bool(true)])
            .unwrap();
        assert_eq!(flushed, event);
        assert!(state.pending.is_empty());
        assert!(state.scheduled.is_empty());
        assert!(state.call_stick("wait_for_event", &[]).is_err());
        assert_eq!(
            state.call_stick("get_events", &[]).unwrap(),
            ScriptValue::Array(vec![])
        );
    }

    #[test]
    fn test_use_after_release_is_fault() {
        let runtime = SimulatedRuntime::new();
        runtime.initialize().unwrap();
        runtime.with_lock(|session| {
            let module = session.import_module("sense_hat").unwrap();
            let id = module.id;
            session.release(module).unwrap();
            let ghost = SimObject {
                id,
                kind: SimKind::Module,
            };
            assert!(session.get_attr(&ghost, DEVICE_CLASS).is_err());
            assert!(session.release(ghost).is_err());
        });
        assert_eq!(runtime.board().reference_stats().invalid_releases, 1);
    }

    #[test]
    fn test_import_requires_initialized_runtime() {
        let runtime = SimulatedRuntime::new();
        let result = runtime.with_lock(|session| session.import_module("sense_hat").map(|_| ()));
        assert_eq!(result.unwrap_err().kind, "SystemError");
    }
}
