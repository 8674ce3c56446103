//! 设备数据类型
//!
//! 跨越 C ABI 的类型均为 `#[repr(C)]`。

use crate::core::{BridgeError, BridgeResult};

/// LED 颜色，每个通道取值 0..=255
///
/// 硬件以 RGB565 存储，读回的值会被量化（见 [`PixelColor::quantized`]）。
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelColor {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
}

impl PixelColor {
    pub const BLACK: PixelColor = PixelColor::new(0, 0, 0);
    pub const WHITE: PixelColor = PixelColor::new(255, 255, 255);

    pub const fn new(red: i32, green: i32, blue: i32) -> Self {
        Self { red, green, blue }
    }

    pub fn is_valid(&self) -> bool {
        [self.red, self.green, self.blue]
            .iter()
            .all(|channel| (0..=255).contains(channel))
    }

    /// 校验通道范围
    pub fn validate(&self) -> BridgeResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(BridgeError::invalid_argument(format!(
                "color channel out of range: ({}, {}, {})",
                self.red, self.green, self.blue
            )))
        }
    }

    /// RGB565 往返后的颜色
    pub fn quantized(&self) -> Self {
        Self {
            red: self.red & 0xF8,
            green: self.green & 0xFC,
            blue: self.blue & 0xF8,
        }
    }
}

/// 矩阵边长
pub const MATRIX_SIDE: usize = 8;
/// 矩阵像素数
pub const MATRIX_LEN: usize = MATRIX_SIDE * MATRIX_SIDE;

/// 8x8 LED 矩阵，行优先，索引为 `y * 8 + x`
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelMatrix(pub [PixelColor; MATRIX_LEN]);

impl PixelMatrix {
    pub const SIDE: usize = MATRIX_SIDE;
    pub const LEN: usize = MATRIX_LEN;

    pub fn filled(color: PixelColor) -> Self {
        Self([color; Self::LEN])
    }

    pub fn index(x: usize, y: usize) -> Option<usize> {
        (x < Self::SIDE && y < Self::SIDE).then_some(y * Self::SIDE + x)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<PixelColor> {
        Self::index(x, y).map(|i| self.0[i])
    }

    pub fn set(&mut self, x: usize, y: usize, color: PixelColor) -> bool {
        match Self::index(x, y) {
            Some(i) => {
                self.0[i] = color;
                true
            }
            None => false,
        }
    }

    pub fn pixels(&self) -> &[PixelColor] {
        &self.0
    }

    pub fn pixels_mut(&mut self) -> &mut [PixelColor] {
        &mut self.0
    }

    pub fn quantized(&self) -> Self {
        let mut out = *self;
        for pixel in out.0.iter_mut() {
            *pixel = pixel.quantized();
        }
        out
    }

    /// 校验全部像素
    pub fn validate(&self) -> BridgeResult<()> {
        for (i, pixel) in self.0.iter().enumerate() {
            if !pixel.is_valid() {
                return Err(BridgeError::invalid_argument(format!(
                    "pixel {} out of range: ({}, {}, {})",
                    i, pixel.red, pixel.green, pixel.blue
                )));
            }
        }
        Ok(())
    }
}

impl Default for PixelMatrix {
    fn default() -> Self {
        Self::filled(PixelColor::BLACK)
    }
}

/// 姿态（俯仰、横滚、偏航）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl Orientation {
    pub const fn new(pitch: f64, roll: f64, yaw: f64) -> Self {
        Self { pitch, roll, yaw }
    }
}

/// 原始三轴读数
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RawVector {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// 摇杆方向
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoystickDirection {
    #[default]
    None = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
    Push = 5,
}

impl JoystickDirection {
    /// 宽松解析，未知名称映射为 `None`
    pub fn from_name(name: &str) -> Self {
        match name {
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "middle" => Self::Push,
            _ => Self::None,
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Up => Some("up"),
            Self::Down => Some("down"),
            Self::Left => Some("left"),
            Self::Right => Some("right"),
            Self::Push => Some("middle"),
        }
    }
}

/// 摇杆动作
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoystickAction {
    #[default]
    None = 0,
    Pressed = 1,
    Released = 2,
    Held = 3,
}

impl JoystickAction {
    /// 宽松解析，未知名称映射为 `None`
    pub fn from_name(name: &str) -> Self {
        match name {
            "pressed" => Self::Pressed,
            "released" => Self::Released,
            "held" => Self::Held,
            _ => Self::None,
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Pressed => Some("pressed"),
            Self::Released => Some("released"),
            Self::Held => Some("held"),
        }
    }
}

/// 摇杆事件
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JoystickEvent {
    /// 秒
    pub timestamp: f64,
    pub direction: JoystickDirection,
    pub action: JoystickAction,
}

impl JoystickEvent {
    pub const fn new(timestamp: f64, direction: JoystickDirection, action: JoystickAction) -> Self {
        Self {
            timestamp,
            direction,
            action,
        }
    }
}

/// 显示旋转角度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = BridgeError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(BridgeError::invalid_argument(format!(
                "rotation must be 0, 90, 180 or 270, got {}",
                other
            ))),
        }
    }
}
