//! 数据编组
//!
//! 本地结构与 [`ScriptValue`] 之间的双向转换。
//!
//! - 编码严格：越界颜色返回 `InvalidArgument`，未知摇杆方向/动作返回 `ConversionFailed`
//! - 解码宽松地处理摇杆字符串（未知名称映射为 `None`），其余形状不符一律 `ConversionFailed`

use super::types::{
    JoystickAction, JoystickDirection, JoystickEvent, Orientation, PixelColor, PixelMatrix,
    RawVector,
};
use crate::core::{BridgeError, BridgeResult};
use crate::scripting::ScriptValue;
use std::collections::HashMap;

/// 编码为脚本值
pub trait ToScriptValue {
    fn to_script_value(&self) -> BridgeResult<ScriptValue>;
}

/// 从脚本值解码
pub trait FromScriptValue: Sized {
    fn from_script_value(value: &ScriptValue) -> BridgeResult<Self>;
}

fn expect_sequence<'a>(value: &'a ScriptValue, what: &str) -> BridgeResult<&'a [ScriptValue]> {
    value.as_array().ok_or_else(|| {
        BridgeError::conversion(format!(
            "{} must be a sequence, got {}",
            what,
            value.type_name()
        ))
    })
}

fn expect_float(value: &ScriptValue, what: &str) -> BridgeResult<f64> {
    value.as_float().ok_or_else(|| {
        BridgeError::conversion(format!("{} must be a float, got {}", what, value.type_name()))
    })
}

fn expect_key<'a>(value: &'a ScriptValue, key: &str) -> BridgeResult<&'a ScriptValue> {
    let map = value.as_object().ok_or_else(|| {
        BridgeError::conversion(format!("expected a mapping, got {}", value.type_name()))
    })?;
    map.get(key)
        .ok_or_else(|| BridgeError::conversion(format!("mapping is missing key '{}'", key)))
}

fn float_mapping(entries: [(&str, f64); 3]) -> ScriptValue {
    let map: HashMap<String, ScriptValue> = entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), ScriptValue::Float(value)))
        .collect();
    ScriptValue::Object(map)
}

impl ToScriptValue for PixelColor {
    fn to_script_value(&self) -> BridgeResult<ScriptValue> {
        self.validate()?;
        Ok(ScriptValue::Array(vec![
            ScriptValue::from(self.red),
            ScriptValue::from(self.green),
            ScriptValue::from(self.blue),
        ]))
    }
}

impl FromScriptValue for PixelColor {
    fn from_script_value(value: &ScriptValue) -> BridgeResult<Self> {
        let items = expect_sequence(value, "pixel")?;
        if items.len() != 3 {
            return Err(BridgeError::conversion(format!(
                "pixel must have 3 channels, got {}",
                items.len()
            )));
        }

        let mut channels = [0i32; 3];
        for (slot, item) in channels.iter_mut().zip(items) {
            let channel = item
                .as_int()
                .filter(|c| (0..=255).contains(c))
                .ok_or_else(|| {
                    BridgeError::conversion(format!("invalid pixel channel {:?}", item))
                })?;
            *slot = channel as i32;
        }
        Ok(PixelColor::new(channels[0], channels[1], channels[2]))
    }
}

impl ToScriptValue for PixelMatrix {
    fn to_script_value(&self) -> BridgeResult<ScriptValue> {
        let pixels = self
            .pixels()
            .iter()
            .map(ToScriptValue::to_script_value)
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(ScriptValue::Array(pixels))
    }
}

impl FromScriptValue for PixelMatrix {
    fn from_script_value(value: &ScriptValue) -> BridgeResult<Self> {
        let items = expect_sequence(value, "pixel matrix")?;
        if items.len() != PixelMatrix::LEN {
            return Err(BridgeError::conversion(format!(
                "pixel matrix must have {} entries, got {}",
                PixelMatrix::LEN,
                items.len()
            )));
        }

        let mut matrix = PixelMatrix::default();
        for (slot, item) in matrix.pixels_mut().iter_mut().zip(items) {
            *slot = PixelColor::from_script_value(item)?;
        }
        Ok(matrix)
    }
}

impl ToScriptValue for Orientation {
    fn to_script_value(&self) -> BridgeResult<ScriptValue> {
        Ok(float_mapping([
            ("pitch", self.pitch),
            ("roll", self.roll),
            ("yaw", self.yaw),
        ]))
    }
}

impl FromScriptValue for Orientation {
    fn from_script_value(value: &ScriptValue) -> BridgeResult<Self> {
        Ok(Orientation {
            pitch: expect_float(expect_key(value, "pitch")?, "pitch")?,
            roll: expect_float(expect_key(value, "roll")?, "roll")?,
            yaw: expect_float(expect_key(value, "yaw")?, "yaw")?,
        })
    }
}

impl ToScriptValue for RawVector {
    fn to_script_value(&self) -> BridgeResult<ScriptValue> {
        Ok(float_mapping([("x", self.x), ("y", self.y), ("z", self.z)]))
    }
}

impl FromScriptValue for RawVector {
    fn from_script_value(value: &ScriptValue) -> BridgeResult<Self> {
        Ok(RawVector {
            x: expect_float(expect_key(value, "x")?, "x")?,
            y: expect_float(expect_key(value, "y")?, "y")?,
            z: expect_float(expect_key(value, "z")?, "z")?,
        })
    }
}

impl ToScriptValue for JoystickEvent {
    fn to_script_value(&self) -> BridgeResult<ScriptValue> {
        let direction = self.direction.name().ok_or_else(|| {
            BridgeError::conversion("joystick event has no direction to encode")
        })?;
        let action = self
            .action
            .name()
            .ok_or_else(|| BridgeError::conversion("joystick event has no action to encode"))?;
        Ok(ScriptValue::Array(vec![
            ScriptValue::Float(self.timestamp),
            ScriptValue::from(direction),
            ScriptValue::from(action),
        ]))
    }
}

impl FromScriptValue for JoystickEvent {
    fn from_script_value(value: &ScriptValue) -> BridgeResult<Self> {
        let items = expect_sequence(value, "joystick event")?;
        if items.len() != 3 {
            return Err(BridgeError::conversion(format!(
                "joystick event must have 3 fields, got {}",
                items.len()
            )));
        }

        let timestamp = expect_float(&items[0], "event timestamp")?;
        let direction = items[1].as_str().ok_or_else(|| {
            BridgeError::conversion(format!(
                "event direction must be a string, got {}",
                items[1].type_name()
            ))
        })?;
        let action = items[2].as_str().ok_or_else(|| {
            BridgeError::conversion(format!(
                "event action must be a string, got {}",
                items[2].type_name()
            ))
        })?;

        Ok(JoystickEvent {
            timestamp,
            direction: JoystickDirection::from_name(direction),
            action: JoystickAction::from_name(action),
        })
    }
}

impl FromScriptValue for f64 {
    fn from_script_value(value: &ScriptValue) -> BridgeResult<Self> {
        expect_float(value, "reading")
    }
}
