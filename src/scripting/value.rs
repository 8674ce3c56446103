//! 脚本值
//!
//! 运行时对象与本地数据之间唯一的中间表示。后端负责把解释器对象
//! 转成 `ScriptValue`，设备层只与 `ScriptValue` 打交道。

use std::collections::HashMap;

/// 脚本值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// 有序序列（列表与元组均映射到此）
    Array(Vec<ScriptValue>),
    /// 字符串键映射
    Object(HashMap<String, ScriptValue>),
}

impl ScriptValue {
    /// 类型名，用于错误信息
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::String(_) => "string",
            ScriptValue::Array(_) => "sequence",
            ScriptValue::Object(_) => "mapping",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 整数值；布尔值不视为整数
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 严格的浮点值；整数不会被提升
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScriptValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, ScriptValue>> {
        match self {
            ScriptValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// 按键取映射成员
    pub fn get(&self, key: &str) -> Option<&ScriptValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        ScriptValue::Int(value)
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        ScriptValue::Int(i64::from(value))
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Float(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::String(value)
    }
}

impl From<Vec<ScriptValue>> for ScriptValue {
    fn from(value: Vec<ScriptValue>) -> Self {
        ScriptValue::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_accessors() {
        assert_eq!(ScriptValue::Int(3).as_int(), Some(3));
        assert_eq!(ScriptValue::Int(3).as_float(), None);
        assert_eq!(ScriptValue::Bool(true).as_int(), None);
        assert_eq!(ScriptValue::Float(1.5).as_float(), Some(1.5));
        assert_eq!(ScriptValue::from("up").as_str(), Some("up"));
    }

    #[test]
    fn test_object_lookup() {
        let mut map = HashMap::new();
        map.insert("pitch".to_string(), ScriptValue::Float(0.5));
        let value = ScriptValue::Object(map);
        assert_eq!(value.get("pitch"), Some(&ScriptValue::Float(0.5)));
        assert_eq!(value.get("roll"), None);
        assert_eq!(ScriptValue::Null.get("pitch"), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ScriptValue::Array(vec![]).type_name(), "sequence");
        assert_eq!(ScriptValue::Null.type_name(), "null");
        assert!(ScriptValue::Null.is_null());
    }
}
