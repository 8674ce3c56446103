//! 嵌入式运行时抽象
//!
//! 设备层通过这两个 trait 驱动解释器：
//! - [`EmbeddedRuntime`] 负责进程级生命周期与全局锁
//! - [`RuntimeSession`] 只在持锁期间存在，是操作运行时对象的唯一途径

use super::value::ScriptValue;
use thiserror::Error;

/// 运行时后端产生的原始故障
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RuntimeFault {
    /// 异常类型名
    pub kind: String,
    /// 异常消息
    pub message: String,
}

impl RuntimeFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// 嵌入式运行时
pub trait EmbeddedRuntime {
    /// 拥有的对象引用，释放必须经由 [`RuntimeSession::release`]
    type Object;

    /// 启动解释器；已启动时为空操作
    fn initialize(&self) -> Result<(), RuntimeFault>;

    /// 终止解释器；未启动时为空操作
    fn finalize(&self) -> Result<(), RuntimeFault>;

    /// 持有全局锁执行 `f`
    fn with_lock<T>(&self, f: impl FnOnce(&dyn RuntimeSession<Object = Self::Object>) -> T) -> T;
}

/// 持锁期间的运行时会话
pub trait RuntimeSession {
    type Object;

    /// 导入模块
    fn import_module(&self, name: &str) -> Result<Self::Object, RuntimeFault>;

    /// 读取属性，属性不存在时返回 `Ok(None)`
    fn get_attr(&self, container: &Self::Object, name: &str)
        -> Result<Option<Self::Object>, RuntimeFault>;

    /// 对象是否可调用
    fn is_callable(&self, object: &Self::Object) -> bool;

    /// 以无参方式调用类，构造实例
    fn construct(&self, class: &Self::Object) -> Result<Self::Object, RuntimeFault>;

    /// 调用可调用对象
    ///
    /// `receiver` 存在时作为第一个位置参数传入（未绑定方法的调用形态）。
    fn call(
        &self,
        callable: &Self::Object,
        receiver: Option<&Self::Object>,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, RuntimeFault>;

    /// 释放对象引用
    fn release(&self, object: Self::Object) -> Result<(), RuntimeFault>;
}
