//! 运行时桥接辅助
//!
//! 可调用对象的解析与释放，以及运行时故障到 [`BridgeError`] 的唯一转换入口。

use super::runtime::{RuntimeFault, RuntimeSession};
use crate::core::{BridgeError, BridgeResult};

/// 记录并转换运行时故障
pub fn translate_fault(context: &str, fault: RuntimeFault) -> BridgeError {
    tracing::error!(
        target: "sensehat::runtime",
        kind = %fault.kind,
        "Runtime fault during {}: {}",
        context,
        fault.message
    );
    BridgeError::RuntimeFault {
        context: context.to_string(),
        message: fault.to_string(),
    }
}

/// 读取必需属性
pub fn require_attr<O>(
    session: &dyn RuntimeSession<Object = O>,
    container: &O,
    name: &str,
) -> BridgeResult<O> {
    session
        .get_attr(container, name)
        .map_err(|fault| translate_fault(name, fault))?
        .ok_or_else(|| BridgeError::NotFound(format!("attribute '{}'", name)))
}

/// 解析可调用属性
///
/// 属性缺失返回 `NotFound`；存在但不可调用时释放该引用并返回 `Unsupported`。
pub fn resolve_callable<O>(
    session: &dyn RuntimeSession<Object = O>,
    container: &O,
    name: &str,
) -> BridgeResult<O> {
    let attr = require_attr(session, container, name)?;
    if session.is_callable(&attr) {
        tracing::trace!(target: "sensehat::runtime", "Resolved callable '{}'", name);
        return Ok(attr);
    }

    if let Err(fault) = session.release(attr) {
        tracing::warn!(target: "sensehat::runtime", "Failed to release '{}': {}", name, fault);
    }
    Err(BridgeError::Unsupported(format!(
        "attribute '{}' is not callable",
        name
    )))
}

/// 释放一个可调用槽位，槽位置空
pub fn release_callable<O>(
    session: &dyn RuntimeSession<Object = O>,
    slot: &mut Option<O>,
) -> BridgeResult<()> {
    let object = slot
        .take()
        .ok_or_else(|| BridgeError::invalid_argument("callable reference already released"))?;
    session
        .release(object)
        .map_err(|fault| translate_fault("release reference", fault))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::runtime::EmbeddedRuntime;
    use crate::scripting::simulated::SimulatedRuntime;

    #[test]
    fn test_resolve_and_release() {
        let runtime = SimulatedRuntime::new();
        let board = runtime.board();
        runtime.initialize().unwrap();

        runtime.with_lock(|session| {
            let module = session.import_module("sense_hat").unwrap();
            let class = require_attr(session, &module, "SenseHat").unwrap();
            let mut slot = Some(resolve_callable(session, &class, "clear").unwrap());

            release_callable(session, &mut slot).unwrap();
            assert!(slot.is_none());
            let again = release_callable(session, &mut slot).unwrap_err();
            assert!(again.is_invalid_argument());

            session.release(class).unwrap();
            session.release(module).unwrap();
        });

        assert_eq!(board.reference_stats().live, 0);
    }

    #[test]
    fn test_missing_attribute_is_not_found() {
        let runtime = SimulatedRuntime::new().without_attribute("get_humidity");
        runtime.initialize().unwrap();

        runtime.with_lock(|session| {
            let module = session.import_module("sense_hat").unwrap();
            let class = require_attr(session, &module, "SenseHat").unwrap();
            let err = resolve_callable(session, &class, "get_humidity").unwrap_err();
            assert!(matches!(err, BridgeError::NotFound(_)));
            session.release(class).unwrap();
            session.release(module).unwrap();
        });
    }

    #[test]
    fn test_non_callable_is_unsupported_and_released() {
        let runtime = SimulatedRuntime::new().with_uncallable_attribute("clear");
        let board = runtime.board();
        runtime.initialize().unwrap();

        runtime.with_lock(|session| {
            let module = session.import_module("sense_hat").unwrap();
            let class = require_attr(session, &module, "SenseHat").unwrap();
            let err = resolve_callable(session, &class, "clear").unwrap_err();
            assert_eq!(err.status_code(), 95);
            session.release(class).unwrap();
            session.release(module).unwrap();
        });

        assert_eq!(board.reference_stats().live, 0);
    }

    #[test]
    fn test_translate_fault_keeps_context() {
        let err = translate_fault("get_pixel", RuntimeFault::new("ValueError", "bad x"));
        match err {
            BridgeError::RuntimeFault { context, message } => {
                assert_eq!(context, "get_pixel");
                assert_eq!(message, "ValueError: bad x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
