//! 运行时上下文
//!
//! 显式的进程运行时守卫：拥有运行时，记录是否已启动以及是否已有设备打开。

use super::bridge::translate_fault;
use super::runtime::EmbeddedRuntime;
use crate::config::RuntimeConfig;
use crate::core::{BridgeError, BridgeResult};
use std::sync::atomic::{AtomicBool, Ordering};

/// 运行时上下文
pub struct RuntimeContext<R: EmbeddedRuntime> {
    runtime: R,
    config: RuntimeConfig,
    started: AtomicBool,
    device_open: AtomicBool,
}

impl<R: EmbeddedRuntime> RuntimeContext<R> {
    /// 使用默认运行时配置创建上下文
    pub fn new(runtime: R) -> Self {
        Self::with_config(runtime, RuntimeConfig::default())
    }

    pub fn with_config(runtime: R, config: RuntimeConfig) -> Self {
        Self {
            runtime,
            config,
            started: AtomicBool::new(false),
            device_open: AtomicBool::new(false),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_device_open(&self) -> bool {
        self.device_open.load(Ordering::Acquire)
    }

    /// 启动运行时（幂等）
    pub fn start(&self) -> BridgeResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(target: "sensehat::runtime", "Starting embedded runtime");
        self.runtime.initialize().map_err(|fault| {
            self.started.store(false, Ordering::Release);
            translate_fault("initialize runtime", fault)
        })
    }

    /// 关闭运行时（幂等）
    pub fn shutdown(&self) -> BridgeResult<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if !self.config.finalize_on_close {
            tracing::debug!(target: "sensehat::runtime", "Leaving embedded runtime running");
            return Ok(());
        }
        tracing::debug!(target: "sensehat::runtime", "Finalizing embedded runtime");
        self.runtime
            .finalize()
            .map_err(|fault| translate_fault("finalize runtime", fault))
    }

    pub(crate) fn claim_device(&self) -> BridgeResult<()> {
        self.device_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BridgeError::AlreadyOpen)
    }

    pub(crate) fn release_device(&self) {
        self.device_open.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::simulated::SimulatedRuntime;

    #[test]
    fn test_start_and_shutdown_are_idempotent() {
        let runtime = SimulatedRuntime::new();
        let board = runtime.board();
        let context = RuntimeContext::new(runtime);

        context.start().unwrap();
        context.start().unwrap();
        assert_eq!(board.initialize_count(), 1);

        context.shutdown().unwrap();
        context.shutdown().unwrap();
        assert_eq!(board.finalize_count(), 1);
        assert!(!board.is_initialized());
    }

    #[test]
    fn test_failed_start_can_be_retried() {
        let runtime = SimulatedRuntime::new().with_failing_initialize();
        let board = runtime.board();
        let context = RuntimeContext::new(runtime);

        let err = context.start().unwrap_err();
        assert_eq!(err.status_code(), -1);
        assert!(!context.is_started());

        board.set_failing_initialize(false);
        context.start().unwrap();
        assert!(context.is_started());
    }

    #[test]
    fn test_keep_running_on_close() {
        let runtime = SimulatedRuntime::new();
        let board = runtime.board();
        let config = RuntimeConfig {
            finalize_on_close: false,
            ..RuntimeConfig::default()
        };
        let context = RuntimeContext::with_config(runtime, config);

        context.start().unwrap();
        context.shutdown().unwrap();
        assert!(board.is_initialized());
        assert!(!context.is_started());
    }

    #[test]
    fn test_single_device_claim() {
        let context = RuntimeContext::new(SimulatedRuntime::new());
        context.claim_device().unwrap();
        assert!(matches!(
            context.claim_device(),
            Err(BridgeError::AlreadyOpen)
        ));
        context.release_device();
        context.claim_device().unwrap();
    }
}
