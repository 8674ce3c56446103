//! 设备打开与关闭

use super::handle::DeviceHandle;
use crate::core::{BridgeError, BridgeResult};
use crate::scripting::{EmbeddedRuntime, RuntimeContext};
use std::sync::Arc;

/// 已打开的 Sense HAT 设备
///
/// 持有运行时上下文与全部运行时引用。`close` 或析构时按逆序释放引用并关闭运行时。
pub struct SenseHat<R: EmbeddedRuntime> {
    pub(super) context: Arc<RuntimeContext<R>>,
    pub(super) handle: Option<DeviceHandle<R::Object>>,
}

impl<R: EmbeddedRuntime> SenseHat<R> {
    /// 打开设备
    ///
    /// 要么完全成功，要么不留下任何状态：失败时释放已获取的引用、关闭运行时并归还设备槽位。
    pub fn open(context: Arc<RuntimeContext<R>>) -> BridgeResult<Self> {
        context.claim_device()?;

        if let Err(err) = context.start() {
            context.release_device();
            return Err(err);
        }

        let mut handle = DeviceHandle::empty();
        let populated = context.runtime().with_lock(|session| {
            let result = handle.populate(session, context.config());
            if result.is_err() {
                if let Err(release_err) = handle.release_all(session) {
                    tracing::warn!(
                        target: "sensehat",
                        "Cleanup after failed open was incomplete: {}",
                        release_err
                    );
                }
            }
            result
        });

        if let Err(err) = populated {
            tracing::error!(target: "sensehat", "Failed to open Sense HAT: {}", err);
            if let Err(shutdown_err) = context.shutdown() {
                tracing::warn!(target: "sensehat", "Runtime shutdown failed: {}", shutdown_err);
            }
            context.release_device();
            return Err(err);
        }

        tracing::info!(
            target: "sensehat",
            "Sense HAT opened via module '{}'",
            context.config().module_name
        );
        Ok(Self {
            context,
            handle: Some(handle),
        })
    }

    /// 关闭设备
    ///
    /// 所有释放步骤都会执行；返回遇到的第一个错误。
    pub fn close(mut self) -> BridgeResult<()> {
        self.teardown()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn context(&self) -> &Arc<RuntimeContext<R>> {
        &self.context
    }

    pub(super) fn handle(&self) -> BridgeResult<&DeviceHandle<R::Object>> {
        self.handle
            .as_ref()
            .ok_or_else(|| BridgeError::invalid_argument("device is closed"))
    }

    fn teardown(&mut self) -> BridgeResult<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        let released = self
            .context
            .runtime()
            .with_lock(|session| handle.release_all(session));
        let shutdown = self.context.shutdown();
        self.context.release_device();

        if let Err(err) = &released {
            tracing::warn!(target: "sensehat", "Releasing runtime references failed: {}", err);
        }
        if let Err(err) = &shutdown {
            tracing::warn!(target: "sensehat", "Runtime shutdown failed: {}", err);
        }
        tracing::info!(target: "sensehat", "Sense HAT closed");
        released.and(shutdown)
    }
}

impl<R: EmbeddedRuntime> Drop for SenseHat<R> {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(target: "sensehat", "Error while dropping Sense HAT: {}", err);
        }
    }
}
