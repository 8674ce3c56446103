//! 核心宏定义
//!
//! 提供统一的宏来减少代码重复

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use sense_hat_bridge::impl_default;
///
/// struct Probe {
///     module: String,
///     retries: u32,
/// }
///
/// impl_default!(Probe {
///     module: "sense_hat".to_string(),
///     retries: 0,
/// });
///
/// assert_eq!(Probe::default().module, "sense_hat");
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
