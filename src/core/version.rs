//! 库版本

/// 版本号编码：`0xMMMMmmpp`（主版本占高 16 位）
pub const VERSION: u32 = 0x0000_0100;

/// 编码后的库版本（0.1.0）
pub fn version() -> u32 {
    VERSION
}

/// 点分形式的版本字符串
pub fn version_string() -> String {
    format_version(VERSION)
}

fn format_version(encoded: u32) -> String {
    format!(
        "{}.{}.{}",
        encoded >> 16,
        (encoded >> 8) & 0xFF,
        encoded & 0xFF
    )
}
