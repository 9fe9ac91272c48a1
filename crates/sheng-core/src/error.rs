//! 统一错误类型定义.
//!
//! 所有 Sheng crate 共用的错误类型, 支持跨模块传播.
//!
//! 注意: "包内比特耗尽" (end of packet) 不是错误 —— 它是音频包解码热路径上的
//! 常态, 由比特读取器的 EOP 标志与码本标量解码的 `None` 哨兵值承载.

use thiserror::Error;

/// Sheng 解码器统一错误类型
#[derive(Debug, Error)]
pub enum ShengError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 无效数据 (损坏的码流、非法头包等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// Ogg 页面 CRC 校验失败
    #[error("Ogg 页面 CRC 校验失败: 读取=0x{stored:08X}, 计算=0x{computed:08X}")]
    CrcMismatch {
        /// 页面头中存储的 CRC
        stored: u32,
        /// 按 CRC 字段置零重新计算得到的 CRC
        computed: u32,
    },

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾 (正常状态, 不代表数据损坏)
    #[error("已到达流末尾")]
    Eof,

    /// 请求超出有效范围 (非法流索引、seek 越界等)
    #[error("请求越界: {0}")]
    OutOfRange(String),

    /// 对象已释放
    #[error("对象已释放")]
    Disposed,

    /// 协作锁被其他持有者占用
    #[error("协作锁冲突: {0}")]
    SynchronizationLock(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Sheng 解码器统一 Result 类型
pub type ShengResult<T> = Result<T, ShengError>;
