//! # sheng-format
//!
//! Sheng 解码器容器层, 提供 Ogg 位流 (RFC 3533) 的页面解析、CRC 校验、
//! 损坏重同步、跨页包重组与按 granule 的 seek 索引.
//!
//! 数据自下而上流动: 字节源 -> 缓冲读取器 -> 页面读取器 -> 逐流包读取器.

pub mod demux;
pub mod io;

// 重导出常用类型
pub use demux::{OggPage, PacketReader, PageReader};
pub use io::{IoBackend, IoContext, MemoryBackend};
