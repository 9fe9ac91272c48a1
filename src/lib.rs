//! # Sheng (笙)
//!
//! 纯 Rust 实现的拉取式 Ogg/Vorbis 音频解码器.
//!
//! Sheng 消费可寻址或流式的字节源, 从多路复用 (链式或并发) 的 Ogg
//! 容器中选取一条 Vorbis I 逻辑流, 产出交错的 32 位浮点 PCM 样本.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use sheng::OggVorbisReader;
//!
//! let mut reader = OggVorbisReader::open_file("input.ogg").expect("打开失败");
//! println!("采样率: {} Hz, 声道: {}", reader.sample_rate(), reader.channels());
//!
//! let mut buf = vec![0.0f32; 4096];
//! loop {
//!     let n = reader.read_samples(&mut buf).expect("解码失败");
//!     if n == 0 {
//!         break;
//!     }
//!     // 使用 buf[..n] 中的交错样本
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `sheng-core` | 错误类型、CRC、granule 工具 |
//! | `sheng-codec` | Vorbis I 音频包解码 |
//! | `sheng-format` | Ogg 页面解析、包重组与 seek 索引 |

/// 核心类型与工具
pub use sheng_core as core;

/// 编解码层
pub use sheng_codec as codec;

/// 容器层
pub use sheng_format as format;

pub mod logging;
pub mod reader;

pub use reader::{OggVorbisReader, ReaderConfig, ReaderStats};
pub use sheng_core::{ShengError, ShengResult};

/// 获取 Sheng 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
