//! # sheng-codec
//!
//! Sheng 解码器编解码库, 提供 Vorbis I 音频包到 PCM 的完整解码链路.
//!
//! 解码器直接消费从容器层 (sheng-format) 重组出的逻辑包 [`Packet`],
//! 经 setup 解析、floor/residue 解码、逆耦合、IMDCT 与重叠相加,
//! 输出交错的 32 位浮点 PCM 样本.

pub mod decoders;
pub mod packet;

// 重导出常用类型
pub use decoders::vorbis::{CommentHeader, IdentHeader, VorbisDecoder};
pub use packet::Packet;
