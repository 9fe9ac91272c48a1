//! 逻辑数据包 (Packet).
//!
//! 表示从 Ogg 容器中重组出的一个完整逻辑包. 一个包可能跨越多个页面;
//! 重组由容器层完成, 解码器拿到的始终是连续的字节序列.

use bytes::Bytes;
use sheng_core::NO_GRANULE;

/// 逻辑数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 包数据 (已跨页重组)
    pub data: Bytes,
    /// 所属逻辑流的序列号
    pub serial: u32,
    /// 完成页的 granule position, [`NO_GRANULE`] 表示该包不是其页面的
    /// 最后一个完成包
    pub granule_position: i64,
    /// 完成页的页面序号
    pub page_sequence: u32,
    /// 该包是否出现在一次重同步之后的首个页面上
    pub is_resync: bool,
    /// 该包是否为所属逻辑流的最后一个包 (EOS 页面的最后完成包)
    pub is_end_of_stream: bool,
    /// 完成页在容器中的字节偏移量 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            serial: 0,
            granule_position: NO_GRANULE,
            page_sequence: 0,
            is_resync: false,
            is_end_of_stream: false,
            pos: -1,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
