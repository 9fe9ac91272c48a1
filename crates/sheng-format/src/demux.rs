//! Ogg 容器解析.
//!
//! # Ogg 页面结构
//! ```text
//! Capture pattern: "OggS" (4 bytes)
//! Version:         1 byte (always 0)
//! Header type:     1 byte (flags: continued=0x01, BOS=0x02, EOS=0x04)
//! Granule pos:     8 bytes (little-endian, codec-specific)
//! Serial number:   4 bytes (identifies logical stream)
//! Page seq no:     4 bytes
//! CRC checksum:    4 bytes (CRC 字段按 0 参与计算)
//! Num segments:    1 byte
//! Segment table:   N bytes (each 1 byte, packet sizes)
//! Page data:       sum(segment_table) bytes
//! ```
//!
//! 段表中一串 255 段后跟一个 <255 的终止段构成一个完整 packet;
//! 页面以 255 段结尾时最后的 packet 跨页续延.
//!
//! 页面读取严格顺序推进: 每解析成功一页, `next_page_offset` 前移到页尾.
//! 解析失败 (坏版本/坏 CRC/截断) 时按字节步进重新搜索同步字, 每跳过一
//! 字节 waste 计数加 8 比特, 搜索窗口至多 65536 字节.

use std::collections::VecDeque;

use bytes::Bytes;
use log::debug;
use sheng_codec::Packet;
use sheng_core::{NO_GRANULE, ShengError, ShengResult, crc, granule};

use crate::io::IoContext;

/// Ogg 同步字 (capture pattern)
pub const OGG_SYNC: &[u8; 4] = b"OggS";

/// 页面头部标志
const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// 重同步搜索窗口上限 (字节)
const MAX_RESYNC_SCAN: u64 = 65536;

/// 页面读取器的锁持有者令牌
const PAGE_LOCK_HOLDER: u64 = 0x5348_4E47;

/// 已解析并通过 CRC 校验的 Ogg 页面
pub struct OggPage {
    /// 头部标志
    pub header_type: u8,
    /// granule position
    pub granule_position: i64,
    /// 逻辑流序列号
    pub serial: u32,
    /// 页面序号 (用于乱序/丢页检测)
    pub sequence: u32,
    /// 段表
    pub segment_table: Vec<u8>,
    /// 页面数据
    pub data: Bytes,
    /// 页面在容器中的起始偏移
    pub start_offset: u64,
    /// 定位本页时是否跳过了字节 (重同步)
    pub is_resync: bool,
}

impl OggPage {
    /// 是否为 BOS (beginning of stream) 页面
    pub fn is_bos(&self) -> bool {
        self.header_type & FLAG_BOS != 0
    }

    /// 是否为 EOS (end of stream) 页面
    pub fn is_eos(&self) -> bool {
        self.header_type & FLAG_EOS != 0
    }

    /// 是否为续延页面 (首段延续前页未完的 packet)
    pub fn is_continued(&self) -> bool {
        self.header_type & FLAG_CONTINUED != 0
    }

    /// 最后一段是否为整 255 段 (packet 跨页)
    pub fn last_segment_full(&self) -> bool {
        self.segment_table.last() == Some(&255)
    }

    /// 页面总长 (头 + 段表 + 数据)
    pub fn page_len(&self) -> u64 {
        27 + self.segment_table.len() as u64 + self.data.len() as u64
    }

    /// 从段表中提取 packet 片段边界.
    ///
    /// 返回 (offset, length, is_complete) 列表.
    pub fn packet_bounds(&self) -> Vec<(usize, usize, bool)> {
        let mut bounds = Vec::new();
        let mut offset = 0usize;
        let mut current_len = 0usize;

        for &seg_size in &self.segment_table {
            current_len += seg_size as usize;
            if seg_size < 255 {
                bounds.push((offset, current_len, true));
                offset += current_len;
                current_len = 0;
            }
        }

        // 最后一段是 255: packet 未完成, 跨页续延
        if current_len > 0 {
            bounds.push((offset, current_len, false));
        }

        bounds
    }
}

enum ParseOutcome {
    Page(OggPage),
    /// 坏版本或坏 CRC, 从下一个字节继续搜索
    Bad,
    /// 页面在文件尾被截断
    Truncated,
}

/// Ogg 页面读取器
///
/// 顺序扫描容器, 校验 CRC, 在损坏处按字节重同步并计数浪费比特.
pub struct PageReader {
    io: IoContext,
    next_page_offset: u64,
    waste_bits: u64,
    container_bits: u64,
    eof: bool,
}

impl PageReader {
    pub fn new(io: IoContext) -> Self {
        Self {
            io,
            next_page_offset: 0,
            waste_bits: 0,
            container_bits: 0,
            eof: false,
        }
    }

    /// 底层 I/O 上下文
    pub fn io_mut(&mut self) -> &mut IoContext {
        &mut self.io
    }

    /// 因损坏而跳过的比特总数
    pub fn waste_bits(&self) -> u64 {
        self.waste_bits
    }

    /// 容器开销 (页面头与段表) 比特总数
    pub fn container_bits(&self) -> u64 {
        self.container_bits
    }

    /// 将读取位置重定位到指定偏移 (seek 用)
    pub fn seek_to_offset(&mut self, offset: u64) {
        self.next_page_offset = offset;
        self.eof = false;
    }

    /// 解析下一个有效页面; 容器耗尽或重同步窗口耗尽返回 None
    pub fn next_page(&mut self) -> ShengResult<Option<OggPage>> {
        self.io.take_lock(PAGE_LOCK_HOLDER)?;
        let result = self.scan_next_page();
        self.io.release_lock(PAGE_LOCK_HOLDER)?;
        result
    }

    fn scan_next_page(&mut self) -> ShengResult<Option<OggPage>> {
        if self.eof {
            return Ok(None);
        }
        let mut pos = self.next_page_offset;
        let mut skipped = 0u64;
        loop {
            if skipped > MAX_RESYNC_SCAN {
                // 搜索窗口耗尽: 硬性扫描终止
                debug!("Ogg 重同步超过 {MAX_RESYNC_SCAN} 字节, 终止扫描");
                self.eof = true;
                return Ok(None);
            }

            let mut sync = [0u8; 4];
            if self.io.read_at(pos, &mut sync)? < 4 {
                self.eof = true;
                return Ok(None);
            }
            if &sync != OGG_SYNC {
                pos += 1;
                skipped += 1;
                self.waste_bits += 8;
                continue;
            }

            match self.try_parse_page(pos)? {
                ParseOutcome::Page(mut page) => {
                    page.is_resync = skipped > 0;
                    if page.is_resync {
                        debug!(
                            "Ogg 重同步: 跳过 {skipped} 字节后在偏移 {pos} 恢复 (serial={})",
                            page.serial,
                        );
                    }
                    self.container_bits += (27 + page.segment_table.len() as u64) * 8;
                    self.next_page_offset = pos + page.page_len();
                    return Ok(Some(page));
                }
                ParseOutcome::Bad => {
                    pos += 1;
                    skipped += 1;
                    self.waste_bits += 8;
                }
                ParseOutcome::Truncated => {
                    // 文件尾的残页: 残包随之丢弃, 作为干净的流结束处理
                    self.eof = true;
                    return Ok(None);
                }
            }
        }
    }

    fn try_parse_page(&mut self, pos: u64) -> ShengResult<ParseOutcome> {
        let mut header = [0u8; 27];
        if self.io.read_at(pos, &mut header)? < 27 {
            return Ok(ParseOutcome::Truncated);
        }
        if header[4] != 0 {
            return Ok(ParseOutcome::Bad);
        }

        let num_segments = header[26] as usize;
        let mut segment_table = vec![0u8; num_segments];
        if self.io.read_at(pos + 27, &mut segment_table)? < num_segments {
            return Ok(ParseOutcome::Truncated);
        }

        let data_len: usize = segment_table.iter().map(|&s| s as usize).sum();
        let mut data = vec![0u8; data_len];
        if self.io.read_at(pos + 27 + num_segments as u64, &mut data)? < data_len {
            return Ok(ParseOutcome::Truncated);
        }

        let stored_crc = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
        let mut crc_page = Vec::with_capacity(27 + num_segments + data_len);
        crc_page.extend_from_slice(&header[..22]);
        crc_page.extend_from_slice(&0u32.to_le_bytes());
        crc_page.push(header[26]);
        crc_page.extend_from_slice(&segment_table);
        crc_page.extend_from_slice(&data);
        let computed_crc = crc::ogg_crc32(&crc_page);
        if stored_crc != computed_crc {
            debug!(
                "{}",
                ShengError::CrcMismatch {
                    stored: stored_crc,
                    computed: computed_crc,
                },
            );
            return Ok(ParseOutcome::Bad);
        }

        let granule_position = i64::from_le_bytes([
            header[6], header[7], header[8], header[9], header[10], header[11], header[12],
            header[13],
        ]);
        let serial = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);
        let sequence = u32::from_le_bytes([header[18], header[19], header[20], header[21]]);

        Ok(ParseOutcome::Page(OggPage {
            header_type: header[5],
            granule_position,
            serial,
            sequence,
            segment_table,
            data: Bytes::from(data),
            start_offset: pos,
            is_resync: false,
        }))
    }
}

/// 逻辑流装配状态
struct LogicalStream {
    serial: u32,
    /// 累积的不完整 packet 数据
    partial: Vec<u8>,
    /// 正在丢弃无头续包 (缺少起始片段)
    discarding_orphan: bool,
    /// 上一个页面序号
    last_sequence: Option<u32>,
    /// 已遇到 EOS
    ended: bool,
    /// 已被调用方弃用, 后续页面直接丢弃
    ignored: bool,
}

/// granule -> 页面偏移的 seek 索引项
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry {
    pub serial: u32,
    pub granule: i64,
    pub offset: u64,
}

/// 逐流 packet 读取器
///
/// 驱动页面读取器, 按逻辑流重组跨页 packet, 维护 seek 索引.
pub struct PacketReader {
    pages: PageReader,
    streams: Vec<LogicalStream>,
    queue: VecDeque<Packet>,
    index: Vec<IndexEntry>,
}

impl PacketReader {
    pub fn new(pages: PageReader) -> Self {
        Self {
            pages,
            streams: Vec::new(),
            queue: VecDeque::new(),
            index: Vec::new(),
        }
    }

    /// 底层 I/O 上下文
    pub fn io_mut(&mut self) -> &mut IoContext {
        self.pages.io_mut()
    }

    /// 因损坏而跳过的比特总数
    pub fn waste_bits(&self) -> u64 {
        self.pages.waste_bits()
    }

    /// 容器开销比特总数
    pub fn container_bits(&self) -> u64 {
        self.pages.container_bits()
    }

    /// 字节源是否可随机访问
    pub fn is_seekable(&mut self) -> bool {
        self.pages.io_mut().is_seekable()
    }

    /// 取下一个重组完成的 packet; 容器耗尽返回 None.
    ///
    /// 内部反复拉取页面直至产出 packet, 这是唯一可能做无界工作的操作.
    pub fn next_packet(&mut self) -> ShengResult<Option<Packet>> {
        loop {
            if let Some(packet) = self.queue.pop_front() {
                return Ok(Some(packet));
            }
            match self.pages.next_page()? {
                Some(page) => self.dispatch(page),
                None => return Ok(None),
            }
        }
    }

    /// 非消耗性预读下一个 packet
    pub fn peek_next_packet(&mut self) -> ShengResult<Option<&Packet>> {
        while self.queue.is_empty() {
            match self.pages.next_page()? {
                Some(page) => self.dispatch(page),
                None => return Ok(None),
            }
        }
        Ok(self.queue.front())
    }

    /// 弃用一条逻辑流: 清空其装配状态与排队 packet, 丢弃后续页面
    pub fn ignore_stream(&mut self, serial: u32) {
        let idx = self.stream_index(serial);
        let stream = &mut self.streams[idx];
        stream.ignored = true;
        stream.partial = Vec::new();
        self.queue.retain(|p| p.serial != serial);
        debug!("Ogg 流 serial={serial} 已弃用");
    }

    /// 声明 packet 及其之前的字节范围不再回看, 允许缓冲读取器释放内存.
    ///
    /// 调用后无法再 seek 回该 packet 完成页之前的位置.
    pub fn release_through(&mut self, packet: &Packet) {
        if packet.pos >= 0 {
            self.pages.io_mut().discard_through(packet.pos as u64);
        }
    }

    /// 按 granule 定位: 找到目标流中 granule <= target 的最近页面,
    /// 将读取位置重置到该页, 清空装配状态.
    ///
    /// 返回 (锚点 granule, 页面偏移). 目标早于首个音频页时锚点为 0.
    pub fn seek_to_granule(&mut self, serial: u32, target: i64) -> ShengResult<(i64, u64)> {
        if !self.is_seekable() {
            return Err(ShengError::Unsupported(
                "不支持在非可寻址源上 seek".into(),
            ));
        }
        if target < 0 {
            return Err(ShengError::OutOfRange(format!(
                "seek 目标 granule 非法: {target}",
            )));
        }

        // 索引尚未覆盖目标时向前扫描补全 (仅索引, 不派发包)
        let covered = self
            .index
            .iter()
            .any(|e| e.serial == serial && e.granule >= target);
        if !covered {
            while let Some(page) = self.pages.next_page()? {
                self.index_page(&page);
                if page.serial == serial && page.granule_position >= target {
                    break;
                }
            }
        }

        let anchor = self
            .index
            .iter()
            .filter(|e| e.serial == serial && e.granule <= target)
            .max_by_key(|e| e.granule)
            .copied();
        let (anchor_granule, offset) = match anchor {
            Some(entry) => (entry.granule, entry.offset),
            // 目标早于首个已索引页: 从容器头解码
            None => (0, 0),
        };

        self.pages.seek_to_offset(offset);
        self.reset_assembly();
        debug!(
            "Ogg seek: serial={serial}, target={target}, 锚点 granule={anchor_granule}, 偏移={offset}",
        );
        Ok((anchor_granule, offset))
    }

    fn reset_assembly(&mut self) {
        self.queue.clear();
        for stream in &mut self.streams {
            stream.partial.clear();
            stream.discarding_orphan = false;
            stream.last_sequence = None;
            stream.ended = false;
        }
    }

    fn stream_index(&mut self, serial: u32) -> usize {
        if let Some(idx) = self.streams.iter().position(|s| s.serial == serial) {
            return idx;
        }
        self.streams.push(LogicalStream {
            serial,
            partial: Vec::new(),
            discarding_orphan: false,
            last_sequence: None,
            ended: false,
            ignored: false,
        });
        self.streams.len() - 1
    }

    fn index_page(&mut self, page: &OggPage) {
        // 只索引携带完成包的音频页 (granule >= 1, 跳过头包页)
        if page.granule_position < 1 || !page.packet_bounds().iter().any(|&(_, _, c)| c) {
            return;
        }
        let serial = page.serial;
        let exists = self
            .index
            .iter()
            .rev()
            .any(|e| e.serial == serial && e.offset == page.start_offset);
        if !exists {
            self.index.push(IndexEntry {
                serial,
                granule: page.granule_position,
                offset: page.start_offset,
            });
        }
    }

    /// 将一页的 packet 片段派发进装配状态, 完成的 packet 入队
    fn dispatch(&mut self, page: OggPage) {
        self.index_page(&page);

        let idx = self.stream_index(page.serial);
        if self.streams[idx].ignored {
            return;
        }

        // 运行中再次遇到 BOS 页: 逻辑流重启边界, 清掉装配状态
        if page.is_bos() && self.streams[idx].last_sequence.is_some() {
            let stream = &mut self.streams[idx];
            stream.partial.clear();
            stream.discarding_orphan = false;
            stream.ended = false;
        }

        if self.streams[idx].ended {
            return;
        }

        let bounds = page.packet_bounds();
        let last_complete = bounds.iter().rposition(|&(_, _, c)| c);

        // 页面序号断裂: 清理残包, 本页不传播 granule
        let mut force_no_granule = false;
        {
            let stream = &mut self.streams[idx];
            if let Some(prev) = stream.last_sequence
                && page.sequence != prev.wrapping_add(1)
            {
                stream.partial.clear();
                stream.discarding_orphan = page.is_continued();
                force_no_granule = true;
            }
            stream.last_sequence = Some(page.sequence);
        }

        let mut emitted = Vec::new();
        let mut first_emit_pending = page.is_resync;
        let mut emit = |emitted: &mut Vec<Packet>,
                        data: Vec<u8>,
                        fragment_idx: Option<usize>| {
            let at_last = fragment_idx.is_some() && fragment_idx == last_complete;
            let granule_position = if force_no_granule || !at_last {
                NO_GRANULE
            } else {
                granule::normalize(page.granule_position)
            };
            emitted.push(Packet {
                data: Bytes::from(data),
                serial: page.serial,
                granule_position,
                page_sequence: page.sequence,
                is_resync: std::mem::take(&mut first_emit_pending),
                is_end_of_stream: page.is_eos() && at_last,
                pos: page.start_offset as i64,
            });
        };

        {
            let stream = &mut self.streams[idx];

            // 未标记 continued 却有残留 partial:
            // 上一页以整 255 段结尾且包恰在页尾结束 (不规范的封装), 补发;
            // 或处于 orphan 丢弃状态, 清掉残片.
            if !page.is_continued() && !stream.partial.is_empty() {
                if stream.discarding_orphan {
                    debug!(
                        "Ogg 流 serial={} 结束 orphan 丢弃, 丢弃 {} 字节残片",
                        stream.serial,
                        stream.partial.len(),
                    );
                    stream.partial.clear();
                    stream.discarding_orphan = false;
                } else {
                    let data = std::mem::take(&mut stream.partial);
                    debug!(
                        "Ogg 流 serial={} 检测到页边界完整包, 补发 {} 字节",
                        stream.serial,
                        data.len(),
                    );
                    emit(&mut emitted, data, None);
                }
            }

            for (i, &(offset, length, complete)) in bounds.iter().enumerate() {
                let chunk = &page.data[offset..offset + length];

                if i == 0 && page.is_continued() {
                    if stream.partial.is_empty() {
                        // 缺少起始片段的续包, 整包丢弃
                        stream.discarding_orphan = !complete;
                        debug!(
                            "Ogg 流 serial={} 遇到无头续包, 丢弃片段 (len={length}, complete={complete})",
                            stream.serial,
                        );
                        continue;
                    }
                    stream.partial.extend_from_slice(chunk);
                    if complete {
                        let data = std::mem::take(&mut stream.partial);
                        stream.discarding_orphan = false;
                        emit(&mut emitted, data, Some(i));
                    }
                } else if complete {
                    if stream.discarding_orphan {
                        stream.discarding_orphan = false;
                        continue;
                    }
                    emit(&mut emitted, chunk.to_vec(), Some(i));
                } else {
                    if stream.discarding_orphan {
                        continue;
                    }
                    stream.partial.extend_from_slice(chunk);
                }
            }

            if page.is_eos() {
                stream.ended = true;
                debug!("Ogg 流 serial={} 结束", stream.serial);
            }
        }

        self.queue.extend(emitted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    fn make_page(segment_table: Vec<u8>, data_len: usize) -> OggPage {
        OggPage {
            header_type: 0,
            granule_position: 100,
            serial: 1,
            sequence: 0,
            segment_table,
            data: Bytes::from(vec![0u8; data_len]),
            start_offset: 0,
            is_resync: false,
        }
    }

    #[test]
    fn test_packet_bounds() {
        // 段表 [100, 50, 255, 200]:
        // 100 < 255 -> packet 1 完成 (100 字节)
        // 50 < 255 -> packet 2 完成 (50 字节)
        // 255 -> 累积; 200 < 255 -> packet 3 完成 (455 字节)
        let page = make_page(vec![100, 50, 255, 200], 100 + 50 + 255 + 200);
        let bounds = page.packet_bounds();
        assert_eq!(bounds.len(), 3);
        assert_eq!(bounds[0], (0, 100, true));
        assert_eq!(bounds[1], (100, 50, true));
        assert_eq!(bounds[2], (150, 455, true));

        // 段表以 255 结尾: 最后的 packet 未完成
        let page = make_page(vec![100, 255], 100 + 255);
        let bounds = page.packet_bounds();
        assert_eq!(bounds.len(), 2);
        assert_eq!(bounds[0], (0, 100, true));
        assert_eq!(bounds[1], (100, 255, false));
        assert!(page.last_segment_full());
    }

    /// 构建一个含正确 CRC 的 Ogg 页面
    fn build_ogg_page(
        header_type: u8,
        granule: i64,
        serial: u32,
        page_seq: u32,
        packet_data: &[u8],
    ) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&page_seq.to_le_bytes());
        let crc_offset = page.len();
        page.extend_from_slice(&0u32.to_le_bytes());

        let mut segments = Vec::new();
        let mut remaining = packet_data.len();
        while remaining >= 255 {
            segments.push(255u8);
            remaining -= 255;
        }
        segments.push(remaining as u8);

        page.push(segments.len() as u8);
        page.extend_from_slice(&segments);
        page.extend_from_slice(packet_data);

        let crc_value = crc::ogg_crc32(&page);
        page[crc_offset..crc_offset + 4].copy_from_slice(&crc_value.to_le_bytes());
        page
    }

    fn reader_over(data: Vec<u8>) -> PacketReader {
        let io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        PacketReader::new(PageReader::new(io))
    }

    #[test]
    fn test_页面解析与crc() {
        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[1, 2, 3]);
        data.extend_from_slice(&build_ogg_page(FLAG_EOS, 48, 7, 1, &[4, 5]));

        let io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let mut pages = PageReader::new(io);

        let p0 = pages.next_page().unwrap().expect("应解析出第一页");
        assert!(p0.is_bos());
        assert_eq!(p0.serial, 7);
        assert_eq!(&p0.data[..], &[1, 2, 3]);
        assert!(!p0.is_resync);

        let p1 = pages.next_page().unwrap().expect("应解析出第二页");
        assert!(p1.is_eos());
        assert_eq!(p1.granule_position, 48);

        assert!(pages.next_page().unwrap().is_none());
        assert_eq!(pages.waste_bits(), 0);
    }

    #[test]
    fn test_重同步计数与标记() {
        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[1]);
        // 两页之间注入 17 字节垃圾
        data.extend_from_slice(&[0xAB; 17]);
        data.extend_from_slice(&build_ogg_page(0, 48, 7, 1, &[2]));

        let io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let mut pages = PageReader::new(io);

        let p0 = pages.next_page().unwrap().unwrap();
        assert!(!p0.is_resync);
        let p1 = pages.next_page().unwrap().expect("垃圾后应恢复");
        assert!(p1.is_resync, "恢复页应带 is_resync 标记");
        assert_eq!(pages.waste_bits(), 17 * 8);
    }

    #[test]
    fn test_crc损坏页被跳过() {
        let mut corrupted = build_ogg_page(0, 48, 7, 1, &[2, 2, 2, 2]);
        let len = corrupted.len();
        corrupted[len - 1] ^= 0xFF; // 翻转包体字节

        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[1]);
        data.extend_from_slice(&corrupted);
        data.extend_from_slice(&build_ogg_page(0, 96, 7, 2, &[3]));

        let io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let mut pages = PageReader::new(io);

        let p0 = pages.next_page().unwrap().unwrap();
        assert_eq!(p0.sequence, 0);
        let p1 = pages.next_page().unwrap().expect("坏页后应恢复到下一页");
        assert_eq!(p1.sequence, 2, "坏页应被整页跳过");
        assert!(p1.is_resync);
        assert!(pages.waste_bits() > 0);
    }

    #[test]
    fn test_跨页包重组() {
        // 600 字节的 packet: 页 0 承载 510 字节 (255+255), 页 1 承载剩余 90
        let payload: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();

        let mut page0 = Vec::new();
        page0.extend_from_slice(b"OggS");
        page0.push(0);
        page0.push(FLAG_BOS);
        page0.extend_from_slice(&(-1i64).to_le_bytes());
        page0.extend_from_slice(&7u32.to_le_bytes());
        page0.extend_from_slice(&0u32.to_le_bytes());
        let crc_off0 = page0.len();
        page0.extend_from_slice(&0u32.to_le_bytes());
        page0.push(2);
        page0.extend_from_slice(&[255, 255]);
        page0.extend_from_slice(&payload[..510]);
        let c0 = crc::ogg_crc32(&page0);
        page0[crc_off0..crc_off0 + 4].copy_from_slice(&c0.to_le_bytes());

        let mut page1 = Vec::new();
        page1.extend_from_slice(b"OggS");
        page1.push(0);
        page1.push(FLAG_CONTINUED);
        page1.extend_from_slice(&128i64.to_le_bytes());
        page1.extend_from_slice(&7u32.to_le_bytes());
        page1.extend_from_slice(&1u32.to_le_bytes());
        let crc_off1 = page1.len();
        page1.extend_from_slice(&0u32.to_le_bytes());
        page1.push(1);
        page1.push(90);
        page1.extend_from_slice(&payload[510..]);
        let c1 = crc::ogg_crc32(&page1);
        page1[crc_off1..crc_off1 + 4].copy_from_slice(&c1.to_le_bytes());

        let mut data = page0;
        data.extend_from_slice(&page1);
        let mut reader = reader_over(data);

        let pkt = reader.next_packet().unwrap().expect("应重组出完整 packet");
        assert_eq!(&pkt.data[..], &payload[..], "重组字节应与原 packet 一致");
        assert_eq!(pkt.granule_position, 128, "granule 取完成页的值");
        assert!(reader.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_无头续包被丢弃() {
        // 第一页就标记 continued, 没有起始片段
        let mut page = build_ogg_page(FLAG_CONTINUED, 0, 7, 5, &[9, 9]);
        page.extend_from_slice(&build_ogg_page(0, 48, 7, 6, &[1]));
        let mut reader = reader_over(page);

        let pkt = reader.next_packet().unwrap().expect("应跳到下一个完整包");
        assert_eq!(&pkt.data[..], &[1]);
    }

    #[test]
    fn test_弃用流后丢弃其页面() {
        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[1]);
        data.extend_from_slice(&build_ogg_page(FLAG_BOS, 0, 9, 0, &[2]));
        data.extend_from_slice(&build_ogg_page(0, 48, 9, 1, &[3]));
        let mut reader = reader_over(data);

        reader.ignore_stream(9);
        let pkt = reader.next_packet().unwrap().unwrap();
        assert_eq!(pkt.serial, 7);
        assert!(reader.next_packet().unwrap().is_none(), "serial=9 的包应被丢弃");
    }

    #[test]
    fn test_granule索引与seek() {
        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[0x01]);
        data.extend_from_slice(&build_ogg_page(0, 256, 7, 1, &[0x10]));
        data.extend_from_slice(&build_ogg_page(0, 512, 7, 2, &[0x20]));
        data.extend_from_slice(&build_ogg_page(FLAG_EOS, 768, 7, 3, &[0x30]));
        let mut reader = reader_over(data);

        let (anchor, _) = reader.seek_to_granule(7, 600).unwrap();
        assert_eq!(anchor, 512, "锚点应为目标之前最近的页");
        let pkt = reader.next_packet().unwrap().unwrap();
        assert_eq!(&pkt.data[..], &[0x20], "seek 后应从锚点页读起");

        // 目标早于首个音频页: 锚点回落到容器头
        let (anchor, offset) = reader.seek_to_granule(7, 10).unwrap();
        assert_eq!((anchor, offset), (0, 0));
        let pkt = reader.next_packet().unwrap().unwrap();
        assert_eq!(&pkt.data[..], &[0x01]);
    }

    #[test]
    fn test_预读不消耗() {
        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[1, 2]);
        data.extend_from_slice(&build_ogg_page(FLAG_EOS, 48, 7, 1, &[3]));
        let mut reader = reader_over(data);

        let peeked = reader.peek_next_packet().unwrap().unwrap().data.clone();
        assert_eq!(&peeked[..], &[1, 2]);
        let pkt = reader.next_packet().unwrap().unwrap();
        assert_eq!(pkt.data, peeked, "peek 不应消耗 packet");
    }

    #[test]
    fn test_release_through后拒绝回读() {
        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[1]);
        data.extend_from_slice(&build_ogg_page(0, 48, 7, 1, &[2]));
        data.extend_from_slice(&build_ogg_page(FLAG_EOS, 96, 7, 2, &[3]));
        let mut reader = reader_over(data);

        reader.next_packet().unwrap().unwrap();
        let pkt = reader.next_packet().unwrap().unwrap();
        assert!(pkt.pos > 0);
        reader.release_through(&pkt);

        // 已释放前缀内的字节不可再读
        assert!(reader.io_mut().read_byte_at(0).is_err());
        // 释放点之后照常推进
        let last = reader.next_packet().unwrap().unwrap();
        assert_eq!(&last.data[..], &[3]);
    }

    #[test]
    fn test_eos标记在最后完成包上() {
        let mut data = build_ogg_page(FLAG_BOS, 0, 7, 0, &[1]);
        data.extend_from_slice(&build_ogg_page(FLAG_EOS, 48, 7, 1, &[2]));
        let mut reader = reader_over(data);

        let p0 = reader.next_packet().unwrap().unwrap();
        assert!(!p0.is_end_of_stream);
        let p1 = reader.next_packet().unwrap().unwrap();
        assert!(p1.is_end_of_stream);
    }
}
