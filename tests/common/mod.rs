//! 集成测试共用工具: LSB-first 比特写入器、Ogg 页面组装与
//! 手工构造的最小 Vorbis 流 (头包 + 音频包).
#![allow(dead_code)]

use sheng::core::crc;

/// 页面头部标志
pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_BOS: u8 = 0x02;
pub const FLAG_EOS: u8 = 0x04;

/// LSB-first 比特写入器, 与解码器的位序约定对称
pub struct BitWriter {
    pub bytes: Vec<u8>,
    bit: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bit: 0,
        }
    }

    /// LSB-first 写入 n 比特
    pub fn write_bits(&mut self, value: u32, n: u8) {
        for i in 0..n {
            if self.bit % 8 == 0 {
                self.bytes.push(0);
            }
            let b = ((value >> i) & 1) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= b << (self.bit % 8);
            self.bit += 1;
        }
    }

    /// 按规范 Huffman 码字的位序 (MSB 在前) 写入
    pub fn write_code(&mut self, code: u32, len: u8) {
        for i in (0..len).rev() {
            self.write_bits((code >> i) & 1, 1);
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Vorbis 打包浮点: mantissa * 2^(exp-788), 此处只需非负整数值
pub fn vorbis_float(mantissa: u32) -> u32 {
    788u32 << 21 | mantissa
}

/// 构建一个含正确 CRC 的 Ogg 页面 (单 packet)
pub fn build_page(
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

/// identification 头包: 单声道, block0=256, block1=2048
pub fn ident_packet(sample_rate: u32) -> Vec<u8> {
    let mut v = Vec::new();
    v.push(0x01);
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&0u32.to_le_bytes());
    v.push(1); // channels
    v.extend_from_slice(&sample_rate.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.push((11 << 4) | 8); // block0 = 2^8, block1 = 2^11
    v.push(1);
    v
}

/// comment 头包: 空注释表
pub fn comment_packet() -> Vec<u8> {
    let mut v = Vec::new();
    v.push(0x03);
    v.extend_from_slice(b"vorbis");
    let vendor = b"sheng-test";
    v.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    v.extend_from_slice(vendor);
    v.extend_from_slice(&0u32.to_le_bytes());
    v.push(1);
    v
}

/// 最小 setup: 一个无查找表的码本, floor1 (无分区), 空区间 residue,
/// 单 submap mapping, 一个长块 mode. 音频包全部静默.
pub fn silent_setup_packet() -> Vec<u8> {
    let mut w = BitWriter::new();
    // 1 个码本
    w.write_bits(0, 8);
    write_scalar_codebook(&mut w);
    // time 占位
    w.write_bits(0, 6);
    w.write_bits(0, 16);
    // 1 个 floor1
    w.write_bits(0, 6);
    write_minimal_floor1(&mut w);
    // 1 个 residue: type 1, 区间 [0, 0), 无码本
    w.write_bits(0, 6);
    w.write_bits(1, 16); // type 1
    w.write_bits(0, 24); // begin
    w.write_bits(0, 24); // end
    w.write_bits(3, 24); // partition_size - 1
    w.write_bits(0, 6); // classifications - 1
    w.write_bits(0, 8); // classbook
    w.write_bits(0, 3); // cascade low
    w.write_bits(0, 1); // cascade high flag
    // 1 个 mapping + 1 个 mode
    write_single_mapping_and_mode(&mut w);
    wrap_setup(w)
}

/// 带实际 VQ 残差的 setup: 码本 0 为分类码本, 码本 1 携带 lookup1
/// 查找表; residue type 1 覆盖 [0, 64), 分区大小 4.
pub fn audible_setup_packet() -> Vec<u8> {
    let mut w = BitWriter::new();
    // 2 个码本
    w.write_bits(1, 8);
    write_scalar_codebook(&mut w);
    write_vq_codebook(&mut w);
    // time 占位
    w.write_bits(0, 6);
    w.write_bits(0, 16);
    // 1 个 floor1
    w.write_bits(0, 6);
    write_minimal_floor1(&mut w);
    // 1 个 residue: type 1, 区间 [0, 64), 分区 4, pass 0 使用码本 1
    w.write_bits(0, 6);
    w.write_bits(1, 16); // type 1
    w.write_bits(0, 24); // begin
    w.write_bits(64, 24); // end
    w.write_bits(3, 24); // partition_size - 1 -> 4
    w.write_bits(0, 6); // classifications - 1 -> 1
    w.write_bits(0, 8); // classbook = 码本 0
    w.write_bits(1, 3); // cascade low: pass 0
    w.write_bits(0, 1); // cascade high flag
    w.write_bits(1, 8); // pass 0 的码本 = 码本 1
    // 1 个 mapping + 1 个 mode
    write_single_mapping_and_mode(&mut w);
    wrap_setup(w)
}

/// 码本: dims=1, entries=2, 长度 [1,1], 无查找表 (分类用)
fn write_scalar_codebook(w: &mut BitWriter) {
    w.write_bits(0x564342, 24);
    w.write_bits(1, 16); // dimensions
    w.write_bits(2, 24); // entries
    w.write_bits(0, 1); // ordered = false
    w.write_bits(0, 1); // sparse = false
    w.write_bits(0, 5); // len 1
    w.write_bits(0, 5); // len 1
    w.write_bits(0, 4); // lookup type 0
}

/// 码本: dims=2, entries=4, 长度 [2,2,2,2], lookup1 量化值 [0, 1]
fn write_vq_codebook(w: &mut BitWriter) {
    w.write_bits(0x564342, 24);
    w.write_bits(2, 16); // dimensions
    w.write_bits(4, 24); // entries
    w.write_bits(0, 1); // ordered = false
    w.write_bits(0, 1); // sparse = false
    for _ in 0..4 {
        w.write_bits(1, 5); // len 2
    }
    w.write_bits(1, 4); // lookup type 1
    w.write_bits(vorbis_float(0), 32); // min = 0.0
    w.write_bits(vorbis_float(1), 32); // delta = 1.0
    w.write_bits(0, 4); // value_bits = 1
    w.write_bits(0, 1); // sequence_p = false
    w.write_bits(0, 1); // 量化值 0
    w.write_bits(1, 1); // 量化值 1
}

/// floor1: 无分区, multiplier=1, rangebits=6 (x_list = [0, 64])
fn write_minimal_floor1(w: &mut BitWriter) {
    w.write_bits(1, 16); // floor type 1
    w.write_bits(0, 5); // partitions = 0
    w.write_bits(0, 2); // multiplier - 1 -> 1 (range 256)
    w.write_bits(6, 4); // rangebits
}

fn write_single_mapping_and_mode(w: &mut BitWriter) {
    // mapping 0: 单 submap, 无耦合
    w.write_bits(0, 6);
    w.write_bits(0, 16); // mapping type 0
    w.write_bits(0, 1); // submaps flag
    w.write_bits(0, 1); // coupling flag
    w.write_bits(0, 2); // reserved
    w.write_bits(0, 8); // time submap
    w.write_bits(0, 8); // floor 0
    w.write_bits(0, 8); // residue 0
    // mode 0: 长块
    w.write_bits(0, 6);
    w.write_bits(1, 1); // block flag = long
    w.write_bits(0, 16); // window type
    w.write_bits(0, 16); // transform type
    w.write_bits(0, 8); // mapping 0
    // framing
    w.write_bits(1, 1);
}

fn wrap_setup(w: BitWriter) -> Vec<u8> {
    let mut v = Vec::new();
    v.push(0x05);
    v.extend_from_slice(b"vorbis");
    v.extend_from_slice(&w.finish());
    v
}

/// 静默音频包: floor 未使用, 整块为零
pub fn silent_audio_packet() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 1); // 音频包
    // mode 索引 0 比特 (只有一个 mode)
    w.write_bits(1, 1); // prev window flag
    w.write_bits(1, 1); // next window flag
    w.write_bits(0, 1); // floor nonzero = false
    w.finish()
}

/// 有声音频包: 平坦 floor 曲线, 残差由 seed 决定的 VQ 向量填充
pub fn audible_audio_packet(seed: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 1); // 音频包
    w.write_bits(1, 1); // prev window flag
    w.write_bits(1, 1); // next window flag
    w.write_bits(1, 1); // floor nonzero
    w.write_bits(200, 8); // y0
    w.write_bits(200, 8); // y1
    // 16 个分区, 每个: 1 比特分类码字 + 2 个 VQ 码字 (各 2 比特)
    for p in 0..16u32 {
        w.write_code(0, 1); // 分类 (码本 0, 条目 0)
        let e0 = (seed.wrapping_add(p * 7)) % 4;
        let e1 = (seed.wrapping_add(p * 13 + 1)) % 4;
        w.write_code(e0, 2);
        w.write_code(e1, 2);
    }
    w.finish()
}

/// 把 header 三连 + 音频包序列封装成单流 Ogg 容器.
///
/// 每个音频包独占一页; 页面 granule 为该包完成后的累计样本数
/// (长块流: 第 a 个音频包对应 a * 1024).
pub fn build_stream(
    serial: u32,
    sample_rate: u32,
    setup: &[u8],
    audio_packets: &[Vec<u8>],
    first_seq: u32,
) -> Vec<u8> {
    let mut data = Vec::new();
    let mut seq = first_seq;
    data.extend_from_slice(&build_page(
        FLAG_BOS,
        0,
        serial,
        seq,
        &ident_packet(sample_rate),
    ));
    seq += 1;
    data.extend_from_slice(&build_page(0, 0, serial, seq, &comment_packet()));
    seq += 1;
    data.extend_from_slice(&build_page(0, 0, serial, seq, setup));
    seq += 1;

    for (a, packet) in audio_packets.iter().enumerate() {
        let granule = (a as i64) * 1024;
        let flags = if a + 1 == audio_packets.len() {
            FLAG_EOS
        } else {
            0
        };
        data.extend_from_slice(&build_page(flags, granule, serial, seq, packet));
        seq += 1;
    }
    data
}

/// 打开内存中的 Ogg 容器
pub fn open_reader(data: Vec<u8>) -> sheng::OggVorbisReader {
    let backend = sheng::format::MemoryBackend::from_data(data);
    sheng::OggVorbisReader::open(Box::new(backend), sheng::ReaderConfig::default())
        .expect("打开合成流失败")
}

/// 读尽所有样本
pub fn read_all(reader: &mut sheng::OggVorbisReader) -> Vec<f32> {
    let mut out = Vec::new();
    let mut buf = vec![0.0f32; 2048];
    loop {
        let n = reader.read_samples(&mut buf).expect("读取样本失败");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}
