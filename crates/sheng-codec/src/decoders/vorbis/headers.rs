//! Vorbis identification / comment 头包解析.

use sheng_core::{ShengError, ShengResult};

/// identification 头包携带的流参数
#[derive(Debug, Clone)]
pub struct IdentHeader {
    /// 声道数
    pub channels: u8,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 最大比特率 (0 表示未指定)
    pub bitrate_maximum: i32,
    /// 标称比特率
    pub bitrate_nominal: i32,
    /// 最小比特率
    pub bitrate_minimum: i32,
    /// 短块长 (2^n, 6 <= n <= 13)
    pub blocksize0: u16,
    /// 长块长 (2^m, n <= m <= 13)
    pub blocksize1: u16,
}

/// comment 头包: vendor 字符串与 key=value 注释表
#[derive(Debug, Clone, Default)]
pub struct CommentHeader {
    /// 编码器 vendor 字符串
    pub vendor: String,
    /// (key, value) 注释对, 保留原始顺序
    pub comments: Vec<(String, String)>,
}

/// 解析 identification 头包 (固定 30 字节)
pub(crate) fn parse_identification(packet: &[u8]) -> ShengResult<IdentHeader> {
    if packet.len() < 30 {
        return Err(ShengError::InvalidData(format!(
            "Vorbis identification 头包长度不足: {}",
            packet.len(),
        )));
    }
    if packet[0] != 0x01 || &packet[1..7] != b"vorbis" {
        return Err(ShengError::InvalidData(
            "Vorbis identification 头包标识无效".into(),
        ));
    }

    let version = u32::from_le_bytes([packet[7], packet[8], packet[9], packet[10]]);
    if version != 0 {
        return Err(ShengError::InvalidData(format!(
            "Vorbis 版本不支持: {version}",
        )));
    }

    let channels = packet[11];
    if channels == 0 {
        return Err(ShengError::InvalidData("Vorbis 声道数不能为 0".into()));
    }

    let sample_rate = u32::from_le_bytes([packet[12], packet[13], packet[14], packet[15]]);
    if sample_rate == 0 {
        return Err(ShengError::InvalidData("Vorbis 采样率不能为 0".into()));
    }

    let bitrate_maximum = i32::from_le_bytes([packet[16], packet[17], packet[18], packet[19]]);
    let bitrate_nominal = i32::from_le_bytes([packet[20], packet[21], packet[22], packet[23]]);
    let bitrate_minimum = i32::from_le_bytes([packet[24], packet[25], packet[26], packet[27]]);

    let bs = packet[28];
    let bs0_exp = bs & 0x0F;
    let bs1_exp = bs >> 4;
    if !(6..=13).contains(&bs0_exp) || bs1_exp < bs0_exp || bs1_exp > 13 {
        return Err(ShengError::InvalidData(format!(
            "Vorbis blocksize 非法: bs0_exp={bs0_exp}, bs1_exp={bs1_exp}",
        )));
    }

    if packet[29] & 0x01 == 0 {
        return Err(ShengError::InvalidData(
            "Vorbis identification 头包 framing_flag 非法".into(),
        ));
    }

    Ok(IdentHeader {
        channels,
        sample_rate,
        bitrate_maximum,
        bitrate_nominal,
        bitrate_minimum,
        blocksize0: 1u16 << bs0_exp,
        blocksize1: 1u16 << bs1_exp,
    })
}

/// 解析 comment 头包, 保留 vendor 与注释表
pub(crate) fn parse_comment(packet: &[u8]) -> ShengResult<CommentHeader> {
    if packet.len() < 8 {
        return Err(ShengError::InvalidData("Vorbis comment 头包长度不足".into()));
    }
    if packet[0] != 0x03 || &packet[1..7] != b"vorbis" {
        return Err(ShengError::InvalidData("Vorbis comment 头包标识无效".into()));
    }

    let mut pos = 7usize;
    let vendor_len = read_le_u32(packet, &mut pos)? as usize;
    ensure_left(packet, pos, vendor_len, "Vorbis vendor 字段")?;
    let vendor = String::from_utf8_lossy(&packet[pos..pos + vendor_len]).into_owned();
    pos += vendor_len;

    let comment_count = read_le_u32(packet, &mut pos)? as usize;
    let mut comments = Vec::new();
    for _ in 0..comment_count {
        let comment_len = read_le_u32(packet, &mut pos)? as usize;
        ensure_left(packet, pos, comment_len, "Vorbis comment 项")?;
        let raw = String::from_utf8_lossy(&packet[pos..pos + comment_len]);
        pos += comment_len;
        // key=value; 无 '=' 的条目整体作为 key 保留
        match raw.split_once('=') {
            Some((key, value)) => comments.push((key.to_string(), value.to_string())),
            None => comments.push((raw.into_owned(), String::new())),
        }
    }

    ensure_left(packet, pos, 1, "Vorbis comment framing_flag")?;
    if packet[pos] & 0x01 == 0 {
        return Err(ShengError::InvalidData(
            "Vorbis comment 头包 framing_flag 非法".into(),
        ));
    }

    Ok(CommentHeader { vendor, comments })
}

fn ensure_left(data: &[u8], pos: usize, need: usize, what: &str) -> ShengResult<()> {
    if pos.saturating_add(need) > data.len() {
        return Err(ShengError::InvalidData(format!(
            "{} 读取越界: pos={}, need={}, len={}",
            what,
            pos,
            need,
            data.len(),
        )));
    }
    Ok(())
}

fn read_le_u32(data: &[u8], pos: &mut usize) -> ShengResult<u32> {
    ensure_left(data, *pos, 4, "Vorbis u32")?;
    let v = u32::from_le_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Ok(v)
}
