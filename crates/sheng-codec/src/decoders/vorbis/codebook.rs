//! Vorbis 码本: 规范 Huffman 码字分配、加速查找表与 VQ 查找表.
//!
//! 码字分配使用逐层空闲前缀数组: 每个长度层至多保留一个空闲前缀,
//! 新码字取深度不超过自身长度的最深空闲前缀, 剩余前缀向更长层分裂.
//! 解码走两级: 长度不超过 [`PREFIX_BITS`] 的码字复制进直接查找表,
//! 更长的码字存放在按 (长度, 码字) 排序的溢出数组中线性探测.

use sheng_core::{ShengError, ShengResult};

use super::bitreader::{PacketBitReader, ilog};

/// 码本同步字
const CODEBOOK_SYNC: u32 = 0x56_43_42;

/// 直接查找表覆盖的最大码字长度
const PREFIX_BITS: u8 = 10;

/// 码字长度上限 (Vorbis 长度字段为 5 比特, 值域 1..=32)
const MAX_CODE_LEN: u8 = 32;

/// 直接查找表项; `value < 0` 表示空位
#[derive(Clone, Copy)]
struct PrefixEntry {
    value: i32,
    len: u8,
}

const VACANT: PrefixEntry = PrefixEntry { value: -1, len: 0 };

/// 溢出码字 (长度超过直接查找表宽度)
struct OverflowCode {
    /// LSB-first 排列的码字比特
    bits: u32,
    len: u8,
    value: u32,
}

/// VQ 查找表, setup 阶段展开为 entries x dimensions 的浮点表
struct VqLookup {
    dimensions: usize,
    table: Vec<f32>,
}

/// Vorbis 码本
pub(crate) struct Codebook {
    pub(crate) dimensions: usize,
    pub(crate) entries: usize,
    prefix_bits: u8,
    prefix_table: Vec<PrefixEntry>,
    overflow: Vec<OverflowCode>,
    max_len: u8,
    lookup: Option<VqLookup>,
}

impl Codebook {
    /// 从 setup 包中解析一个码本
    pub(crate) fn read(br: &mut PacketBitReader<'_>) -> ShengResult<Self> {
        let sync = br.read_bits(24);
        if sync != CODEBOOK_SYNC {
            return Err(ShengError::InvalidData(format!(
                "Vorbis codebook 同步字错误: 0x{sync:06X}",
            )));
        }

        let dimensions = br.read_bits(16) as usize;
        if dimensions == 0 {
            return Err(ShengError::InvalidData(
                "Vorbis codebook dimensions 不能为 0".into(),
            ));
        }

        let entries = br.read_bits(24) as usize;
        if entries == 0 {
            return Err(ShengError::InvalidData(
                "Vorbis codebook entries 不能为 0".into(),
            ));
        }

        let lengths = read_code_lengths(br, entries)?;
        let assigned = assign_codewords(&lengths)?;

        let max_len = assigned.iter().map(|c| c.2).max().unwrap_or(0);
        let prefix_bits = max_len.min(PREFIX_BITS);
        let mut prefix_table = vec![VACANT; 1usize << prefix_bits];
        let mut overflow = Vec::new();

        for &(entry, code, len) in &assigned {
            if len <= prefix_bits {
                // 对所有以该码字为低位的索引复制表项
                let mut idx = code as usize;
                let step = 1usize << len;
                while idx < prefix_table.len() {
                    prefix_table[idx] = PrefixEntry {
                        value: entry as i32,
                        len,
                    };
                    idx += step;
                }
            } else {
                overflow.push(OverflowCode {
                    bits: code,
                    len,
                    value: entry,
                });
            }
        }
        overflow.sort_by_key(|c| (c.len, c.bits));

        let lookup = VqLookup::read(br, entries, dimensions)?;

        if br.is_eop() {
            return Err(ShengError::InvalidData(
                "Vorbis codebook 数据在包尾被截断".into(),
            ));
        }

        Ok(Codebook {
            dimensions,
            entries,
            prefix_bits,
            prefix_table,
            overflow,
            max_len,
            lookup,
        })
    }

    /// 是否携带 VQ 查找表 (lookup type != 0)
    pub(crate) fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    /// 解码一个标量码字, 返回条目索引.
    ///
    /// 包尾耗尽或无法匹配任何码字时返回 `None`, 由调用方按零值处理.
    pub(crate) fn decode_scalar(&self, br: &mut PacketBitReader<'_>) -> Option<u32> {
        let (peek, avail) = br.try_peek_bits(self.prefix_bits);
        if avail == 0 {
            br.skip_bits(1);
            return None;
        }
        if !self.prefix_table.is_empty() {
            let entry = self.prefix_table[peek as usize];
            if entry.value >= 0 && entry.len <= avail {
                br.skip_bits(entry.len as usize);
                return Some(entry.value as u32);
            }
        }

        let (peek, avail) = br.try_peek_bits(self.max_len);
        for code in &self.overflow {
            let mask = (1u64 << code.len) - 1;
            if code.len <= avail && (peek & mask) as u32 == code.bits {
                br.skip_bits(code.len as usize);
                return Some(code.value);
            }
        }

        // 剩余比特拼不出任何码字: 消耗掉以保证调用方能终止
        br.skip_bits(avail as usize + 1);
        None
    }

    /// 解码一个 VQ 向量, 返回查找表中对应的行.
    ///
    /// 码本没有查找表时返回 `None` 由上层在 setup 阶段拦截.
    pub(crate) fn decode_vector(&self, br: &mut PacketBitReader<'_>) -> Option<&[f32]> {
        let lookup = self.lookup.as_ref()?;
        let entry = self.decode_scalar(br)? as usize;
        let start = entry * lookup.dimensions;
        Some(&lookup.table[start..start + lookup.dimensions])
    }

    /// 条目对应的查找表行 (测试与调试用)
    #[cfg(test)]
    fn vector(&self, entry: usize) -> Option<&[f32]> {
        let lookup = self.lookup.as_ref()?;
        let start = entry * lookup.dimensions;
        Some(&lookup.table[start..start + lookup.dimensions])
    }
}

/// 读取码字长度表. 未使用的条目长度为 -1.
fn read_code_lengths(br: &mut PacketBitReader<'_>, entries: usize) -> ShengResult<Vec<i8>> {
    let mut lengths = vec![-1i8; entries];
    let ordered = br.read_flag();
    if ordered {
        let mut current_entry = 0usize;
        let mut current_length = br.read_bits(5) + 1;
        while current_entry < entries {
            if current_length > u32::from(MAX_CODE_LEN) {
                // 长度组越过 32 比特上限的码流视为非法
                return Err(ShengError::InvalidData(
                    "Vorbis codebook ordered 长度超过 32".into(),
                ));
            }
            let left = (entries - current_entry) as u32;
            let number = br.read_bits(ilog(left)) as usize;
            if number == 0 || number > left as usize {
                return Err(ShengError::InvalidData(
                    "Vorbis codebook ordered 长度组无效".into(),
                ));
            }
            for len in &mut lengths[current_entry..current_entry + number] {
                *len = current_length as i8;
            }
            current_entry += number;
            current_length += 1;
        }
    } else {
        let sparse = br.read_flag();
        for len in &mut lengths {
            let used = if sparse { br.read_flag() } else { true };
            if used {
                *len = (br.read_bits(5) + 1) as i8;
            }
        }
    }
    if br.is_eop() {
        return Err(ShengError::InvalidData(
            "Vorbis codebook 长度表在包尾被截断".into(),
        ));
    }
    Ok(lengths)
}

/// 按 Vorbis 规范为所有使用中的条目分配规范 Huffman 码字.
///
/// 返回 (条目索引, LSB-first 码字, 长度). `available[len]` 保存深度 len 上
/// 唯一的空闲前缀 (MSB 对齐的 32 位表示, 0 表示无).
fn assign_codewords(lengths: &[i8]) -> ShengResult<Vec<(u32, u32, u8)>> {
    let mut assigned = Vec::new();
    let mut available = [0u32; 33];

    let mut iter = lengths.iter().enumerate().filter(|&(_, &l)| l > 0);
    let Some((first_idx, &first_len)) = iter.next() else {
        // 全部条目未使用: 空码本, 解码时永远不会命中
        return Ok(assigned);
    };
    assigned.push((first_idx as u32, 0, first_len as u8));
    for i in 1..=first_len as usize {
        available[i] = 1u32 << (32 - i);
    }

    for (idx, &len) in iter {
        let len = len as u8;
        let mut depth = len as usize;
        while depth > 0 && available[depth] == 0 {
            depth -= 1;
        }
        if depth == 0 {
            return Err(ShengError::InvalidData(
                "Vorbis codebook 码树过度指定".into(),
            ));
        }
        let prefix = available[depth];
        available[depth] = 0;
        assigned.push((idx as u32, prefix.reverse_bits(), len));
        // 将剩余空间沿更长层分裂出新的空闲前缀
        for d in depth + 1..=len as usize {
            available[d] = prefix + (1u32 << (32 - d));
        }
    }

    Ok(assigned)
}

impl VqLookup {
    fn read(
        br: &mut PacketBitReader<'_>,
        entries: usize,
        dimensions: usize,
    ) -> ShengResult<Option<Self>> {
        let lookup_type = br.read_bits(4);
        if lookup_type == 0 {
            return Ok(None);
        }
        if lookup_type > 2 {
            return Err(ShengError::InvalidData(format!(
                "Vorbis codebook lookup_type 非法: {lookup_type}",
            )));
        }

        let minimum = br.read_float32();
        let delta = br.read_float32();
        let value_bits = (br.read_bits(4) + 1) as u8;
        let sequence_p = br.read_flag();

        let quant_count = if lookup_type == 1 {
            lookup1_values(entries as u32, dimensions as u32) as usize
        } else {
            entries
                .checked_mul(dimensions)
                .ok_or_else(|| ShengError::InvalidData("Vorbis quant_values 溢出".into()))?
        };

        let mut mults = Vec::with_capacity(quant_count);
        for _ in 0..quant_count {
            mults.push(br.read_bits(value_bits) as f32 * delta + minimum);
        }
        if br.is_eop() {
            return Err(ShengError::InvalidData(
                "Vorbis codebook 量化值在包尾被截断".into(),
            ));
        }

        // 展开为 entries x dimensions 的行表, sequence_p 的累加在行内完成
        let mut table = Vec::with_capacity(entries * dimensions);
        for entry in 0..entries {
            let mut last = 0f32;
            if lookup_type == 1 {
                let mut index_divisor = 1usize;
                for _ in 0..dimensions {
                    let offset = entry / index_divisor % quant_count;
                    let value = mults[offset] + last;
                    table.push(value);
                    if sequence_p {
                        last = value;
                    }
                    index_divisor *= quant_count;
                }
            } else {
                for d in 0..dimensions {
                    let value = mults[entry * dimensions + d] + last;
                    table.push(value);
                    if sequence_p {
                        last = value;
                    }
                }
            }
        }

        Ok(Some(VqLookup { dimensions, table }))
    }
}

/// lookup type 1 的量化值数量: 满足 r^dimensions <= entries 的最大整数 r
pub(crate) fn lookup1_values(entries: u32, dimensions: u32) -> u32 {
    if entries == 0 || dimensions == 0 {
        return 0;
    }

    let mut lo = 1u32;
    let mut hi = entries.max(1);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if pow_le_entries(mid, dimensions, entries) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

fn pow_le_entries(base: u32, exp: u32, entries: u32) -> bool {
    let mut out = 1u128;
    let limit = entries as u128;
    for _ in 0..exp {
        out *= base as u128;
        if out > limit {
            return false;
        }
    }
    true
}
