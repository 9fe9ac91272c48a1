//! Vorbis residue (谱残差) 解码, 支持 type 0/1/2.
//!
//! 残差按 8 个 pass 级联解码: pass 0 读取分区分类码字, 每个 pass 按
//! 分类查 cascade 位图选择 VQ 码本, 将向量累加进声道系数. type 2 先把
//! 所有声道交错进单一向量解码, 再拆回各声道.

use sheng_core::{ShengError, ShengResult};

use super::bitreader::PacketBitReader;
use super::codebook::Codebook;

/// residue 配置
pub(crate) struct Residue {
    kind: u8,
    begin: u32,
    end: u32,
    partition_size: u32,
    classifications: u8,
    classbook: u8,
    /// 每个分类在 8 个 pass 上的码本, -1 表示该 pass 无码本
    books: Vec<[i16; 8]>,
}

impl Residue {
    /// 从 setup 包解析一个 residue 配置
    pub(crate) fn read(
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
    ) -> ShengResult<Self> {
        let kind = br.read_bits(16);
        if kind > 2 {
            return Err(ShengError::InvalidData(format!(
                "Vorbis residue_type 不支持: {kind}",
            )));
        }

        let begin = br.read_bits(24);
        let end = br.read_bits(24);
        if end < begin {
            return Err(ShengError::InvalidData(
                "Vorbis residue begin/end 区间非法".into(),
            ));
        }
        let partition_size = br.read_bits(24) + 1;
        let classifications = (br.read_bits(6) + 1) as u8;
        let classbook = br.read_bits(8) as usize;
        if classbook >= codebooks.len() {
            return Err(ShengError::InvalidData(
                "Vorbis residue classbook 索引越界".into(),
            ));
        }

        let mut cascades = vec![0u32; usize::from(classifications)];
        for cascade in &mut cascades {
            let low_bits = br.read_bits(3);
            let high_bits = if br.read_flag() { br.read_bits(5) } else { 0 };
            *cascade = (high_bits << 3) | low_bits;
        }

        let mut books = Vec::with_capacity(usize::from(classifications));
        for cascade in cascades {
            let mut set = [-1i16; 8];
            for (pass, slot) in set.iter_mut().enumerate() {
                if cascade & (1 << pass) != 0 {
                    let book = br.read_bits(8) as usize;
                    if book >= codebooks.len() {
                        return Err(ShengError::InvalidData(
                            "Vorbis residue 码本索引越界".into(),
                        ));
                    }
                    // 无 VQ 查找表的码本出现在残差码本表中使码流不可解码
                    if !codebooks[book].has_lookup() {
                        return Err(ShengError::InvalidData(
                            "Vorbis residue 码本缺少 VQ 查找表".into(),
                        ));
                    }
                    *slot = book as i16;
                }
            }
            books.push(set);
        }
        if br.is_eop() {
            return Err(ShengError::InvalidData(
                "Vorbis residue 配置在包尾被截断".into(),
            ));
        }

        Ok(Residue {
            kind: kind as u8,
            begin,
            end,
            partition_size,
            classifications,
            classbook: classbook as u8,
            books,
        })
    }

    /// 解码一个 submap 上所有声道的残差向量.
    ///
    /// `do_not_decode` 按 submap 内声道顺序给出; 返回等长的每声道向量,
    /// 每个向量 `n2` 个系数. 包尾耗尽时剩余分区保持零值, 正常返回.
    pub(crate) fn decode(
        &self,
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
        do_not_decode: &[bool],
        n2: usize,
    ) -> ShengResult<Vec<Vec<f32>>> {
        let ch = do_not_decode.len();

        if self.kind == 2 {
            let mut vectors = vec![vec![0f32; n2]; ch];
            if do_not_decode.iter().all(|&d| d) {
                return Ok(vectors);
            }
            // type 2: 所有声道交错进单一向量, 按单声道路径解码后拆分
            let interleaved = self.decode_inner(br, codebooks, &[false], n2 * ch)?;
            for (j, vector) in vectors.iter_mut().enumerate() {
                for (i, v) in vector.iter_mut().enumerate() {
                    *v = interleaved[0][i * ch + j];
                }
            }
            Ok(vectors)
        } else {
            self.decode_inner(br, codebooks, do_not_decode, n2)
        }
    }

    fn decode_inner(
        &self,
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
        do_not_decode: &[bool],
        actual_size: usize,
    ) -> ShengResult<Vec<Vec<f32>>> {
        let ch = do_not_decode.len();
        let mut vectors = vec![vec![0f32; actual_size]; ch];

        // begin/end 超出半块长时按半块长截断 (规范勘误)
        let limit_begin = (self.begin as usize).min(actual_size);
        let limit_end = (self.end as usize).min(actual_size);
        let n_to_read = limit_end - limit_begin;
        if n_to_read == 0 {
            return Ok(vectors);
        }

        let classbook = &codebooks[usize::from(self.classbook)];
        let classwords = classbook.dimensions;
        if classwords == 0 {
            return Err(ShengError::InvalidData(
                "Vorbis residue classbook 维度为 0".into(),
            ));
        }
        let partition_size = self.partition_size as usize;
        let partitions_to_read = n_to_read / partition_size;
        let class_count = u32::from(self.classifications);

        let cl_stride = partitions_to_read + classwords;
        let mut classes = vec![0u32; ch * cl_stride];

        'decode: for pass in 0..8 {
            let mut partition = 0usize;
            while partition < partitions_to_read {
                if pass == 0 {
                    for (j, &skip) in do_not_decode.iter().enumerate() {
                        if skip {
                            continue;
                        }
                        let Some(mut temp) = classbook.decode_scalar(br) else {
                            break 'decode;
                        };
                        for i in (0..classwords).rev() {
                            classes[j * cl_stride + i + partition] = temp % class_count;
                            temp /= class_count;
                        }
                    }
                }

                for _ in 0..classwords {
                    if partition >= partitions_to_read {
                        break;
                    }
                    for (j, &skip) in do_not_decode.iter().enumerate() {
                        if skip {
                            continue;
                        }
                        let class = classes[j * cl_stride + partition] as usize;
                        let book = self.books[class][pass];
                        if book < 0 {
                            continue;
                        }
                        let codebook = &codebooks[book as usize];
                        let offset = limit_begin + partition * partition_size;
                        if !self.read_partition(br, codebook, &mut vectors[j], offset) {
                            break 'decode;
                        }
                    }
                    partition += 1;
                }
            }
        }

        Ok(vectors)
    }

    /// 将一个分区的 VQ 向量累加进目标向量; 包尾耗尽返回 false
    fn read_partition(
        &self,
        br: &mut PacketBitReader<'_>,
        codebook: &Codebook,
        target: &mut [f32],
        offset: usize,
    ) -> bool {
        let partition_size = self.partition_size as usize;
        let dims = codebook.dimensions;

        if self.kind == 0 {
            // type 0: 向量分量按 step 间隔散布在分区内
            let step = partition_size / dims;
            for i in 0..step {
                let Some(vector) = codebook.decode_vector(br) else {
                    return false;
                };
                for (j, &e) in vector.iter().enumerate() {
                    if let Some(slot) = target.get_mut(offset + i + j * step) {
                        *slot += e;
                    }
                }
            }
        } else {
            // type 1/2 共用: 分量连续排列
            let mut i = 0;
            while i < partition_size {
                let Some(vector) = codebook.decode_vector(br) else {
                    return false;
                };
                let Some(slots) = target.get_mut(offset + i..offset + i + vector.len()) else {
                    break;
                };
                for (slot, &e) in slots.iter_mut().zip(vector.iter()) {
                    *slot += e;
                }
                i += vector.len();
            }
        }
        true
    }
}
