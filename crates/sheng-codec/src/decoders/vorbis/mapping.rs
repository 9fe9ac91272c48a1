//! Vorbis mapping (type 0): 声道到 floor/residue 的路由与幅角耦合.

use sheng_core::{ShengError, ShengResult};

use super::bitreader::{PacketBitReader, ilog};

/// submap: 一组声道共享的 floor 与 residue 配置
pub(crate) struct Submap {
    pub(crate) floor: u8,
    pub(crate) residue: u8,
}

/// mapping 配置
pub(crate) struct Mapping {
    /// (magnitude 声道, angle 声道) 耦合对
    couplings: Vec<(u8, u8)>,
    /// 声道索引 -> submap 索引
    pub(crate) mux: Vec<u8>,
    pub(crate) submaps: Vec<Submap>,
}

impl Mapping {
    /// 从 setup 包解析一个 mapping 配置
    pub(crate) fn read(
        br: &mut PacketBitReader<'_>,
        channels: u8,
        floor_count: usize,
        residue_count: usize,
    ) -> ShengResult<Self> {
        let mapping_type = br.read_bits(16);
        if mapping_type != 0 {
            return Err(ShengError::InvalidData(format!(
                "Vorbis mapping_type 不支持: {mapping_type}",
            )));
        }

        let submap_count = if br.read_flag() {
            br.read_bits(4) as usize + 1
        } else {
            1
        };

        let mut couplings = Vec::new();
        if br.read_flag() {
            let coupling_steps = br.read_bits(8) as usize + 1;
            let ch_bits = ilog(u32::from(channels) - 1);
            for _ in 0..coupling_steps {
                let magnitude = br.read_bits(ch_bits);
                let angle = br.read_bits(ch_bits);
                if magnitude == angle
                    || magnitude >= u32::from(channels)
                    || angle >= u32::from(channels)
                {
                    return Err(ShengError::InvalidData("Vorbis coupling 参数非法".into()));
                }
                couplings.push((magnitude as u8, angle as u8));
            }
        }

        let reserved = br.read_bits(2);
        if reserved != 0 {
            return Err(ShengError::InvalidData(
                "Vorbis mapping reserved bits 必须为 0".into(),
            ));
        }

        let mux = if submap_count > 1 {
            let mut mux = Vec::with_capacity(usize::from(channels));
            for _ in 0..channels {
                let m = br.read_bits(4);
                if m as usize >= submap_count {
                    return Err(ShengError::InvalidData("Vorbis mapping mux 值越界".into()));
                }
                mux.push(m as u8);
            }
            mux
        } else {
            vec![0; usize::from(channels)]
        };

        let mut submaps = Vec::with_capacity(submap_count);
        for _ in 0..submap_count {
            let _time_submap = br.read_bits(8);
            let floor = br.read_bits(8) as usize;
            let residue = br.read_bits(8) as usize;
            if floor >= floor_count || residue >= residue_count {
                return Err(ShengError::InvalidData(
                    "Vorbis mapping floor/residue 索引越界".into(),
                ));
            }
            submaps.push(Submap {
                floor: floor as u8,
                residue: residue as u8,
            });
        }
        if br.is_eop() {
            return Err(ShengError::InvalidData(
                "Vorbis mapping 配置在包尾被截断".into(),
            ));
        }

        Ok(Mapping {
            couplings,
            mux,
            submaps,
        })
    }

    /// 耦合对传播: 任一方有残差则双方都需解码
    pub(crate) fn propagate_couplings(&self, no_residue: &mut [bool]) {
        for &(m, a) in &self.couplings {
            let m = usize::from(m);
            let a = usize::from(a);
            if !(no_residue[m] && no_residue[a]) {
                no_residue[m] = false;
                no_residue[a] = false;
            }
        }
    }

    /// 逆声道耦合, 按耦合表逆序还原 (magnitude, angle) 对
    pub(crate) fn inverse_coupling(&self, channels: &mut [Vec<f32>]) {
        for &(mag, ang) in self.couplings.iter().rev() {
            let (mag, ang) = (usize::from(mag), usize::from(ang));
            let (lo, hi) = if mag < ang { (mag, ang) } else { (ang, mag) };
            let (head, tail) = channels.split_at_mut(hi);
            let (m_vec, a_vec) = if mag < ang {
                (&mut head[lo], &mut tail[0])
            } else {
                (&mut tail[0], &mut head[lo])
            };
            for (m, a) in m_vec.iter_mut().zip(a_vec.iter_mut()) {
                let (new_m, new_a) = inverse_couple(*m, *a);
                *m = new_m;
                *a = new_a;
            }
        }
    }
}

#[inline]
fn inverse_couple(m: f32, a: f32) -> (f32, f32) {
    if m > 0.0 {
        if a > 0.0 { (m, m - a) } else { (m + a, m) }
    } else if a > 0.0 {
        (m, m + a)
    } else {
        (m - a, m)
    }
}
