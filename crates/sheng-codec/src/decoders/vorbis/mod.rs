//! Vorbis 音频解码器.
//!
//! 实现完整的包到 PCM 解码链路:
//! - 三个头包 (identification/comment/setup) 解析与校验
//! - setup 中 codebook/floor/residue/mapping/mode 的值级物化
//! - 逐包管线: mode/窗口选择 -> floor -> residue -> 逆耦合 -> IMDCT
//!   -> 窗后重叠相加 -> 交错样本环形缓冲
//!
//! 首个音频包只建立重叠状态不产出样本; 之后每包产出
//! `(prev_blocksize + cur_blocksize) / 4` 个样本每声道.

mod bitreader;
mod codebook;
mod floor;
mod headers;
mod imdct;
mod mapping;
mod residue;
mod ring;
mod setup;
mod window;

use log::debug;
use sheng_core::{NO_GRANULE, ShengError, ShengResult, granule};

use crate::packet::Packet;

use self::bitreader::PacketBitReader;
use self::imdct::imdct;
use self::ring::SampleRing;
use self::setup::{Setup, mode_bits, parse_setup};
use self::window::{BlockWindow, WindowCache};

pub use self::headers::{CommentHeader, IdentHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStage {
    Identification,
    Comment,
    Setup,
    Audio,
}

/// Vorbis 解码器
///
/// 消费容器层重组出的逻辑包, 产出交错 f32 PCM. 所有工作缓冲在 setup
/// 阶段按 `blocksize1` 与声道数一次性分配, 热路径上不再增长.
pub struct VorbisDecoder {
    stage: HeaderStage,
    ident: Option<IdentHeader>,
    comments: Option<CommentHeader>,
    setup: Option<Setup>,
    windows: Option<WindowCache>,
    /// 每声道上一块保留的右半窗数据; None 表示重叠状态未建立
    prev_right: Option<Vec<Vec<f32>>>,
    ring: SampleRing,
    /// 已推入环形缓冲的样本流末端的绝对采样位置
    granule: i64,
    clip: bool,
    clipped: bool,
    clip_count: u64,
}

impl VorbisDecoder {
    /// 创建解码器. `clip` 控制输出是否钳制到 [-1, 1].
    pub fn new(clip: bool) -> Self {
        Self {
            stage: HeaderStage::Identification,
            ident: None,
            comments: None,
            setup: None,
            windows: None,
            prev_right: None,
            ring: SampleRing::with_capacity(0),
            granule: NO_GRANULE,
            clip,
            clipped: false,
            clip_count: 0,
        }
    }

    /// 头包是否全部就绪
    pub fn is_ready(&self) -> bool {
        self.stage == HeaderStage::Audio
    }

    pub fn ident(&self) -> Option<&IdentHeader> {
        self.ident.as_ref()
    }

    pub fn comments(&self) -> Option<&CommentHeader> {
        self.comments.as_ref()
    }

    pub fn channels(&self) -> usize {
        self.ident.as_ref().map_or(0, |h| usize::from(h.channels))
    }

    pub fn sample_rate(&self) -> u32 {
        self.ident.as_ref().map_or(0, |h| h.sample_rate)
    }

    /// 输出是否发生过钳制 (粘性标志)
    pub fn is_clipped(&self) -> bool {
        self.clipped
    }

    /// 被钳制的样本总数
    pub fn clip_count(&self) -> u64 {
        self.clip_count
    }

    /// 环形缓冲中可读的交错样本数
    pub fn samples_available(&self) -> usize {
        self.ring.len()
    }

    /// 已解码样本流末端的绝对采样位置; 未锚定时为 [`NO_GRANULE`]
    pub fn granule_position(&self) -> i64 {
        self.granule
    }

    /// 送入一个逻辑包.
    ///
    /// 头包阶段返回 0; 音频阶段返回本包产出的每声道样本数
    /// (首个音频包只建立重叠状态, 返回 0).
    pub fn send_packet(&mut self, packet: &Packet) -> ShengResult<usize> {
        match self.stage {
            HeaderStage::Identification => {
                let ident = headers::parse_identification(&packet.data)?;
                let b0 = usize::from(ident.blocksize0);
                let b1 = usize::from(ident.blocksize1);
                let ch = usize::from(ident.channels);
                self.windows = Some(WindowCache::new(b0, b1));
                self.ring = SampleRing::with_capacity(ch * (b1 / 2 + b0 / 2) + ch);
                self.ident = Some(ident);
                self.stage = HeaderStage::Comment;
                Ok(0)
            }
            HeaderStage::Comment => {
                self.comments = Some(headers::parse_comment(&packet.data)?);
                self.stage = HeaderStage::Setup;
                Ok(0)
            }
            HeaderStage::Setup => {
                let ident = self
                    .ident
                    .as_ref()
                    .ok_or_else(|| ShengError::Internal("setup 前缺少 identification 头".into()))?;
                self.setup = Some(parse_setup(
                    &packet.data,
                    ident.channels,
                    (ident.blocksize0, ident.blocksize1),
                )?);
                self.stage = HeaderStage::Audio;
                Ok(0)
            }
            HeaderStage::Audio => self.decode_audio(packet),
        }
    }

    /// 抽取至多 dst.len() 个交错样本
    pub fn read_samples(&mut self, dst: &mut [f32]) -> usize {
        self.ring.copy_to(dst)
    }

    /// 丢弃最旧的 n 个交错样本 (seek 裁剪用)
    pub fn discard_samples(&mut self, n: usize) -> usize {
        self.ring.remove_items(n)
    }

    /// 清空环形缓冲, 保留重叠状态与 granule 锚点 (seek 落点对齐用).
    /// granule 指向已解码样本流的末端, 丢弃缓冲不改变它.
    pub fn discard_buffered(&mut self) {
        self.ring.clear();
    }

    /// 重置解码管线: 清空环形缓冲与重叠状态, 取消 granule 锚定.
    /// setup 配置保留, 用于 seek 后继续解码.
    pub fn reset_pipeline(&mut self) {
        self.ring.clear();
        self.prev_right = None;
        self.granule = NO_GRANULE;
    }

    fn decode_audio(&mut self, packet: &Packet) -> ShengResult<usize> {
        if packet.is_empty() {
            return Ok(0);
        }
        // 字段级拆借: 配置只读, 重叠状态/环形缓冲可写
        let Self {
            ident,
            setup,
            windows,
            prev_right,
            ring,
            granule,
            clip,
            clipped,
            clip_count,
            ..
        } = self;
        let ident = ident
            .as_ref()
            .ok_or_else(|| ShengError::Internal("Vorbis 头信息未就绪".into()))?;
        let setup = setup
            .as_ref()
            .ok_or_else(|| ShengError::Internal("Vorbis setup 信息未就绪".into()))?;
        let windows = windows
            .as_ref()
            .ok_or_else(|| ShengError::Internal("Vorbis 窗缓存未就绪".into()))?;

        let channels = usize::from(ident.channels);
        let b0 = usize::from(ident.blocksize0);
        let b1 = usize::from(ident.blocksize1);

        let mut br = PacketBitReader::new(&packet.data);
        if br.read_flag() {
            return Err(ShengError::InvalidData(
                "Vorbis 音频包首位必须为 0".into(),
            ));
        }

        let mode_idx = br.read_bits(mode_bits(setup.modes.len())) as usize;
        if mode_idx >= setup.modes.len() {
            return Err(ShengError::InvalidData(format!(
                "Vorbis mode 索引越界: {mode_idx}",
            )));
        }
        let mode = &setup.modes[mode_idx];
        let long = mode.block_flag;
        let n = if long { b1 } else { b0 };
        let n2 = n / 2;

        let (prev_flag, next_flag) = if long {
            (br.read_flag(), br.read_flag())
        } else {
            (true, true)
        };

        let mapping = &setup.mappings[usize::from(mode.mapping)];

        // floor 解码; 包尾耗尽的声道按"未使用"静音
        let mut floor_states = Vec::with_capacity(channels);
        for ch in 0..channels {
            let submap = &mapping.submaps[usize::from(mapping.mux[ch])];
            let floor = &setup.floors[usize::from(submap.floor)];
            floor_states.push(floor.decode(&mut br, &setup.codebooks)?);
        }

        let mut no_residue: Vec<bool> = floor_states.iter().map(|f| f.is_unused()).collect();
        mapping.propagate_couplings(&mut no_residue);

        // residue 解码, 按 submap 分组
        let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); channels];
        for (s_idx, submap) in mapping.submaps.iter().enumerate() {
            let mut submap_channels = Vec::new();
            let mut do_not_decode = Vec::new();
            for (ch, &mux) in mapping.mux.iter().enumerate() {
                if usize::from(mux) == s_idx {
                    submap_channels.push(ch);
                    do_not_decode.push(no_residue[ch]);
                }
            }
            let residue = &setup.residues[usize::from(submap.residue)];
            let decoded = residue.decode(&mut br, &setup.codebooks, &do_not_decode, n2)?;
            for (vector, ch) in decoded.into_iter().zip(submap_channels) {
                vectors[ch] = vector;
            }
        }

        mapping.inverse_coupling(&mut vectors);

        // floor 曲线合成并与残差点乘
        for ch in 0..channels {
            if floor_states[ch].is_unused() {
                vectors[ch].iter_mut().for_each(|v| *v = 0.0);
                continue;
            }
            let submap = &mapping.submaps[usize::from(mapping.mux[ch])];
            let floor = &setup.floors[usize::from(submap.floor)];
            let curve = floor.synthesize(&floor_states[ch], long, n2);
            for (v, c) in vectors[ch].iter_mut().zip(curve) {
                *v *= c;
            }
        }

        // IMDCT
        let mut blocks: Vec<Vec<f32>> = vectors.iter().map(|v| imdct(v)).collect();

        // 窗后重叠相加
        let bw = BlockWindow::compute(n, b0, prev_flag, next_flag);
        let mut produced = 0usize;
        match prev_right.take() {
            Some(prev) if prev[0].len() == bw.left_len => {
                let slope = windows.slope(bw.left_use_long);
                for (prev_chan, chan) in prev.iter().zip(blocks.iter_mut()) {
                    for (i, &p) in prev_chan.iter().enumerate() {
                        let idx = bw.left_start + i;
                        chan[idx] = chan[idx] * slope[i] + p * slope[prev_chan.len() - 1 - i];
                    }
                }
                produced = bw.output_len();
            }
            Some(prev) => {
                // 重叠区长度与前块不匹配 (resync 后的块型跳变): 丢弃重叠状态重新起振
                debug!(
                    "Vorbis 重叠区长度不匹配: prev={}, cur={}, 重新起振",
                    prev[0].len(),
                    bw.left_len,
                );
            }
            None => {}
        }

        if produced > 0 {
            for i in 0..produced {
                for block in &blocks {
                    let mut v = block[bw.left_start + i];
                    if *clip {
                        if v > 1.0 {
                            v = 1.0;
                            *clipped = true;
                            *clip_count += 1;
                        } else if v < -1.0 {
                            v = -1.0;
                            *clipped = true;
                            *clip_count += 1;
                        }
                    }
                    ring.push(v);
                }
            }
            if *granule != NO_GRANULE {
                *granule += produced as i64;
            }
        }

        // 保存本块右半窗数据, 供下一块重叠
        *prev_right = Some(
            blocks
                .iter()
                .map(|c| c[bw.right_start..bw.right_end].to_vec())
                .collect(),
        );

        align_granule(granule, ring, packet, channels);

        Ok(produced)
    }
}

/// 与完成页的 granule 对齐: 锚定、纠偏与流尾裁剪
fn align_granule(current: &mut i64, ring: &mut SampleRing, packet: &Packet, channels: usize) {
    if !granule::is_valid(packet.granule_position) {
        return;
    }
    if *current == NO_GRANULE {
        *current = packet.granule_position;
        return;
    }
    let diff = *current - packet.granule_position;
    if diff == 0 {
        return;
    }
    if diff > 0 && packet.is_end_of_stream {
        // 流尾: 最后一页的 granule 少于已产出样本时裁掉多余尾样本
        let trim = (diff as usize).saturating_mul(channels);
        ring.truncate_newest(trim);
    } else {
        debug!(
            "Vorbis granule 纠偏: 本地={}, 页面={}",
            *current, packet.granule_position,
        );
    }
    *current = packet.granule_position;
}
