//! 拉取式 Ogg/Vorbis 读取器.
//!
//! 将容器层的逐流包读取器与 Vorbis 解码器接成完整管线:
//! 打开时扫描 BOS 页选取第一条 Vorbis 逻辑流并消费三个头包;
//! 之后每次 `read_samples` 按需拉包解码, 从解码器环形缓冲抽取样本.
//!
//! 链式容器中前一逻辑流结束后出现的新 Vorbis 流会触发参数变更:
//! 读取器解析新流的头包后置位 `is_parameter_change` 并停止产出,
//! 直到调用方 `clear_parameter_change` 切换到新流.

use log::{debug, warn};
use serde::Deserialize;
use sheng_codec::{CommentHeader, IdentHeader, Packet, VorbisDecoder};
use sheng_core::{NO_GRANULE, ShengError, ShengResult, granule};
use sheng_format::{IoBackend, IoContext, PacketReader, PageReader};

/// 读取器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    /// 读缓冲窗口上限 (字节)
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,
    /// 输出样本是否钳制到 [-1, 1]
    #[serde(default = "default_clip")]
    pub clip_samples: bool,
}

fn default_max_buffer() -> usize {
    64 * 1024
}

fn default_clip() -> bool {
    true
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_buffer: default_max_buffer(),
            clip_samples: default_clip(),
        }
    }
}

/// 读取器统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// 容器开销 (页面头与段表) 比特数
    pub container_bits: u64,
    /// 因损坏跳过的比特数
    pub waste_bits: u64,
    /// 被钳制的样本数
    pub clipped_samples: u64,
    /// 是否发生过钳制 (粘性)
    pub is_clipped: bool,
}

/// 拉取式 Ogg/Vorbis 读取器
pub struct OggVorbisReader {
    packets: PacketReader,
    decoder: VorbisDecoder,
    serial: u32,
    clip: bool,
    /// 当前逻辑流已见到 EOS
    end_of_stream: bool,
    param_change: bool,
    /// 链式新流段: 头包已就绪, 等待调用方确认切换
    pending: Option<(u32, VorbisDecoder)>,
    /// seek 丢弃期: 丢弃全部输出直到完成页 granule 达到锚点
    seek_dropping: Option<i64>,
    /// 锚点之后仍需丢弃的每声道样本数
    seek_trim: u64,
    disposed: bool,
}

impl OggVorbisReader {
    /// 从文件路径打开
    pub fn open_file(path: &str) -> ShengResult<Self> {
        let io = IoContext::open_read(path)?;
        Self::open_io(io, ReaderConfig::default())
    }

    /// 从 I/O 后端打开
    pub fn open(backend: Box<dyn IoBackend>, config: ReaderConfig) -> ShengResult<Self> {
        let io = IoContext::with_max_window(backend, config.max_buffer);
        Self::open_io(io, config)
    }

    fn open_io(io: IoContext, config: ReaderConfig) -> ShengResult<Self> {
        let mut packets = PacketReader::new(PageReader::new(io));

        // 扫描 BOS 包, 选取第一条 Vorbis 流
        let (serial, ident_packet) = loop {
            let Some(packet) = packets.next_packet()? else {
                return Err(ShengError::InvalidData(
                    "容器中未找到 Vorbis 逻辑流".into(),
                ));
            };
            if is_vorbis_ident(&packet.data) {
                break (packet.serial, packet);
            }
            debug!("忽略非 Vorbis 流: serial={}", packet.serial);
            packets.ignore_stream(packet.serial);
        };

        let mut decoder = VorbisDecoder::new(config.clip_samples);
        decoder.send_packet(&ident_packet)?;
        read_remaining_headers(&mut packets, &mut decoder, serial)?;

        debug!(
            "选取 Vorbis 流: serial={serial}, {} Hz, {} 声道",
            decoder.sample_rate(),
            decoder.channels(),
        );

        Ok(Self {
            packets,
            decoder,
            serial,
            clip: config.clip_samples,
            end_of_stream: false,
            param_change: false,
            pending: None,
            seek_dropping: None,
            seek_trim: 0,
            disposed: false,
        })
    }

    /// 当前逻辑流的采样率 (Hz)
    pub fn sample_rate(&self) -> u32 {
        self.decoder.sample_rate()
    }

    /// 当前逻辑流的声道数
    pub fn channels(&self) -> usize {
        self.decoder.channels()
    }

    /// identification 头信息
    pub fn ident(&self) -> Option<&IdentHeader> {
        self.decoder.ident()
    }

    /// comment 头信息 (vendor 与注释表)
    pub fn comments(&self) -> Option<&CommentHeader> {
        self.decoder.comments()
    }

    /// 是否有待确认的参数变更 (链式新流段)
    pub fn is_parameter_change(&self) -> bool {
        self.param_change
    }

    /// 确认参数变更, 切换到新逻辑流段
    pub fn clear_parameter_change(&mut self) {
        if let Some((serial, decoder)) = self.pending.take() {
            self.serial = serial;
            self.decoder = decoder;
            self.end_of_stream = false;
            self.seek_dropping = None;
            self.seek_trim = 0;
        }
        self.param_change = false;
    }

    /// 下一个将被返回的样本的绝对采样位置
    pub fn current_position(&self) -> i64 {
        let g = self.decoder.granule_position();
        if g == NO_GRANULE {
            return 0;
        }
        let channels = self.decoder.channels().max(1);
        g - (self.decoder.samples_available() / channels) as i64
    }

    /// 已解码样本流末端的绝对采样位置
    pub fn last_granule_position(&self) -> i64 {
        self.decoder.granule_position()
    }

    /// 读取器统计
    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            container_bits: self.packets.container_bits(),
            waste_bits: self.packets.waste_bits(),
            clipped_samples: self.decoder.clip_count(),
            is_clipped: self.decoder.is_clipped(),
        }
    }

    /// 读取至多 dst.len() 个交错 f32 样本.
    ///
    /// 返回实际读取数; 参数变更待确认或流结束时提前返回 (可能为 0).
    pub fn read_samples(&mut self, dst: &mut [f32]) -> ShengResult<usize> {
        self.ensure_alive()?;
        let mut written = 0usize;
        loop {
            written += self.decoder.read_samples(&mut dst[written..]);
            if written == dst.len() || self.param_change {
                return Ok(written);
            }
            if !self.pump()? {
                return Ok(written);
            }
        }
    }

    /// 随机定位到指定绝对采样位置. 需要可寻址的字节源.
    pub fn seek_to_granule(&mut self, target: i64) -> ShengResult<()> {
        self.ensure_alive()?;
        if target < 0 {
            return Err(ShengError::OutOfRange(format!(
                "seek 目标非法: {target}",
            )));
        }
        let (anchor, offset) = self.packets.seek_to_granule(self.serial, target)?;
        self.decoder.reset_pipeline();
        self.end_of_stream = false;
        if anchor > 0 {
            // 锚点页之前 (含锚点页) 的输出全部丢弃, 再裁剪到目标
            self.seek_dropping = Some(anchor);
            self.seek_trim = (target - anchor) as u64;
        } else {
            // 从容器头解码: 输出从位置 0 起, 裁剪 target 个样本
            self.seek_dropping = None;
            self.seek_trim = target as u64;
        }
        debug!("seek: target={target}, 锚点={anchor}, 偏移={offset}");
        Ok(())
    }

    /// 释放字节源与全部缓冲. 之后的操作返回 [`ShengError::Disposed`].
    pub fn dispose(&mut self) {
        self.packets.io_mut().dispose();
        self.disposed = true;
    }

    fn ensure_alive(&self) -> ShengResult<()> {
        if self.disposed {
            return Err(ShengError::Disposed);
        }
        Ok(())
    }

    /// 拉取并处理一个包. 返回 false 表示当前无法继续产出
    /// (容器耗尽或参数变更已挂起).
    fn pump(&mut self) -> ShengResult<bool> {
        loop {
            let Some(packet) = self.packets.next_packet()? else {
                // 容器耗尽; 无 EOS 标志的流按干净结束处理
                self.end_of_stream = true;
                return Ok(false);
            };

            if packet.serial == self.serial {
                if self.end_of_stream {
                    continue;
                }
                // Vorbis 头包类型字节为奇数; seek 回容器头后重见的头包直接跳过
                if packet.data.first().is_some_and(|b| b & 1 == 1) {
                    continue;
                }
                let produced = match self.decoder.send_packet(&packet) {
                    Ok(n) => n,
                    Err(e @ ShengError::InvalidData(_)) => {
                        warn!("跳过无法解码的音频包: {e}");
                        0
                    }
                    Err(e) => return Err(e),
                };
                self.after_decode(&packet, produced);
                if packet.is_end_of_stream {
                    self.end_of_stream = true;
                }
                return Ok(true);
            }

            // 其他逻辑流
            if self.end_of_stream && is_vorbis_ident(&packet.data) {
                self.begin_chain(packet)?;
                return Ok(false);
            }
            debug!("忽略其他逻辑流: serial={}", packet.serial);
            self.packets.ignore_stream(packet.serial);
        }
    }

    /// 解码后的 seek 对齐: 丢弃期清空输出, 锚点之后裁剪到目标位置
    fn after_decode(&mut self, packet: &Packet, _produced: usize) {
        if let Some(anchor) = self.seek_dropping {
            self.decoder.discard_buffered();
            if granule::is_valid(packet.granule_position) && packet.granule_position >= anchor {
                self.seek_dropping = None;
            }
            return;
        }
        if self.seek_trim > 0 {
            let channels = self.decoder.channels().max(1);
            let available = self.decoder.samples_available();
            let want = (self.seek_trim as usize).saturating_mul(channels);
            let dropped = self.decoder.discard_samples(want.min(available));
            self.seek_trim -= (dropped / channels) as u64;
        }
    }

    /// 处理链式容器中的新逻辑流段: 解析头包, 挂起参数变更
    fn begin_chain(&mut self, ident_packet: Packet) -> ShengResult<()> {
        let new_serial = ident_packet.serial;
        let mut decoder = VorbisDecoder::new(self.clip);
        decoder.send_packet(&ident_packet)?;
        read_remaining_headers(&mut self.packets, &mut decoder, new_serial)?;

        debug!(
            "链式新流段: serial={new_serial}, {} Hz, {} 声道",
            decoder.sample_rate(),
            decoder.channels(),
        );
        self.pending = Some((new_serial, decoder));
        self.param_change = true;
        Ok(())
    }
}

/// identification 头包识别: `\x01vorbis` 前缀
fn is_vorbis_ident(data: &[u8]) -> bool {
    data.len() >= 7 && data[0] == 0x01 && &data[1..7] == b"vorbis"
}

/// 消费 comment 与 setup 头包直至解码器就绪
fn read_remaining_headers(
    packets: &mut PacketReader,
    decoder: &mut VorbisDecoder,
    serial: u32,
) -> ShengResult<()> {
    while !decoder.is_ready() {
        let Some(packet) = packets.next_packet()? else {
            return Err(ShengError::InvalidData("Vorbis 头包不完整".into()));
        };
        if packet.serial != serial {
            packets.ignore_stream(packet.serial);
            continue;
        }
        decoder.send_packet(&packet)?;
    }
    Ok(())
}
