//! I/O 抽象层.
//!
//! 为页面读取器提供统一的按绝对偏移读取接口, 内部维护一个滑动窗口
//! 缓冲: 窗口按需向后增长至配置上限, `discard_through` 声明"不再回看"
//! 的前缀并释放对应内存. 窗口之前的位置仍可通过可 seek 的后端重新读取.
//!
//! 字节源由一把协作递归锁保护: 每个公开入口在触碰源的读取序列前后
//! 成对调用 `take_lock`/`release_lock`; 同一持有者可重入, 不同持有者
//! 抢占或错配释放都是编程错误.

use std::io::{self, Read, Seek};

use sheng_core::{ShengError, ShengResult};

/// I/O 后端 trait
///
/// 实现此 trait 以支持不同的字节源 (文件、内存等). 解码器只读.
pub trait IoBackend: Send {
    /// 读取数据到缓冲区
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持 seek
    fn is_seekable(&self) -> bool;
}

/// 默认窗口上限 (64 KB)
const DEFAULT_MAX_WINDOW: usize = 64 * 1024;

/// 协作递归锁: 按持有者令牌计数
struct SourceLock {
    holder: Option<u64>,
    depth: u32,
}

/// I/O 上下文
///
/// 封装底层字节源, 为页面读取器提供按绝对偏移的缓冲读取.
pub struct IoContext {
    inner: Box<dyn IoBackend>,
    /// 窗口缓冲, 覆盖 [window_start, window_start + window.len())
    window: Vec<u8>,
    window_start: u64,
    /// 后端读游标当前的绝对位置 (窗口末端)
    backend_pos: u64,
    /// 已声明不再回看的前缀终点
    discard_floor: u64,
    max_window: usize,
    lock: SourceLock,
    disposed: bool,
}

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self::with_max_window(backend, DEFAULT_MAX_WINDOW)
    }

    /// 指定窗口上限创建上下文
    pub fn with_max_window(backend: Box<dyn IoBackend>, max_window: usize) -> Self {
        Self {
            inner: backend,
            window: Vec::new(),
            window_start: 0,
            backend_pos: 0,
            discard_floor: 0,
            max_window: max_window.max(1024),
            lock: SourceLock {
                holder: None,
                depth: 0,
            },
            disposed: false,
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: &str) -> ShengResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 获取协作锁.
    ///
    /// 同一持有者可重入 (递归计数); 其他持有者持锁时返回
    /// [`ShengError::SynchronizationLock`].
    pub fn take_lock(&mut self, holder: u64) -> ShengResult<()> {
        self.ensure_alive()?;
        match self.lock.holder {
            None => {
                self.lock.holder = Some(holder);
                self.lock.depth = 1;
                Ok(())
            }
            Some(h) if h == holder => {
                self.lock.depth += 1;
                Ok(())
            }
            Some(h) => Err(ShengError::SynchronizationLock(format!(
                "锁已被持有者 {h} 占用, 请求者 {holder}",
            ))),
        }
    }

    /// 释放协作锁. 持有者不符或未持锁时报错.
    pub fn release_lock(&mut self, holder: u64) -> ShengResult<()> {
        match self.lock.holder {
            Some(h) if h == holder => {
                self.lock.depth -= 1;
                if self.lock.depth == 0 {
                    self.lock.holder = None;
                }
                Ok(())
            }
            Some(h) => Err(ShengError::SynchronizationLock(format!(
                "释放者 {holder} 与持有者 {h} 不符",
            ))),
            None => Err(ShengError::SynchronizationLock(
                "释放未被持有的锁".into(),
            )),
        }
    }

    /// 读取绝对偏移 pos 处的一个字节
    pub fn read_byte_at(&mut self, pos: u64) -> ShengResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_at(pos, &mut buf)?;
        Ok(buf[0])
    }

    /// 从绝对偏移 pos 读满 dst, 数据不足返回 [`ShengError::Eof`]
    pub fn read_exact_at(&mut self, pos: u64, dst: &mut [u8]) -> ShengResult<()> {
        let n = self.read_at(pos, dst)?;
        if n < dst.len() {
            return Err(ShengError::Eof);
        }
        Ok(())
    }

    /// 从绝对偏移 pos 读取至多 dst.len() 字节, 返回实际读取数
    pub fn read_at(&mut self, pos: u64, dst: &mut [u8]) -> ShengResult<usize> {
        self.ensure_alive()?;
        if dst.is_empty() {
            return Ok(0);
        }
        if pos < self.discard_floor {
            return Err(ShengError::InvalidArgument(format!(
                "读取位置 {pos} 在已丢弃前缀 {} 之前",
                self.discard_floor,
            )));
        }

        self.ensure_window(pos, dst.len())?;

        if pos < self.window_start {
            return Err(ShengError::Internal("窗口重建后位置仍在窗口前".into()));
        }
        let offset = (pos - self.window_start) as usize;
        let available = self.window.len().saturating_sub(offset);
        let n = available.min(dst.len());
        dst[..n].copy_from_slice(&self.window[offset..offset + n]);
        Ok(n)
    }

    /// 声明不再读取 pos 之前的任何位置, 释放对应窗口内存
    pub fn discard_through(&mut self, pos: u64) {
        if pos <= self.discard_floor {
            return;
        }
        self.discard_floor = pos;
        if pos > self.window_start {
            let drop = ((pos - self.window_start) as usize).min(self.window.len());
            self.window.drain(..drop);
            self.window_start = pos.max(self.window_start + drop as u64);
        }
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    /// 释放字节源与全部缓冲; 之后的任何操作返回 [`ShengError::Disposed`]
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.window = Vec::new();
    }

    fn ensure_alive(&self) -> ShengResult<()> {
        if self.disposed {
            return Err(ShengError::Disposed);
        }
        Ok(())
    }

    /// 保证窗口覆盖 [pos, pos+len) 中可从源取得的部分
    fn ensure_window(&mut self, pos: u64, len: usize) -> ShengResult<()> {
        if pos < self.window_start {
            // 回退到窗口之前: 需要可 seek 的源, 从 pos 重建窗口
            if !self.inner.is_seekable() {
                return Err(ShengError::Unsupported(
                    "不可 seek 的源无法回读已滑出窗口的数据".into(),
                ));
            }
            self.inner.seek(io::SeekFrom::Start(pos))?;
            self.window.clear();
            self.window_start = pos;
            self.backend_pos = pos;
        }

        let window_end = self.window_start + self.window.len() as u64;
        let need_end = pos + len as u64;
        if need_end <= window_end {
            return Ok(());
        }

        // 若后端游标不在窗口末端 (重建或 discard 越过末端), 归位
        if self.backend_pos != window_end {
            if self.inner.is_seekable() {
                self.inner.seek(io::SeekFrom::Start(window_end))?;
                self.backend_pos = window_end;
            } else if self.backend_pos < window_end {
                // 不可 seek 的源: 逐块读取丢弃, 推进到窗口末端
                let mut chunk = [0u8; 4096];
                while self.backend_pos < window_end {
                    let want = ((window_end - self.backend_pos) as usize).min(chunk.len());
                    let got = self.inner.read(&mut chunk[..want])?;
                    if got == 0 {
                        return Ok(());
                    }
                    self.backend_pos += got as u64;
                }
            } else {
                return Err(ShengError::Unsupported(
                    "不可 seek 的源无法回退读游标".into(),
                ));
            }
        }

        // 向后扩展窗口直至覆盖请求或源耗尽
        let mut remaining = (need_end.saturating_sub(window_end)) as usize;
        let mut chunk = [0u8; 4096];
        while remaining > 0 {
            let want = remaining.min(chunk.len());
            let got = self.inner.read(&mut chunk[..want])?;
            if got == 0 {
                break;
            }
            self.window.extend_from_slice(&chunk[..got]);
            self.backend_pos += got as u64;
            remaining = remaining.saturating_sub(got);
        }

        // 超过上限时从前端滑动, 但绝不滑过请求位置
        if self.window.len() > self.max_window {
            let max_drop = (pos.saturating_sub(self.window_start)) as usize;
            let drop = (self.window.len() - self.max_window).min(max_drop);
            if drop > 0 {
                self.window.drain(..drop);
                self.window_start += drop as u64;
            }
        }

        Ok(())
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}
