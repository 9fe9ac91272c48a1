//! 交错样本环形缓冲.
//!
//! 解码器独占持有: 每解码一个音频块, 窗后样本按声道交错推入;
//! 上层按需抽取. seek 与参数变更时整体清空.

use std::collections::VecDeque;

/// 交错 f32 样本环形缓冲
pub(crate) struct SampleRing {
    buf: VecDeque<f32>,
}

impl SampleRing {
    /// 创建环形缓冲并预留容量
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// 可读样本数
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 推入一个交错样本
    pub(crate) fn push(&mut self, sample: f32) {
        self.buf.push_back(sample);
    }

    /// 抽取至多 dst.len() 个样本, 返回实际抽取数并推进读游标
    pub(crate) fn copy_to(&mut self, dst: &mut [f32]) -> usize {
        let n = dst.len().min(self.buf.len());
        for slot in dst[..n].iter_mut() {
            *slot = self.buf.pop_front().unwrap();
        }
        n
    }

    /// 丢弃最旧的 n 个样本 (不读取), 返回实际丢弃数
    pub(crate) fn remove_items(&mut self, n: usize) -> usize {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
        n
    }

    /// 丢弃最新的 n 个样本 (流尾 granule 裁剪用)
    pub(crate) fn truncate_newest(&mut self, n: usize) {
        let keep = self.buf.len().saturating_sub(n);
        self.buf.truncate(keep);
    }

    /// 清空读写游标
    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(n: usize) -> SampleRing {
        let mut ring = SampleRing::with_capacity(16);
        for i in 0..n {
            ring.push(i as f32);
        }
        ring
    }

    #[test]
    fn test_抽取推进游标() {
        let mut ring = filled(6);
        let mut dst = [0.0f32; 4];
        assert_eq!(ring.copy_to(&mut dst), 4);
        assert_eq!(dst, [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(ring.len(), 2);

        let mut dst = [0.0f32; 4];
        assert_eq!(ring.copy_to(&mut dst), 2, "仅剩 2 个样本");
        assert_eq!(&dst[..2], [4.0, 5.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_丢弃最旧() {
        let mut ring = filled(5);
        assert_eq!(ring.remove_items(3), 3);
        let mut dst = [0.0f32; 2];
        ring.copy_to(&mut dst);
        assert_eq!(dst, [3.0, 4.0]);

        assert_eq!(ring.remove_items(10), 0, "空环丢弃返回 0");
    }

    #[test]
    fn test_裁剪最新() {
        let mut ring = filled(5);
        ring.truncate_newest(2);
        assert_eq!(ring.len(), 3);
        let mut dst = [0.0f32; 3];
        ring.copy_to(&mut dst);
        assert_eq!(dst, [0.0, 1.0, 2.0]);

        let mut ring = filled(2);
        ring.truncate_newest(5);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_清空() {
        let mut ring = filled(4);
        ring.clear();
        assert!(ring.is_empty());
        ring.push(9.0);
        assert_eq!(ring.len(), 1);
    }
}
