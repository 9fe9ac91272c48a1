//! Vorbis 窗函数缓存与逐包窗口区间计算.
//!
//! 斜坡公式: `sin(π/2 * sin²(π/2 * (i+0.5)/L))`. 每个块长只缓存一条
//! 斜坡; 长块的四种形状 (前后块长短组合) 由区间计算在重叠相加时拼出.

use std::f64::consts::PI;

/// 两个块长各一条的窗斜坡缓存
pub(crate) struct WindowCache {
    slopes: [Vec<f32>; 2],
}

impl WindowCache {
    pub(crate) fn new(blocksize0: usize, blocksize1: usize) -> Self {
        Self {
            slopes: [
                window_slope(blocksize0 / 2),
                window_slope(blocksize1 / 2),
            ],
        }
    }

    /// 取块长标志对应的斜坡 (false = 短块)
    pub(crate) fn slope(&self, long_block: bool) -> &[f32] {
        &self.slopes[usize::from(long_block)]
    }
}

/// 计算长度 len 的上升斜坡
fn window_slope(len: usize) -> Vec<f32> {
    let l = len as f64;
    (0..len)
        .map(|i| {
            let inner = (0.5 * PI * (i as f64 + 0.5) / l).sin();
            (0.5 * PI * inner * inner).sin() as f32
        })
        .collect()
}

/// 一个音频块的窗口区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockWindow {
    /// 左重叠区起点
    pub(crate) left_start: usize,
    /// 左重叠区长度 (等于前块的保留半窗长)
    pub(crate) left_len: usize,
    /// 左半窗使用长块斜坡
    pub(crate) left_use_long: bool,
    /// 本块输出区终点 (右重叠区起点)
    pub(crate) right_start: usize,
    /// 右保留区终点
    pub(crate) right_end: usize,
}

impl BlockWindow {
    /// 由块长与前后块标志计算窗口区间
    pub(crate) fn compute(n: usize, blocksize0: usize, prev_long: bool, next_long: bool) -> Self {
        let center = n / 2;
        let (left_start, left_len, left_use_long) = if prev_long {
            (0, center, n != blocksize0)
        } else {
            ((n - blocksize0) / 4, blocksize0 / 2, false)
        };
        let (right_start, right_end) = if next_long {
            (center, n)
        } else {
            ((n * 3 - blocksize0) / 4, (n * 3 + blocksize0) / 4)
        };
        Self {
            left_start,
            left_len,
            left_use_long,
            right_start,
            right_end,
        }
    }

    /// 本块贡献的输出样本数
    pub(crate) fn output_len(&self) -> usize {
        self.right_start - self.left_start
    }
}
