//! 逆修正离散余弦变换 (IMDCT).
//!
//! 直接按 Vorbis 定义求和: 输入 n/2 个频域系数, 输出 n 个时域样本,
//! `y[i] = Σ_k X[k] · cos((2π/n)(i + 1/2 + n/4)(k + 1/2))`.
//! 用 f64 累加保证数值稳定; 全零频谱走快速路径.

use std::f64::consts::PI;

/// 对 n/2 点频谱做 IMDCT, 返回 n 点时域样本
pub(crate) fn imdct(spectrum: &[f32]) -> Vec<f32> {
    let half_n = spectrum.len();
    let n = half_n * 2;
    let mut output = vec![0.0f32; n];

    if spectrum.iter().all(|&s| s == 0.0) {
        return output;
    }

    let step = PI / half_n as f64;
    let quarter_n = half_n as f64 / 2.0;
    for (i, out_sample) in output.iter_mut().enumerate() {
        let i_term = i as f64 + 0.5 + quarter_n;
        let mut sum = 0.0f64;
        for (k, &coeff) in spectrum.iter().enumerate() {
            if coeff == 0.0 {
                continue;
            }
            let angle = step * i_term * (k as f64 + 0.5);
            sum += f64::from(coeff) * angle.cos();
        }
        *out_sample = sum as f32;
    }
    output
}
