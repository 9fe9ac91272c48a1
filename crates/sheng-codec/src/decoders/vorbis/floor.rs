//! Vorbis floor (谱包络) 解码, 支持 type 0 与 type 1.
//!
//! floor 1 通过邻点预测 + 振幅解包还原折线控制点, 再经 Bresenham
//! 直线渲染查逆 dB 表得到线性谱包络. floor 0 解码 LSP 系数,
//! 在 setup 阶段缓存好的 bark 尺度 cos(omega) 映射上合成包络曲线.

use std::f32::consts::PI;

use sheng_core::{ShengError, ShengResult};

use super::bitreader::{PacketBitReader, ilog};
use super::codebook::Codebook;

/// floor1 multiplier 对应的 Y 值范围
const FLOOR1_RANGES: [u32; 4] = [256, 128, 86, 64];

/// floor 配置
pub(crate) enum Floor {
    Zero(FloorZero),
    One(FloorOne),
}

/// 单个音频包内一条声道的 floor 解码结果
pub(crate) enum FloorState {
    /// 本包该声道未使用 (全零输出)
    Unused,
    /// floor 0: LSP 系数的余弦值与振幅
    Zero(Vec<f32>, u64),
    /// floor 1: 未解包的 Y 值序列
    One(Vec<u32>),
}

impl FloorState {
    pub(crate) fn is_unused(&self) -> bool {
        matches!(self, FloorState::Unused)
    }
}

impl Floor {
    /// 从 setup 包解析一个 floor 配置
    pub(crate) fn read(
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
        blocksizes: (u16, u16),
    ) -> ShengResult<Self> {
        let floor_type = br.read_bits(16);
        match floor_type {
            0 => Ok(Floor::Zero(FloorZero::read(br, codebooks, blocksizes)?)),
            1 => Ok(Floor::One(FloorOne::read(br, codebooks)?)),
            _ => Err(ShengError::InvalidData(format!(
                "Vorbis floor_type 不支持: {floor_type}",
            ))),
        }
    }

    /// 从音频包解码本声道的 floor 数据.
    ///
    /// 包尾耗尽视为"未使用"; 码流语义非法返回错误, 由上层丢弃整包.
    pub(crate) fn decode(
        &self,
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
    ) -> ShengResult<FloorState> {
        match self {
            Floor::Zero(fl) => fl.decode(br, codebooks),
            Floor::One(fl) => fl.decode(br, codebooks),
        }
    }

    /// 将解码结果合成为 n 个频点的线性包络曲线
    pub(crate) fn synthesize(&self, state: &FloorState, long_block: bool, n: usize) -> Vec<f32> {
        match (self, state) {
            (Floor::Zero(fl), FloorState::Zero(coeffs, amplitude)) => {
                fl.compute_curve(coeffs, *amplitude, long_block, n)
            }
            (Floor::One(fl), FloorState::One(ys)) => fl.synthesize(ys, n),
            _ => vec![0.0; n],
        }
    }
}

// ========================
// floor 0
// ========================

pub(crate) struct FloorZero {
    order: u8,
    amplitude_bits: u8,
    amplitude_offset: u8,
    book_list: Vec<u8>,
    /// 每个块长 (short/long) 对应的 cos(omega) bark 映射缓存
    cos_omega: [Vec<f32>; 2],
}

impl FloorZero {
    fn read(
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
        blocksizes: (u16, u16),
    ) -> ShengResult<Self> {
        let order = br.read_bits(8) as u8;
        let rate = br.read_bits(16) as u16;
        let bark_map_size = br.read_bits(16) as u16;
        let amplitude_bits = br.read_bits(6) as u8;
        let amplitude_offset = br.read_bits(8) as u8;
        if order < 2 || rate == 0 || bark_map_size == 0 {
            return Err(ShengError::InvalidData(
                "Vorbis floor0 order/rate/bark_map_size 非法".into(),
            ));
        }
        if amplitude_bits > 64 {
            return Err(ShengError::InvalidData(format!(
                "Vorbis floor0 amplitude_bits 过大: {amplitude_bits}",
            )));
        }

        let book_count = br.read_bits(4) as usize + 1;
        let mut book_list = Vec::with_capacity(book_count);
        for _ in 0..book_count {
            let book = br.read_bits(8) as usize;
            if book >= codebooks.len() {
                return Err(ShengError::InvalidData(
                    "Vorbis floor0 码本索引越界".into(),
                ));
            }
            if !codebooks[book].has_lookup() {
                return Err(ShengError::InvalidData(
                    "Vorbis floor0 码本缺少 VQ 查找表".into(),
                ));
            }
            book_list.push(book as u8);
        }

        let cos_omega = [
            bark_cos_omega_map(usize::from(blocksizes.0) / 2, rate, bark_map_size),
            bark_cos_omega_map(usize::from(blocksizes.1) / 2, rate, bark_map_size),
        ];

        Ok(FloorZero {
            order,
            amplitude_bits,
            amplitude_offset,
            book_list,
            cos_omega,
        })
    }

    fn decode(
        &self,
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
    ) -> ShengResult<FloorState> {
        let amplitude = br.read_bits64(self.amplitude_bits);
        if br.is_eop() || amplitude == 0 {
            return Ok(FloorState::Unused);
        }

        let book_bits = ilog(self.book_list.len() as u32);
        let book_number = br.read_bits(book_bits) as usize;
        let Some(&book_idx) = self.book_list.get(book_number) else {
            // 规范规定: 越界的 book number 使整包不可解码
            return Err(ShengError::InvalidData(
                "Vorbis floor0 book number 越界".into(),
            ));
        };
        let codebook = &codebooks[usize::from(book_idx)];

        // 系数以余弦值缓存, 曲线合成阶段直接使用
        let order = usize::from(self.order);
        let mut coefficients = Vec::with_capacity(order);
        let mut last = 0f32;
        while coefficients.len() < order {
            let Some(vector) = codebook.decode_vector(br) else {
                return Ok(FloorState::Unused);
            };
            let mut last_new = last;
            for &e in vector {
                coefficients.push((last + e).cos());
                last_new = e;
                if coefficients.len() == order {
                    return Ok(FloorState::Zero(coefficients, amplitude));
                }
            }
            last += last_new;
        }
        Ok(FloorState::Zero(coefficients, amplitude))
    }

    fn compute_curve(
        &self,
        cos_coefficients: &[f32],
        amplitude: u64,
        long_block: bool,
        n: usize,
    ) -> Vec<f32> {
        let cos_omega = &self.cos_omega[usize::from(long_block)];
        let order = usize::from(self.order);
        let amp_offset = f32::from(self.amplitude_offset);
        let lfv_common =
            amplitude as f32 * amp_offset / ((1u128 << self.amplitude_bits) - 1) as f32;

        let mut output = Vec::with_capacity(n);
        let mut i = 0usize;
        while i < n {
            let omega = cos_omega[i];

            let (p_bound, q_bound) = if order & 1 == 1 {
                ((order - 3) / 2, (order - 1) / 2)
            } else {
                ((order - 2) / 2, (order - 2) / 2)
            };
            let (mut p, mut q) = if order & 1 == 1 {
                (1.0 - omega * omega, 0.25)
            } else {
                ((1.0 - omega) / 2.0, (1.0 + omega) / 2.0)
            };
            for j in 0..=p_bound {
                let m = cos_coefficients[2 * j + 1] - omega;
                p *= 4.0 * m * m;
            }
            for j in 0..=q_bound {
                let m = cos_coefficients[2 * j] - omega;
                q *= 4.0 * m * m;
            }

            let linear_floor_value =
                (0.115_129_25 * (lfv_common / (p + q).sqrt() - amp_offset)).exp();

            // bark 映射中相邻频点可能落在同一 omega 上, 共享同一包络值
            while i < n && cos_omega[i] == omega {
                output.push(linear_floor_value);
                i += 1;
            }
        }
        output
    }
}

/// bark 频率刻度
fn bark(x: f32) -> f32 {
    13.1 * (0.000_74 * x).atan() + 2.24 * (1.85e-8 * x * x).atan() + 1e-4 * x
}

/// 预计算 n 个频点的 cos(omega) bark 映射
fn bark_cos_omega_map(n: usize, rate: u16, bark_map_size: u16) -> Vec<f32> {
    let rate = f32::from(rate);
    let map_size = f32::from(bark_map_size);
    let denom = bark(0.5 * rate);
    (0..n)
        .map(|i| {
            let scaled = (bark(rate * i as f32 / (2.0 * n as f32)) * map_size / denom).floor();
            let mapped = scaled.min(map_size - 1.0);
            (mapped * PI / map_size).cos()
        })
        .collect()
}

// ========================
// floor 1
// ========================

pub(crate) struct FloorOne {
    partition_classes: Vec<u8>,
    class_dimensions: Vec<u8>,
    class_subclasses: Vec<u8>,
    class_masterbooks: Vec<u8>,
    /// 每类的子类码本, -1 表示无码本 (Y 值取 0)
    subclass_books: Vec<Vec<i16>>,
    multiplier: u8,
    x_list: Vec<u32>,
    /// (原索引, X 值) 按 X 升序
    x_sorted: Vec<(usize, u32)>,
    /// x_list[2..] 每个点的 (低邻, 高邻) 原索引
    neighbors: Vec<(usize, usize)>,
}

impl FloorOne {
    fn read(br: &mut PacketBitReader<'_>, codebooks: &[Codebook]) -> ShengResult<Self> {
        let partitions = br.read_bits(5) as usize;
        let mut partition_classes = Vec::with_capacity(partitions);
        let mut maximum_class = 0usize;
        for _ in 0..partitions {
            let class = br.read_bits(4) as u8;
            maximum_class = maximum_class.max(usize::from(class) + 1);
            partition_classes.push(class);
        }

        let mut class_dimensions = Vec::with_capacity(maximum_class);
        let mut class_subclasses = Vec::with_capacity(maximum_class);
        let mut class_masterbooks = Vec::with_capacity(maximum_class);
        let mut subclass_books = Vec::with_capacity(maximum_class);
        for _ in 0..maximum_class {
            class_dimensions.push((br.read_bits(3) + 1) as u8);
            let subclass = br.read_bits(2) as u8;
            class_subclasses.push(subclass);

            if subclass > 0 {
                let masterbook = br.read_bits(8) as usize;
                if masterbook >= codebooks.len() {
                    return Err(ShengError::InvalidData(
                        "Vorbis floor1 masterbook 索引越界".into(),
                    ));
                }
                class_masterbooks.push(masterbook as u8);
            } else {
                class_masterbooks.push(0);
            }

            let count = 1usize << subclass;
            let mut books = Vec::with_capacity(count);
            for _ in 0..count {
                let book = br.read_bits(8) as i32 - 1;
                if book >= codebooks.len() as i32 {
                    return Err(ShengError::InvalidData(
                        "Vorbis floor1 子类码本索引越界".into(),
                    ));
                }
                books.push(book as i16);
            }
            subclass_books.push(books);
        }

        let multiplier = (br.read_bits(2) + 1) as u8;
        let range_bits = br.read_bits(4) as u8;

        // 前两个点 X=0 和 X=2^range_bits 为隐式常量
        let mut x_list = vec![0u32, 1u32 << range_bits];
        for &class in &partition_classes {
            for _ in 0..class_dimensions[usize::from(class)] {
                if x_list.len() >= 65 {
                    return Err(ShengError::InvalidData(
                        "Vorbis floor1 X 列表过长".into(),
                    ));
                }
                x_list.push(br.read_bits(range_bits));
            }
        }
        if br.is_eop() {
            return Err(ShengError::InvalidData(
                "Vorbis floor1 配置在包尾被截断".into(),
            ));
        }

        let mut x_sorted: Vec<(usize, u32)> = x_list.iter().copied().enumerate().collect();
        x_sorted.sort_by_key(|&(_, x)| x);
        for pair in x_sorted.windows(2) {
            if pair[0].1 == pair[1].1 {
                return Err(ShengError::InvalidData(
                    "Vorbis floor1 X 列表含重复值".into(),
                ));
            }
        }

        let neighbors = (2..x_list.len())
            .map(|i| find_neighbors(&x_list, i))
            .collect();

        Ok(FloorOne {
            partition_classes,
            class_dimensions,
            class_subclasses,
            class_masterbooks,
            subclass_books,
            multiplier,
            x_list,
            x_sorted,
            neighbors,
        })
    }

    fn decode(
        &self,
        br: &mut PacketBitReader<'_>,
        codebooks: &[Codebook],
    ) -> ShengResult<FloorState> {
        let nonzero = br.read_flag();
        if br.is_eop() || !nonzero {
            return Ok(FloorState::Unused);
        }

        let range = FLOOR1_RANGES[usize::from(self.multiplier) - 1];
        let y_bits = ilog(range - 1);

        let mut ys = Vec::with_capacity(self.x_list.len());
        ys.push(br.read_bits(y_bits));
        ys.push(br.read_bits(y_bits));
        if br.is_eop() {
            return Ok(FloorState::Unused);
        }

        for &class in &self.partition_classes {
            let class = usize::from(class);
            let cdim = usize::from(self.class_dimensions[class]);
            let cbits = self.class_subclasses[class];
            let csub = (1u32 << cbits) - 1;
            let mut cval = 0u32;
            if cbits > 0 {
                let masterbook = &codebooks[usize::from(self.class_masterbooks[class])];
                match masterbook.decode_scalar(br) {
                    Some(v) => cval = v,
                    None => return Ok(FloorState::Unused),
                }
            }
            for _ in 0..cdim {
                let book = self.subclass_books[class][(cval & csub) as usize];
                cval >>= cbits;
                if book >= 0 {
                    match codebooks[book as usize].decode_scalar(br) {
                        Some(y) => ys.push(y),
                        None => return Ok(FloorState::Unused),
                    }
                } else {
                    ys.push(0);
                }
            }
        }

        Ok(FloorState::One(ys))
    }

    /// 由解码出的 Y 值合成 n 点包络曲线
    fn synthesize(&self, ys: &[u32], n: usize) -> Vec<f32> {
        let (final_y, step2_flag) = self.unwrap_amplitude(ys);

        let y_of = |i: usize| final_y[self.x_sorted[i].0] * u32::from(self.multiplier);
        let flag_of = |i: usize| step2_flag[self.x_sorted[i].0];

        let mut curve = Vec::with_capacity(n);
        let mut lx = 0u32;
        let mut ly = y_of(0);
        let mut hx = 0u32;
        let mut hy = 0u32;
        for i in 1..self.x_sorted.len() {
            if flag_of(i) {
                hy = y_of(i);
                hx = self.x_sorted[i].1;
                render_line(lx, ly, hx, hy, &mut curve);
                lx = hx;
                ly = hy;
            }
        }
        if (hx as usize) < n {
            render_line(hx, hy, n as u32, hy, &mut curve);
        }
        curve.truncate(n);

        curve
            .into_iter()
            .map(|y| INVERSE_DB_TABLE[y as usize])
            .collect()
    }

    /// 邻点预测 + 振幅解包, 返回 (最终 Y 值, 点是否参与渲染)
    fn unwrap_amplitude(&self, ys: &[u32]) -> (Vec<u32>, Vec<bool>) {
        let range = FLOOR1_RANGES[usize::from(self.multiplier) - 1] as i32;
        let mut final_y = Vec::with_capacity(ys.len());
        let mut step2_flag = vec![true; 2];
        final_y.push(ys[0]);
        final_y.push(ys[1]);

        for i in 2..ys.len().min(self.x_list.len()) {
            let (low, high) = self.neighbors[i - 2];
            let predicted = render_point(
                self.x_list[low],
                final_y[low],
                self.x_list[high],
                final_y[high],
                self.x_list[i],
            ) as i32;
            let val = ys[i] as i32;
            let high_room = range - predicted;
            let low_room = predicted;
            let room = high_room.min(low_room) * 2;
            if val != 0 {
                step2_flag[low] = true;
                step2_flag[high] = true;
                step2_flag.push(true);
                let y = if val >= room {
                    if high_room > low_room {
                        predicted + val - low_room
                    } else {
                        predicted - val + high_room - 1
                    }
                } else if val % 2 == 1 {
                    predicted - (val + 1) / 2
                } else {
                    predicted + val / 2
                };
                final_y.push(y as u32);
            } else {
                step2_flag.push(false);
                final_y.push(predicted as u32);
            }
        }

        // 所有最终 Y 值钳制到取值范围内
        for y in &mut final_y {
            *y = (*y).min(range as u32 - 1);
        }
        (final_y, step2_flag)
    }
}

/// 在 arr[..end] 中找出小于 arr[end] 的最大值与大于 arr[end] 的最小值的索引
fn find_neighbors(arr: &[u32], end: usize) -> (usize, usize) {
    let v = arr[end];
    let mut low: Option<(usize, u32)> = None;
    let mut high: Option<(usize, u32)> = None;
    for (i, &x) in arr[..end].iter().enumerate() {
        if x < v {
            if low.is_none_or(|(_, lv)| x > lv) {
                low = Some((i, x));
            }
        } else if x > v && high.is_none_or(|(_, hv)| x < hv) {
            high = Some((i, x));
        }
    }
    (low.unwrap().0, high.unwrap().0)
}

/// 两点直线上 x 处的 y 值 (整数斜率规则)
fn render_point(x0: u32, y0: u32, x1: u32, y1: u32, x: u32) -> u32 {
    let dy = y1 as i32 - y0 as i32;
    let adx = x1 - x0;
    let ady = dy.unsigned_abs();
    let err = ady * (x - x0);
    let off = err / adx;
    if dy < 0 { y0 - off } else { y0 + off }
}

/// Bresenham 直线渲染, 将 [x0, x1) 范围的 y 值追加进 v
fn render_line(x0: u32, y0: u32, x1: u32, y1: u32, v: &mut Vec<u32>) {
    if x1 <= x0 {
        return;
    }
    let dy = y1 as i32 - y0 as i32;
    let adx = (x1 - x0) as i32;
    let base = dy / adx;
    let ady = dy.abs() - base.abs() * adx;
    let sy = base + if dy < 0 { -1 } else { 1 };
    let mut y = y0 as i32;
    let mut err = 0;
    v.push(y as u32);
    for _ in (x0 + 1)..x1 {
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }
        v.push(y as u32);
    }
}

/// floor1 逆 dB 查找表
const INVERSE_DB_TABLE: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
    0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
    0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
    0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
    0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
    0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
    0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
    0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
    0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
    0.00092223983, 0.00098217216, 0.0010459992,  0.0011139742,
    0.0011863665,  0.0012634633,  0.0013455702,  0.0014330129,
    0.0015261382,  0.0016253153,  0.0017309374,  0.0018434235,
    0.0019632195,  0.0020908006,  0.0022266726,  0.0023713743,
    0.0025254795,  0.0026895994,  0.0028643847,  0.0030505286,
    0.0032487691,  0.0034598925,  0.0036847358,  0.0039241906,
    0.0041792066,  0.0044507950,  0.0047400328,  0.0050480668,
    0.0053761186,  0.0057254891,  0.0060975636,  0.0064938176,
    0.0069158225,  0.0073652516,  0.0078438871,  0.0083536271,
    0.0088964928,  0.009474637,   0.010090352,   0.010746080,
    0.011444421,   0.012188144,   0.012980198,   0.013823725,
    0.014722068,   0.015678791,   0.016697687,   0.017782797,
    0.018938423,   0.020169149,   0.021479854,   0.022875735,
    0.024362330,   0.025945531,   0.027631618,   0.029427276,
    0.031339626,   0.033376252,   0.035545228,   0.037855157,
    0.040315199,   0.042935108,   0.045725273,   0.048696758,
    0.051861348,   0.055231591,   0.058820850,   0.062643361,
    0.066714279,   0.071049749,   0.075666962,   0.080584227,
    0.085821044,   0.091398179,   0.097337747,   0.10366330,
    0.11039993,    0.11757434,    0.12521498,    0.13335215,
    0.14201813,    0.15124727,    0.16107617,    0.17154380,
    0.18269168,    0.19456402,    0.20720788,    0.22067342,
    0.23501402,    0.25028656,    0.26655159,    0.28387361,
    0.30232132,    0.32196786,    0.34289114,    0.36517414,
    0.38890521,    0.41417847,    0.44109412,    0.46975890,
    0.50028648,    0.53279791,    0.56742212,    0.60429640,
    0.64356699,    0.68538959,    0.72993007,    0.77736504,
    0.82788260,    0.88168307,    0.9389798,     1.0,
];
