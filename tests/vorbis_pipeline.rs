//! Vorbis 解码管线端到端测试: 合成的单流 Ogg 容器.

mod common;

use common::*;

/// 静默流: 三个头包 + 全零残差音频包.
/// 首个音频包只起振; 之后每包产出 block1/2 = 1024 个样本, 全为 0.0.
#[test]
fn test_静默流_起振与稳态输出() {
    let setup = silent_setup_packet();
    let packets: Vec<Vec<u8>> = (0..5).map(|_| silent_audio_packet()).collect();
    let data = build_stream(0x1234_5678, 48000, &setup, &packets, 0);

    let mut reader = open_reader(data);
    assert_eq!(reader.sample_rate(), 48000);
    assert_eq!(reader.channels(), 1);
    assert_eq!(reader.comments().unwrap().vendor, "sheng-test");

    let samples = read_all(&mut reader);
    assert_eq!(samples.len(), 4 * 1024, "5 个音频包产出 4 * 1024 个样本");
    assert!(samples.iter().all(|&s| s == 0.0), "静默流应输出全零");

    assert_eq!(reader.current_position(), 4 * 1024);
    let stats = reader.stats();
    assert_eq!(stats.waste_bits, 0);
    assert!(stats.container_bits > 0, "应统计容器开销");
    assert!(!stats.is_clipped);
}

/// 有声流: 解码两次得到比特级一致的输出
#[test]
fn test_有声流_确定性() {
    let setup = audible_setup_packet();
    let packets: Vec<Vec<u8>> = (0..6).map(|a| audible_audio_packet(a as u32)).collect();
    let data = build_stream(0x42, 44100, &setup, &packets, 0);

    let mut r1 = open_reader(data.clone());
    let mut r2 = open_reader(data);
    let s1 = read_all(&mut r1);
    let s2 = read_all(&mut r2);

    assert_eq!(s1.len(), 5 * 1024);
    assert!(s1.iter().any(|&v| v != 0.0), "有声流应产出非零样本");
    assert_eq!(s1, s2, "两次解码必须比特级一致");
}

/// 音频包在 floor 数据中途被截断: 该块按静默处理, 流继续, 不报错
#[test]
fn test_截断音频包_零填充并继续() {
    let setup = audible_setup_packet();
    let mut packets: Vec<Vec<u8>> = (0..6).map(|a| audible_audio_packet(a as u32)).collect();
    // 截断中间一个包: 只留 2 字节, floor 解码在包尾耗尽
    packets[3].truncate(2);
    let data = build_stream(0x42, 44100, &setup, &packets, 0);

    let mut reader = open_reader(data);
    let samples = read_all(&mut reader);
    assert_eq!(samples.len(), 5 * 1024, "截断包仍占一个块的输出");
}

/// 释放后的任何操作返回 Disposed
#[test]
fn test_释放后操作报错() {
    let setup = silent_setup_packet();
    let packets: Vec<Vec<u8>> = (0..3).map(|_| silent_audio_packet()).collect();
    let data = build_stream(1, 48000, &setup, &packets, 0);

    let mut reader = open_reader(data);
    reader.dispose();
    let mut buf = [0.0f32; 64];
    assert!(matches!(
        reader.read_samples(&mut buf),
        Err(sheng::ShengError::Disposed)
    ));
    assert!(matches!(
        reader.seek_to_granule(0),
        Err(sheng::ShengError::Disposed)
    ));
}
