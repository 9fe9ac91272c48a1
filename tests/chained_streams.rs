//! 链式容器测试: 前一逻辑流结束后接续新流段, 参数变更交接.

mod common;

use common::*;

/// 44100 Hz 流段结束后接 48000 Hz 新流段:
/// 读尽第一段 -> is_parameter_change -> 确认后采样率切换并继续产出.
#[test]
fn test_链式流_采样率切换() {
    let setup = silent_setup_packet();
    let first: Vec<Vec<u8>> = (0..4).map(|_| silent_audio_packet()).collect();
    let second: Vec<Vec<u8>> = (0..3).map(|_| silent_audio_packet()).collect();

    let mut data = build_stream(0x0A, 44100, &setup, &first, 0);
    data.extend_from_slice(&build_stream(0x0B, 48000, &setup, &second, 0));

    let mut reader = open_reader(data);
    assert_eq!(reader.sample_rate(), 44100);

    // 读尽第一段
    let mut collected = Vec::new();
    let mut buf = vec![0.0f32; 1024];
    loop {
        let n = reader.read_samples(&mut buf).expect("第一段读取失败");
        collected.extend_from_slice(&buf[..n]);
        if reader.is_parameter_change() {
            break;
        }
        assert!(n > 0, "参数变更前不应出现 EOF");
    }
    assert_eq!(collected.len(), 3 * 1024, "第一段 4 包产出 3 块");
    assert_eq!(reader.sample_rate(), 44100, "确认前仍报告旧流参数");

    // 挂起期间不再产出
    let n = reader.read_samples(&mut buf).expect("挂起期读取失败");
    assert_eq!(n, 0, "参数变更未确认时应返回 0");

    reader.clear_parameter_change();
    assert!(!reader.is_parameter_change());
    assert_eq!(reader.sample_rate(), 48000, "确认后切换到新流参数");

    let second_samples = read_all(&mut reader);
    assert_eq!(second_samples.len(), 2 * 1024, "第二段 3 包产出 2 块");
}

/// 并发复用: 同一容器中两条交织的逻辑流, 读取器只跟随选中的流
#[test]
fn test_并发复用_只跟随选中流() {
    let setup = silent_setup_packet();

    // 流 A (选中) 与流 B 页面交织
    let a_pages = [
        build_page(FLAG_BOS, 0, 0xA, 0, &ident_packet(48000)),
        build_page(0, 0, 0xA, 1, &comment_packet()),
        build_page(0, 0, 0xA, 2, &setup),
        build_page(0, 0, 0xA, 3, &silent_audio_packet()),
        build_page(0, 1024, 0xA, 4, &silent_audio_packet()),
        build_page(FLAG_EOS, 2048, 0xA, 5, &silent_audio_packet()),
    ];
    let b_pages = [
        build_page(FLAG_BOS, 0, 0xB, 0, &ident_packet(8000)),
        build_page(0, 0, 0xB, 1, &comment_packet()),
        build_page(0, 0, 0xB, 2, &setup),
        build_page(FLAG_EOS, 512, 0xB, 3, &silent_audio_packet()),
    ];

    let mut data = Vec::new();
    data.extend_from_slice(&a_pages[0]);
    data.extend_from_slice(&b_pages[0]);
    for (a, b) in a_pages[1..].iter().zip(b_pages[1..].iter()) {
        data.extend_from_slice(a);
        data.extend_from_slice(b);
    }
    data.extend_from_slice(&a_pages[4]);
    data.extend_from_slice(&a_pages[5]);

    let mut reader = open_reader(data);
    assert_eq!(reader.sample_rate(), 48000, "应选中首条 Vorbis 流");

    let samples = read_all(&mut reader);
    assert_eq!(samples.len(), 2 * 1024, "只消费流 A 的 3 个音频包");
    assert!(!reader.is_parameter_change(), "并发流不触发参数变更");
}
