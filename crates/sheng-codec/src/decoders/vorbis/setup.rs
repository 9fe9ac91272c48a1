//! Vorbis setup 头包解析: 码本、floor、residue、mapping 与 mode.
//!
//! 所有配置在此一次性物化, setup 之后不再变更.

use sheng_core::{ShengError, ShengResult};

use super::bitreader::{PacketBitReader, ilog};
use super::codebook::Codebook;
use super::floor::Floor;
use super::mapping::Mapping;
use super::residue::Residue;

/// 解码 mode: 块长标志 + mapping 选择
pub(crate) struct Mode {
    pub(crate) block_flag: bool,
    pub(crate) mapping: u8,
}

/// setup 头包物化出的全部配置
pub(crate) struct Setup {
    pub(crate) codebooks: Vec<Codebook>,
    pub(crate) floors: Vec<Floor>,
    pub(crate) residues: Vec<Residue>,
    pub(crate) mappings: Vec<Mapping>,
    pub(crate) modes: Vec<Mode>,
}

/// 解析 setup 头包 (含 `\x05vorbis` 前缀)
pub(crate) fn parse_setup(
    packet: &[u8],
    channels: u8,
    blocksizes: (u16, u16),
) -> ShengResult<Setup> {
    if packet.len() < 8 {
        return Err(ShengError::InvalidData("Vorbis setup 头包长度不足".into()));
    }
    if packet[0] != 0x05 || &packet[1..7] != b"vorbis" {
        return Err(ShengError::InvalidData("Vorbis setup 头包标识无效".into()));
    }

    let mut br = PacketBitReader::new(&packet[7..]);

    let codebook_count = br.read_bits(8) as usize + 1;
    let mut codebooks = Vec::with_capacity(codebook_count);
    for i in 0..codebook_count {
        let codebook = Codebook::read(&mut br).map_err(|e| {
            ShengError::InvalidData(format!(
                "Vorbis setup codebook[{i}] 解析失败(bit={}): {e}",
                br.bit_position(),
            ))
        })?;
        codebooks.push(codebook);
    }

    parse_time_domain_transforms(&mut br)?;

    let floor_count = br.read_bits(6) as usize + 1;
    let mut floors = Vec::with_capacity(floor_count);
    for i in 0..floor_count {
        let floor = Floor::read(&mut br, &codebooks, blocksizes).map_err(|e| {
            ShengError::InvalidData(format!(
                "Vorbis setup floor[{i}] 解析失败(bit={}): {e}",
                br.bit_position(),
            ))
        })?;
        floors.push(floor);
    }

    let residue_count = br.read_bits(6) as usize + 1;
    let mut residues = Vec::with_capacity(residue_count);
    for i in 0..residue_count {
        let residue = Residue::read(&mut br, &codebooks).map_err(|e| {
            ShengError::InvalidData(format!(
                "Vorbis setup residue[{i}] 解析失败(bit={}): {e}",
                br.bit_position(),
            ))
        })?;
        residues.push(residue);
    }

    let mapping_count = br.read_bits(6) as usize + 1;
    let mut mappings = Vec::with_capacity(mapping_count);
    for i in 0..mapping_count {
        let mapping =
            Mapping::read(&mut br, channels, floors.len(), residues.len()).map_err(|e| {
                ShengError::InvalidData(format!(
                    "Vorbis setup mapping[{i}] 解析失败(bit={}): {e}",
                    br.bit_position(),
                ))
            })?;
        mappings.push(mapping);
    }

    let modes = parse_modes(&mut br, mappings.len())?;

    let framing = br.read_flag();
    if br.is_eop() || !framing {
        return Err(ShengError::InvalidData(
            "Vorbis setup 头包 framing_flag 非法".into(),
        ));
    }

    Ok(Setup {
        codebooks,
        floors,
        residues,
        mappings,
        modes,
    })
}

fn parse_time_domain_transforms(br: &mut PacketBitReader<'_>) -> ShengResult<()> {
    let count = br.read_bits(6) + 1;
    for _ in 0..count {
        let value = br.read_bits(16);
        if value != 0 {
            return Err(ShengError::InvalidData(
                "Vorbis time domain transform 必须为 0".into(),
            ));
        }
    }
    Ok(())
}

fn parse_modes(br: &mut PacketBitReader<'_>, mapping_count: usize) -> ShengResult<Vec<Mode>> {
    let mode_count = br.read_bits(6) as usize + 1;
    let mut modes = Vec::with_capacity(mode_count);
    for _ in 0..mode_count {
        let block_flag = br.read_flag();
        let window_type = br.read_bits(16);
        let transform_type = br.read_bits(16);
        if window_type != 0 || transform_type != 0 {
            return Err(ShengError::InvalidData(
                "Vorbis mode window/transform 必须为 0".into(),
            ));
        }

        let mapping = br.read_bits(8);
        if mapping as usize >= mapping_count {
            return Err(ShengError::InvalidData("Vorbis mode mapping 索引越界".into()));
        }

        modes.push(Mode {
            block_flag,
            mapping: mapping as u8,
        });
    }
    Ok(modes)
}

/// 读取音频包的 mode 索引所需的比特数
pub(crate) fn mode_bits(mode_count: usize) -> u8 {
    ilog(mode_count as u32 - 1)
}
