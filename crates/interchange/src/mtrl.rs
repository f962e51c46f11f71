//! Minimal material (`.mtrl`) reader.
//!
//! Only the header, the texture/UV/color-set offset tables and the string
//! table are decoded. Shader constants and the color table are carried as
//! opaque trailing bytes.
//!
//! ```text
//! u32 version
//! u16 file_size
//! u16 data_set_size
//! u16 string_table_size
//! u16 shader_package_name_offset
//! u8  texture_count
//! u8  uv_set_count
//! u8  color_set_count
//! u8  additional_data_size
//! texture_count   x (u16 offset, u16 flags)
//! uv_set_count    x (u16 offset, u16 index)
//! color_set_count x (u16 offset, u16 index)
//! string table (NUL-terminated strings at the offsets above)
//! additional data, data set, shader data...
//! ```

use byteorder::{ByteOrder, LittleEndian};
use charsnap_common::GamePath;

const HEADER_LEN: usize = 16;
const ENTRY_LEN: usize = 4;
/// Texture flag marking the DX11 spelling of the texture file name.
pub const DX11_FLAG: u16 = 0x8000;
const DX11_PREFIX: &str = "--";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MaterialError {
    #[error("material truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("string offset {0} outside the string table")]
    BadStringOffset(u16),
    #[error("string at offset {0} is not valid UTF-8")]
    BadString(u16),
    #[error("material section too large: {0}")]
    TooLarge(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialTexture {
    pub path: String,
    pub flags: u16,
}

impl MaterialTexture {
    pub fn is_dx11(&self) -> bool {
        self.flags & DX11_FLAG != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialSet {
    pub name: String,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialFile {
    pub version: u32,
    pub shader_package: String,
    pub textures: Vec<MaterialTexture>,
    pub uv_sets: Vec<MaterialSet>,
    pub color_sets: Vec<MaterialSet>,
    /// Everything after the string table, kept verbatim.
    pub trailing: Vec<u8>,
}

impl MaterialFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, MaterialError> {
        need(bytes, HEADER_LEN)?;
        let version = LittleEndian::read_u32(&bytes[0..4]);
        let string_table_size = LittleEndian::read_u16(&bytes[8..10]) as usize;
        let shader_offset = LittleEndian::read_u16(&bytes[10..12]);
        let texture_count = bytes[12] as usize;
        let uv_count = bytes[13] as usize;
        let color_count = bytes[14] as usize;

        let tables_end = HEADER_LEN + (texture_count + uv_count + color_count) * ENTRY_LEN;
        let strings_end = tables_end + string_table_size;
        need(bytes, strings_end)?;
        let strings = &bytes[tables_end..strings_end];

        let entry = |i: usize| {
            let at = HEADER_LEN + i * ENTRY_LEN;
            (
                LittleEndian::read_u16(&bytes[at..at + 2]),
                LittleEndian::read_u16(&bytes[at + 2..at + 4]),
            )
        };
        let mut textures = Vec::with_capacity(texture_count);
        for i in 0..texture_count {
            let (offset, flags) = entry(i);
            textures.push(MaterialTexture {
                path: read_string(strings, offset)?,
                flags,
            });
        }
        let mut uv_sets = Vec::with_capacity(uv_count);
        for i in texture_count..texture_count + uv_count {
            let (offset, index) = entry(i);
            uv_sets.push(MaterialSet {
                name: read_string(strings, offset)?,
                index,
            });
        }
        let mut color_sets = Vec::with_capacity(color_count);
        for i in texture_count + uv_count..texture_count + uv_count + color_count {
            let (offset, index) = entry(i);
            color_sets.push(MaterialSet {
                name: read_string(strings, offset)?,
                index,
            });
        }

        Ok(Self {
            version,
            shader_package: read_string(strings, shader_offset)?,
            textures,
            uv_sets,
            color_sets,
            trailing: bytes[strings_end..].to_vec(),
        })
    }

    /// Serialize with a freshly laid out string table.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MaterialError> {
        let mut strings = Vec::new();
        let mut push = |s: &str| -> Result<u16, MaterialError> {
            let offset = u16::try_from(strings.len()).map_err(|_| MaterialError::TooLarge("strings"))?;
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
            Ok(offset)
        };
        let mut entries = Vec::new();
        for t in &self.textures {
            entries.push((push(&t.path)?, t.flags));
        }
        for s in self.uv_sets.iter().chain(&self.color_sets) {
            entries.push((push(&s.name)?, s.index));
        }
        let shader_offset = push(&self.shader_package)?;

        let count = |n: usize, what| u8::try_from(n).map_err(|_| MaterialError::TooLarge(what));
        let texture_count = count(self.textures.len(), "textures")?;
        let uv_count = count(self.uv_sets.len(), "uv sets")?;
        let color_count = count(self.color_sets.len(), "color sets")?;
        let string_table_size =
            u16::try_from(strings.len()).map_err(|_| MaterialError::TooLarge("strings"))?;
        let total = HEADER_LEN + entries.len() * ENTRY_LEN + strings.len() + self.trailing.len();
        let file_size = u16::try_from(total).map_err(|_| MaterialError::TooLarge("file"))?;

        let mut out = vec![0u8; HEADER_LEN + entries.len() * ENTRY_LEN];
        LittleEndian::write_u32(&mut out[0..4], self.version);
        LittleEndian::write_u16(&mut out[4..6], file_size);
        LittleEndian::write_u16(&mut out[8..10], string_table_size);
        LittleEndian::write_u16(&mut out[10..12], shader_offset);
        out[12] = texture_count;
        out[13] = uv_count;
        out[14] = color_count;
        for (i, (offset, value)) in entries.iter().enumerate() {
            let at = HEADER_LEN + i * ENTRY_LEN;
            LittleEndian::write_u16(&mut out[at..at + 2], *offset);
            LittleEndian::write_u16(&mut out[at + 2..at + 4], *value);
        }
        out.extend_from_slice(&strings);
        out.extend_from_slice(&self.trailing);
        Ok(out)
    }

    /// Every logical path a texture reference may resolve under: the
    /// canonical spelling, plus the `--`-prefixed file name for DX11 textures.
    /// Unusable paths are skipped.
    pub fn texture_candidates(&self) -> Vec<GamePath> {
        let mut out = Vec::new();
        for texture in &self.textures {
            if let Ok(path) = GamePath::new(&texture.path) {
                out.push(path);
            }
            if texture.is_dx11() {
                if let Ok(path) = GamePath::new(&dx11_spelling(&texture.path)) {
                    out.push(path);
                }
            }
        }
        out
    }
}

fn dx11_spelling(raw: &str) -> String {
    let raw = raw.replace('\\', "/");
    match raw.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/{DX11_PREFIX}{file}"),
        None => format!("{DX11_PREFIX}{raw}"),
    }
}

fn need(bytes: &[u8], len: usize) -> Result<(), MaterialError> {
    if bytes.len() < len {
        return Err(MaterialError::Truncated {
            need: len,
            have: bytes.len(),
        });
    }
    Ok(())
}

fn read_string(table: &[u8], offset: u16) -> Result<String, MaterialError> {
    let rest = table
        .get(offset as usize..)
        .filter(|r| !r.is_empty())
        .ok_or(MaterialError::BadStringOffset(offset))?;
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    std::str::from_utf8(&rest[..end])
        .map(str::to_string)
        .map_err(|_| MaterialError::BadString(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MaterialFile {
        MaterialFile {
            version: 0x0103_0000,
            shader_package: "character.shpk".into(),
            textures: vec![
                MaterialTexture {
                    path: "chara/equipment/e0001/texture/v01_c0101e0001_top_n.tex".into(),
                    flags: 0,
                },
                MaterialTexture {
                    path: "chara/equipment/e0001/texture/v01_c0101e0001_top_m.tex".into(),
                    flags: DX11_FLAG,
                },
            ],
            uv_sets: vec![MaterialSet {
                name: "UVSet0".into(),
                index: 0,
            }],
            color_sets: vec![MaterialSet {
                name: "colorSet1".into(),
                index: 0,
            }],
            trailing: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn written_material_parses_back() {
        let material = sample();
        let bytes = material.to_bytes().unwrap();
        assert_eq!(LittleEndian::read_u16(&bytes[4..6]) as usize, bytes.len());
        assert_eq!(MaterialFile::parse(&bytes).unwrap(), material);
    }

    #[test]
    fn dx11_textures_get_both_spellings() {
        let candidates: Vec<String> = sample()
            .texture_candidates()
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert_eq!(
            candidates,
            vec![
                "chara/equipment/e0001/texture/v01_c0101e0001_top_n.tex",
                "chara/equipment/e0001/texture/v01_c0101e0001_top_m.tex",
                "chara/equipment/e0001/texture/--v01_c0101e0001_top_m.tex",
            ]
        );
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = sample().to_bytes().unwrap();
        assert!(matches!(
            MaterialFile::parse(&bytes[..10]),
            Err(MaterialError::Truncated { need: 16, have: 10 })
        ));
        assert!(matches!(
            MaterialFile::parse(&bytes[..30]),
            Err(MaterialError::Truncated { .. })
        ));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        LittleEndian::write_u16(&mut bytes[16..18], 0x7fff);
        assert_eq!(
            MaterialFile::parse(&bytes),
            Err(MaterialError::BadStringOffset(0x7fff))
        );
    }
}
