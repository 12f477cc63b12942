//! The PRAY tagged-block archive format (`.agents`, `.creature`, `.family`).

pub mod block;
pub mod history;
pub mod tags;

pub use block::{BlockType, PrayBlock, FLAG_ZLIB_COMPRESSED};
pub use history::{CreatureHistory, HistoryEvent, HistoryFormat};
pub use tags::{PrayDependency, TagDict, TagValue};

use image::RgbaImage;

use crate::binary_utils::{decode_text, ByteCursor};
use crate::error::{C2eError, C2eResult};
use crate::formats::c16::C16File;
use crate::formats::s16::S16File;

use self::block::BLOCK_NAME_LEN;

/// A parsed or under-construction PRAY container.
#[derive(Default)]
pub struct PrayFile {
    blocks: Vec<PrayBlock>,
}

impl PrayFile {
    pub fn new() -> Self {
        PrayFile::default()
    }

    pub fn from_bytes(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        if cursor.read(4)? != b"PRAY" {
            return Err(C2eError::Format("not a PRAY file (bad magic)".into()));
        }
        let mut file = PrayFile::new();
        while cursor.has_next() {
            let mut tag = [0u8; 4];
            tag.copy_from_slice(cursor.read(4)?);
            let name = decode_text(cursor.read(BLOCK_NAME_LEN)?)
                .trim_matches(&[' ', '\0', '\t', '\r', '\n'][..])
                .to_owned();
            if name.is_empty() {
                break;
            }
            let length = cursor.read_u32()? as usize;
            let uncompressed_len = cursor.read_u32()?;
            let flags = cursor.read_u32()?;
            if cursor.remaining() < length {
                return Err(C2eError::Format(format!(
                    "block {:?} declares {} payload bytes but only {} remain",
                    name,
                    length,
                    cursor.remaining()
                )));
            }
            let payload = cursor.read(length)?.to_vec();
            file.add_block(PrayBlock::from_stream(
                BlockType::from_tag(tag),
                name,
                payload,
                flags,
                uncompressed_len,
            )?)?;
        }
        Ok(file)
    }

    /// Adds a block; names must be unique within the container.
    pub fn add_block(&mut self, block: PrayBlock) -> C2eResult<()> {
        if self.blocks.iter().any(|b| b.name() == block.name()) {
            return Err(C2eError::DuplicateName(block.name().to_owned()));
        }
        self.blocks.push(block);
        Ok(())
    }

    pub fn blocks(&self) -> &[PrayBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [PrayBlock] {
        &mut self.blocks
    }

    pub fn blocks_of_type(&self, block_type: BlockType) -> Vec<&PrayBlock> {
        self.blocks
            .iter()
            .filter(|b| b.block_type() == block_type)
            .collect()
    }

    pub fn block_by_name(&self, name: &str) -> Option<&PrayBlock> {
        self.blocks.iter().find(|b| b.name() == name)
    }

    pub fn block_by_name_mut(&mut self, name: &str) -> Option<&mut PrayBlock> {
        self.blocks.iter_mut().find(|b| b.name() == name)
    }

    /// Sibling-evidence fallback for histories without an explicit format:
    /// a DSEX block in the container implies Docking Station.
    pub fn sibling_history_format(&self) -> HistoryFormat {
        if self.blocks_of_type(BlockType::Dsex).is_empty() {
            HistoryFormat::C3
        } else {
            HistoryFormat::Ds
        }
    }

    pub fn compile(&mut self) -> C2eResult<Vec<u8>> {
        let sibling_format = self.sibling_history_format();
        let mut out = b"PRAY".to_vec();
        for block in &mut self.blocks {
            if let Some(history) = block.history_payload_mut() {
                if history.format == HistoryFormat::Unknown
                    && history.guess_format() != HistoryFormat::Ds
                {
                    history.format = sibling_format;
                }
            }
            out.extend_from_slice(&block.compile()?);
        }
        Ok(out)
    }

    /// Resolves the creator-animation frame an agent block advertises via
    /// its animation tags. A missing or non-FILE sprite block yields a
    /// placeholder description rather than an error.
    pub fn animation_preview(&mut self, agent_name: &str) -> C2eResult<AnimationPreview> {
        let agent = self
            .block_by_name_mut(agent_name)
            .ok_or_else(|| C2eError::Format(format!("no block named {agent_name:?}")))?;
        let tags = agent.tags()?;

        let animation_file = match tags.animation_file() {
            Some(file) if !file.is_empty() => file.to_owned(),
            _ => match tags.animation_gallery() {
                Some(gallery) if !gallery.is_empty() => format!("{gallery}.c16"),
                _ => {
                    return Err(C2eError::Format(format!(
                        "agent {agent_name:?} names no animation file"
                    )))
                }
            },
        };
        let first_image = tags.animation_first_image();
        let animation_start: u32 = tags
            .animation_string()
            .and_then(|s| s.split_whitespace().next())
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let frame_index = (first_image + animation_start) as usize;

        let sprite_block = match self.block_by_name_mut(&animation_file) {
            Some(block) if block.block_type() == BlockType::File => block,
            _ => {
                return Ok(AnimationPreview::Missing(format!(
                    "{animation_file}[{frame_index}]"
                )))
            }
        };
        let data = sprite_block.data()?;
        let lower = animation_file.to_lowercase();
        let surface = if lower.ends_with(".c16") {
            let sprite = C16File::from_bytes(data)?;
            sprite
                .frame(frame_index)
                .ok_or_else(|| {
                    C2eError::Format(format!(
                        "{animation_file} has no frame {frame_index}"
                    ))
                })?
                .surface()
                .clone()
        } else if lower.ends_with(".s16") {
            let mut sprite = S16File::from_bytes(data)?;
            let frame = sprite.frame_mut(frame_index).ok_or_else(|| {
                C2eError::Format(format!("{animation_file} has no frame {frame_index}"))
            })?;
            frame.surface()?.clone()
        } else {
            return Err(C2eError::Unsupported(format!(
                "cannot read {animation_file:?} as a sprite file"
            )));
        };
        Ok(AnimationPreview::Frame(surface))
    }
}

/// Result of resolving an agent's creator animation.
pub enum AnimationPreview {
    Frame(RgbaImage),
    Missing(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::archive;
    use crate::formats::c16::C16Frame;
    use crate::formats::PixelFormat;
    use image::Rgba;

    fn agent_tags() -> TagDict {
        let mut tags = TagDict::new();
        tags.set_int("Agent Type", 0);
        tags.set_string("Agent Description", "an agent");
        tags
    }

    #[test]
    fn typed_round_trip_preserves_tags_names_and_types() {
        let mut file = PrayFile::new();
        file.add_block(PrayBlock::new_tags(BlockType::Agnt, "my agent", agent_tags()).unwrap())
            .unwrap();
        file.add_block(PrayBlock::new_binary(BlockType::File, "data.cos", b"inst".to_vec()).unwrap())
            .unwrap();
        let mut history = CreatureHistory::new("1_moniker", "Norn");
        history.format = HistoryFormat::C3;
        file.add_block(PrayBlock::new_history("1_moniker.GLST", history.clone()).unwrap())
            .unwrap();

        let bytes = file.compile().unwrap();
        let mut reread = PrayFile::from_bytes(&bytes).unwrap();
        assert_eq!(reread.blocks().len(), 3);
        assert_eq!(reread.blocks()[0].block_type(), BlockType::Agnt);
        assert_eq!(reread.blocks()[0].name(), "my agent");
        assert_eq!(reread.blocks()[1].name(), "data.cos");
        assert_eq!(
            reread.blocks_mut()[0].tags().unwrap(),
            &agent_tags()
        );
        assert_eq!(
            reread.block_by_name_mut("1_moniker.GLST").unwrap().history().unwrap(),
            &history
        );
    }

    #[test]
    fn duplicate_names_are_rejected_at_add_time() {
        let mut file = PrayFile::new();
        file.add_block(PrayBlock::new_binary(BlockType::File, "same", vec![]).unwrap())
            .unwrap();
        let err = file
            .add_block(PrayBlock::new_binary(BlockType::Gene, "same", vec![]).unwrap())
            .unwrap_err();
        assert!(matches!(err, C2eError::DuplicateName(name) if name == "same"));
    }

    #[test]
    fn truncated_payload_is_a_format_error() {
        let mut file = PrayFile::new();
        file.add_block(
            PrayBlock::new_binary(BlockType::File, "file", vec![0xAB; 100]).unwrap(),
        )
        .unwrap();
        let mut bytes = file.compile().unwrap();
        bytes.truncate(bytes.len() - 50);
        assert!(matches!(
            PrayFile::from_bytes(&bytes),
            Err(C2eError::Format(_))
        ));
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        assert!(matches!(
            PrayFile::from_bytes(b"PREY....junk"),
            Err(C2eError::Format(_))
        ));
    }

    #[test]
    fn unknown_block_kinds_round_trip_verbatim() {
        let mut file = PrayFile::new();
        file.add_block(
            PrayBlock::new_binary(BlockType::Other(*b"WXYZ"), "future", vec![9, 9, 9]).unwrap(),
        )
        .unwrap();
        let bytes = file.compile().unwrap();
        let mut reread = PrayFile::from_bytes(&bytes).unwrap();
        let block = &mut reread.blocks_mut()[0];
        assert_eq!(block.block_type(), BlockType::Other(*b"WXYZ"));
        assert_eq!(block.data().unwrap(), &[9, 9, 9]);
    }

    #[test]
    fn compressed_glst_block_decodes_through_both_envelopes() {
        // history → archive envelope → block-level zlib, as real exporters do
        let mut history = CreatureHistory::new("2_m", "Dee");
        history.format = HistoryFormat::C3;
        let archived = archive::wrap(&history.encode(HistoryFormat::Unknown)).unwrap();
        let full_len = archived.len() as u32;
        let packed = archive::deflate(&archived).unwrap();

        let mut file = PrayFile::new();
        file.add_block(
            PrayBlock::from_stream(
                BlockType::Glst,
                "2_m.GLST".into(),
                packed,
                FLAG_ZLIB_COMPRESSED,
                full_len,
            )
            .unwrap(),
        )
        .unwrap();
        let decoded = file.block_by_name_mut("2_m.GLST").unwrap().history().unwrap();
        assert_eq!(decoded.moniker, "2_m");
        assert_eq!(decoded.name, "Dee");
    }

    #[test]
    fn animation_preview_resolves_sprite_frames() {
        let surface = RgbaImage::from_pixel(4, 2, Rgba([248, 0, 0, 255]));
        let mut sprite = C16File::new(PixelFormat::Rgb565);
        sprite.add_frame(C16Frame::from_surface(surface.clone()).unwrap());
        sprite.add_frame(C16Frame::from_surface(surface.clone()).unwrap());

        let mut tags = agent_tags();
        tags.set_string("Agent Animation File", "icon.c16");
        tags.set_int("Animation Sprite First Image", 1);
        tags.set_string("Agent Animation String", "0 0 1");

        let mut file = PrayFile::new();
        file.add_block(PrayBlock::new_tags(BlockType::Agnt, "agent", tags).unwrap())
            .unwrap();
        file.add_block(
            PrayBlock::new_binary(BlockType::File, "icon.c16", sprite.compile().unwrap())
                .unwrap(),
        )
        .unwrap();

        match file.animation_preview("agent").unwrap() {
            AnimationPreview::Frame(frame) => assert_eq!(frame, surface),
            AnimationPreview::Missing(_) => panic!("expected a frame"),
        }
    }

    #[test]
    fn animation_preview_tolerates_a_missing_sprite_block() {
        let mut tags = agent_tags();
        tags.set_string("Agent Animation File", "absent.c16");
        let mut file = PrayFile::new();
        file.add_block(PrayBlock::new_tags(BlockType::Dsag, "agent", tags).unwrap())
            .unwrap();
        match file.animation_preview("agent").unwrap() {
            AnimationPreview::Missing(placeholder) => {
                assert_eq!(placeholder, "absent.c16[0]");
            }
            AnimationPreview::Frame(_) => panic!("expected a placeholder"),
        }
    }

    #[test]
    fn sibling_dsex_block_implies_ds_history_format() {
        let mut file = PrayFile::new();
        file.add_block(
            PrayBlock::new_tags(BlockType::Dsex, "creature export", TagDict::new()).unwrap(),
        )
        .unwrap();
        file.add_block(
            PrayBlock::new_history("m.GLST", CreatureHistory::new("m", "n")).unwrap(),
        )
        .unwrap();
        let bytes = file.compile().unwrap();
        let mut reread = PrayFile::from_bytes(&bytes).unwrap();
        let history = reread.block_by_name_mut("m.GLST").unwrap().history().unwrap();
        assert_eq!(history.format, HistoryFormat::Ds);
    }
}
