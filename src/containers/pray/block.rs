use crate::binary_utils::{decode_text, encode_text, write_u32};
use crate::containers::archive;
use crate::containers::pray::history::{CreatureHistory, HistoryFormat};
use crate::containers::pray::tags::TagDict;
use crate::error::{C2eError, C2eResult};

/// Flag bit 0: the payload is independently zlib-compressed on disk.
pub const FLAG_ZLIB_COMPRESSED: u32 = 1;

/// On-disk block names occupy a fixed 128-byte field.
pub const BLOCK_NAME_LEN: usize = 128;

/// The closed set of block kinds. Several kinds share one codec: the
/// tag-dictionary kinds differ only in which named tags callers expect, and
/// the opaque kinds are raw payloads whose internal layout is not understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Creatures 3 agent metadata.
    Agnt,
    /// Docking Station agent metadata.
    Dsag,
    /// Sea-Monkeys agent metadata.
    Live,
    /// Creatures 3 exported-creature metadata.
    Expc,
    /// Docking Station exported-creature metadata.
    Dsex,
    /// Egg metadata.
    Eggs,
    /// Docking Station starter family.
    Dfam,
    /// Creatures 3 starter family.
    Sfam,
    /// Creature life history (archived).
    Glst,
    /// Embedded file payload.
    File,
    /// Creature photograph (an S16 file).
    Phot,
    /// Genetics payload.
    Gene,
    /// Exported creature state.
    Crea,
    /// Anything else: preserved verbatim.
    Other([u8; 4]),
}

impl BlockType {
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"AGNT" => BlockType::Agnt,
            b"DSAG" => BlockType::Dsag,
            b"LIVE" => BlockType::Live,
            b"EXPC" => BlockType::Expc,
            b"DSEX" => BlockType::Dsex,
            b"EGGS" => BlockType::Eggs,
            b"DFAM" => BlockType::Dfam,
            b"SFAM" => BlockType::Sfam,
            b"GLST" => BlockType::Glst,
            b"FILE" => BlockType::File,
            b"PHOT" => BlockType::Phot,
            b"GENE" => BlockType::Gene,
            b"CREA" => BlockType::Crea,
            _ => BlockType::Other(tag),
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        match self {
            BlockType::Agnt => *b"AGNT",
            BlockType::Dsag => *b"DSAG",
            BlockType::Live => *b"LIVE",
            BlockType::Expc => *b"EXPC",
            BlockType::Dsex => *b"DSEX",
            BlockType::Eggs => *b"EGGS",
            BlockType::Dfam => *b"DFAM",
            BlockType::Sfam => *b"SFAM",
            BlockType::Glst => *b"GLST",
            BlockType::File => *b"FILE",
            BlockType::Phot => *b"PHOT",
            BlockType::Gene => *b"GENE",
            BlockType::Crea => *b"CREA",
            BlockType::Other(tag) => *tag,
        }
    }

    /// Kinds whose payload is a tag dictionary.
    pub fn is_tag_dictionary(&self) -> bool {
        matches!(
            self,
            BlockType::Agnt
                | BlockType::Dsag
                | BlockType::Live
                | BlockType::Expc
                | BlockType::Dsex
                | BlockType::Eggs
                | BlockType::Dfam
                | BlockType::Sfam
        )
    }

    pub fn name(&self) -> String {
        decode_text(&self.tag())
    }
}

/// The explicit raw/decoded duality: a block parsed from a stream starts
/// `Raw` and converts on first structured access; a block built through the
/// typed API starts decoded and is only serialized at compile time.
enum Payload {
    Raw(Vec<u8>),
    Tags(TagDict),
    History(CreatureHistory),
}

/// One named, typed record in a PRAY stream.
pub struct PrayBlock {
    block_type: BlockType,
    name: String,
    flags: u32,
    /// Declared uncompressed length, known for blocks read from a stream.
    uncompressed_len: Option<u32>,
    /// True while `Raw` bytes are still in their on-disk compressed form.
    raw_compressed: bool,
    payload: Payload,
}

fn check_name(name: &str) -> C2eResult<()> {
    if encode_text(name).len() > BLOCK_NAME_LEN {
        return Err(C2eError::Format(format!(
            "block name longer than {BLOCK_NAME_LEN} bytes: {name:?}"
        )));
    }
    Ok(())
}

impl PrayBlock {
    /// Block read from a stream; the payload stays raw until first access.
    pub(crate) fn from_stream(
        block_type: BlockType,
        name: String,
        payload: Vec<u8>,
        flags: u32,
        uncompressed_len: u32,
    ) -> C2eResult<Self> {
        check_name(&name)?;
        Ok(PrayBlock {
            block_type,
            name,
            raw_compressed: flags & FLAG_ZLIB_COMPRESSED != 0,
            flags,
            uncompressed_len: Some(uncompressed_len),
            payload: Payload::Raw(payload),
        })
    }

    /// Tag-dictionary block built through the typed API.
    pub fn new_tags(block_type: BlockType, name: impl Into<String>, tags: TagDict) -> C2eResult<Self> {
        if !block_type.is_tag_dictionary() {
            return Err(C2eError::Unsupported(format!(
                "{} blocks do not hold tag dictionaries",
                block_type.name()
            )));
        }
        let name = name.into();
        check_name(&name)?;
        Ok(PrayBlock {
            block_type,
            name,
            flags: 0,
            uncompressed_len: None,
            raw_compressed: false,
            payload: Payload::Tags(tags),
        })
    }

    /// Life-history block built through the typed API.
    pub fn new_history(name: impl Into<String>, history: CreatureHistory) -> C2eResult<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(PrayBlock {
            block_type: BlockType::Glst,
            name,
            flags: 0,
            uncompressed_len: None,
            raw_compressed: false,
            payload: Payload::History(history),
        })
    }

    /// Opaque block holding arbitrary bytes.
    pub fn new_binary(
        block_type: BlockType,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> C2eResult<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(PrayBlock {
            block_type,
            name,
            flags: 0,
            uncompressed_len: None,
            raw_compressed: false,
            payload: Payload::Raw(data),
        })
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_ZLIB_COMPRESSED != 0
    }

    /// Requests (or cancels) compression for the next compile.
    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.flags |= FLAG_ZLIB_COMPRESSED;
        } else if !self.raw_compressed {
            self.flags &= !FLAG_ZLIB_COMPRESSED;
        }
    }

    /// Size of the payload as currently held, for listings.
    pub fn payload_len(&self) -> usize {
        match &self.payload {
            Payload::Raw(data) => data.len(),
            Payload::Tags(tags) => tags.encode().len(),
            Payload::History(history) => history.encode(HistoryFormat::Unknown).len(),
        }
    }

    /// The raw payload bytes, inflating them first (and clearing the
    /// compression flag) when they are still compressed. Only available
    /// while the block has not been decoded into a typed payload.
    pub fn data(&mut self) -> C2eResult<&[u8]> {
        match &mut self.payload {
            Payload::Raw(data) => {
                if self.raw_compressed {
                    *data = archive::inflate(data)?;
                    self.raw_compressed = false;
                    self.flags &= !FLAG_ZLIB_COMPRESSED;
                }
                Ok(data)
            }
            _ => Err(C2eError::Unsupported(
                "block has been decoded; compile it to get bytes".into(),
            )),
        }
    }

    /// The tag dictionary, decoding the raw payload on first access.
    pub fn tags(&mut self) -> C2eResult<&TagDict> {
        self.ensure_tags()?;
        match &self.payload {
            Payload::Tags(tags) => Ok(tags),
            _ => unreachable!(),
        }
    }

    pub fn tags_mut(&mut self) -> C2eResult<&mut TagDict> {
        self.ensure_tags()?;
        match &mut self.payload {
            Payload::Tags(tags) => Ok(tags),
            _ => unreachable!(),
        }
    }

    fn ensure_tags(&mut self) -> C2eResult<()> {
        if !self.block_type.is_tag_dictionary() {
            return Err(C2eError::Unsupported(format!(
                "cannot decode a {} block as a tag dictionary",
                self.block_type.name()
            )));
        }
        if matches!(self.payload, Payload::Raw(_)) {
            let tags = TagDict::decode(self.data()?)?;
            self.payload = Payload::Tags(tags);
        }
        Ok(())
    }

    /// The creature history, de-archiving and decoding on first access.
    pub fn history(&mut self) -> C2eResult<&CreatureHistory> {
        self.ensure_history()?;
        match &self.payload {
            Payload::History(history) => Ok(history),
            _ => unreachable!(),
        }
    }

    pub fn history_mut(&mut self) -> C2eResult<&mut CreatureHistory> {
        self.ensure_history()?;
        match &mut self.payload {
            Payload::History(history) => Ok(history),
            _ => unreachable!(),
        }
    }

    fn ensure_history(&mut self) -> C2eResult<()> {
        if self.block_type != BlockType::Glst {
            return Err(C2eError::Unsupported(format!(
                "cannot decode a {} block as a creature history",
                self.block_type.name()
            )));
        }
        if matches!(self.payload, Payload::Raw(_)) {
            let data = self.data()?;
            let plain = if archive::is_archived(data) {
                archive::unwrap(data)?
            } else {
                data.to_vec()
            };
            self.payload = Payload::History(CreatureHistory::decode(&plain)?);
        }
        Ok(())
    }

    pub(crate) fn history_payload_mut(&mut self) -> Option<&mut CreatureHistory> {
        match &mut self.payload {
            Payload::History(history) => Some(history),
            _ => None,
        }
    }

    /// Serializes the block: payload body, flag operations, then the header.
    pub fn compile(&self) -> C2eResult<Vec<u8>> {
        let (body, uncompressed_len) = match &self.payload {
            Payload::Raw(data) => {
                if self.is_compressed() {
                    if self.raw_compressed {
                        // still in on-disk form: pass through
                        let full = self.uncompressed_len.unwrap_or(data.len() as u32);
                        (data.clone(), full)
                    } else {
                        (archive::deflate(data)?, data.len() as u32)
                    }
                } else {
                    (data.clone(), data.len() as u32)
                }
            }
            Payload::Tags(tags) => {
                let encoded = tags.encode();
                let full = encoded.len() as u32;
                if self.is_compressed() {
                    (archive::deflate(&encoded)?, full)
                } else {
                    (encoded, full)
                }
            }
            Payload::History(history) => {
                let encoded = archive::wrap(&history.encode(HistoryFormat::Unknown))?;
                let full = encoded.len() as u32;
                if self.is_compressed() {
                    (archive::deflate(&encoded)?, full)
                } else {
                    (encoded, full)
                }
            }
        };

        let mut out = Vec::with_capacity(4 + BLOCK_NAME_LEN + 12 + body.len());
        out.extend_from_slice(&self.block_type.tag());
        let name_bytes = encode_text(&self.name);
        out.extend_from_slice(&name_bytes);
        out.resize(out.len() + BLOCK_NAME_LEN - name_bytes.len(), b' ');
        write_u32(&mut out, body.len() as u32);
        write_u32(&mut out, uncompressed_len);
        write_u32(&mut out, self.flags);
        out.extend_from_slice(&body);
        Ok(out)
    }
}
