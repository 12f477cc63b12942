//! The COB object-bundle format, in its legacy (Creatures 1) and tagged
//! (Creatures 2, `"cob2"`) layouts.

pub mod blocks;

pub use blocks::{
    CalendarDate, CobAgentBlock, CobAuthorBlock, CobDependency, CobFileBlock, DependencyKind,
    Thumbnail,
};

use crate::binary_utils::{write_u32, ByteCursor};
use crate::containers::archive;
use crate::error::{C2eError, C2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CobVariant {
    /// Creatures 1: a bare version word and a single agent block.
    Legacy,
    /// Creatures 2: `"cob2"` magic and a tagged block stream.
    Tagged,
}

/// One block of a tagged COB. Unrecognised kinds are preserved verbatim so
/// the stream round-trips losslessly.
pub enum CobBlock {
    Agent(CobAgentBlock),
    Author(CobAuthorBlock),
    File(CobFileBlock),
    Unknown { tag: [u8; 4], data: Vec<u8> },
}

impl CobBlock {
    pub fn kind_tag(&self) -> [u8; 4] {
        match self {
            CobBlock::Agent(_) => *b"agnt",
            CobBlock::Author(_) => *b"auth",
            CobBlock::File(_) => *b"file",
            CobBlock::Unknown { tag, .. } => *tag,
        }
    }
}

/// A parsed COB bundle.
pub struct Cob {
    variant: CobVariant,
    blocks: Vec<CobBlock>,
}

impl Cob {
    pub fn new(variant: CobVariant) -> Self {
        Cob {
            variant,
            blocks: Vec::new(),
        }
    }

    /// Sniffs the layout: `"cob2"` magic parses as tagged directly; a
    /// stream that zlib-inflates is a compressed tagged COB; anything else
    /// is tried as legacy.
    pub fn from_bytes(data: &[u8]) -> C2eResult<Self> {
        if data.starts_with(b"cob2") {
            return Self::parse_tagged(data);
        }
        match archive::inflate(data) {
            Ok(inflated) => {
                if inflated.starts_with(b"cob2") {
                    Self::parse_tagged(&inflated)
                } else {
                    Err(C2eError::Format(
                        "compressed stream does not contain a tagged COB".into(),
                    ))
                }
            }
            Err(_) => Self::parse_legacy(data),
        }
    }

    fn parse_tagged(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        cursor.skip(4)?; // magic, checked by the caller
        let mut cob = Cob::new(CobVariant::Tagged);
        while cursor.has_next() {
            let mut tag = [0u8; 4];
            tag.copy_from_slice(cursor.read(4)?);
            let size = cursor.read_u32()? as usize;
            let block = match &tag {
                b"agnt" => CobBlock::Agent(CobAgentBlock::read_tagged(&mut cursor)?),
                b"auth" => {
                    let mut body = ByteCursor::new(cursor.read(size)?);
                    CobBlock::Author(CobAuthorBlock::read(&mut body)?)
                }
                b"file" => {
                    let mut body = ByteCursor::new(cursor.read(size)?);
                    CobBlock::File(CobFileBlock::read(&mut body)?)
                }
                _ => CobBlock::Unknown {
                    tag,
                    data: cursor.read(size)?.to_vec(),
                },
            };
            cob.blocks.push(block);
        }
        Ok(cob)
    }

    fn parse_legacy(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let version = cursor.read_u16()?;
        if version > 4 {
            return Err(C2eError::Format(format!(
                "legacy COB version {version} is not valid"
            )));
        }
        let mut cob = Cob::new(CobVariant::Legacy);
        cob.blocks
            .push(CobBlock::Agent(CobAgentBlock::read_legacy(&mut cursor)?));
        Ok(cob)
    }

    pub fn variant(&self) -> CobVariant {
        self.variant
    }

    pub fn blocks(&self) -> &[CobBlock] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [CobBlock] {
        &mut self.blocks
    }

    pub fn add_block(&mut self, block: CobBlock) {
        self.blocks.push(block);
    }

    pub fn agent_blocks(&self) -> Vec<&CobAgentBlock> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                CobBlock::Agent(agent) => Some(agent),
                _ => None,
            })
            .collect()
    }

    /// Serializes a tagged COB. The legacy layout is read-only.
    pub fn compile(&mut self) -> C2eResult<Vec<u8>> {
        if self.variant != CobVariant::Tagged {
            return Err(C2eError::Unsupported(
                "legacy COBs cannot be compiled".into(),
            ));
        }
        let mut out = b"cob2".to_vec();
        for block in &mut self.blocks {
            let (tag, body) = match block {
                CobBlock::Agent(agent) => (*b"agnt", agent.compile_tagged()?),
                CobBlock::Author(author) => (*b"auth", author.compile()),
                CobBlock::File(file) => (*b"file", file.compile()),
                CobBlock::Unknown { tag, data } => (*tag, data.clone()),
            };
            out.extend_from_slice(&tag);
            write_u32(&mut out, body.len() as u32);
            out.extend_from_slice(&body);
        }
        Ok(out)
    }
}
