use crate::binary_utils::{decode_text, write_cstring, write_u16, write_u32, ByteCursor};
use crate::error::{C2eError, C2eResult};
use crate::formats::s16::S16Frame;
use crate::formats::spr::SprFrame;
use crate::formats::PixelFormat;

/// Counts read from untrusted input above this are treated as corruption.
pub const COUNT_SANITY_LIMIT: usize = 512;

fn check_count(what: &'static str, value: usize) -> C2eResult<()> {
    if value > COUNT_SANITY_LIMIT {
        return Err(C2eError::SanityLimit {
            what,
            value,
            limit: COUNT_SANITY_LIMIT,
        });
    }
    Ok(())
}

/// Scripts are stored NUL-terminated with `,` standing in for newlines.
fn read_script(cursor: &mut ByteCursor) -> String {
    cursor.read_cstring().replace(',', "\n")
}

fn write_script(out: &mut Vec<u8>, script: &str) {
    write_cstring(out, &script.replace('\n', ","));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Sprite,
    Sound,
}

impl DependencyKind {
    fn from_code(code: u16) -> Self {
        if code == 0 {
            DependencyKind::Sprite
        } else {
            DependencyKind::Sound
        }
    }

    fn code(self) -> u16 {
        match self {
            DependencyKind::Sprite => 0,
            DependencyKind::Sound => 1,
        }
    }
}

/// A sprite or sound file the agent needs installed alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CobDependency {
    pub kind: DependencyKind,
    pub name: String,
}

/// Calendar date as stored on disk; never converted to a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarDate {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

/// Injector thumbnail. Tagged COBs embed a raw 565 S16 frame; legacy COBs
/// embed a bottom-up palette-indexed SPR frame.
#[derive(Debug)]
pub enum Thumbnail {
    S16(S16Frame),
    Spr(SprFrame),
}

/// The scripted-object payload shared by both COB variants.
#[derive(Debug)]
pub struct CobAgentBlock {
    pub name: String,
    pub description: String,
    /// -1 means unlimited (0xFFFF on disk).
    pub quantity_available: i32,
    pub last_usage: u32,
    pub reuse_interval: u32,
    pub expiry: CalendarDate,
    pub reserved: [u32; 3],
    pub dependencies: Vec<CobDependency>,
    pub thumbnail: Option<Thumbnail>,
    pub install_script: String,
    pub remove_script: String,
    pub event_scripts: Vec<String>,
}

impl CobAgentBlock {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        CobAgentBlock {
            name: name.into(),
            description: description.into(),
            quantity_available: 0,
            last_usage: 0,
            reuse_interval: 0,
            expiry: CalendarDate::default(),
            reserved: [0; 3],
            dependencies: Vec::new(),
            thumbnail: None,
            install_script: String::new(),
            remove_script: String::new(),
            event_scripts: Vec::new(),
        }
    }

    /// Takes the remove script from an RCB file (a COB whose agent install
    /// script is the remover).
    pub fn set_remove_script_from_rcb(&mut self, data: &[u8]) -> C2eResult<()> {
        if !self.remove_script.is_empty() {
            return Err(C2eError::Unsupported(
                "remove script is already set".into(),
            ));
        }
        let rcb = super::Cob::from_bytes(data)?;
        let agent = rcb
            .agent_blocks()
            .into_iter()
            .next()
            .ok_or_else(|| C2eError::Format("RCB contains no agent block".into()))?;
        self.remove_script = agent.install_script.clone();
        Ok(())
    }

    /// Reads the tagged-variant (Creatures 2) layout.
    pub(crate) fn read_tagged(cursor: &mut ByteCursor) -> C2eResult<Self> {
        let quantity = cursor.read_u16()?;
        let quantity_available = if quantity == 0xFFFF {
            -1
        } else {
            quantity as i32
        };
        let last_usage = cursor.read_u32()?;
        let reuse_interval = cursor.read_u32()?;
        let expiry = CalendarDate {
            day: cursor.read_u8()?,
            month: cursor.read_u8()?,
            year: cursor.read_u16()?,
        };
        let reserved = [cursor.read_u32()?, cursor.read_u32()?, cursor.read_u32()?];

        let name = cursor.read_cstring();
        let description = cursor.read_cstring();
        let install_script = read_script(cursor);
        let remove_script = read_script(cursor);

        let event_script_count = cursor.read_u16()? as usize;
        check_count("event script count", event_script_count)?;
        let mut event_scripts = Vec::with_capacity(event_script_count);
        for _ in 0..event_script_count {
            event_scripts.push(read_script(cursor));
        }

        let dependency_count = cursor.read_u16()? as usize;
        check_count("dependency count", dependency_count)?;
        let mut dependencies = Vec::with_capacity(dependency_count);
        for _ in 0..dependency_count {
            let kind = DependencyKind::from_code(cursor.read_u16()?);
            dependencies.push(CobDependency {
                kind,
                name: cursor.read_cstring(),
            });
        }

        let thumb_width = cursor.read_u16()?;
        let thumb_height = cursor.read_u16()?;
        let thumbnail = if thumb_width > 0 && thumb_height > 0 {
            let pixels = cursor
                .read(thumb_width as usize * thumb_height as usize * 2)?
                .to_vec();
            Some(Thumbnail::S16(S16Frame::from_raw(
                thumb_width,
                thumb_height,
                PixelFormat::Rgb565,
                pixels,
            )?))
        } else {
            None
        };

        Ok(CobAgentBlock {
            name,
            description,
            quantity_available,
            last_usage,
            reuse_interval,
            expiry,
            reserved,
            dependencies,
            thumbnail,
            install_script,
            remove_script,
            event_scripts,
        })
    }

    pub(crate) fn compile_tagged(&mut self) -> C2eResult<Vec<u8>> {
        let mut out = Vec::new();
        let quantity = if self.quantity_available < 0 {
            0xFFFF
        } else {
            self.quantity_available as u16
        };
        write_u16(&mut out, quantity);
        write_u32(&mut out, self.last_usage);
        write_u32(&mut out, self.reuse_interval);
        out.push(self.expiry.day);
        out.push(self.expiry.month);
        write_u16(&mut out, self.expiry.year);
        for value in self.reserved {
            write_u32(&mut out, value);
        }
        write_cstring(&mut out, &self.name);
        write_cstring(&mut out, &self.description);
        write_script(&mut out, &self.install_script);
        write_script(&mut out, &self.remove_script);
        write_u16(&mut out, self.event_scripts.len() as u16);
        for script in &self.event_scripts {
            write_script(&mut out, script);
        }
        write_u16(&mut out, self.dependencies.len() as u16);
        for dependency in &self.dependencies {
            write_u16(&mut out, dependency.kind.code());
            write_cstring(&mut out, &dependency.name);
        }
        match &mut self.thumbnail {
            Some(Thumbnail::S16(frame)) => {
                write_u16(&mut out, frame.width());
                write_u16(&mut out, frame.height());
                let pixels = frame.encode(PixelFormat::Rgb565)?;
                out.extend_from_slice(&pixels);
            }
            Some(Thumbnail::Spr(_)) => {
                return Err(C2eError::Unsupported(
                    "legacy SPR thumbnails cannot be written into a tagged COB".into(),
                ))
            }
            None => {
                write_u16(&mut out, 0);
                write_u16(&mut out, 0);
            }
        }
        Ok(out)
    }

    /// Reads the legacy-variant (Creatures 1) layout.
    pub(crate) fn read_legacy(cursor: &mut ByteCursor) -> C2eResult<Self> {
        let quantity_available = cursor.read_u16()? as i32;
        let expiry_month = cursor.read_u32()?;
        let expiry_day = cursor.read_u32()?;
        let expiry_year = cursor.read_u32()?;

        let object_script_count = cursor.read_u16()? as usize;
        check_count("object script count", object_script_count)?;
        let install_script_count = cursor.read_u16()? as usize;
        check_count("install script count", install_script_count)?;
        cursor.skip(4)?; // quantity used

        let mut event_scripts = Vec::with_capacity(object_script_count);
        for _ in 0..object_script_count {
            event_scripts.push(read_legacy_string(cursor)?);
        }
        let mut install_scripts = Vec::with_capacity(install_script_count);
        for _ in 0..install_script_count {
            install_scripts.push(read_legacy_string(cursor)?);
        }

        let picture_width = cursor.read_u32()?;
        let picture_height = cursor.read_u32()?;
        cursor.skip(2)?;
        let thumbnail = if picture_width > 0 && picture_height > 0 {
            let pixels = cursor
                .read(picture_width as usize * picture_height as usize)?
                .to_vec();
            let mut frame =
                SprFrame::from_raw(picture_width as u16, picture_height as u16, pixels)?;
            // stored bottom-up
            frame.flip()?;
            Some(Thumbnail::Spr(frame))
        } else {
            None
        };

        let name_length = cursor.read_u8()? as usize;
        let name = decode_text(cursor.read(name_length)?);

        let mut block = CobAgentBlock::new(name, "");
        block.quantity_available = quantity_available;
        block.expiry = CalendarDate {
            day: expiry_day as u8,
            month: expiry_month as u8,
            year: expiry_year as u16,
        };
        block.event_scripts = event_scripts;
        block.install_script = install_scripts.join("\n");
        block.thumbnail = thumbnail;
        Ok(block)
    }
}

/// Legacy length-prefixed string: a one-byte length, where 255 is an escape
/// meaning "a 16-bit length follows".
fn read_legacy_string(cursor: &mut ByteCursor) -> C2eResult<String> {
    let mut length = cursor.read_u8()? as usize;
    if length == 255 {
        length = cursor.read_u16()? as usize;
    }
    Ok(decode_text(cursor.read(length)?))
}

/// Who made the COB and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CobAuthorBlock {
    pub creation: CalendarDate,
    pub version: u8,
    pub revision: u8,
    pub author_name: String,
    pub author_email: String,
    pub author_url: String,
    pub author_comments: String,
}

impl CobAuthorBlock {
    pub(crate) fn read(cursor: &mut ByteCursor) -> C2eResult<Self> {
        Ok(CobAuthorBlock {
            creation: CalendarDate {
                day: cursor.read_u8()?,
                month: cursor.read_u8()?,
                year: cursor.read_u16()?,
            },
            version: cursor.read_u8()?,
            revision: cursor.read_u8()?,
            author_name: cursor.read_cstring(),
            author_email: cursor.read_cstring(),
            author_url: cursor.read_cstring(),
            author_comments: cursor.read_cstring(),
        })
    }

    pub(crate) fn compile(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.creation.day);
        out.push(self.creation.month);
        write_u16(&mut out, self.creation.year);
        out.push(self.version);
        out.push(self.revision);
        write_cstring(&mut out, &self.author_name);
        write_cstring(&mut out, &self.author_email);
        write_cstring(&mut out, &self.author_url);
        write_cstring(&mut out, &self.author_comments);
        out
    }
}

/// An embedded file carried inside a tagged COB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CobFileBlock {
    pub kind: DependencyKind,
    pub reserved: u32,
    pub name: String,
    pub contents: Vec<u8>,
}

impl CobFileBlock {
    pub(crate) fn read(cursor: &mut ByteCursor) -> C2eResult<Self> {
        let kind = DependencyKind::from_code(cursor.read_u16()?);
        let reserved = cursor.read_u32()?;
        let size = cursor.read_u32()? as usize;
        let name = cursor.read_cstring();
        let contents = cursor.read(size)?.to_vec();
        Ok(CobFileBlock {
            kind,
            reserved,
            name,
            contents,
        })
    }

    pub(crate) fn compile(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_u16(&mut out, self.kind.code());
        write_u32(&mut out, self.reserved);
        write_u32(&mut out, self.contents.len() as u32);
        write_cstring(&mut out, &self.name);
        out.extend_from_slice(&self.contents);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_string_escape_reads_16_bit_length() {
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(b"abc");
        bytes.push(255);
        bytes.extend_from_slice(&300u16.to_le_bytes());
        bytes.extend_from_slice(&vec![b'y'; 300]);
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(read_legacy_string(&mut cursor).unwrap(), "abc");
        assert_eq!(read_legacy_string(&mut cursor).unwrap().len(), 300);
    }

    #[test]
    fn scripts_swap_commas_for_newlines() {
        let mut bytes = Vec::new();
        write_cstring(&mut bytes, "inst,new: simp,endm");
        let mut cursor = ByteCursor::new(&bytes);
        let script = read_script(&mut cursor);
        assert_eq!(script, "inst\nnew: simp\nendm");
        let mut out = Vec::new();
        write_script(&mut out, &script);
        assert_eq!(out, bytes);
    }

    #[test]
    fn author_block_round_trips() {
        let block = CobAuthorBlock {
            creation: CalendarDate {
                day: 14,
                month: 2,
                year: 1998,
            },
            version: 1,
            revision: 3,
            author_name: "Someone".into(),
            author_email: "someone@example.com".into(),
            author_url: "http://example.com".into(),
            author_comments: "a comment".into(),
        };
        let bytes = block.compile();
        let reread = CobAuthorBlock::read(&mut ByteCursor::new(&bytes)).unwrap();
        assert_eq!(reread, block);
    }

    #[test]
    fn file_block_round_trips() {
        let block = CobFileBlock {
            kind: DependencyKind::Sound,
            reserved: 7,
            name: "boing.wav".into(),
            contents: vec![1, 2, 3, 4],
        };
        let bytes = block.compile();
        let reread = CobFileBlock::read(&mut ByteCursor::new(&bytes)).unwrap();
        assert_eq!(reread, block);
    }

    #[test]
    fn oversized_counts_are_corruption() {
        // tagged agent header with an absurd event-script count
        let mut bytes = Vec::new();
        write_u16(&mut bytes, 1); // quantity
        write_u32(&mut bytes, 0); // last usage
        write_u32(&mut bytes, 0); // reuse interval
        bytes.extend_from_slice(&[1, 1]); // expiry day/month
        write_u16(&mut bytes, 2000); // expiry year
        for _ in 0..3 {
            write_u32(&mut bytes, 0);
        }
        write_cstring(&mut bytes, "name");
        write_cstring(&mut bytes, "desc");
        write_cstring(&mut bytes, "");
        write_cstring(&mut bytes, "");
        write_u16(&mut bytes, 600); // event script count
        let err = CobAgentBlock::read_tagged(&mut ByteCursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, C2eError::SanityLimit { value: 600, .. }));
    }
}
