use image::{Rgba, RgbaImage};

use crate::binary_utils::{write_u16, write_u32, ByteCursor};
use crate::error::{C2eError, C2eResult};
use crate::formats::{blank_surface, ensure_nonzero, pack_pixel, PixelFormat};

/// One frame of an S16 sprite: raw 16-bit pixel words, row-major.
///
/// Frames parsed from a file hold their raw words until the pixel surface is
/// first requested; frames built from a surface hold the surface and are
/// packed at encode time.
#[derive(Debug)]
pub struct S16Frame {
    width: u16,
    height: u16,
    format: PixelFormat,
    state: FrameState,
}

#[derive(Debug)]
enum FrameState {
    Raw(Vec<u8>),
    Decoded(RgbaImage),
}

impl S16Frame {
    pub(crate) fn from_raw(
        width: u16,
        height: u16,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> C2eResult<Self> {
        ensure_nonzero(width, height)?;
        Ok(S16Frame {
            width,
            height,
            format,
            state: FrameState::Raw(data),
        })
    }

    pub fn from_surface(surface: RgbaImage) -> C2eResult<Self> {
        if surface.width() == 0 || surface.height() == 0 {
            return Err(C2eError::Format("zero-sized surface".into()));
        }
        Ok(S16Frame {
            width: surface.width() as u16,
            height: surface.height() as u16,
            format: PixelFormat::Rgb565,
            state: FrameState::Decoded(surface),
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Decodes the raw words on first access. A word of 0 becomes a fully
    /// transparent pixel; anything else is opaque.
    pub fn surface(&mut self) -> C2eResult<&RgbaImage> {
        if let FrameState::Raw(data) = &self.state {
            let mut cursor = ByteCursor::new(data);
            let mut surface = blank_surface(self.width, self.height);
            for y in 0..self.height as u32 {
                for x in 0..self.width as u32 {
                    let word = cursor.read_u16()?;
                    if word != 0 {
                        let (r, g, b) = self.format.unpack(word);
                        surface.put_pixel(x, y, Rgba([r, g, b, 255]));
                    }
                }
            }
            self.state = FrameState::Decoded(surface);
        }
        match &self.state {
            FrameState::Decoded(surface) => Ok(surface),
            FrameState::Raw(_) => unreachable!(),
        }
    }

    /// Packs the frame into raw words in the requested layout. Undecoded
    /// frames already in that layout pass through byte-for-byte.
    pub fn encode(&mut self, format: PixelFormat) -> C2eResult<Vec<u8>> {
        if let FrameState::Raw(data) = &self.state {
            if format == self.format {
                return Ok(data.clone());
            }
        }
        let width = self.width;
        let height = self.height;
        let surface = self.surface()?;
        let mut out = Vec::with_capacity(width as usize * height as usize * 2);
        for y in 0..height as u32 {
            for x in 0..width as u32 {
                write_u16(&mut out, pack_pixel(format, surface.get_pixel(x, y)));
            }
        }
        Ok(out)
    }
}

/// An S16 sprite file: format flags, frame count, frame index, pixel data.
pub struct S16File {
    format: PixelFormat,
    frames: Vec<S16Frame>,
}

impl S16File {
    pub fn new(format: PixelFormat) -> Self {
        S16File {
            format,
            frames: Vec::new(),
        }
    }

    pub fn from_bytes(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let flags = cursor.read_u32()?;
        let format = match flags {
            0 => PixelFormat::Rgb555,
            1 => PixelFormat::Rgb565,
            other => {
                return Err(C2eError::Format(format!(
                    "unrecognised S16 flag word {other:#x}"
                )))
            }
        };
        let frame_count = cursor.read_u16()?;
        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let offset = cursor.read_u32()? as usize;
            let width = cursor.read_u16()?;
            let height = cursor.read_u16()?;
            let size = width as usize * height as usize * 2;
            let pixels = cursor.substring(offset, Some(size))?.to_vec();
            frames.push(S16Frame::from_raw(width, height, format, pixels)?);
        }
        Ok(S16File { format, frames })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Sets the layout used when compiling. Parsing is always driven by the
    /// file's own flag word, never by this.
    pub fn set_format(&mut self, format: PixelFormat) {
        self.format = format;
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&S16Frame> {
        self.frames.get(index)
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut S16Frame> {
        self.frames.get_mut(index)
    }

    pub fn frames_mut(&mut self) -> &mut [S16Frame] {
        &mut self.frames
    }

    pub fn add_frame(&mut self, frame: S16Frame) {
        self.frames.push(frame);
    }

    pub fn compile(&mut self) -> C2eResult<Vec<u8>> {
        let format = self.format;
        let encoded: Vec<Vec<u8>> = self
            .frames
            .iter_mut()
            .map(|frame| frame.encode(format))
            .collect::<C2eResult<_>>()?;

        let mut out = Vec::new();
        write_u32(&mut out, if format == PixelFormat::Rgb565 { 1 } else { 0 });
        write_u16(&mut out, self.frames.len() as u16);
        let mut offset = 6 + 8 * self.frames.len() as u32;
        for (frame, bytes) in self.frames.iter().zip(&encoded) {
            write_u32(&mut out, offset);
            write_u16(&mut out, frame.width);
            write_u16(&mut out, frame.height);
            offset += bytes.len() as u32;
        }
        for bytes in &encoded {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }
}
