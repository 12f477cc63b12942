use image::{Rgba, RgbaImage};

use crate::binary_utils::{write_u16, write_u32, ByteCursor};
use crate::error::{C2eError, C2eResult};
use crate::formats::{blank_surface, pack_pixel, PixelFormat};

/// Longest run expressible once bit 0 is reserved for the run-type flag.
const MAX_RUN: u16 = 0x7FFF;

/// One frame of a C16 sprite. Runs are decoded as soon as the frame is read,
/// since finding a frame's extent requires walking its runs anyway.
pub struct C16Frame {
    surface: RgbaImage,
}

impl C16Frame {
    pub fn from_surface(surface: RgbaImage) -> C2eResult<Self> {
        if surface.width() == 0 || surface.height() == 0 {
            return Err(C2eError::Format("zero-sized surface".into()));
        }
        Ok(C16Frame { surface })
    }

    pub fn width(&self) -> u16 {
        self.surface.width() as u16
    }

    pub fn height(&self) -> u16 {
        self.surface.height() as u16
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    fn decode(
        data: &[u8],
        offset: usize,
        width: u16,
        height: u16,
        format: PixelFormat,
    ) -> C2eResult<Self> {
        if width == 0 || height == 0 {
            return Err(C2eError::Format(format!(
                "zero-sized frame ({width}x{height})"
            )));
        }
        let mut cursor = ByteCursor::new(data);
        cursor.seek(offset)?;
        let mut surface = blank_surface(width, height);
        for y in 0..height as u32 {
            let mut x = 0u32;
            while x < width as u32 {
                let run = cursor.read_u16()?;
                if run == 0 {
                    return Err(C2eError::Format(format!(
                        "line terminator inside row {y} at column {x}"
                    )));
                }
                let run_length = (run >> 1) as u32;
                if x + run_length > width as u32 {
                    return Err(C2eError::Format(format!(
                        "run of {run_length} pixels overflows row {y} at column {x}"
                    )));
                }
                if run & 1 == 0 {
                    // transparent run: no further words
                    x += run_length;
                } else {
                    for _ in 0..run_length {
                        let word = cursor.read_u16()?;
                        if word != 0 {
                            let (r, g, b) = format.unpack(word);
                            surface.put_pixel(x, y, Rgba([r, g, b, 255]));
                        }
                        x += 1;
                    }
                }
            }
            // line terminator
            cursor.read_u16()?;
        }
        Ok(C16Frame { surface })
    }

    /// Run-length-encodes the frame. Returns the encoded bytes together with
    /// the byte offset of each row after the first, relative to the start of
    /// the frame data; the file-level index table needs them.
    pub fn encode(&self, format: PixelFormat) -> (Vec<u32>, Vec<u8>) {
        fn flush(transparent: bool, length: u16, words: &mut Vec<u8>, out: &mut Vec<u8>) {
            if length == 0 {
                return;
            }
            if transparent {
                write_u16(out, length << 1);
            } else {
                write_u16(out, (length << 1) | 1);
                out.append(words);
            }
        }

        let mut data = Vec::new();
        let mut row_offsets = Vec::with_capacity(self.surface.height() as usize - 1);

        for y in 0..self.surface.height() {
            if y > 0 {
                row_offsets.push(data.len() as u32);
            }
            let mut run_transparent = true;
            let mut run_length: u16 = 0;
            let mut run_words: Vec<u8> = Vec::new();

            for x in 0..self.surface.width() {
                let word = pack_pixel(format, self.surface.get_pixel(x, y));
                let transparent = word == 0;
                if run_length > 0 && transparent == run_transparent && run_length < MAX_RUN {
                    run_length += 1;
                } else {
                    flush(run_transparent, run_length, &mut run_words, &mut data);
                    run_transparent = transparent;
                    run_length = 1;
                }
                if !transparent {
                    write_u16(&mut run_words, word);
                }
            }
            flush(run_transparent, run_length, &mut run_words, &mut data);
            write_u16(&mut data, 0); // line terminator
        }
        write_u16(&mut data, 0); // frame terminator
        (row_offsets, data)
    }
}

/// A C16 sprite file: flag word (bit 0 layout, bit 1 RLE), frame count,
/// per-frame index with row offsets, then run data.
pub struct C16File {
    format: PixelFormat,
    frames: Vec<C16Frame>,
}

impl C16File {
    pub fn new(format: PixelFormat) -> Self {
        C16File {
            format,
            frames: Vec::new(),
        }
    }

    pub fn from_bytes(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let flags = cursor.read_u32()?;
        if flags & 2 == 0 {
            return Err(C2eError::Format(
                "flag word has no RLE bit; this is an S16 masquerading as a C16".into(),
            ));
        }
        if flags > 3 {
            return Err(C2eError::Format(format!(
                "unrecognised C16 flag word {flags:#x}"
            )));
        }
        let format = if flags & 1 == 1 {
            PixelFormat::Rgb565
        } else {
            PixelFormat::Rgb555
        };
        let frame_count = cursor.read_u16()?;
        if frame_count < 1 {
            return Err(C2eError::Format("sprite file contains no frames".into()));
        }
        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let offset = cursor.read_u32()? as usize;
            let width = cursor.read_u16()?;
            let height = cursor.read_u16()?;
            // per-row offsets; re-derived at compile time
            for _ in 1..height {
                cursor.read_u32()?;
            }
            frames.push(C16Frame::decode(data, offset, width, height, format)?);
        }
        Ok(C16File { format, frames })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn set_format(&mut self, format: PixelFormat) {
        self.format = format;
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&C16Frame> {
        self.frames.get(index)
    }

    pub fn add_frame(&mut self, frame: C16Frame) {
        self.frames.push(frame);
    }

    pub fn compile(&self) -> C2eResult<Vec<u8>> {
        let encoded: Vec<(Vec<u32>, Vec<u8>)> = self
            .frames
            .iter()
            .map(|frame| frame.encode(self.format))
            .collect();

        let mut out = Vec::new();
        let flags = 2 | if self.format == PixelFormat::Rgb565 { 1 } else { 0 };
        write_u32(&mut out, flags);
        write_u16(&mut out, self.frames.len() as u16);

        // the index itself holds 8 bytes plus (height-1) row offsets per frame
        let mut offset = 6u32
            + self
                .frames
                .iter()
                .map(|f| 8 + (f.height() as u32 - 1) * 4)
                .sum::<u32>();
        for (frame, (row_offsets, data)) in self.frames.iter().zip(&encoded) {
            write_u32(&mut out, offset);
            write_u16(&mut out, frame.width());
            write_u16(&mut out, frame.height());
            for row_offset in row_offsets {
                write_u32(&mut out, offset + row_offset);
            }
            offset += data.len() as u32;
        }
        for (_, data) in &encoded {
            out.extend_from_slice(data);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped_surface(width: u32, height: u32) -> RgbaImage {
        let mut surface = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let pixel = if (x / 3) % 2 == 0 {
                    Rgba([248, 0, 0, 255])
                } else {
                    Rgba([0, 0, 0, 0])
                };
                surface.put_pixel(x, y, pixel);
            }
        }
        surface
    }

    #[test]
    fn file_round_trips_both_layouts() {
        for format in [PixelFormat::Rgb555, PixelFormat::Rgb565] {
            let surface = striped_surface(10, 3);
            let mut file = C16File::new(format);
            file.add_frame(C16Frame::from_surface(surface.clone()).unwrap());
            let bytes = file.compile().unwrap();

            let reread = C16File::from_bytes(&bytes).unwrap();
            assert_eq!(reread.format(), format);
            assert_eq!(reread.frame(0).unwrap().surface(), &surface);
        }
    }

    #[test]
    fn consecutive_same_colour_pixels_merge_into_one_run() {
        let surface = RgbaImage::from_pixel(8, 1, Rgba([0, 248, 0, 255]));
        let (rows, data) = C16Frame::from_surface(surface).unwrap().encode(PixelFormat::Rgb565);
        assert!(rows.is_empty());
        // run word + 8 pixels + line terminator + frame terminator
        assert_eq!(data.len(), 2 + 16 + 2 + 2);
        assert_eq!(u16::from_le_bytes([data[0], data[1]]), (8 << 1) | 1);
    }

    #[test]
    fn oversized_run_splits_below_length_limit() {
        let surface = RgbaImage::from_pixel(100_000, 1, Rgba([248, 0, 0, 255]));
        let (_, data) = C16Frame::from_surface(surface).unwrap().encode(PixelFormat::Rgb565);
        let mut cursor = ByteCursor::new(&data);
        let mut painted = 0u32;
        let mut runs = 0;
        loop {
            let run = cursor.read_u16().unwrap();
            if run == 0 {
                break;
            }
            let length = run >> 1;
            assert!(length <= 0x7FFF);
            assert_eq!(run & 1, 1);
            cursor.skip(length as usize * 2).unwrap();
            painted += length as u32;
            runs += 1;
        }
        assert_eq!(painted, 100_000);
        assert!(runs > 1);
    }

    #[test]
    fn transparent_runs_consume_no_pixel_words() {
        let surface = RgbaImage::from_pixel(5, 1, Rgba([0, 0, 0, 0]));
        let (_, data) = C16Frame::from_surface(surface).unwrap().encode(PixelFormat::Rgb565);
        // transparent run word + line terminator + frame terminator
        assert_eq!(data, vec![0x0A, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn s16_flag_word_is_rejected() {
        let mut bytes = Vec::new();
        write_u32(&mut bytes, 1); // RLE bit missing
        write_u16(&mut bytes, 1);
        assert!(matches!(
            C16File::from_bytes(&bytes),
            Err(C2eError::Format(_))
        ));
    }

    #[test]
    fn row_offsets_point_at_row_starts() {
        let surface = striped_surface(7, 4);
        let mut file = C16File::new(PixelFormat::Rgb565);
        file.add_frame(C16Frame::from_surface(surface).unwrap());
        let bytes = file.compile().unwrap();

        let mut cursor = ByteCursor::new(&bytes);
        cursor.skip(6).unwrap();
        let frame_offset = cursor.read_u32().unwrap() as usize;
        cursor.skip(4).unwrap(); // width, height
        let second_row = cursor.read_u32().unwrap() as usize;
        assert!(second_row > frame_offset);
        // a run word, never a terminator, starts each row
        let word = u16::from_le_bytes([bytes[second_row], bytes[second_row + 1]]);
        assert_ne!(word, 0);
    }
}
