use std::path::Path;
use std::sync::OnceLock;

use image::{Rgba, RgbaImage};

use crate::binary_utils::{write_u16, write_u32, ByteCursor};
use crate::error::{C2eError, C2eResult};
use crate::formats::{blank_surface, ensure_nonzero};

/// The 256-entry RGB palette SPR indices map through.
///
/// On disk (`palette.dta`) each channel is 6-bit and is scaled by 4 on load.
/// The palette is injected into the codec; `install`/`shared` offer an
/// optional set-once process-wide slot for tools that load it from a file
/// exactly once.
#[derive(Clone)]
pub struct Palette {
    entries: [[u8; 3]; 256],
}

static SHARED_PALETTE: OnceLock<Palette> = OnceLock::new();

impl Palette {
    pub fn from_rgb(entries: [[u8; 3]; 256]) -> Self {
        Palette { entries }
    }

    /// Parses a 768-byte `.dta` palette (256 x 6-bit RGB).
    pub fn from_dta(data: &[u8]) -> C2eResult<Self> {
        if data.len() != 768 {
            return Err(C2eError::Format(format!(
                "palette data is {} bytes, expected 768",
                data.len()
            )));
        }
        let mut entries = [[0u8; 3]; 256];
        let scale = |v: u8| (v as u32 * 4).min(255) as u8;
        for (i, chunk) in data.chunks_exact(3).enumerate() {
            entries[i] = [scale(chunk[0]), scale(chunk[1]), scale(chunk[2])];
        }
        Ok(Palette { entries })
    }

    pub fn load(path: &Path) -> C2eResult<Self> {
        Self::from_dta(&std::fs::read(path)?)
    }

    /// Installs the process-wide palette. Returns false if one was already
    /// installed (the first install wins).
    pub fn install(palette: Palette) -> bool {
        SHARED_PALETTE.set(palette).is_ok()
    }

    pub fn shared() -> Option<&'static Palette> {
        SHARED_PALETTE.get()
    }

    pub fn color(&self, index: u8) -> [u8; 3] {
        self.entries[index as usize]
    }

    /// Nearest palette entry by squared RGB distance, scanning in ascending
    /// index order; the first entry at the minimum distance wins. Index 0 is
    /// skipped while `keep_black` is set, so opaque black pixels cannot
    /// collapse into the transparent slot.
    pub fn nearest(&self, r: u8, g: u8, b: u8, keep_black: bool) -> u8 {
        let mut best = 0u8;
        let mut best_distance = u32::MAX;
        for (index, entry) in self.entries.iter().enumerate() {
            if index == 0 && keep_black {
                continue;
            }
            let dr = r as i32 - entry[0] as i32;
            let dg = g as i32 - entry[1] as i32;
            let db = b as i32 - entry[2] as i32;
            let distance = (dr * dr + dg * dg + db * db) as u32;
            if distance == 0 {
                return index as u8;
            }
            if distance < best_distance {
                best_distance = distance;
                best = index as u8;
            }
        }
        best
    }
}

/// One frame of an SPR sprite: one palette index per pixel, row-major.
#[derive(Debug)]
pub struct SprFrame {
    width: u16,
    height: u16,
    keep_black: bool,
    state: FrameState,
}

#[derive(Debug)]
enum FrameState {
    Raw(Vec<u8>),
    Decoded(RgbaImage),
}

impl SprFrame {
    pub fn from_raw(width: u16, height: u16, data: Vec<u8>) -> C2eResult<Self> {
        ensure_nonzero(width, height)?;
        if data.len() != width as usize * height as usize {
            return Err(C2eError::Format(format!(
                "SPR frame data is {} bytes, expected {}",
                data.len(),
                width as usize * height as usize
            )));
        }
        Ok(SprFrame {
            width,
            height,
            keep_black: true,
            state: FrameState::Raw(data),
        })
    }

    pub fn from_surface(surface: RgbaImage) -> C2eResult<Self> {
        if surface.width() == 0 || surface.height() == 0 {
            return Err(C2eError::Format("zero-sized surface".into()));
        }
        Ok(SprFrame {
            width: surface.width() as u16,
            height: surface.height() as u16,
            keep_black: true,
            state: FrameState::Decoded(surface),
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Controls the meaning of palette index 0: kept reserved for
    /// transparency (the default), or treated as the palette's slot-0
    /// colour on both decode and encode.
    pub fn set_keep_black(&mut self, keep_black: bool) {
        self.keep_black = keep_black;
    }

    /// Reverses the row order of the raw index data. Legacy COB thumbnails
    /// are stored bottom-up. Only valid before the frame is decoded.
    pub fn flip(&mut self) -> C2eResult<()> {
        match &mut self.state {
            FrameState::Raw(data) => {
                let width = self.width as usize;
                let flipped: Vec<u8> = data
                    .chunks_exact(width)
                    .rev()
                    .flatten()
                    .copied()
                    .collect();
                *data = flipped;
                Ok(())
            }
            FrameState::Decoded(_) => Err(C2eError::Unsupported(
                "cannot flip a frame that has already been decoded".into(),
            )),
        }
    }

    pub fn surface(&mut self, palette: &Palette) -> C2eResult<&RgbaImage> {
        if let FrameState::Raw(data) = &self.state {
            let mut surface = blank_surface(self.width, self.height);
            for y in 0..self.height as u32 {
                for x in 0..self.width as u32 {
                    let index = data[(y * self.width as u32 + x) as usize];
                    if index == 0 && self.keep_black {
                        continue; // stays transparent
                    }
                    let [r, g, b] = palette.color(index);
                    surface.put_pixel(x, y, Rgba([r, g, b, 255]));
                }
            }
            self.state = FrameState::Decoded(surface);
        }
        match &self.state {
            FrameState::Decoded(surface) => Ok(surface),
            FrameState::Raw(_) => unreachable!(),
        }
    }

    /// Quantizes the frame back to palette indices. Transparent pixels take
    /// the index-0 fast path; everything else is a nearest-colour search.
    pub fn encode(&self, palette: &Palette) -> Vec<u8> {
        match &self.state {
            FrameState::Raw(data) => data.clone(),
            FrameState::Decoded(surface) => {
                let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
                for pixel in surface.pixels() {
                    let [r, g, b, a] = pixel.0;
                    if a < 128 {
                        out.push(0);
                    } else {
                        out.push(palette.nearest(r, g, b, self.keep_black));
                    }
                }
                out
            }
        }
    }
}

/// An SPR sprite file: frame count, frame index, one byte per pixel.
pub struct SprFile {
    frames: Vec<SprFrame>,
}

impl SprFile {
    pub fn new() -> Self {
        SprFile { frames: Vec::new() }
    }

    pub fn from_bytes(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let frame_count = cursor.read_u16()?;
        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let offset = cursor.read_u32()? as usize;
            let width = cursor.read_u16()?;
            let height = cursor.read_u16()?;
            let size = width as usize * height as usize;
            let indices = cursor.substring(offset, Some(size))?.to_vec();
            frames.push(SprFrame::from_raw(width, height, indices)?);
        }
        Ok(SprFile { frames })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&SprFrame> {
        self.frames.get(index)
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut SprFrame> {
        self.frames.get_mut(index)
    }

    pub fn add_frame(&mut self, frame: SprFrame) {
        self.frames.push(frame);
    }

    pub fn compile(&self, palette: &Palette) -> C2eResult<Vec<u8>> {
        let mut out = Vec::new();
        write_u16(&mut out, self.frames.len() as u16);
        let mut offset = 2 + 8 * self.frames.len() as u32;
        for frame in &self.frames {
            write_u32(&mut out, offset);
            write_u16(&mut out, frame.width);
            write_u16(&mut out, frame.height);
            offset += frame.width as u32 * frame.height as u32;
        }
        for frame in &self.frames {
            out.extend_from_slice(&frame.encode(palette));
        }
        Ok(out)
    }
}

impl Default for SprFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_palette() -> Palette {
        // index 0 black, then a ramp of distinct colours
        let mut entries = [[0u8; 3]; 256];
        for (i, entry) in entries.iter_mut().enumerate().skip(1) {
            *entry = [i as u8, (255 - i) as u8, (i * 2) as u8];
        }
        Palette::from_rgb(entries)
    }

    #[test]
    fn dta_channels_scale_by_four() {
        let mut data = vec![0u8; 768];
        data[3] = 63;
        data[4] = 1;
        data[5] = 32;
        let palette = Palette::from_dta(&data).unwrap();
        assert_eq!(palette.color(1), [252, 4, 128]);
        assert!(Palette::from_dta(&data[..100]).is_err());
    }

    #[test]
    fn exact_palette_colours_round_trip() {
        let palette = test_palette();
        let mut surface = RgbaImage::new(3, 1);
        surface.put_pixel(0, 0, Rgba([10, 245, 20, 255])); // entry 10
        surface.put_pixel(1, 0, Rgba([0, 0, 0, 0])); // transparent
        surface.put_pixel(2, 0, Rgba([200, 55, 144, 255])); // entry 200

        let frame = SprFrame::from_surface(surface.clone()).unwrap();
        let indices = frame.encode(&palette);
        assert_eq!(indices, vec![10, 0, 200]);

        let mut reread = SprFrame::from_raw(3, 1, indices).unwrap();
        assert_eq!(reread.surface(&palette).unwrap(), &surface);
    }

    #[test]
    fn nearest_skips_index_zero_while_keeping_black() {
        let mut entries = [[0u8; 3]; 256];
        entries[5] = [8, 8, 8];
        let palette = Palette::from_rgb(entries);
        // opaque black: index 0 excluded, first black entry wins instead
        assert_eq!(palette.nearest(0, 0, 0, true), 1);
        assert_eq!(palette.nearest(0, 0, 0, false), 0);
        // nearly black still prefers the dark non-reserved entry
        assert_eq!(palette.nearest(9, 9, 9, true), 5);
    }

    #[test]
    fn ties_resolve_to_the_lowest_index() {
        let mut entries = [[0u8; 3]; 256];
        entries[3] = [100, 0, 0];
        entries[7] = [100, 0, 0];
        let palette = Palette::from_rgb(entries);
        assert_eq!(palette.nearest(100, 0, 0, true), 3);
        // equidistant between entry 3 (100) and black entries: 90 is closer to 100
        assert_eq!(palette.nearest(90, 0, 0, true), 3);
    }

    #[test]
    fn flip_reverses_rows_and_rejects_decoded_frames() {
        let palette = test_palette();
        let mut frame = SprFrame::from_raw(2, 2, vec![1, 2, 3, 4]).unwrap();
        frame.flip().unwrap();
        assert_eq!(frame.encode(&palette), vec![3, 4, 1, 2]);
        frame.surface(&palette).unwrap();
        assert!(matches!(frame.flip(), Err(C2eError::Unsupported(_))));
    }

    #[test]
    fn file_round_trips() {
        let palette = test_palette();
        let mut file = SprFile::new();
        file.add_frame(SprFrame::from_raw(2, 2, vec![1, 0, 3, 200]).unwrap());
        file.add_frame(SprFrame::from_raw(1, 1, vec![9]).unwrap());
        let bytes = file.compile(&palette).unwrap();

        let reread = SprFile::from_bytes(&bytes).unwrap();
        assert_eq!(reread.frame_count(), 2);
        assert_eq!(reread.frame(0).unwrap().encode(&palette), vec![1, 0, 3, 200]);
        assert_eq!(reread.frame(1).unwrap().encode(&palette), vec![9]);
    }
}
