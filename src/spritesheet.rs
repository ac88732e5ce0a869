//! Packs composited frames into a single atlas image.

use log::debug;
use rgb::{ComponentBytes, RGBA8};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{AsepriteError, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum SpritesheetLayout {
    /// One row.
    Horizontal,
    /// One column.
    Vertical,
    /// A near-square grid, `ceil(sqrt(n))` columns wide.
    #[default]
    Packed,
}

/// How frames are laid out in the atlas.
///
/// Every field has a default, so a partial JSON object is enough:
///
/// ```
/// use aseprite_atlas::{SpritesheetLayout, SpritesheetOptions};
/// let options: SpritesheetOptions = serde_json::from_str(r#"{"layoutType":"Vertical","spacing":2}"#).unwrap();
/// assert_eq!(options.layout_type, SpritesheetLayout::Vertical);
/// assert_eq!(options.spacing, 2);
/// assert!(options.merge_duplicate_frames);
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpritesheetOptions {
    pub layout_type: SpritesheetLayout,
    /// Frames with identical pixels share one cell.
    pub merge_duplicate_frames: bool,
    /// Skip hidden layers when compositing.
    pub only_visible_frames: bool,
    /// Around the whole atlas.
    pub border_padding: u32,
    /// Between neighbouring cells.
    pub spacing: u32,
    /// Around every cell.
    pub inner_padding: u32,
}

impl Default for SpritesheetOptions {
    fn default() -> Self {
        Self {
            layout_type: SpritesheetLayout::Packed,
            merge_duplicate_frames: true,
            only_visible_frames: true,
            border_padding: 0,
            spacing: 0,
            inner_padding: 0,
        }
    }
}

/// Where a source frame ended up in the atlas.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct SpritesheetFrame {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Milliseconds.
    pub duration: u16,
}

/// Packed RGBA image plus one placement per source frame. Serializing it
/// yields only the placements, the pixels go through [`Spritesheet::as_bytes`].
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Spritesheet {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub pixels: Vec<RGBA8>,
    pub frames: Vec<SpritesheetFrame>,
}

impl Spritesheet {
    /// Row-major RGBA bytes, ready for an image encoder.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_bytes()
    }
}

/// Packs `frames`, one canvas-sized buffer per frame of `document`, into an
/// atlas according to `options`.
pub fn pack(document: &Document, frames: &[Vec<RGBA8>], options: &SpritesheetOptions) -> Result<Spritesheet> {
    if frames.len() != document.frames.len() {
        return Err(AsepriteError::Index {
            what: "frame",
            index: frames.len(),
            len: document.frames.len(),
        });
    }
    let frame_width = usize::from(document.width);
    let frame_height = usize::from(document.height);
    let frame_len = frame_width * frame_height;
    if let Some(bad) = frames.iter().find(|f| f.len() != frame_len) {
        return Err(AsepriteError::Index {
            what: "pixel",
            index: bad.len(),
            len: frame_len,
        });
    }

    // The first equal frame is never itself a duplicate.
    let duplicate_of: Vec<Option<usize>> = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            if options.merge_duplicate_frames {
                frames[..i].iter().position(|earlier| earlier == frame)
            } else {
                None
            }
        })
        .collect();
    let cells = duplicate_of.iter().filter(|d| d.is_none()).count();

    let (columns, rows) = match options.layout_type {
        SpritesheetLayout::Horizontal => (cells, cells.min(1)),
        SpritesheetLayout::Vertical => (cells.min(1), cells),
        SpritesheetLayout::Packed => {
            let columns = ceil_sqrt(cells);
            (columns, if columns == 0 { 0 } else { cells.div_ceil(columns) })
        }
    };

    let border = options.border_padding as usize;
    let spacing = options.spacing as usize;
    let inner = options.inner_padding as usize;
    let extent = |cells: usize, size: usize| {
        cells * size + 2 * border + spacing * cells.saturating_sub(1) + 2 * inner * cells
    };
    let width = extent(columns, frame_width);
    let height = extent(rows, frame_height);
    debug!(
        "packing {} frames ({} unique) as {:?}: {}x{} cells, {}x{} px",
        frames.len(),
        cells,
        options.layout_type,
        columns,
        rows,
        width,
        height
    );

    let mut pixels = vec![RGBA8::new(0, 0, 0, 0); width * height];
    let mut placed: Vec<SpritesheetFrame> = Vec::with_capacity(frames.len());
    let mut cell = 0;
    for ((frame, duplicate), source) in document.frames.iter().zip(&duplicate_of).zip(frames) {
        if let Some(original) = *duplicate {
            placed.push(SpritesheetFrame {
                duration: frame.duration,
                ..placed[original]
            });
            continue;
        }

        let column = cell % columns;
        let row = cell / columns;
        cell += 1;
        let x = border + column * (frame_width + spacing + 2 * inner) + inner;
        let y = border + row * (frame_height + spacing + 2 * inner) + inner;

        if frame_width > 0 {
            for (line, src) in source.chunks_exact(frame_width).enumerate() {
                let start = (y + line) * width + x;
                pixels[start..start + frame_width].copy_from_slice(src);
            }
        }
        placed.push(SpritesheetFrame {
            x: x as u32,
            y: y as u32,
            width: frame_width as u32,
            height: frame_height as u32,
            duration: frame.duration,
        });
    }

    Ok(Spritesheet {
        width: width as u32,
        height: height as u32,
        pixels,
        frames: placed,
    })
}

fn ceil_sqrt(n: usize) -> usize {
    let mut root = 0;
    while root * root < n {
        root += 1;
    }
    root
}
