//! Decoder for Aseprite `.ase`/`.aseprite` documents, a compositor that
//! flattens frames with Aseprite's blend modes, and a spritesheet packer.
//!
//! ```no_run
//! use aseprite_atlas::{Document, SpritesheetOptions};
//!
//! let document = Document::from_file("player.aseprite")?;
//! let first = document.composite_frame(0, true)?;
//! assert_eq!(first.len(), document.width as usize * document.height as usize);
//!
//! let sheet = document.create_spritesheet(&SpritesheetOptions::default())?;
//! println!("{}x{} atlas, {} frames", sheet.width, sheet.height, sheet.frames.len());
//! # Ok::<(), aseprite_atlas::AsepriteError>(())
//! ```

// on-disk records keep every field, read or not
#[allow(unused)]
mod ase_file;
pub mod blend;
mod composite;
mod decoder;
pub mod document;
mod error;
mod inflate;
pub mod spritesheet;

pub use composite::composite;
pub use decoder::decode;
pub use document::{
    BlendMode, Cel, CelContent, ColorDepth, Direction, Document, ExternalTileset, FormatVersion,
    Frame, ImageCel, Layer, LayerFlags, LayerKind, Point, Rect, Slice, SliceFlags, SliceKey, Tag,
    Tile, TilemapCel, Tileset, UserData,
};
pub use error::{AsepriteError, FormatError, Result};
pub use spritesheet::{pack, Spritesheet, SpritesheetFrame, SpritesheetLayout, SpritesheetOptions};

pub use rgb::{RGB8, RGBA8};
