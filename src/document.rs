//! The decoded document. Everything here is created once by the decoder and
//! only read afterwards.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use rgb::{RGB8, RGBA8};
use serde::Serialize;

use crate::ase_file::read_tile_value;
use crate::error::{AsepriteError, Result};
use crate::spritesheet::{Spritesheet, SpritesheetOptions};

/// Pixel storage of the document. Pixels are always expanded to RGBA on
/// decode, this only says how they were stored.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum ColorDepth {
    Indexed,
    Grayscale,
    Rgba,
}

impl ColorDepth {
    pub fn from_bits_per_pixel(bpp: u16) -> Option<Self> {
        match bpp {
            8 => Some(Self::Indexed),
            16 => Some(Self::Grayscale),
            32 => Some(Self::Rgba),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Indexed => 1,
            Self::Grayscale => 2,
            Self::Rgba => 4,
        }
    }
}

/// Editor generation the file was written by, as far as the decoder can tell.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
pub enum FormatVersion {
    V1_2,
    V1_3,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
    Addition,
    Subtract,
    Divide,
}

impl BlendMode {
    pub fn from_raw(raw: u16) -> Option<Self> {
        use BlendMode::*;
        Some(match raw {
            0 => Normal,
            1 => Multiply,
            2 => Screen,
            3 => Overlay,
            4 => Darken,
            5 => Lighten,
            6 => ColorDodge,
            7 => ColorBurn,
            8 => HardLight,
            9 => SoftLight,
            10 => Difference,
            11 => Exclusion,
            12 => Hue,
            13 => Saturation,
            14 => Color,
            15 => Luminosity,
            16 => Addition,
            17 => Subtract,
            18 => Divide,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum LayerKind {
    Normal,
    Group,
    Tilemap,
}

impl LayerKind {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::Normal),
            1 => Some(Self::Group),
            2 => Some(Self::Tilemap),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub struct LayerFlags {
    pub visible: bool,
    pub editable: bool,
    pub lock_movement: bool,
    pub background: bool,
    pub prefers_linked_cels: bool,
    pub collapsed: bool,
    pub reference_layer: bool,
}

impl LayerFlags {
    pub fn from_bits(bits: u16) -> Self {
        Self {
            visible: bits & 1 != 0,
            editable: bits & 2 != 0,
            lock_movement: bits & 4 != 0,
            background: bits & 8 != 0,
            prefers_linked_cels: bits & 16 != 0,
            collapsed: bits & 32 != 0,
            reference_layer: bits & 64 != 0,
        }
    }
}

/// Free text and/or a color attached to a layer, cel, tag, slice or the
/// sprite itself.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct UserData {
    pub text: Option<String>,
    pub color: Option<RGBA8>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub flags: LayerFlags,
    /// Nesting depth below group layers, 0 for top level.
    pub child_level: u16,
    pub blend_mode: BlendMode,
    /// Only meaningful when [`Document::layer_opacity_valid`] is set.
    pub opacity: u8,
    /// Present only for [`LayerKind::Tilemap`] layers.
    pub tileset_index: Option<u32>,
    pub user_data: Option<UserData>,
}

impl Layer {
    pub fn is_visible(&self) -> bool {
        self.flags.visible
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct Frame {
    /// Milliseconds.
    pub duration: u16,
    /// Bottom to top, in the order they were stored.
    pub cels: Vec<Cel>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Cel {
    pub layer_index: u16,
    pub x: i16,
    pub y: i16,
    pub opacity: u8,
    pub z_index: i16,
    pub content: CelContent,
    pub user_data: Option<UserData>,
}

impl Cel {
    pub fn width(&self) -> u16 {
        match &self.content {
            CelContent::Image(image) => image.width,
            CelContent::Tilemap(tilemap) => tilemap.width,
        }
    }

    pub fn height(&self) -> u16 {
        match &self.content {
            CelContent::Image(image) => image.height,
            CelContent::Tilemap(tilemap) => tilemap.height,
        }
    }

    pub fn image(&self) -> Option<&ImageCel> {
        match &self.content {
            CelContent::Image(image) => Some(image),
            CelContent::Tilemap(_) => None,
        }
    }
}

/// Linked cels never show up here: they are resolved into a copy of the cel
/// they point at while decoding.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub enum CelContent {
    Image(ImageCel),
    Tilemap(TilemapCel),
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct ImageCel {
    pub width: u16,
    pub height: u16,
    /// Row-major, `width * height` entries.
    pub pixels: Vec<RGBA8>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct TilemapCel {
    /// In tiles.
    pub width: u16,
    pub height: u16,
    pub bits_per_tile: u16,
    pub tile_id_mask: u32,
    pub x_flip_mask: u32,
    pub y_flip_mask: u32,
    pub rotation_mask: u32,
    /// Decompressed tile data, `bits_per_tile / 8` bytes per tile.
    pub tiles: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct Tile {
    pub id: u32,
    pub x_flip: bool,
    pub y_flip: bool,
    pub rotate_90: bool,
}

impl TilemapCel {
    /// Splits the raw tile data into tiles using the cel's bitmasks. Yields
    /// nothing for tile widths other than 8, 16 or 32 bits.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        let step = usize::from(self.bits_per_tile / 8).max(1);
        self.tiles
            .chunks_exact(step)
            .map_while(move |bytes| read_tile_value(bytes, self.bits_per_tile))
            .map(move |value| Tile {
                id: value & self.tile_id_mask,
                x_flip: value & self.x_flip_mask != 0,
                y_flip: value & self.y_flip_mask != 0,
                rotate_90: value & self.rotation_mask != 0,
            })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum Direction {
    Forward,
    Reverse,
    PingPong,
    PingPongReverse,
}

impl Direction {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Forward),
            1 => Some(Self::Reverse),
            2 => Some(Self::PingPong),
            3 => Some(Self::PingPongReverse),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Tag {
    pub name: String,
    /// Inclusive.
    pub from: u16,
    /// Inclusive.
    pub to: u16,
    pub direction: Direction,
    pub repeat: u16,
    /// Legacy tag color, kept for 1.2 files only.
    pub color: Option<RGB8>,
    pub user_data: Option<UserData>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub struct SliceFlags {
    pub nine_patch: bool,
    pub pivot: bool,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Slice {
    pub name: String,
    pub flags: SliceFlags,
    pub keys: Vec<SliceKey>,
    pub user_data: Option<UserData>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct SliceKey {
    /// The key applies from this frame on.
    pub frame: u32,
    pub bounds: Rect,
    pub center: Option<Rect>,
    pub pivot: Option<Point>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct ExternalTileset {
    pub file_id: u32,
    pub tileset_id: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Tileset {
    pub id: u32,
    pub name: String,
    pub tile_count: u32,
    pub tile_width: u16,
    pub tile_height: u16,
    pub base_index: i16,
    pub external: Option<ExternalTileset>,
    /// `tile_width` by `tile_height * tile_count`, tiles stacked vertically.
    pub pixels: Option<Vec<RGBA8>>,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Document {
    pub width: u16,
    pub height: u16,
    pub color_depth: ColorDepth,
    pub layer_opacity_valid: bool,
    /// Always 0 unless the depth is [`ColorDepth::Indexed`].
    pub transparent_index: u8,
    pub color_count: u16,
    /// `None` when the file had no tags to tell the versions apart.
    pub version: Option<FormatVersion>,
    pub frames: Vec<Frame>,
    pub layers: Vec<Layer>,
    pub tags: Vec<Tag>,
    pub slices: Vec<Slice>,
    pub palette: Vec<RGBA8>,
    pub tilesets: HashMap<u32, Tileset>,
    pub external_files: HashMap<u32, String>,
    pub user_data: Option<UserData>,
}

impl Document {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        crate::decoder::decode(bytes)
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => AsepriteError::NotFound(path.to_path_buf()),
            _ => AsepriteError::Io(err),
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn tag_by_name(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn slice_by_name(&self, name: &str) -> Option<&Slice> {
        self.slices.iter().find(|s| s.name == name)
    }

    /// Flattens one frame into `width * height` pixels.
    pub fn composite_frame(&self, frame: usize, only_visible: bool) -> Result<Vec<RGBA8>> {
        crate::composite::composite(self, frame, only_visible)
    }

    /// Flattens every frame and packs them into a single atlas.
    pub fn create_spritesheet(&self, options: &SpritesheetOptions) -> Result<Spritesheet> {
        let frames = (0..self.frames.len())
            .map(|i| self.composite_frame(i, options.only_visible_frames))
            .collect::<Result<Vec<_>>>()?;
        crate::spritesheet::pack(self, &frames, options)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tiles_are_split_with_masks() {
        let mut tiles = Vec::new();
        tiles.extend_from_slice(&0x0000_0005_u32.to_le_bytes());
        tiles.extend_from_slice(&0xA000_0003_u32.to_le_bytes());
        let cel = TilemapCel {
            width: 2,
            height: 1,
            bits_per_tile: 32,
            tile_id_mask: 0x1fff_ffff,
            x_flip_mask: 0x2000_0000,
            y_flip_mask: 0x4000_0000,
            rotation_mask: 0x8000_0000,
            tiles,
        };
        let tiles: Vec<_> = cel.tiles().collect();
        assert_eq!(tiles.len(), 2);
        assert_eq!(
            tiles[0],
            Tile {
                id: 5,
                x_flip: false,
                y_flip: false,
                rotate_90: false
            }
        );
        assert_eq!(
            tiles[1],
            Tile {
                id: 3,
                x_flip: true,
                y_flip: false,
                rotate_90: true
            }
        );
    }

    #[test]
    fn layer_flag_bits() {
        let flags = LayerFlags::from_bits(1 | 8 | 64);
        assert!(flags.visible);
        assert!(flags.background);
        assert!(flags.reference_layer);
        assert!(!flags.editable);
        assert!(!flags.collapsed);
    }

    #[test]
    fn blend_mode_values() {
        assert_eq!(BlendMode::from_raw(0), Some(BlendMode::Normal));
        assert_eq!(BlendMode::from_raw(15), Some(BlendMode::Luminosity));
        assert_eq!(BlendMode::from_raw(18), Some(BlendMode::Divide));
        assert_eq!(BlendMode::from_raw(19), None);
    }
}
