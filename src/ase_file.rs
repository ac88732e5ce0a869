//! On-disk records of the `.ase`/`.aseprite` format, declared with the
//! `parsing` macros. Everything here is a faithful view of the bytes; turning
//! these records into the document model is the decoder's job.

use byteorder::{ByteOrder, LittleEndian};
use parsing::Parse;

pub type Byte = u8;
pub type Word = u16;
pub type Short = i16;
pub type Dword = u32;
pub type Long = i32;

pub const HEADER_MAGIC: Word = 0xA5E0;
pub const FRAME_MAGIC: Word = 0xF1FA;

pub const CHUNK_OLD_PALETTE_A: Word = 0x0004;
pub const CHUNK_OLD_PALETTE_B: Word = 0x0011;
pub const CHUNK_LAYER: Word = 0x2004;
pub const CHUNK_CEL: Word = 0x2005;
pub const CHUNK_CEL_EXTRA: Word = 0x2006;
pub const CHUNK_COLOR_PROFILE: Word = 0x2007;
pub const CHUNK_EXTERNAL_FILES: Word = 0x2008;
pub const CHUNK_MASK: Word = 0x2016;
pub const CHUNK_PATH: Word = 0x2017;
pub const CHUNK_TAGS: Word = 0x2018;
pub const CHUNK_PALETTE: Word = 0x2019;
pub const CHUNK_USER_DATA: Word = 0x2020;
pub const CHUNK_SLICE: Word = 0x2022;
pub const CHUNK_TILESET: Word = 0x2023;

pub const CEL_RAW_IMAGE: Word = 0;
pub const CEL_LINKED: Word = 1;
pub const CEL_COMPRESSED_IMAGE: Word = 2;
pub const CEL_COMPRESSED_TILEMAP: Word = 3;

/// Sentinel in the legacy frame chunk count meaning "see the 32-bit field".
pub const LEGACY_CHUNK_COUNT_OVERFLOW: Word = 0xFFFF;

parsing::parsable_struct! {
    /// `STRING`: a WORD length followed by that many UTF-8 bytes.
    #[derive(Clone, PartialEq, Eq, Debug, Default)]
    pub struct AseString {
        [[param: Word = len]]
        #[parse(sized_utf8_string = len)]
        pub value: String,
    }
}

impl From<AseString> for String {
    fn from(s: AseString) -> Self {
        s.value
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Parse)]
pub struct Point {
    pub x: Long,
    pub y: Long,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Parse)]
pub struct Bounds {
    pub x: Long,
    pub y: Long,
    pub width: Dword,
    pub height: Dword,
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Debug)]
    pub struct FileHeader {
        pub file_size: Dword,
        [[magic: Word = HEADER_MAGIC]]
        pub num_frames: Word,
        pub width: Word,
        pub height: Word,
        /// 32=RGBA, 16=Grayscale, 8=Indexed
        pub color_depth: Word,
        pub flags: Dword,
        /// Deprecated, now on each frame
        pub frame_ms_dur: Word,
        [[ignore: Dword]]
        [[ignore: Dword]]
        pub transparent_index: Byte,
        [[padding_bytes = 3]]
        /// 0 means 256 for old sprites
        pub color_num: Word,
        pub pix_width: Byte,
        pub pix_height: Byte,
        pub grid_x_pos: Short,
        pub grid_y_pos: Short,
        pub grid_width: Word,
        pub grid_height: Word,
        [[padding_bytes = 84]]
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Debug)]
    pub struct FrameHeader {
        pub frame_size: Dword,
        [[magic: Word = FRAME_MAGIC]]
        old_num_chunks: Word,
        pub frame_dur_ms: Word,
        [[padding_bytes = 2]]
        new_num_chunks: Dword,
    }
}

impl FrameHeader {
    pub fn num_chunks(&self) -> usize {
        if self.old_num_chunks == LEGACY_CHUNK_COUNT_OVERFLOW
            && Dword::from(self.old_num_chunks) < self.new_num_chunks
        {
            self.new_num_chunks as usize
        } else {
            self.old_num_chunks as usize
        }
    }
}

parsing::parsable_struct! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ChunkHeader {
        pub chunk_size: Dword,
        pub chunk_type: Word,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Debug)]
    pub struct RestOfBytes<'a> {
        #[parse(rest_of_buf)]
        pub rest: &'a [u8],
    }
}

parsing::parsable_enum! {
    #[derive(Clone, PartialEq, Debug)]
    #[repr(u16)]
    pub enum Chunk<'a> {
        [[param: Dword = chunk_size]]
        [[limit_buffer = (chunk_size as usize).saturating_sub(std::mem::size_of::<Dword>())]]
        [[param: Word = chunk_type]]
        [[enum_type = chunk_type]]
        OldPalette1(RestOfBytes<'a>) = CHUNK_OLD_PALETTE_A,
        OldPalette2(RestOfBytes<'a>) = CHUNK_OLD_PALETTE_B,
        Layer(LayerChunk) = CHUNK_LAYER,
        Cel(CelChunk<'a>) = CHUNK_CEL,
        CelExtra(RestOfBytes<'a>) = CHUNK_CEL_EXTRA,
        ColorProfile(RestOfBytes<'a>) = CHUNK_COLOR_PROFILE,
        ExternalFiles(ExternalFilesChunk) = CHUNK_EXTERNAL_FILES,
        /// deprecated
        Mask(RestOfBytes<'a>) = CHUNK_MASK,
        Path(RestOfBytes<'a>) = CHUNK_PATH,
        Tags(TagsChunk) = CHUNK_TAGS,
        Palette(PaletteChunk) = CHUNK_PALETTE,
        UserData(UserDataChunk) = CHUNK_USER_DATA,
        Slice(SliceChunk<'a>) = CHUNK_SLICE,
        Tileset(TilesetChunk<'a>) = CHUNK_TILESET,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct LayerChunk {
        pub flags: Word,
        pub layer_type: Word,
        pub child_level: Word,
        [[ignore: Word]]
        [[ignore: Word]]
        pub blend_mode: Word,
        pub opacity: Byte,
        [[padding_bytes = 3]]
        pub name: AseString,
        #[parse(option_if: Dword = layer_type == 2)]
        pub tileset_index: Option<Dword>,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct CelChunk<'a> {
        pub layer_ind: Word,
        pub x_pos: Short,
        pub y_pos: Short,
        pub opacity: Byte,
        pub cel_type: Word,
        pub z_ind: Short,
        [[padding_bytes = 5]]
        #[parse(rest_of_buf)]
        pub rest: &'a [u8],
    }
}

parsing::parsable_struct! {
    /// Leading fields of raw and compressed image cels; the pixel payload is
    /// whatever remains of the chunk.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ImageCelHeader {
        pub width: Word,
        pub height: Word,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct TilemapCelHeader {
        pub width: Word,
        pub height: Word,
        pub bits_per_tile: Word,
        pub tile_id_mask: Dword,
        pub x_flip_mask: Dword,
        pub y_flip_mask: Dword,
        pub rotation_mask: Dword,
        [[padding_bytes = 10]]
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct ExternalFilesChunk {
        [[param: Dword = num_entries]]
        [[padding_bytes = 8]]
        #[parse(collection: ExternalFileEntry = num_entries)]
        pub entries: Vec<ExternalFileEntry>,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct ExternalFileEntry {
        pub id: Dword,
        [[padding_bytes = 8]]
        pub path: AseString,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct TagsChunk {
        [[param: Word = num_tags]]
        [[padding_bytes = 8]]
        #[parse(collection: TagEntry = num_tags)]
        pub tags: Vec<TagEntry>,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct TagEntry {
        pub start_ind: Word,
        pub end_ind: Word,
        pub direction: Byte,
        pub repeat: Word,
        [[padding_bytes = 6]]
        /// Only meaningful for files written before tag user data existed
        pub color: [Byte; 3],
        [[ignore: Byte]]
        pub tag_name: AseString,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct PaletteChunk {
        pub new_palette_size: Dword,
        pub first_ind: Dword,
        pub last_ind: Dword,
        [[padding_bytes = 8]]
        #[parse(collection: PaletteEntry = last_ind.saturating_add(1).saturating_sub(first_ind))]
        pub entries: Vec<PaletteEntry>,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct PaletteEntry {
        pub flags: Word,
        pub rgba: [Byte; 4],
        /// Read to stay aligned, never kept
        #[parse(option_if: AseString = (flags & 1) != 0)]
        pub name: Option<AseString>,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct UserDataChunk {
        pub flags: Dword,
        #[parse(option_if: AseString = (flags & 1) != 0)]
        pub text: Option<AseString>,
        #[parse(option_if: [Byte; 4] = (flags & 2) != 0)]
        pub color: Option<[Byte; 4]>,
    }
}

parsing::parsable_struct! {
    /// Slice keys depend on the slice flags, so they stay unparsed here.
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct SliceChunk<'a> {
        pub num_keys: Dword,
        pub flags: Dword,
        [[ignore: Dword]]
        pub name: AseString,
        #[parse(rest_of_buf)]
        pub keys: &'a [u8],
    }
}

parsing::parsable_struct! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SliceKeyHeader {
        pub frame: Dword,
        pub bounds: Bounds,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ExternalTilesetRef {
        pub file_id: Dword,
        pub tileset_id: Dword,
    }
}

parsing::parsable_struct! {
    #[derive(Clone, PartialEq, Eq, Debug)]
    pub struct TilesetChunk<'a> {
        pub id: Dword,
        pub flags: Dword,
        pub num_tiles: Dword,
        pub tile_width: Word,
        pub tile_height: Word,
        pub base_index: Short,
        [[padding_bytes = 14]]
        pub name: AseString,
        #[parse(option_if: ExternalTilesetRef = (flags & 1) != 0)]
        pub external: Option<ExternalTilesetRef>,
        #[parse(rest_of_buf)]
        pub rest: &'a [u8],
    }
}

/// Reads one tile value of `bits_per_tile` width from the start of `bytes`.
pub fn read_tile_value(bytes: &[u8], bits_per_tile: Word) -> Option<Dword> {
    match bits_per_tile {
        8 => bytes.first().map(|&b| Dword::from(b)),
        16 => (bytes.len() >= 2).then(|| Dword::from(LittleEndian::read_u16(bytes))),
        32 => (bytes.len() >= 4).then(|| LittleEndian::read_u32(bytes)),
        _ => None,
    }
}
