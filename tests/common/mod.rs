//! Byte-level builder for synthetic `.aseprite` files.
#![allow(dead_code)]

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;

pub const CHUNK_OLD_PALETTE: u16 = 0x0004;
pub const CHUNK_LAYER: u16 = 0x2004;
pub const CHUNK_CEL: u16 = 0x2005;
pub const CHUNK_COLOR_PROFILE: u16 = 0x2007;
pub const CHUNK_EXTERNAL_FILES: u16 = 0x2008;
pub const CHUNK_TAGS: u16 = 0x2018;
pub const CHUNK_PALETTE: u16 = 0x2019;
pub const CHUNK_USER_DATA: u16 = 0x2020;
pub const CHUNK_SLICE: u16 = 0x2022;
pub const CHUNK_TILESET: u16 = 0x2023;

pub const HEADER_LEN: usize = 128;
pub const FRAME_HEADER_LEN: usize = 16;
pub const CHUNK_HEADER_LEN: usize = 6;

#[derive(Default)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn byte(&mut self, v: u8) -> &mut Self {
        self.0.write_u8(v).unwrap();
        self
    }

    pub fn word(&mut self, v: u16) -> &mut Self {
        self.0.write_u16::<LittleEndian>(v).unwrap();
        self
    }

    pub fn short(&mut self, v: i16) -> &mut Self {
        self.0.write_i16::<LittleEndian>(v).unwrap();
        self
    }

    pub fn dword(&mut self, v: u32) -> &mut Self {
        self.0.write_u32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn long(&mut self, v: i32) -> &mut Self {
        self.0.write_i32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.0.resize(self.0.len() + n, 0);
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.0.extend_from_slice(v);
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.word(s.len() as u16).bytes(s.as_bytes())
    }

    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub struct Chunk {
    pub chunk_type: u16,
    pub body: Vec<u8>,
}

impl Chunk {
    pub fn new(chunk_type: u16, body: Vec<u8>) -> Self {
        Self { chunk_type, body }
    }

    pub fn encoded_len(&self) -> usize {
        CHUNK_HEADER_LEN + self.body.len()
    }

    fn write(&self, out: &mut Bytes) {
        out.dword(self.encoded_len() as u32)
            .word(self.chunk_type)
            .bytes(&self.body);
    }
}

pub struct FrameBuilder {
    duration: u16,
    chunks: Vec<Chunk>,
    size_adjust: i64,
    magic: u16,
}

impl FrameBuilder {
    pub fn new(duration: u16) -> Self {
        Self {
            duration,
            chunks: Vec::new(),
            size_adjust: 0,
            magic: 0xF1FA,
        }
    }

    pub fn chunk(mut self, chunk: Chunk) -> Self {
        self.chunks.push(chunk);
        self
    }

    /// Makes the declared frame size disagree with the real one.
    pub fn size_adjust(mut self, delta: i64) -> Self {
        self.size_adjust = delta;
        self
    }

    pub fn magic(mut self, magic: u16) -> Self {
        self.magic = magic;
        self
    }

    fn write(&self, out: &mut Bytes) {
        let len = FRAME_HEADER_LEN + self.chunks.iter().map(Chunk::encoded_len).sum::<usize>();
        let count = self.chunks.len();
        out.dword((len as i64 + self.size_adjust) as u32)
            .word(self.magic)
            .word(count.min(0xFFFF) as u16)
            .word(self.duration)
            .zeros(2)
            .dword(count as u32);
        for chunk in &self.chunks {
            chunk.write(out);
        }
    }
}

pub struct FileBuilder {
    width: u16,
    height: u16,
    depth: u16,
    flags: u32,
    transparent_index: u8,
    color_count: u16,
    magic: u16,
    frames: Vec<FrameBuilder>,
}

impl FileBuilder {
    pub fn new(width: u16, height: u16, depth: u16) -> Self {
        Self {
            width,
            height,
            depth,
            flags: 1,
            transparent_index: 0,
            color_count: 0,
            magic: 0xA5E0,
            frames: Vec::new(),
        }
    }

    pub fn rgba(width: u16, height: u16) -> Self {
        Self::new(width, height, 32)
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn transparent_index(mut self, index: u8) -> Self {
        self.transparent_index = index;
        self
    }

    pub fn color_count(mut self, count: u16) -> Self {
        self.color_count = count;
        self
    }

    pub fn magic(mut self, magic: u16) -> Self {
        self.magic = magic;
        self
    }

    pub fn frame(mut self, frame: FrameBuilder) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut frames = Bytes::default();
        for frame in &self.frames {
            frame.write(&mut frames);
        }

        let mut out = Bytes::default();
        out.dword((HEADER_LEN + frames.0.len()) as u32)
            .word(self.magic)
            .word(self.frames.len() as u16)
            .word(self.width)
            .word(self.height)
            .word(self.depth)
            .dword(self.flags)
            .word(100)
            .dword(0)
            .dword(0)
            .byte(self.transparent_index)
            .zeros(3)
            .word(self.color_count)
            .byte(1)
            .byte(1)
            .short(0)
            .short(0)
            .word(16)
            .word(16)
            .zeros(84);
        assert_eq!(out.0.len(), HEADER_LEN);
        out.bytes(&frames.0);
        out.take()
    }
}

// Chunk bodies.

pub fn layer(name: &str, flags: u16, blend_mode: u16, opacity: u8) -> Chunk {
    let mut b = Bytes::default();
    b.word(flags)
        .word(0)
        .word(0)
        .word(0)
        .word(0)
        .word(blend_mode)
        .byte(opacity)
        .zeros(3)
        .string(name);
    Chunk::new(CHUNK_LAYER, b.take())
}

pub fn visible_layer(name: &str) -> Chunk {
    layer(name, 1, 0, 255)
}

pub fn tilemap_layer(name: &str, tileset: u32) -> Chunk {
    let mut b = Bytes::default();
    b.word(1)
        .word(2)
        .word(0)
        .word(0)
        .word(0)
        .word(0)
        .byte(255)
        .zeros(3)
        .string(name)
        .dword(tileset);
    Chunk::new(CHUNK_LAYER, b.take())
}

fn cel_header(b: &mut Bytes, layer: u16, x: i16, y: i16, opacity: u8, cel_type: u16) {
    b.word(layer)
        .short(x)
        .short(y)
        .byte(opacity)
        .word(cel_type)
        .short(0)
        .zeros(5);
}

pub fn raw_cel(layer: u16, x: i16, y: i16, width: u16, height: u16, pixels: &[u8]) -> Chunk {
    let mut b = Bytes::default();
    cel_header(&mut b, layer, x, y, 255, 0);
    b.word(width).word(height).bytes(pixels);
    Chunk::new(CHUNK_CEL, b.take())
}

pub fn compressed_cel(layer: u16, x: i16, y: i16, width: u16, height: u16, pixels: &[u8]) -> Chunk {
    let mut b = Bytes::default();
    cel_header(&mut b, layer, x, y, 255, 2);
    b.word(width).word(height).bytes(&zlib(pixels));
    Chunk::new(CHUNK_CEL, b.take())
}

pub fn linked_cel(layer: u16, frame: u16) -> Chunk {
    let mut b = Bytes::default();
    cel_header(&mut b, layer, 0, 0, 255, 1);
    b.word(frame);
    Chunk::new(CHUNK_CEL, b.take())
}

/// 32-bit tiles with the usual id/flip/rotate masks.
pub fn tilemap_cel(layer: u16, width: u16, height: u16, tiles: &[u32]) -> Chunk {
    let mut raw = Bytes::default();
    for &tile in tiles {
        raw.dword(tile);
    }
    let mut b = Bytes::default();
    cel_header(&mut b, layer, 0, 0, 255, 3);
    b.word(width)
        .word(height)
        .word(32)
        .dword(0x1fff_ffff)
        .dword(0x2000_0000)
        .dword(0x4000_0000)
        .dword(0x8000_0000)
        .zeros(10)
        .bytes(&zlib(&raw.0));
    Chunk::new(CHUNK_CEL, b.take())
}

pub fn cel_of_type(cel_type: u16) -> Chunk {
    let mut b = Bytes::default();
    cel_header(&mut b, 0, 0, 0, 255, cel_type);
    Chunk::new(CHUNK_CEL, b.take())
}

pub fn palette(new_size: u32, first: u32, colors: &[[u8; 4]]) -> Chunk {
    let mut b = Bytes::default();
    b.dword(new_size)
        .dword(first)
        .dword(first + colors.len() as u32 - 1)
        .zeros(8);
    for (i, color) in colors.iter().enumerate() {
        // every other entry carries a name
        if i % 2 == 1 {
            b.word(1).bytes(color).string("named");
        } else {
            b.word(0).bytes(color);
        }
    }
    Chunk::new(CHUNK_PALETTE, b.take())
}

pub struct TagSpec<'a> {
    pub from: u16,
    pub to: u16,
    pub direction: u8,
    pub repeat: u16,
    pub color: [u8; 3],
    pub name: &'a str,
}

pub fn tags(tags: &[TagSpec]) -> Chunk {
    let mut b = Bytes::default();
    b.word(tags.len() as u16).zeros(8);
    for tag in tags {
        b.word(tag.from)
            .word(tag.to)
            .byte(tag.direction)
            .word(tag.repeat)
            .zeros(6)
            .bytes(&tag.color)
            .byte(0)
            .string(tag.name);
    }
    Chunk::new(CHUNK_TAGS, b.take())
}

pub fn user_data(text: Option<&str>, color: Option<[u8; 4]>) -> Chunk {
    let flags = u32::from(text.is_some()) | u32::from(color.is_some()) << 1;
    let mut b = Bytes::default();
    b.dword(flags);
    if let Some(text) = text {
        b.string(text);
    }
    if let Some(color) = color {
        b.bytes(&color);
    }
    Chunk::new(CHUNK_USER_DATA, b.take())
}

pub struct SliceKeySpec {
    pub frame: u32,
    pub bounds: (i32, i32, u32, u32),
    pub center: Option<(i32, i32, u32, u32)>,
    pub pivot: Option<(i32, i32)>,
}

pub fn slice(name: &str, flags: u32, keys: &[SliceKeySpec]) -> Chunk {
    let mut b = Bytes::default();
    b.dword(keys.len() as u32).dword(flags).dword(0).string(name);
    for key in keys {
        let (x, y, w, h) = key.bounds;
        b.dword(key.frame).long(x).long(y).dword(w).dword(h);
        if let Some((x, y, w, h)) = key.center {
            b.long(x).long(y).dword(w).dword(h);
        }
        if let Some((x, y)) = key.pivot {
            b.long(x).long(y);
        }
    }
    Chunk::new(CHUNK_SLICE, b.take())
}

pub fn tileset(
    id: u32,
    name: &str,
    tile_size: (u16, u16),
    num_tiles: u32,
    external: Option<(u32, u32)>,
    pixels: Option<&[u8]>,
) -> Chunk {
    let flags = u32::from(external.is_some()) | u32::from(pixels.is_some()) << 1;
    let mut b = Bytes::default();
    b.dword(id)
        .dword(flags)
        .dword(num_tiles)
        .word(tile_size.0)
        .word(tile_size.1)
        .short(1)
        .zeros(14)
        .string(name);
    if let Some((file, tileset)) = external {
        b.dword(file).dword(tileset);
    }
    if let Some(pixels) = pixels {
        let compressed = zlib(pixels);
        b.dword(compressed.len() as u32).bytes(&compressed);
    }
    Chunk::new(CHUNK_TILESET, b.take())
}

pub fn external_files(entries: &[(u32, &str)]) -> Chunk {
    let mut b = Bytes::default();
    b.dword(entries.len() as u32).zeros(8);
    for (id, path) in entries {
        b.dword(*id).zeros(8).string(path);
    }
    Chunk::new(CHUNK_EXTERNAL_FILES, b.take())
}

pub fn opaque_rgba(pixels: &[[u8; 3]]) -> Vec<u8> {
    pixels.iter().flat_map(|&[r, g, b]| [r, g, b, 255]).collect()
}
