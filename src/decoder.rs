//! Walks header → frames → chunks and builds a [`Document`].
//!
//! All decode state lives in one [`DecoderContext`] threaded through the
//! chunk readers: the cursor, the partially built document, the frame being
//! filled, and the chunk that a following UserData chunk applies to.

use std::collections::hash_map::Entry;

use log::{debug, trace};
use parsing::{Cursor, ReadBytes};
use rgb::{RGB8, RGBA8};

use crate::ase_file::{
    self as raw, Chunk, ChunkHeader, FileHeader, FrameHeader, CEL_COMPRESSED_IMAGE,
    CEL_COMPRESSED_TILEMAP, CEL_LINKED, CEL_RAW_IMAGE, CHUNK_USER_DATA,
};
use crate::document::{
    BlendMode, Cel, CelContent, ColorDepth, Direction, Document, ExternalTileset, FormatVersion,
    Frame, ImageCel, Layer, LayerFlags, LayerKind, Point, Rect, Slice, SliceFlags, SliceKey, Tag,
    TilemapCel, Tileset, UserData,
};
use crate::error::{AsepriteError, FormatError, Result};
use crate::inflate::inflate_zlib;

const TRANSPARENT: RGBA8 = RGBA8 {
    r: 0,
    g: 0,
    b: 0,
    a: 0,
};

/// Largest palette the editor can produce.
const MAX_PALETTE_SIZE: usize = 65536;

/// Decodes a complete in-memory `.ase`/`.aseprite` file.
pub fn decode(bytes: &[u8]) -> Result<Document> {
    let mut cursor = Cursor::new(bytes);
    let header: FileHeader = cursor.read_type_le().map_err(|err| match err {
        parsing::Error::MagicCheckFailed => FormatError::BadHeaderMagic,
        other => FormatError::Parse(other),
    })?;
    let color_depth = ColorDepth::from_bits_per_pixel(header.color_depth).ok_or_else(|| {
        AsepriteError::Unsupported(format!("color depth {}", header.color_depth))
    })?;
    debug!(
        "decoding {}x{} {:?} sprite with {} frames",
        header.width, header.height, color_depth, header.num_frames
    );

    let mut ctx = DecoderContext::new(cursor, document_from_header(&header, color_depth));
    for _ in 0..header.num_frames {
        ctx.read_frame()?;
    }

    let document = ctx.document;
    debug!(
        "decoded {} frames, {} layers, {} tags, {} slices, version {:?}",
        document.frames.len(),
        document.layers.len(),
        document.tags.len(),
        document.slices.len(),
        document.version
    );
    Ok(document)
}

fn document_from_header(header: &FileHeader, color_depth: ColorDepth) -> Document {
    let color_count = if header.color_num == 0 {
        256
    } else {
        header.color_num
    };
    let transparent_index = match color_depth {
        ColorDepth::Indexed => header.transparent_index,
        _ => 0,
    };
    Document {
        width: header.width,
        height: header.height,
        color_depth,
        layer_opacity_valid: header.flags & 1 != 0,
        transparent_index,
        color_count,
        version: None,
        frames: Vec::with_capacity(usize::from(header.num_frames)),
        layers: Vec::new(),
        tags: Vec::new(),
        slices: Vec::new(),
        palette: vec![TRANSPARENT; usize::from(color_count)],
        tilesets: Default::default(),
        external_files: Default::default(),
        user_data: None,
    }
}

/// Where the next UserData chunk gets attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UserDataTarget {
    Sprite,
    Layer(usize),
    Cel { frame: usize, cel: usize },
    Tag(usize),
    Slice(usize),
}

/// How indexed pixels pick their palette entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PaletteLookup {
    /// Entry at the pixel's byte value.
    ByValue,
    /// Entry at the pixel's position in the buffer.
    ByPosition,
}

struct DecoderContext<'a> {
    cursor: Cursor<'a>,
    document: Document,
    frame: Frame,
    frame_index: usize,
    chunks_read: usize,
    user_data_target: UserDataTarget,
}

impl<'a> DecoderContext<'a> {
    fn new(cursor: Cursor<'a>, document: Document) -> Self {
        Self {
            cursor,
            document,
            frame: Frame::default(),
            frame_index: 0,
            chunks_read: 0,
            user_data_target: UserDataTarget::Sprite,
        }
    }

    fn read_frame(&mut self) -> Result<()> {
        let frame = self.frame_index;
        let start = self.cursor.position();
        let header: FrameHeader = self.cursor.read_type_le().map_err(|err| match err {
            parsing::Error::MagicCheckFailed => FormatError::BadFrameMagic { frame },
            other => FormatError::Parse(other),
        })?;
        let num_chunks = header.num_chunks();
        trace!(
            "frame {}: {} bytes, {} chunks, {} ms",
            frame,
            header.frame_size,
            num_chunks,
            header.frame_dur_ms
        );

        self.frame = Frame {
            duration: header.frame_dur_ms,
            cels: Vec::new(),
        };
        self.chunks_read = 0;
        while self.chunks_read < num_chunks {
            self.read_chunk()?;
            self.chunks_read += 1;
        }

        let expected = start + header.frame_size as usize;
        let actual = self.cursor.position();
        if actual != expected {
            return Err(FormatError::FrameMisaligned {
                frame,
                expected,
                actual,
            }
            .into());
        }

        self.document.frames.push(std::mem::take(&mut self.frame));
        self.frame_index += 1;
        Ok(())
    }

    /// Reads the next chunk header without moving the cursor.
    fn peek_chunk_header(&self) -> Option<ChunkHeader> {
        let mut probe = self.cursor;
        probe.read_type_le().ok()
    }

    fn read_chunk(&mut self) -> Result<()> {
        let position = self.cursor.position();
        let chunk_type = self.peek_chunk_header().map(|h| h.chunk_type);
        let chunk: Chunk<'a> = self.cursor.read_type_le().map_err(|err| match (err, chunk_type) {
            (parsing::Error::EnumTypeValueMatchFailed, Some(chunk_type)) => {
                FormatError::UnknownChunkType {
                    chunk_type,
                    position,
                }
            }
            (other, _) => FormatError::Parse(other),
        })?;

        match chunk {
            Chunk::Layer(layer) => self.read_layer(layer)?,
            Chunk::Cel(cel) => self.read_cel(cel)?,
            Chunk::ExternalFiles(files) => self.read_external_files(files)?,
            Chunk::Tags(tags) => self.read_tags(tags)?,
            Chunk::Palette(palette) => self.read_palette(palette)?,
            Chunk::UserData(data) => self.read_user_data(data),
            Chunk::Slice(slice) => self.read_slice(slice)?,
            Chunk::Tileset(tileset) => self.read_tileset(tileset)?,
            Chunk::OldPalette1(_)
            | Chunk::OldPalette2(_)
            | Chunk::CelExtra(_)
            | Chunk::ColorProfile(_)
            | Chunk::Mask(_)
            | Chunk::Path(_) => {
                trace!(
                    "skipping chunk {:#06x} at byte {}",
                    chunk_type.unwrap_or_default(),
                    position
                );
            }
        }
        Ok(())
    }

    fn read_layer(&mut self, chunk: raw::LayerChunk) -> Result<()> {
        let kind = LayerKind::from_raw(chunk.layer_type)
            .ok_or(FormatError::UnknownLayerType(chunk.layer_type))?;
        let blend_mode = BlendMode::from_raw(chunk.blend_mode)
            .ok_or(FormatError::UnknownBlendMode(chunk.blend_mode))?;
        self.document.layers.push(Layer {
            name: chunk.name.into(),
            kind,
            flags: LayerFlags::from_bits(chunk.flags),
            child_level: chunk.child_level,
            blend_mode,
            opacity: chunk.opacity,
            tileset_index: chunk.tileset_index,
            user_data: None,
        });
        self.user_data_target = UserDataTarget::Layer(self.document.layers.len() - 1);
        Ok(())
    }

    fn read_cel(&mut self, chunk: raw::CelChunk<'a>) -> Result<()> {
        let mut body = chunk.rest;
        let content = match chunk.cel_type {
            CEL_RAW_IMAGE | CEL_COMPRESSED_IMAGE => {
                let size: raw::ImageCelHeader = body.read_type_le()?;
                let payload = body.read_rest();
                let inflated;
                let bytes = if chunk.cel_type == CEL_COMPRESSED_IMAGE {
                    inflated = inflate_zlib(payload)?;
                    inflated.as_slice()
                } else {
                    payload
                };
                let count = usize::from(size.width) * usize::from(size.height);
                let pixels = self.unpack_pixels(bytes, count, PaletteLookup::ByValue)?;
                CelContent::Image(ImageCel {
                    width: size.width,
                    height: size.height,
                    pixels,
                })
            }
            CEL_LINKED => {
                let linked_frame: raw::Word = body.read_type_le()?;
                return self.push_linked_cel(chunk.layer_ind, linked_frame);
            }
            CEL_COMPRESSED_TILEMAP => {
                let header: raw::TilemapCelHeader = body.read_type_le()?;
                let tiles = inflate_zlib(body.read_rest())?;
                CelContent::Tilemap(TilemapCel {
                    width: header.width,
                    height: header.height,
                    bits_per_tile: header.bits_per_tile,
                    tile_id_mask: header.tile_id_mask,
                    x_flip_mask: header.x_flip_mask,
                    y_flip_mask: header.y_flip_mask,
                    rotation_mask: header.rotation_mask,
                    tiles,
                })
            }
            other => return Err(FormatError::UnknownCelType(other).into()),
        };

        self.push_cel(Cel {
            layer_index: chunk.layer_ind,
            x: chunk.x_pos,
            y: chunk.y_pos,
            opacity: chunk.opacity,
            z_index: chunk.z_ind,
            content,
            user_data: None,
        });
        Ok(())
    }

    /// Frames are decoded in order, so only earlier frames can be found here.
    fn push_linked_cel(&mut self, layer: raw::Word, linked_frame: raw::Word) -> Result<()> {
        let cel = self
            .document
            .frames
            .get(usize::from(linked_frame))
            .and_then(|frame| frame.cels.iter().find(|cel| cel.layer_index == layer))
            .cloned()
            .ok_or(FormatError::UnresolvedLink {
                frame: self.frame_index,
                layer,
                linked_frame,
            })?;
        trace!(
            "frame {}: cel on layer {} linked to frame {}",
            self.frame_index,
            layer,
            linked_frame
        );
        self.push_cel(cel);
        Ok(())
    }

    fn push_cel(&mut self, cel: Cel) {
        self.frame.cels.push(cel);
        self.user_data_target = UserDataTarget::Cel {
            frame: self.frame_index,
            cel: self.frame.cels.len() - 1,
        };
    }

    fn unpack_pixels(
        &self,
        bytes: &[u8],
        count: usize,
        lookup: PaletteLookup,
    ) -> std::result::Result<Vec<RGBA8>, FormatError> {
        let depth = self.document.color_depth;
        let too_short = |expected| FormatError::PixelDataTooShort {
            expected,
            found: bytes.len(),
        };
        let expected = count
            .checked_mul(depth.bytes_per_pixel())
            .ok_or(too_short(usize::MAX))?;
        let bytes = bytes.get(..expected).ok_or(too_short(expected))?;
        match depth {
            ColorDepth::Rgba => Ok(bytemuck::cast_slice::<u8, [u8; 4]>(bytes)
                .iter()
                .map(|&[r, g, b, a]| RGBA8::new(r, g, b, a))
                .collect()),
            ColorDepth::Grayscale => Ok(bytemuck::cast_slice::<u8, [u8; 2]>(bytes)
                .iter()
                .map(|&[v, a]| RGBA8::new(v, v, v, a))
                .collect()),
            ColorDepth::Indexed => bytes
                .iter()
                .enumerate()
                .map(|(position, &value)| self.palette_color(value, position, lookup))
                .collect(),
        }
    }

    fn palette_color(
        &self,
        value: u8,
        position: usize,
        lookup: PaletteLookup,
    ) -> std::result::Result<RGBA8, FormatError> {
        if value == self.document.transparent_index {
            return Ok(TRANSPARENT);
        }
        let index = match lookup {
            PaletteLookup::ByValue => usize::from(value),
            PaletteLookup::ByPosition => position,
        };
        let palette = &self.document.palette;
        palette
            .get(index)
            .copied()
            .ok_or(FormatError::PaletteIndexOutOfRange {
                index,
                len: palette.len(),
            })
    }

    fn read_external_files(&mut self, chunk: raw::ExternalFilesChunk) -> Result<()> {
        for entry in chunk.entries {
            match self.document.external_files.entry(entry.id) {
                Entry::Occupied(_) => {
                    return Err(FormatError::DuplicateExternalFile(entry.id).into());
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry.path.into());
                }
            }
        }
        Ok(())
    }

    fn read_tags(&mut self, chunk: raw::TagsChunk) -> Result<()> {
        let first = self.document.tags.len();
        let count = chunk.tags.len();
        for entry in chunk.tags {
            let direction = Direction::from_raw(entry.direction)
                .ok_or(FormatError::UnknownDirection(entry.direction))?;
            let [r, g, b] = entry.color;
            self.document.tags.push(Tag {
                name: entry.tag_name.into(),
                from: entry.start_ind,
                to: entry.end_ind,
                direction,
                repeat: entry.repeat,
                color: Some(RGB8::new(r, g, b)),
                user_data: None,
            });
        }

        // 1.3 writes one UserData chunk per tag right after the tags chunk;
        // 1.2 does not. The first chunk that is not UserData settles it.
        for offset in 0..count {
            if self.peek_chunk_header().map(|h| h.chunk_type) != Some(CHUNK_USER_DATA) {
                self.document.version = Some(FormatVersion::V1_2);
                break;
            }
            self.document.version = Some(FormatVersion::V1_3);
            self.user_data_target = UserDataTarget::Tag(first + offset);
            self.read_chunk()?;
            self.chunks_read += 1;
        }
        debug!(
            "{} tags, detected version {:?}",
            count, self.document.version
        );

        if self.document.version == Some(FormatVersion::V1_3) {
            for tag in &mut self.document.tags[first..] {
                tag.color = None;
            }
        }
        Ok(())
    }

    fn read_palette(&mut self, chunk: raw::PaletteChunk) -> Result<()> {
        let first = chunk.first_ind as usize;
        let needed = (chunk.new_palette_size as usize)
            .max(first.saturating_add(chunk.entries.len()));
        if needed > MAX_PALETTE_SIZE {
            return Err(FormatError::PaletteTooLarge(needed).into());
        }
        let palette = &mut self.document.palette;
        if palette.len() < needed {
            palette.resize(needed, TRANSPARENT);
        }
        for (slot, entry) in palette[first..].iter_mut().zip(chunk.entries) {
            let [r, g, b, a] = entry.rgba;
            *slot = RGBA8::new(r, g, b, a);
        }
        Ok(())
    }

    fn read_user_data(&mut self, chunk: raw::UserDataChunk) {
        let data = UserData {
            text: chunk.text.map(String::from),
            color: chunk.color.map(|[r, g, b, a]| RGBA8::new(r, g, b, a)),
        };
        let target = self.user_data_target;
        let slot = match target {
            UserDataTarget::Sprite => Some(&mut self.document.user_data),
            UserDataTarget::Layer(i) => self.document.layers.get_mut(i).map(|l| &mut l.user_data),
            UserDataTarget::Cel { frame, cel } => {
                let cels = if frame == self.frame_index {
                    Some(&mut self.frame.cels)
                } else {
                    self.document.frames.get_mut(frame).map(|f| &mut f.cels)
                };
                cels.and_then(|cels| cels.get_mut(cel)).map(|c| &mut c.user_data)
            }
            UserDataTarget::Tag(i) => self.document.tags.get_mut(i).map(|t| &mut t.user_data),
            UserDataTarget::Slice(i) => self.document.slices.get_mut(i).map(|s| &mut s.user_data),
        };
        match slot {
            Some(slot) => {
                trace!("user data attached to {:?}", target);
                *slot = Some(data);
            }
            None => debug!("dropping user data for missing {:?}", target),
        }
    }

    fn read_slice(&mut self, chunk: raw::SliceChunk<'a>) -> Result<()> {
        let flags = SliceFlags {
            nine_patch: chunk.flags & 1 != 0,
            pivot: chunk.flags & 2 != 0,
        };
        let mut key_bytes = chunk.keys;
        let keys = (0..chunk.num_keys)
            .map(|_| read_slice_key(&mut key_bytes, flags))
            .collect::<parsing::Result<Vec<_>>>()?;
        self.document.slices.push(Slice {
            name: chunk.name.into(),
            flags,
            keys,
            user_data: None,
        });
        self.user_data_target = UserDataTarget::Slice(self.document.slices.len() - 1);
        Ok(())
    }

    fn read_tileset(&mut self, chunk: raw::TilesetChunk<'a>) -> Result<()> {
        let pixels = if chunk.flags & 2 != 0 {
            let mut rest = chunk.rest;
            let len: raw::Dword = rest.read_type_le()?;
            let bytes = inflate_zlib(rest.read_bytes(len as usize)?)?;
            let count = usize::from(chunk.tile_width)
                .checked_mul(usize::from(chunk.tile_height))
                .and_then(|n| n.checked_mul(chunk.num_tiles as usize))
                .ok_or(FormatError::PixelDataTooShort {
                    expected: usize::MAX,
                    found: bytes.len(),
                })?;
            // Unlike cels, indexed tileset pixels index the palette by their
            // position. Kept as found, though it looks like a defect.
            Some(self.unpack_pixels(&bytes, count, PaletteLookup::ByPosition)?)
        } else {
            None
        };

        let tileset = Tileset {
            id: chunk.id,
            name: chunk.name.into(),
            tile_count: chunk.num_tiles,
            tile_width: chunk.tile_width,
            tile_height: chunk.tile_height,
            base_index: chunk.base_index,
            external: chunk.external.map(|ext| ExternalTileset {
                file_id: ext.file_id,
                tileset_id: ext.tileset_id,
            }),
            pixels,
        };
        match self.document.tilesets.entry(tileset.id) {
            Entry::Occupied(_) => Err(FormatError::DuplicateTileset(tileset.id).into()),
            Entry::Vacant(slot) => {
                slot.insert(tileset);
                Ok(())
            }
        }
    }
}

fn read_slice_key(input: &mut &[u8], flags: SliceFlags) -> parsing::Result<SliceKey> {
    let header: raw::SliceKeyHeader = input.read_type_le()?;
    let center = if flags.nine_patch {
        Some(rect(input.read_type_le()?))
    } else {
        None
    };
    let pivot = if flags.pivot {
        let p: raw::Point = input.read_type_le()?;
        Some(Point { x: p.x, y: p.y })
    } else {
        None
    };
    Ok(SliceKey {
        frame: header.frame,
        bounds: rect(header.bounds),
        center,
        pivot,
    })
}

fn rect(bounds: raw::Bounds) -> Rect {
    Rect {
        x: bounds.x,
        y: bounds.y,
        width: bounds.width,
        height: bounds.height,
    }
}
