use std::path::PathBuf;

use thiserror::Error;

/// Structural problems found while decoding. Every one of these aborts the
/// whole decode.
#[derive(Debug, PartialEq, Error)]
pub enum FormatError {
    #[error("bad header magic, this is not an .ase/.aseprite file")]
    BadHeaderMagic,

    #[error("bad frame magic in frame {frame}")]
    BadFrameMagic { frame: usize },

    #[error("frame {frame} misaligned: expected to end at byte {expected}, ended at {actual}")]
    FrameMisaligned {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("unknown chunk type {chunk_type:#06x} at byte {position}")]
    UnknownChunkType { chunk_type: u16, position: usize },

    #[error("unknown cel type {0}")]
    UnknownCelType(u16),

    #[error("unknown blend mode {0}")]
    UnknownBlendMode(u16),

    #[error("unknown layer type {0}")]
    UnknownLayerType(u16),

    #[error("unknown loop direction {0}")]
    UnknownDirection(u8),

    #[error("unresolved link: no cel for layer {layer} in frame {linked_frame} (linked from frame {frame})")]
    UnresolvedLink {
        frame: usize,
        layer: u16,
        linked_frame: u16,
    },

    #[error("external file id {0} declared twice")]
    DuplicateExternalFile(u32),

    #[error("tileset id {0} declared twice")]
    DuplicateTileset(u32),

    #[error("palette index {index} out of range (palette has {len} entries)")]
    PaletteIndexOutOfRange { index: usize, len: usize },

    #[error("palette of {0} entries is larger than any editor produces")]
    PaletteTooLarge(usize),

    #[error("pixel data too short: expected {expected} bytes, found {found}")]
    PixelDataTooShort { expected: usize, found: usize },

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error(transparent)]
    Parse(#[from] parsing::Error),
}

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum AsepriteError {
    #[error("no file exists at {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid format: {0}")]
    Format(#[from] FormatError),

    #[error("{what} index {index} out of range (len {len})")]
    Index {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<parsing::Error> for AsepriteError {
    fn from(err: parsing::Error) -> Self {
        Self::Format(FormatError::Parse(err))
    }
}

/// A convenience `Result` type alias using the crate's `AsepriteError` type.
pub type Result<T> = std::result::Result<T, AsepriteError>;
