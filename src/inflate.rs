use std::io::Read;

use flate2::read::DeflateDecoder;
use log::trace;

use crate::error::FormatError;

/// Length of the zlib envelope in front of the raw DEFLATE stream.
const ZLIB_HEADER_LEN: usize = 2;

/// Inflates a raw DEFLATE stream.
pub fn inflate(deflated: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::new();
    DeflateDecoder::new(deflated)
        .read_to_end(&mut out)
        .map_err(|e| FormatError::Decompression(e.to_string()))?;
    trace!("inflated {} bytes -> {} bytes", deflated.len(), out.len());
    Ok(out)
}

/// Strips the 2-byte zlib header and inflates the rest. The trailing adler32
/// checksum is ignored.
pub fn inflate_zlib(payload: &[u8]) -> Result<Vec<u8>, FormatError> {
    let deflated = payload
        .get(ZLIB_HEADER_LEN..)
        .ok_or_else(|| FormatError::Decompression("zlib stream shorter than its header".into()))?;
    inflate(deflated)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    #[test]
    fn zlib_payload_round_trips() {
        let raw: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        let compressed = enc.finish().unwrap();
        assert_eq!(inflate_zlib(&compressed).unwrap(), raw);
    }

    #[test]
    fn garbage_is_a_decompression_error() {
        let err = inflate_zlib(&[0x78, 0x9c, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, FormatError::Decompression(_)));
        assert!(matches!(
            inflate_zlib(&[0x78]).unwrap_err(),
            FormatError::Decompression(_)
        ));
    }
}
