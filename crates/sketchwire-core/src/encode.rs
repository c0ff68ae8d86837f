//! Transport encoding for the remote rendering service.
//!
//! GET-rendered types are sent as `base64url(zlib(utf8(text)))` without padding. This is the
//! format the service decodes, so the four steps are fixed; only the compression level is a
//! local choice (it changes the size, never the decoded text).

use crate::{DiagramType, Error, Result};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::sync::Arc;

/// base64 with `-`/`_` in place of `+`/`/` and no trailing `=`; decoding accepts either padding.
const URL_SAFE_COMPACT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// PlantUML's text alphabet: `0-9A-Za-z-_` in place of base64's `A-Za-z0-9+/`.
#[cfg(feature = "deflate")]
const PLANTUML_ALPHABET: alphabet::Alphabet =
    match alphabet::Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid PlantUML alphabet"),
    };

#[cfg(feature = "deflate")]
const PLANTUML: GeneralPurpose = GeneralPurpose::new(
    &PLANTUML_ALPHABET,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes `text` the way PlantUML servers read it from a URL path: raw DEFLATE at level 9,
/// then PlantUML's base64 alphabet with every 3-byte group written as four characters.
#[cfg(feature = "deflate")]
pub fn plantuml_encode(text: &str) -> Result<String> {
    use std::io::Write;

    let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::best());
    enc.write_all(text.as_bytes())
        .and_then(|()| enc.finish())
        .map(|mut deflated| {
            // Zero bytes past the final block are ignored by the inflater.
            deflated.resize(deflated.len().div_ceil(3) * 3, 0);
            PLANTUML.encode(deflated)
        })
        .map_err(|err| Error::configuration(format!("compression failed: {err}")))
}

/// Inverse of [`plantuml_encode`].
#[cfg(feature = "deflate")]
pub fn plantuml_decode(encoded: &str) -> Result<String> {
    use std::io::Read;

    let bytes = PLANTUML
        .decode(encoded.trim().as_bytes())
        .map_err(|err| Error::decode(format!("invalid PlantUML encoding: {err}")))?;
    let mut out = Vec::with_capacity(bytes.len() * 3);
    flate2::read::DeflateDecoder::new(bytes.as_slice())
        .read_to_end(&mut out)
        .map_err(|err| Error::decode(format!("invalid deflate stream: {err}")))?;
    String::from_utf8(out).map_err(|err| Error::decode(format!("invalid UTF-8: {err}")))
}

/// A lossless byte compressor paired with its inverse.
pub trait Compressor: Send + Sync {
    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>>;
    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// zlib-wrapped DEFLATE, the framing Kroki expects.
#[cfg(feature = "deflate")]
#[derive(Debug, Clone, Copy)]
pub struct ZlibCompressor {
    pub level: u32,
}

#[cfg(feature = "deflate")]
impl Default for ZlibCompressor {
    fn default() -> Self {
        Self { level: 9 }
    }
}

#[cfg(feature = "deflate")]
impl Compressor for ZlibCompressor {
    fn compress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        use std::io::Write;

        let mut enc = flate2::write::ZlibEncoder::new(
            Vec::with_capacity(input.len() / 2 + 16),
            flate2::Compression::new(self.level.min(9)),
        );
        enc.write_all(input)?;
        enc.finish()
    }

    fn decompress(&self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        use std::io::Read;

        let mut out = Vec::with_capacity(input.len() * 3);
        flate2::read::ZlibDecoder::new(input).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// How a diagram source travels to the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Raw text, sent as a POST body.
    Body(String),
    /// Compact encoding, appended to a GET path.
    Path(String),
}

impl Transport {
    pub fn as_str(&self) -> &str {
        match self {
            Transport::Body(s) | Transport::Path(s) => s,
        }
    }
}

#[derive(Clone)]
pub struct Encoder {
    compressor: Option<Arc<dyn Compressor>>,
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("compression", &self.compressor.is_some())
            .finish()
    }
}

impl Default for Encoder {
    #[cfg(feature = "deflate")]
    fn default() -> Self {
        Self::with_compressor(Arc::new(ZlibCompressor::default()))
    }

    #[cfg(not(feature = "deflate"))]
    fn default() -> Self {
        Self::without_compression()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compressor(compressor: Arc<dyn Compressor>) -> Self {
        Self {
            compressor: Some(compressor),
        }
    }

    /// An encoder that can only pass POST bodies through. Encoding a GET type fails.
    pub fn without_compression() -> Self {
        Self { compressor: None }
    }

    pub fn can_compress(&self) -> bool {
        self.compressor.is_some()
    }

    pub fn encode(&self, text: &str, diagram_type: &DiagramType) -> Result<Transport> {
        if !diagram_type.requires_encoding {
            return Ok(Transport::Body(text.to_string()));
        }
        self.encode_compact(text).map(Transport::Path)
    }

    pub fn encode_compact(&self, text: &str) -> Result<String> {
        let compressor = self.compressor()?;
        let compressed = compressor
            .compress(text.as_bytes())
            .map_err(|err| Error::configuration(format!("compression failed: {err}")))?;
        Ok(URL_SAFE_COMPACT.encode(compressed))
    }

    /// Inverse of [`Encoder::encode_compact`].
    pub fn decode_compact(&self, encoded: &str) -> Result<String> {
        let compressor = self.compressor()?;
        let bytes = URL_SAFE_COMPACT
            .decode(encoded.trim().as_bytes())
            .map_err(|err| Error::decode(format!("invalid base64url: {err}")))?;
        let inflated = compressor
            .decompress(&bytes)
            .map_err(|err| Error::decode(format!("invalid deflate stream: {err}")))?;
        String::from_utf8(inflated).map_err(|err| Error::decode(format!("invalid UTF-8: {err}")))
    }

    fn compressor(&self) -> Result<&dyn Compressor> {
        self.compressor.as_deref().ok_or_else(|| {
            Error::configuration("compact encoding requires a compressor (enable the `deflate` feature)")
        })
    }
}
