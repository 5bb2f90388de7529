use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::canvas::{Canvas, CanvasError, Origin};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("journal encoding error: {0}")]
    Journal(#[from] bincode::Error),
    #[error("not a pending-save journal (bad magic header)")]
    BadMagic,
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

// ============================================================================
// PNG
// ============================================================================

/// Reverse row order of a tightly packed RGBA8 buffer.
pub fn flip_rows(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row = width as usize * 4;
    let mut out = Vec::with_capacity(pixels.len());
    for y in (0..height as usize).rev() {
        out.extend_from_slice(&pixels[y * row..(y + 1) * row]);
    }
    out
}

/// Decode a PNG into a canvas whose buffer follows `origin`.
pub fn load_png(path: &Path, origin: Origin) -> Result<Canvas, CodecError> {
    let mut image = image::open(path)?.to_rgba8();
    if origin == Origin::BottomLeft {
        image::imageops::flip_vertical_in_place(&mut image);
    }
    Ok(Canvas::from_image(image)?.with_origin(origin))
}

/// Encode raw RGBA8 pixels as PNG bytes. On-disk images are always
/// top-row-first regardless of the buffer's origin.
pub fn encode_png(width: u32, height: u32, origin: Origin, pixels: &[u8]) -> Result<Vec<u8>, CodecError> {
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(CanvasError::BufferSize { expected, actual: pixels.len() }.into());
    }
    let flipped;
    let rows = match origin {
        Origin::TopLeft => pixels,
        Origin::BottomLeft => {
            flipped = flip_rows(pixels, width, height);
            &flipped[..]
        }
    };
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(rows, width, height, ColorType::Rgba8)?;
    Ok(out)
}

pub fn write_png(path: &Path, width: u32, height: u32, origin: Origin, pixels: &[u8]) -> Result<(), CodecError> {
    let bytes = encode_png(width, height, origin, pixels)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Decode PNG bytes to a top-row-first image.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, CodecError> {
    Ok(image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.to_rgba8())
}

// ============================================================================
// PENDING-SAVE JOURNAL
// ============================================================================

/// Raw header ahead of the bincode body.
const JOURNAL_MAGIC: [u8; 4] = *b"SCJ1";

pub fn write_journal<T: Serialize>(path: &Path, body: &T) -> Result<(), CodecError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&JOURNAL_MAGIC)?;
    bincode::serialize_into(&mut writer, body)?;
    writer.flush()?;
    Ok(())
}

/// Read a journal written by `write_journal`. A missing or foreign header
/// is `BadMagic`; a damaged body is a `Journal` decode error.
pub fn read_journal<T: DeserializeOwned>(path: &Path) -> Result<T, CodecError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(()) if magic == JOURNAL_MAGIC => {}
        Ok(()) => return Err(CodecError::BadMagic),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(CodecError::BadMagic),
        Err(e) => return Err(e.into()),
    }
    Ok(bincode::deserialize_from(reader)?)
}
