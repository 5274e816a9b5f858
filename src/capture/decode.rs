use crate::error::DecodeError;

const JPEG_MAGIC: [u8; 2] = [0xFF, 0xD8];

/// Decoder output: tightly packed 8-bit samples, 1, 3 or 4 per pixel
#[derive(Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl DecodedImage {
    fn from_packed(width: usize, height: usize, data: Vec<u8>) -> Result<Self, DecodeError> {
        let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(DecodeError::Geometry {
                width: u32::MAX,
                height: u32::MAX,
                len: data.len(),
            });
        };

        let geometry_error = || DecodeError::Geometry {
            width: w,
            height: h,
            len: data.len(),
        };

        let pixel_count = width.checked_mul(height).ok_or_else(geometry_error)?;
        if pixel_count == 0 || data.len() % pixel_count != 0 {
            return Err(geometry_error());
        }

        match data.len() / pixel_count {
            channels @ (1 | 3 | 4) => Ok(Self {
                width: w,
                height: h,
                channels,
                data,
            }),
            other => Err(DecodeError::Channels(other)),
        }
    }
}

/// Decode one encoded live-view frame.
///
/// JPEG is the device's native format and takes the fast path; anything else
/// goes through the generic `image` loader.
pub fn decode_frame(data: &[u8]) -> Result<DecodedImage, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    if data.starts_with(&JPEG_MAGIC) {
        return decode_jpeg(data);
    }

    let image = image::load_from_memory(data)?.into_rgba8();
    let (width, height) = image.dimensions();
    DecodedImage::from_packed(width as usize, height as usize, image.into_raw())
}

#[cfg(feature = "fast-jpeg")]
fn decode_jpeg(data: &[u8]) -> Result<DecodedImage, DecodeError> {
    let mut decoder = zune_jpeg::JpegDecoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| DecodeError::Jpeg(format!("{e:?}")))?;
    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| DecodeError::Jpeg("missing frame header".into()))?;

    DecodedImage::from_packed(width, height, pixels)
}

#[cfg(not(feature = "fast-jpeg"))]
fn decode_jpeg(data: &[u8]) -> Result<DecodedImage, DecodeError> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| DecodeError::Jpeg(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| DecodeError::Jpeg("missing frame header".into()))?;

    DecodedImage::from_packed(info.width as usize, info.height as usize, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(img: impl Into<image::DynamicImage>, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.into().write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_jpeg_to_rgb() {
        let jpeg = encode(RgbImage::from_pixel(32, 16, Rgb([200, 40, 40])), ImageFormat::Jpeg);

        let decoded = decode_frame(&jpeg).unwrap();
        assert_eq!((decoded.width, decoded.height), (32, 16));
        assert_eq!(decoded.channels, 3);
        assert_eq!(decoded.data.len(), 32 * 16 * 3);
        // lossy, so only check the dominant channel survived
        assert!(decoded.data[0] > 150 && decoded.data[1] < 100);
    }

    #[test]
    fn decodes_png_to_rgba() {
        let png = encode(RgbaImage::from_pixel(5, 7, Rgba([1, 2, 3, 4])), ImageFormat::Png);

        let decoded = decode_frame(&png).unwrap();
        assert_eq!((decoded.width, decoded.height, decoded.channels), (5, 7, 4));
        assert_eq!(&decoded.data[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_garbage_and_empty() {
        assert!(matches!(decode_frame(&[]), Err(DecodeError::Empty)));
        assert!(decode_frame(&[0xFF, 0xD8, 0x00, 0x01]).is_err());
        assert!(decode_frame(b"definitely not an image").is_err());
    }

    #[test]
    fn packed_geometry_is_checked() {
        assert!(DecodedImage::from_packed(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(
            DecodedImage::from_packed(2, 2, vec![0; 8]),
            Err(DecodeError::Channels(2))
        ));
        assert!(matches!(
            DecodedImage::from_packed(2, 2, vec![0; 7]),
            Err(DecodeError::Geometry { .. })
        ));
        assert!(DecodedImage::from_packed(0, 2, Vec::new()).is_err());
    }
}
