//! Visible signature appearances.
//!
//! A signature widget shows a Form XObject: text lines set in Helvetica for the
//! selected details and, optionally, an image on the left. Images are decoded
//! and re-embedded as Flate-compressed RGB with a soft mask when they carry
//! transparency.

use crate::decoders::flate_encode;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::writer::IncrementalUpdate;
use chrono::{DateTime, Utc};

use super::types::{SignatureAppearance, VisibleField};

/// Line height relative to the font size.
const LEADING: f64 = 1.2;
/// Inner margin of the widget, in points.
const PADDING: f64 = 2.0;

/// Values printed in the appearance.
#[derive(Debug, Clone)]
pub struct AppearanceText<'a> {
    pub signer_name: &'a str,
    pub signing_time: DateTime<Utc>,
    pub reason: Option<&'a str>,
    pub location: Option<&'a str>,
}

impl AppearanceText<'_> {
    /// Text lines for the requested fields, in the order given.
    pub fn lines(&self, fields: &[VisibleField]) -> Vec<String> {
        fields
            .iter()
            .filter_map(|field| match field {
                VisibleField::Name => Some(format!("Digitally signed by {}", self.signer_name)),
                VisibleField::Date => Some(format!("Date: {}", self.signing_time.format("%Y-%m-%d %H:%M:%S UTC"))),
                VisibleField::Reason => self.reason.map(|r| format!("Reason: {}", r)),
                VisibleField::Location => self.location.map(|l| format!("Location: {}", l)),
            })
            .collect()
    }
}

/// Decoded RGB image with optional alpha.
#[derive(Debug, Clone)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

impl RgbImage {
    /// Decode PNG or JPEG bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(data)
            .map_err(|e| Error::Configuration(format!("unsupported appearance image: {}", e)))?
            .to_rgba8();
        let (width, height) = img.dimensions();

        let pixels = img.into_raw();
        let mut rgb = Vec::with_capacity(pixels.len() / 4 * 3);
        let mut alpha = Vec::with_capacity(pixels.len() / 4);
        for px in pixels.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        let opaque = alpha.iter().all(|a| *a == 255);

        Ok(Self {
            width,
            height,
            rgb,
            alpha: (!opaque).then_some(alpha),
        })
    }

    /// Largest size with this aspect ratio that fits the box.
    pub fn fit_to_box(&self, max_width: f64, max_height: f64) -> (f64, f64) {
        if self.width == 0 || self.height == 0 {
            return (0.0, 0.0);
        }
        let scale = (max_width / self.width as f64).min(max_height / self.height as f64);
        (self.width as f64 * scale, self.height as f64 * scale)
    }

    /// Add the image (and its soft mask) to `update`.
    pub fn embed(&self, update: &mut IncrementalUpdate<'_>) -> Result<ObjectRef> {
        let smask = match &self.alpha {
            Some(alpha) => Some(update.add_object(image_stream(self.width, self.height, "DeviceGray", alpha)?)),
            None => None,
        };
        let mut stream = image_stream(self.width, self.height, "DeviceRGB", &self.rgb)?;
        if let (Some(smask), Object::Stream { dict, .. }) = (smask, &mut stream) {
            dict.insert("SMask".to_string(), Object::Reference(smask));
        }
        Ok(update.add_object(stream))
    }
}

fn image_stream(width: u32, height: u32, color_space: &str, samples: &[u8]) -> Result<Object> {
    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("XObject"));
    dict.insert("Subtype".to_string(), Object::name("Image"));
    dict.insert("Width".to_string(), Object::Integer(width as i64));
    dict.insert("Height".to_string(), Object::Integer(height as i64));
    dict.insert("ColorSpace".to_string(), Object::name(color_space));
    dict.insert("BitsPerComponent".to_string(), Object::Integer(8));
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    Ok(Object::Stream {
        dict,
        data: bytes::Bytes::from(flate_encode(samples)?),
    })
}

/// Escape text for a literal string in a content stream. Characters outside
/// Latin-1 become `?`.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            },
            c if (c as u32) < 0x20 => out.push(' '),
            c if c.is_ascii() => out.push(c),
            c if (c as u32) <= 0xFF => out.push_str(&format!("\\{:03o}", c as u32)),
            _ => out.push('?'),
        }
    }
    out
}

fn num(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Content stream, resources and bounding box of a signature appearance.
#[derive(Debug, Clone)]
pub struct AppearanceStreamBuilder {
    width: f64,
    height: f64,
    content: Vec<u8>,
    resources: Dict,
}

impl AppearanceStreamBuilder {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            content: Vec::new(),
            resources: Dict::new(),
        }
    }

    /// Draw text lines top-down inside `x..x+width`.
    pub fn text_lines(mut self, lines: &[String], x: f64, font_size: f64) -> Self {
        if lines.is_empty() {
            return self;
        }
        let mut fonts = Dict::new();
        let mut helvetica = Dict::new();
        helvetica.insert("Type".to_string(), Object::name("Font"));
        helvetica.insert("Subtype".to_string(), Object::name("Type1"));
        helvetica.insert("BaseFont".to_string(), Object::name("Helvetica"));
        helvetica.insert("Encoding".to_string(), Object::name("WinAnsiEncoding"));
        fonts.insert("F1".to_string(), Object::Dictionary(helvetica));
        self.resources.insert("Font".to_string(), Object::Dictionary(fonts));

        let leading = font_size * LEADING;
        let mut ops = format!(
            "BT\n/F1 {} Tf\n{} TL\n{} {} Td\n",
            num(font_size),
            num(leading),
            num(x),
            num(self.height - PADDING - font_size)
        );
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                ops.push_str("T*\n");
            }
            ops.push_str(&format!("({}) Tj\n", escape_text(line)));
        }
        ops.push_str("ET\n");
        self.content.extend_from_slice(ops.as_bytes());
        self
    }

    /// Paint an embedded image scaled to `width` x `height` at `x`, `y`.
    pub fn image(mut self, name: &str, image: ObjectRef, x: f64, y: f64, width: f64, height: f64) -> Self {
        let mut xobjects = Dict::new();
        xobjects.insert(name.to_string(), Object::Reference(image));
        self.resources.insert("XObject".to_string(), Object::Dictionary(xobjects));
        self.content.extend_from_slice(
            format!(
                "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                num(width),
                num(height),
                num(x),
                num(y),
                name
            )
            .as_bytes(),
        );
        self
    }

    /// Form XObject stream.
    pub fn build(self) -> Object {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Form"));
        dict.insert("FormType".to_string(), Object::Integer(1));
        dict.insert("BBox".to_string(), Object::rect([0.0, 0.0, self.width, self.height]));
        dict.insert("Resources".to_string(), Object::Dictionary(self.resources));
        Object::Stream {
            dict,
            data: bytes::Bytes::from(self.content),
        }
    }
}

/// Build the normal appearance for a signature widget and add it to `update`.
///
/// Invisible signatures get an empty appearance with a zero bounding box.
pub fn build_appearance(
    update: &mut IncrementalUpdate<'_>,
    appearance: &SignatureAppearance,
    text: &AppearanceText<'_>,
) -> Result<ObjectRef> {
    if appearance.invisible {
        return Ok(update.add_object(AppearanceStreamBuilder::new(0.0, 0.0).build()));
    }

    let (width, height) = (appearance.rect.width, appearance.rect.height);
    let mut builder = AppearanceStreamBuilder::new(width, height);
    let lines = text.lines(&appearance.visible_fields);

    let mut text_x = PADDING;
    if let Some(bytes) = &appearance.image {
        let image = RgbImage::decode(bytes)?;
        let max_width = if lines.is_empty() { width } else { width / 2.0 } - 2.0 * PADDING;
        let (w, h) = image.fit_to_box(max_width.max(0.0), (height - 2.0 * PADDING).max(0.0));
        let image_ref = image.embed(update)?;
        builder = builder.image("Img1", image_ref, PADDING, (height - h) / 2.0, w, h);
        text_x = PADDING * 2.0 + w;
        log::debug!("appearance image {}x{} px drawn at {:.1}x{:.1} pt", image.width, image.height, w, h);
    }

    builder = builder.text_lines(&lines, text_x, appearance.font_size);
    Ok(update.add_object(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn text() -> AppearanceText<'static> {
        AppearanceText {
            signer_name: "Test Signer",
            signing_time: Utc.with_ymd_and_hms(2027, 1, 2, 3, 4, 5).unwrap(),
            reason: Some("Approval (final)"),
            location: None,
        }
    }

    fn png(rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 2, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_lines_skip_missing_values() {
        let lines = text().lines(&[
            VisibleField::Name,
            VisibleField::Location,
            VisibleField::Date,
            VisibleField::Reason,
        ]);
        assert_eq!(
            lines,
            vec![
                "Digitally signed by Test Signer".to_string(),
                "Date: 2027-01-02 03:04:05 UTC".to_string(),
                "Reason: Approval (final)".to_string(),
            ]
        );
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a(b)\\c"), "a\\(b\\)\\\\c");
        assert_eq!(escape_text("café"), "caf\\351");
        assert_eq!(escape_text("日本"), "??");
    }

    #[test]
    fn test_text_stream_content() {
        let stream = AppearanceStreamBuilder::new(200.0, 50.0)
            .text_lines(&text().lines(&[VisibleField::Name, VisibleField::Reason]), 2.0, 9.0)
            .build();
        let Object::Stream { dict, data } = stream else {
            panic!("expected stream");
        };
        let content = String::from_utf8(data.to_vec()).unwrap();
        assert!(content.contains("/F1 9 Tf"));
        assert!(content.contains("(Digitally signed by Test Signer) Tj"));
        assert!(content.contains("T*\n(Reason: Approval \\(final\\)) Tj"));
        assert_eq!(dict.get("Subtype").and_then(|o| o.as_name()), Some("Form"));
        assert!(dict
            .get("Resources")
            .and_then(|r| r.as_dict())
            .and_then(|r| r.get("Font"))
            .is_some());
    }

    #[test]
    fn test_decode_image_alpha() {
        let opaque = RgbImage::decode(&png([10, 20, 30, 255])).unwrap();
        assert_eq!((opaque.width, opaque.height), (4, 2));
        assert_eq!(&opaque.rgb[..3], &[10, 20, 30]);
        assert!(opaque.alpha.is_none());

        let translucent = RgbImage::decode(&png([10, 20, 30, 128])).unwrap();
        assert_eq!(translucent.alpha.as_deref(), Some(&[128u8; 8][..]));
        assert_eq!(translucent.fit_to_box(40.0, 40.0), (40.0, 20.0));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(RgbImage::decode(b"not an image"), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_num_formatting() {
        assert_eq!(num(9.0), "9");
        assert_eq!(num(10.8), "10.8");
        assert_eq!(num(0.0), "0");
        assert_eq!(num(-0.001), "0");
    }
}
