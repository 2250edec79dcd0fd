//! Image-only PDF assembly

use image::RgbImage;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::ExportError;

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Builds a PDF whose pages each draw one JPEG
pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfWriter {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Page that is entirely covered by the image
    pub fn add_full_page(&mut self, width: f32, height: f32, jpeg: Vec<u8>, pixels: (u32, u32)) {
        self.add_jpeg_page(width, height, jpeg, pixels, [0.0, 0.0, width, height]);
    }

    /// Page of `width` x `height` points drawing the image into `rect`
    /// (`[x, y, w, h]`, bottom-left origin)
    pub fn add_jpeg_page(
        &mut self,
        width: f32,
        height: f32,
        jpeg: Vec<u8>,
        pixels: (u32, u32),
        rect: [f32; 4],
    ) {
        let image_id = self.doc.add_object(Object::Stream(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => pixels.0 as i64,
                "Height" => pixels.1 as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )));

        let [x, y, w, h] = rect;
        let content = format!("q {} 0 0 {} {} {} cm /Im0 Do Q\n", w, h, x, y);
        let stream = Stream::new(lopdf::Dictionary::new(), content.into_bytes());
        let content_id = self.doc.add_object(Object::Stream(stream));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => Object::Dictionary(dictionary! {
                "XObject" => Object::Dictionary(dictionary! { "Im0" => image_id }),
            }),
        });
        self.kids.push(page_id.into());
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ExportError> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| ExportError::Assemble(e.to_string()))?;
        Ok(buf)
    }
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_pdf_has_one_image_per_page() {
        let bitmap = RgbImage::from_pixel(20, 10, image::Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&bitmap, 92).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let mut writer = PdfWriter::new();
        writer.add_full_page(300.0, 150.0, jpeg.clone(), (20, 10));
        writer.add_full_page(300.0, 150.0, jpeg, (20, 10));
        assert_eq!(writer.page_count(), 2);
        let bytes = writer.finish().unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
        for page_id in pages.values() {
            let page = doc.get_dictionary(*page_id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            assert_eq!(media_box[2].as_float().unwrap(), 300.0);
            assert_eq!(media_box[3].as_float().unwrap(), 150.0);
            let content = doc.get_page_content(*page_id).unwrap();
            assert!(String::from_utf8_lossy(&content).contains("/Im0 Do"));
        }
    }
}
