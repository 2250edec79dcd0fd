//! In-memory PDF fixtures for tests

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// An RGB image XObject and the rectangles it is drawn into (PDF user space)
#[derive(Clone)]
pub struct FixtureImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    /// `(x, y, w, h)` for each `Do` of this image
    pub draws: Vec<(f32, f32, f32, f32)>,
}

impl FixtureImage {
    /// Solid-color image
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        let rgb = color.repeat((width * height) as usize);
        Self {
            width,
            height,
            rgb,
            draws: Vec::new(),
        }
    }

    pub fn drawn_at(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.draws.push((x, y, w, h));
        self
    }
}

#[derive(Default)]
struct FixturePage {
    lines: Vec<String>,
    images: Vec<FixtureImage>,
}

/// Builder for small letter-sized PDFs
#[derive(Default)]
pub struct PdfFixture {
    pages: Vec<FixturePage>,
}

impl PdfFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page with one Helvetica line per entry, 20pt apart from the top
    pub fn page(mut self, lines: &[&str]) -> Self {
        self.pages.push(FixturePage {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..FixturePage::default()
        });
        self
    }

    /// A page with text and images
    pub fn page_with_images(mut self, lines: &[&str], images: Vec<FixtureImage>) -> Self {
        self.pages.push(FixturePage {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            images,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids = Vec::new();
        for page in self.pages {
            let mut content = String::new();
            for (i, line) in page.lines.iter().enumerate() {
                let escaped = line.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");
                content.push_str(&format!(
                    "BT /F1 12 Tf 72 {} Td ({}) Tj ET\n",
                    720 - (i as i32) * 20,
                    escaped
                ));
            }

            let mut xobjects = lopdf::Dictionary::new();
            for (i, image) in page.images.iter().enumerate() {
                let name = format!("Im{}", i);
                let image_id = doc.add_object(Object::Stream(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => image.width as i64,
                        "Height" => image.height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8i64,
                    },
                    image.rgb.clone(),
                )));
                xobjects.set(name.clone(), image_id);
                for (x, y, w, h) in &image.draws {
                    content.push_str(&format!("q {} 0 0 {} {} {} cm /{} Do Q\n", w, h, x, y, name));
                }
            }

            let content_id = doc.add_object(Object::Stream(Stream::new(
                lopdf::Dictionary::new(),
                content.into_bytes(),
            )));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => Object::Dictionary(dictionary! {
                    "Font" => Object::Dictionary(dictionary! { "F1" => font_id }),
                    "XObject" => Object::Dictionary(xobjects),
                }),
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }
}

/// Single-page PDF with the given lines
pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    PdfFixture::new().page(lines).build()
}

/// Multi-page PDF, one line per page
pub fn pages_pdf(count: usize) -> Vec<u8> {
    let labels: Vec<String> = (1..=count).map(|i| format!("Page {} body", i)).collect();
    labels
        .iter()
        .fold(PdfFixture::new(), |fixture, label| fixture.page(&[label.as_str()]))
        .build()
}
