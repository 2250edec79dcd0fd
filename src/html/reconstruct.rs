//! Layout reconstruction
//!
//! Converts positioned text runs and image placements into one editable HTML
//! fragment per page. Text is grouped into lines by baseline and re-spaced
//! with non-breaking spaces; images are layered in absolutely.

use std::fmt::Write;

use crate::pdf::{ImagePlacement, PageViewport, TextRun};

/// Maximum baseline difference, in viewport pixels, within one line
pub const LINE_THRESHOLD: f32 = 2.0;
/// Gap, in multiples of the font size, below which no padding is inserted
pub const SPACING_THRESHOLD: f32 = 0.1;

pub const ERROR_MESSAGE: &str =
    "Error rendering page content. The page may be corrupted or contain unsupported elements.";

/// A run converted to viewport pixels (origin top-left)
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
}

/// Runs sharing a baseline
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub runs: Vec<PlacedRun>,
}

impl Line {
    /// Font size of the line, taken from its first run
    pub fn font_size(&self) -> f32 {
        self.runs.first().map(|r| r.font_size).unwrap_or(0.0)
    }
}

/// Opening tag of a page block sized to the viewport
pub fn page_open_tag(width: f32, height: f32) -> String {
    sized_open_tag(width, "height", height)
}

/// Opening tag of a page block that grows with its content
pub fn flow_page_open_tag(width: f32, min_height: f32) -> String {
    sized_open_tag(width, "min-height", min_height)
}

fn sized_open_tag(width: f32, height_property: &str, height: f32) -> String {
    format!(
        "<div class=\"pdf-page\" contenteditable=\"true\" style=\"width: {}px; {}: {}px; \
         position: relative; background-color: white; margin: 20px auto; border: 1px solid #ddd; \
         padding: 40px; box-sizing: border-box;\">",
        px(width),
        height_property,
        px(height)
    )
}

/// Project runs into the viewport, dropping those without a transform
fn place_runs(runs: &[TextRun], viewport: PageViewport) -> Vec<PlacedRun> {
    runs.iter()
        .filter_map(|run| {
            let t = run.transform?;
            Some(PlacedRun {
                text: run.text.clone(),
                x: t[4] * viewport.scale,
                y: viewport.height - t[5] * viewport.scale,
                width: run.width * viewport.scale,
                font_size: t[0].hypot(t[1]) * viewport.scale,
            })
        })
        .collect()
}

/// Sort top-to-bottom then left-to-right and split into lines
pub fn group_lines(runs: &[TextRun], viewport: PageViewport) -> Vec<Line> {
    let mut placed = place_runs(runs, viewport);
    placed.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Line> = Vec::new();
    let mut previous_y: Option<f32> = None;

    for run in placed {
        let y = run.y;
        match (previous_y, lines.last_mut()) {
            (Some(prev), Some(line)) if (y - prev).abs() <= LINE_THRESHOLD => line.runs.push(run),
            _ => lines.push(Line { runs: vec![run] }),
        }
        previous_y = Some(y);
    }

    lines
}

/// Number of `&nbsp;` to place between two runs on a line
pub fn gap_spaces(previous: &PlacedRun, current: &PlacedRun, font_size: f32) -> usize {
    if font_size <= 0.0 {
        return 0;
    }
    let gap = (current.x - (previous.x + previous.width)) / font_size;
    if gap > SPACING_THRESHOLD {
        gap.round() as usize
    } else {
        0
    }
}

fn line_html(line: &Line, out: &mut String) {
    let font_size = line.font_size();
    let _ = write!(
        out,
        "<p style=\"margin: 0 0 0.2em 0; padding: 0; font-size: {}px; line-height: 1.3; \
         color: #000000; background-color: rgba(255, 255, 255, 0.7);\">",
        px(font_size)
    );
    for (i, run) in line.runs.iter().enumerate() {
        if i > 0 {
            out.push_str(&"&nbsp;".repeat(gap_spaces(&line.runs[i - 1], run, font_size)));
        }
        out.push_str(&html_escape::encode_text(&run.text));
    }
    out.push_str("</p>");
}

/// Element id of the `index`-th extracted image of a source page
pub fn image_element_id(page_number: usize, index: usize) -> String {
    format!("pdf-img-{}-{}", page_number, index)
}

fn image_html(page_number: usize, index: usize, image: &ImagePlacement, out: &mut String) {
    let _ = write!(
        out,
        "<figure class=\"image-container\" style=\"position: absolute; left: {}px; top: {}px; \
         width: {}px; height: {}px; z-index: 1; margin: 0;\">\
         <img src=\"{}\" id=\"{}\" width=\"{}\" height=\"{}\" \
         style=\"width: 100%; height: 100%; object-fit: contain;\" data-pdf-img=\"true\" \
         alt=\"PDF Image {}\"></figure>",
        px(image.x),
        px(image.y),
        px(image.width),
        px(image.height),
        html_escape::encode_double_quoted_attribute(&image.data_url),
        image_element_id(page_number, index),
        image.width.round() as i64,
        image.height.round() as i64,
        index + 1
    );
}

/// Build the editable fragment for one page
pub fn reconstruct_page(
    page_number: usize,
    viewport: PageViewport,
    runs: &[TextRun],
    images: &[ImagePlacement],
) -> String {
    let mut html = page_open_tag(viewport.width, viewport.height);

    for (index, image) in images.iter().enumerate() {
        image_html(page_number, index, image, &mut html);
    }
    for line in group_lines(runs, viewport) {
        line_html(&line, &mut html);
    }

    html.push_str("</div>");
    html
}

/// Fragment used in place of a page that could not be reconstructed
pub fn error_page(viewport: PageViewport) -> String {
    format!(
        "{}<p style=\"color: red;\">{}</p></div>",
        page_open_tag(viewport.width, viewport.height),
        ERROR_MESSAGE
    )
}

/// Format a pixel value without trailing zeros
fn px(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: PageViewport = PageViewport {
        width: 800.0,
        height: 1000.0,
        scale: 1.0,
    };

    fn run(text: &str, x: f32, baseline: f32, width: f32) -> TextRun {
        TextRun::new(text, [12.0, 0.0, 0.0, 12.0, x, baseline], width)
    }

    #[test]
    fn test_runs_within_threshold_share_a_line() {
        let runs = vec![run("a", 10.0, 500.0, 5.0), run("b", 50.0, 498.0, 5.0)];
        let lines = group_lines(&runs, VIEWPORT);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].runs.len(), 2);
    }

    #[test]
    fn test_runs_beyond_threshold_split() {
        let runs = vec![run("a", 10.0, 500.0, 5.0), run("b", 50.0, 497.5, 5.0)];
        let lines = group_lines(&runs, VIEWPORT);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_lines_sorted_top_down_then_left_right() {
        let runs = vec![
            run("lower", 10.0, 100.0, 20.0),
            run("right", 200.0, 700.0, 20.0),
            run("left", 10.0, 700.0, 20.0),
        ];
        let lines = group_lines(&runs, VIEWPORT);
        assert_eq!(lines.len(), 2);
        let first: Vec<&str> = lines[0].runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(first, vec!["left", "right"]);
        assert_eq!(lines[1].runs[0].text, "lower");
    }

    #[test]
    fn test_runs_without_transform_are_dropped() {
        let runs = vec![
            TextRun {
                text: "ghost".to_string(),
                transform: None,
                width: 10.0,
            },
            run("kept", 10.0, 500.0, 20.0),
        ];
        let html = reconstruct_page(1, VIEWPORT, &runs, &[]);
        assert!(!html.contains("ghost"));
        assert!(html.contains("kept"));
    }

    #[test]
    fn test_gap_padding_rounds_to_whole_spaces() {
        // Gap of 24px at 12px font is two spaces
        let runs = vec![run("Name", 10.0, 500.0, 40.0), run("Value", 74.0, 500.0, 40.0)];
        let html = reconstruct_page(1, VIEWPORT, &runs, &[]);
        assert!(html.contains("Name&nbsp;&nbsp;Value"));

        // Gap below the threshold adds nothing
        let tight = vec![run("ab", 10.0, 500.0, 10.0), run("cd", 21.0, 500.0, 10.0)];
        let html = reconstruct_page(1, VIEWPORT, &tight, &[]);
        assert!(html.contains("abcd"));
    }

    #[test]
    fn test_font_size_scales_with_viewport() {
        let viewport = PageViewport {
            width: 800.0,
            height: 1000.0,
            scale: 1.5,
        };
        let html = reconstruct_page(1, viewport, &[run("x", 10.0, 500.0, 5.0)], &[]);
        assert!(html.contains("font-size: 18px"));
    }

    #[test]
    fn test_text_is_escaped() {
        let html = reconstruct_page(1, VIEWPORT, &[run("<b>&", 10.0, 500.0, 5.0)], &[]);
        assert!(html.contains("&lt;b&gt;&amp;"));
    }

    #[test]
    fn test_images_are_tagged_per_page_and_index() {
        let image = ImagePlacement {
            data_url: "data:image/png;base64,AAAA".to_string(),
            width: 100.0,
            height: 50.5,
            x: 10.0,
            y: 20.0,
        };
        let html = reconstruct_page(3, VIEWPORT, &[], &[image.clone(), image]);
        assert!(html.contains("id=\"pdf-img-3-0\""));
        assert!(html.contains("id=\"pdf-img-3-1\""));
        assert!(html.contains("alt=\"PDF Image 2\""));
        assert!(html.contains("left: 10px; top: 20px; width: 100px; height: 50.5px"));
        assert!(html.contains("data-pdf-img=\"true\""));
    }

    #[test]
    fn test_error_page_keeps_dimensions() {
        let html = error_page(VIEWPORT);
        assert!(html.contains("width: 800px; height: 1000px"));
        assert!(html.contains(ERROR_MESSAGE));
        assert!(html.starts_with("<div class=\"pdf-page\""));
    }
}
