//! Streaming HTML rewrites over page content

use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use serde::{Deserialize, Serialize};

use super::RewriteError;

/// Vertical rhythm applied to every paragraph of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphSpacing {
    #[default]
    Compact,
    Relaxed,
}

impl ParagraphSpacing {
    pub fn margin(&self) -> &'static str {
        match self {
            ParagraphSpacing::Compact => "0 0 0.2em 0",
            ParagraphSpacing::Relaxed => "0 0 0.8em 0",
        }
    }

    pub fn line_height(&self) -> &'static str {
        match self {
            ParagraphSpacing::Compact => "1.3",
            ParagraphSpacing::Relaxed => "1.6",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            ParagraphSpacing::Compact => ParagraphSpacing::Relaxed,
            ParagraphSpacing::Relaxed => ParagraphSpacing::Compact,
        }
    }
}

/// Strip scripts, inline event handlers and `javascript:` URLs
pub fn sanitize_html(html: &str) -> Result<String, RewriteError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("*", |el| {
                    let handlers: Vec<String> = el
                        .attributes()
                        .iter()
                        .map(|attr| attr.name())
                        .filter(|name| name.starts_with("on"))
                        .collect();
                    for name in handlers {
                        el.remove_attribute(&name);
                    }
                    for attr in ["href", "src"] {
                        if let Some(value) = el.get_attribute(attr) {
                            if value.trim().to_lowercase().starts_with("javascript:") {
                                el.remove_attribute(attr);
                            }
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()))
}

/// Append hidden enrichment markup inside the first page block
pub fn merge_enrichment(html: &str, enhanced_text: &str) -> Result<String, RewriteError> {
    let hidden = format!(
        "<div class=\"server-ocr-text\" style=\"display: none;\">{}</div>",
        enhanced_text
    );
    let mut merged = false;

    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("div.pdf-page", |el| {
                if !merged {
                    el.append(&hidden, ContentType::Html);
                    merged = true;
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()));
    result
}

/// Rewrite margin and line-height on every paragraph
pub fn set_paragraph_spacing(
    html: &str,
    spacing: ParagraphSpacing,
) -> Result<String, RewriteError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("p", |el| {
                let style = el.get_attribute("style").unwrap_or_default();
                let updated = set_style_properties(
                    &style,
                    &[("margin", spacing.margin()), ("line-height", spacing.line_height())],
                );
                el.set_attribute("style", &updated)?;
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()))
}

/// Replace or append CSS declarations in an inline style.
///
/// Setting `margin` also drops any `margin-*` longhands.
pub fn set_style_properties(style: &str, properties: &[(&str, &str)]) -> String {
    let mut declarations: Vec<String> = style
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .filter(|decl| {
            let name = decl.split(':').next().unwrap_or("").trim().to_lowercase();
            !properties
                .iter()
                .any(|(prop, _)| name == *prop || name.starts_with(&format!("{}-", prop)))
        })
        .map(str::to_string)
        .collect();

    for (prop, value) in properties {
        declarations.push(format!("{}: {}", prop, value));
    }

    let mut out = declarations.join("; ");
    out.push(';');
    out
}

/// Value of one property in an inline style
pub fn style_property<'a>(style: &'a str, property: &str) -> Option<&'a str> {
    style.split(';').rev().find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        (name.trim().eq_ignore_ascii_case(property)).then(|| value.trim())
    })
}

/// Parse a CSS length in px (unitless treated as px)
pub fn parse_px(value: &str) -> Option<f32> {
    let value = value.trim();
    let px: f32 = value.strip_suffix("px").unwrap_or(value).trim().parse().ok()?;
    px.is_finite().then_some(px)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_scripts_and_handlers() {
        let html = r#"<p onclick="x()" onmouseenter="y()">hi</p><script>alert(1)</script><a href="javascript:evil()">l</a>"#;
        let clean = sanitize_html(html).unwrap();
        assert!(!clean.contains("script"));
        assert!(!clean.contains("onclick"));
        assert!(!clean.contains("onmouseenter"));
        assert!(!clean.contains("javascript"));
        assert!(clean.contains("<p>hi</p>"));
    }

    #[test]
    fn test_merge_targets_first_page_only() {
        let html = r#"<div class="pdf-page"><p>a</p></div><div class="pdf-page"><p>b</p></div>"#;
        let merged = merge_enrichment(html, "<div class=\"extracted-text\">x</div>").unwrap();
        assert_eq!(merged.matches("server-ocr-text").count(), 1);
        assert!(merged.starts_with(
            r#"<div class="pdf-page"><p>a</p><div class="server-ocr-text" style="display: none;">"#
        ));
    }

    #[test]
    fn test_merge_without_page_block_is_noop() {
        let html = "<p>plain</p>";
        assert_eq!(merge_enrichment(html, "x").unwrap(), html);
    }

    #[test]
    fn test_spacing_rewrites_paragraph_styles() {
        let html = r#"<p style="margin: 0 0 0.2em 0; font-size: 12px; line-height: 1.3;">x</p>"#;
        let relaxed = set_paragraph_spacing(html, ParagraphSpacing::Relaxed).unwrap();
        assert!(relaxed.contains("font-size: 12px"));
        assert!(relaxed.contains("margin: 0 0 0.8em 0"));
        assert!(relaxed.contains("line-height: 1.6"));
        assert!(!relaxed.contains("1.3"));
    }

    #[test]
    fn test_style_helpers() {
        let style = "width: 100px; height:50.5px;position: absolute";
        assert_eq!(style_property(style, "height"), Some("50.5px"));
        assert_eq!(style_property(style, "top"), None);
        assert_eq!(parse_px("50.5px"), Some(50.5));
        assert_eq!(parse_px("12"), Some(12.0));
        assert_eq!(parse_px("1em"), None);
        assert_eq!(parse_px("inf"), None);
        assert_eq!(parse_px("NaNpx"), None);

        let updated = set_style_properties("margin-bottom: 3px; color: red", &[("margin", "0")]);
        assert_eq!(updated, "color: red; margin: 0;");
    }
}
