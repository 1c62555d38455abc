use color_eyre::eyre::{Context, Result};
use regex::{Match, Regex};

/// Wrap width handed to html2text; large enough that titles never wrap.
const TITLE_WIDTH: usize = 10_000;

/// Candidate items found in one document, aligned by position.
///
/// `images[i]` belongs to `titles[i]`. An image without a usable `src`
/// shows up as `None` so the positions stay aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub images: Vec<Option<String>>,
    pub titles: Vec<String>,
}

/// Pulls candidate items out of a source document.
pub trait Extract: Send + Sync {
    fn extract(&self, document: &str) -> Extracted;
}

/// Extractor for blog-style pages. Titles are `.post h3 a`, images are
/// `.post .bodytype .e img`; anything outside those elements is ignored.
pub struct PostExtractor {
    post: Regex,
    bodytype: Regex,
    entry: Regex,
    any_tag: Regex,
    title: Regex,
    image: Regex,
    src: Regex,
    tag: Regex,
}

/// Opening tag of any element whose class list contains `class`.
fn class_pattern(class: &str) -> Result<Regex> {
    Regex::new(&format!(
        r#"(?i)<([a-z][a-z0-9]*)\b[^>]*\sclass\s*=\s*["'](?:[^"']*\s)?{}(?:\s[^"']*)?["'][^>]*>"#,
        regex::escape(class)
    ))
    .wrap_err_with(|| format!("invalid pattern for class {}", class))
}

impl PostExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            post: class_pattern("post")?,
            bodytype: class_pattern("bodytype")?,
            entry: class_pattern("e")?,
            any_tag: Regex::new(r"(?i)<(/?)([a-z][a-z0-9]*)\b[^>]*>")
                .wrap_err("invalid tag scan pattern")?,
            title: Regex::new(r"(?is)<h3\b[^>]*>\s*<a\b[^>]*>(.*?)</a>")
                .wrap_err("invalid title pattern")?,
            image: Regex::new(r"(?is)<img\b[^>]*>").wrap_err("invalid image pattern")?,
            src: Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
                .wrap_err("invalid src pattern")?,
            tag: Regex::new(r"<[^>]+>").wrap_err("invalid tag pattern")?,
        })
    }

    /// Inner HTML of every element opened by a match of `opening` in `html`.
    fn elements<'a>(&self, opening: &Regex, html: &'a str) -> Vec<&'a str> {
        opening
            .captures_iter(html)
            .filter_map(|caps| {
                let open = caps.get(0)?;
                let name = caps.get(1)?.as_str();
                Some(self.inner_html(html, open, name))
            })
            .collect()
    }

    /// Content between `open` and its matching closing tag. An element that
    /// is never closed runs to the end of `html`.
    fn inner_html<'a>(&self, html: &'a str, open: Match<'_>, name: &str) -> &'a str {
        let rest = &html[open.end()..];
        let mut depth = 1usize;
        for caps in self.any_tag.captures_iter(rest) {
            let Some(tag_name) = caps.get(2) else { continue };
            if !tag_name.as_str().eq_ignore_ascii_case(name) {
                continue;
            }
            let Some(whole) = caps.get(0) else { continue };
            let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            if closing {
                depth -= 1;
                if depth == 0 {
                    return &rest[..whole.start()];
                }
            } else if !whole.as_str().ends_with("/>") {
                depth += 1;
            }
        }
        rest
    }

    fn clean_title(&self, raw: &str) -> String {
        let stripped = self.tag.replace_all(raw, "");
        let text = html2text::from_read(stripped.as_bytes(), TITLE_WIDTH);
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn image_src(&self, img_tag: &str) -> Option<String> {
        let caps = self.src.captures(img_tag)?;
        let src = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
        if src.is_empty() {
            return None;
        }
        Some(src.replace("&amp;", "&"))
    }
}

impl Extract for PostExtractor {
    fn extract(&self, document: &str) -> Extracted {
        let mut out = Extracted::default();
        for post in self.elements(&self.post, document) {
            out.titles.extend(
                self.title
                    .captures_iter(post)
                    .filter_map(|c| c.get(1))
                    .map(|m| self.clean_title(m.as_str())),
            );

            for body in self.elements(&self.bodytype, post) {
                for entry in self.elements(&self.entry, body) {
                    out.images.extend(
                        self.image
                            .find_iter(entry)
                            .map(|m| self.image_src(m.as_str())),
                    );
                }
            }
        }
        out
    }
}
