//! Minimal page layout on top of `lopdf`: a top-down cursor over A4 pages,
//! the three standard Helvetica faces and WinAnsi text encoding.

use chrono::NaiveDateTime;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::render::RenderError;

pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
pub const MARGIN: f32 = 42.0;
const FOOTER: f32 = 24.0;
const LEADING: f32 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Italic];

    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }

    fn base(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Italic => "Helvetica-Oblique",
        }
    }

    /// Rough average glyph advance in em, good enough for line breaking.
    fn advance(self) -> f32 {
        match self {
            Font::Bold => 0.56,
            Font::Regular | Font::Italic => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

pub fn line_height(size: f32) -> f32 {
    size * LEADING
}

/// Width available for text, measured from the left margin.
pub fn text_width(indent: f32) -> f32 {
    PAGE_WIDTH - 2.0 * MARGIN - indent
}

/// Maps text to WinAnsiEncoding; anything outside it becomes `?`.
pub fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\t' => b' ',
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            'Œ' => 0x8c,
            'œ' => 0x9c,
            'Š' => 0x8a,
            'š' => 0x9a,
            'Ž' => 0x8e,
            'ž' => 0x9e,
            'Ÿ' => 0x9f,
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap by estimated width. Words longer than a line are split.
pub fn wrap(text: &str, font: Font, size: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (size * font.advance())) as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.len();
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Document metadata written to the trailer's Info dictionary.
pub struct Info<'a> {
    pub title: &'a str,
    pub created: Option<NaiveDateTime>,
}

/// Accumulates drawing operations page by page.
pub struct Canvas {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn current(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    pub fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Starts a new page unless `height` still fits above the footer.
    pub fn ensure(&mut self, height: f32) {
        let on_fresh_page = self.y >= PAGE_HEIGHT - MARGIN;
        if self.y - height < MARGIN + FOOTER && !on_fresh_page {
            self.new_page();
        }
    }

    pub fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    /// Writes one line of text below the cursor and moves the cursor down.
    pub fn line(&mut self, indent: f32, font: Font, size: f32, text: &str) {
        self.y -= line_height(size);
        let baseline = self.y + (line_height(size) - size);
        let x = MARGIN + indent;
        self.current().extend(text_ops(font, size, x, baseline, text));
    }

    /// A filled bar at the left margin, from the cursor down by `height`.
    pub fn bar(&mut self, colour: Rgb, width: f32, height: f32) {
        let y = self.y - height;
        self.current().extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![colour.0.into(), colour.1.into(), colour.2.into()]),
            Operation::new("re", vec![MARGIN.into(), y.into(), width.into(), height.into()]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    /// Adds a centered footer to every page and serializes the document.
    pub fn finish<F>(mut self, footer: F, info: Info<'_>, compress: bool) -> Result<Vec<u8>, RenderError>
    where
        F: Fn(usize, usize) -> String,
    {
        let total = self.pages.len();
        for (idx, page) in self.pages.iter_mut().enumerate() {
            let text = footer(idx + 1, total);
            let size = 8.0;
            let width = text.chars().count() as f32 * size * Font::Regular.advance();
            let x = (PAGE_WIDTH - width) / 2.0;
            page.extend(text_ops(Font::Regular, size, x, MARGIN / 2.0, &text));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = lopdf::Dictionary::new();
        for font in Font::ALL {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource(), font_id);
        }
        let resources_id = doc.add_object(dictionary! { "Font" => fonts });

        let mut kids: Vec<Object> = Vec::with_capacity(total);
        for operations in self.pages {
            let content = Content { operations }
                .encode()
                .map_err(|err| RenderError::Backend(err.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => total as i64,
                "Resources" => resources_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut info_dict = dictionary! {
            "Title" => Object::String(encode(info.title), StringFormat::Literal),
            "Producer" => Object::string_literal(concat!("schaukasten ", env!("CARGO_PKG_VERSION"))),
        };
        if let Some(created) = info.created {
            info_dict.set(
                "CreationDate",
                Object::string_literal(created.format("D:%Y%m%d%H%M%S").to_string()),
            );
        }
        let info_id = doc.add_object(info_dict);
        doc.trailer.set("Info", info_id);

        if compress {
            doc.compress();
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|err| RenderError::Backend(err.to_string()))?;
        Ok(bytes)
    }
}

fn text_ops(font: Font, size: f32, x: f32, y: f32, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.resource().into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::String(encode(text), StringFormat::Literal)]),
        Operation::new("ET", vec![]),
    ]
}
