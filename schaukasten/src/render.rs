use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::debug;
use schaukasten_parser::{Event, Snapshot};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::locale::LocaleBundle;
use crate::pdf::{self, line_height, Canvas, Font, Info, Rgb};

const TITLE_SIZE: f32 = 18.0;
const SECTION_SIZE: f32 = 14.0;
const EVENT_TITLE_SIZE: f32 = 12.0;
const DETAIL_SIZE: f32 = 10.0;
const DESCRIPTION_SIZE: f32 = 9.0;
const TEXT_INDENT: f32 = 10.0;
const BAR_WIDTH: f32 = 4.0;
const BLOCK_GAP: f32 = 8.0;
const EXCERPT_CHARS: usize = 280;
const EXCERPT_LINES: usize = 4;

/// Colours of recurring events, keyed by category or title.
const PALETTE: [(&str, u32); 18] = [
    ("Filmabend", 0xE78080),
    ("Queer Feminist Action", 0x88E780),
    ("Queercafé", 0xE780DB),
    ("Trans-Beratung", 0x80E7E1),
    ("test²multiply", 0xF6A97C),
    ("International Evening", 0x80E7A7),
    ("Ace & Aro Abend", 0xE7E680),
    ("Fesseltreff", 0xAA80E7),
    ("Bi-Pan* and Friends", 0xE7C280),
    ("FLINTA-Abend", 0xDF80E7),
    ("Plenum", 0x8081E7),
    ("Spieleabend", 0xE7D080),
    ("TIN* Abend", 0x84D980),
    ("Poly Abend", 0xD2D984),
    ("Warm Up", 0xF05252),
    ("Anime Abend (Film)", 0xF2966F),
    ("Anime Abend Serie", 0xBDF370),
    ("Bibliothekstreffen", 0x99FFFC),
];

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF backend failed: {0}")]
    Backend(String),
    #[error("renderer produced an empty document")]
    Empty,
}

/// Knobs that are not part of the calendar data itself.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Date range the document covers; switches to the week heading.
    pub range: Option<(NaiveDate, NaiveDate)>,
    /// The organisation's own venue, left out of event blocks.
    pub home_location: Option<String>,
    /// Embedded as CreationDate. Leave unset for reproducible output.
    pub created: Option<NaiveDateTime>,
    pub compress: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            range: None,
            home_location: None,
            created: None,
            compress: true,
        }
    }
}

/// PDF bytes plus what they were made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub locale: String,
    pub snapshot_id: String,
    pub bytes: Vec<u8>,
}

fn from_hex(hex: u32) -> Rgb {
    let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
    Rgb(channel(16), channel(8), channel(0))
}

/// Fixed colour for known names, otherwise a pastel derived from the name.
pub fn colour_for(name: &str) -> Rgb {
    if let Some((_, hex)) = PALETTE.iter().find(|(known, _)| *known == name) {
        return from_hex(*hex);
    }

    let digest = Sha256::digest(name.as_bytes());
    let pastel = |byte: u8| 0.7 + 0.3 * (f32::from(byte) / 255.0);
    Rgb(pastel(digest[0]), pastel(digest[1]), pastel(digest[2]))
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    if let Some(space) = cut.rfind(' ') {
        cut.truncate(space);
    }
    cut.push('…');
    cut
}

struct Line {
    font: Font,
    size: f32,
    text: String,
}

fn event_lines(event: &Event, bundle: &LocaleBundle, options: &RenderOptions) -> Vec<Line> {
    let width = pdf::text_width(TEXT_INDENT);
    let mut lines = Vec::new();
    let mut push = |font: Font, size: f32, text: &str, limit: usize| {
        let mut wrapped = pdf::wrap(text, font, size, width);
        if wrapped.len() > limit {
            wrapped.truncate(limit);
            if let Some(last) = wrapped.last_mut() {
                last.push('…');
            }
        }
        lines.extend(wrapped.into_iter().map(|text| Line { font, size, text }));
    };

    push(Font::Bold, EVENT_TITLE_SIZE, event.title(), 2);

    let when = format!(
        "{} · {}",
        bundle.format_date(event.date()),
        bundle.format_time(event.start(), event.end())
    );
    push(Font::Regular, DETAIL_SIZE, &when, 2);

    let home = options.home_location.as_deref();
    if let Some(location) = event.location().filter(|location| Some(*location) != home) {
        let location = format!("{}: {location}", bundle.location_label());
        push(Font::Italic, DETAIL_SIZE, &location, 2);
    }

    if let Some(description) = event.description() {
        let description = excerpt(&bundle.localized_description(description));
        if !description.is_empty() {
            push(Font::Regular, DESCRIPTION_SIZE, &description, EXCERPT_LINES);
        }
    }

    lines
}

/// Renders a snapshot into a PDF for one locale.
///
/// Events are grouped into one section per month in snapshot order. The
/// output depends only on the arguments; with `options.created` unset two
/// calls produce identical bytes.
pub fn render(
    snapshot: &Snapshot,
    bundle: &LocaleBundle,
    options: &RenderOptions,
) -> Result<RenderedDocument, RenderError> {
    let heading = bundle.heading(options.range);
    let mut canvas = Canvas::new();

    canvas.line(0.0, Font::Bold, TITLE_SIZE, &heading);
    canvas.gap(line_height(DETAIL_SIZE));

    if snapshot.is_empty() {
        canvas.gap(2.0 * line_height(SECTION_SIZE));
        canvas.line(0.0, Font::Bold, SECTION_SIZE, bundle.no_events_label());
    }

    let mut section = None;
    for event in snapshot {
        let lines = event_lines(event, bundle, options);
        let block_height: f32 = lines.iter().map(|line| line_height(line.size)).sum();

        let month = (event.date().year(), event.date().month());
        if section != Some(month) {
            let heading_height = line_height(SECTION_SIZE) + BLOCK_GAP;
            canvas.ensure(heading_height + block_height);
            canvas.gap(BLOCK_GAP);
            canvas.line(0.0, Font::Bold, SECTION_SIZE, &bundle.format_section(month.0, month.1));
            section = Some(month);
        }

        canvas.ensure(block_height);
        let colour = colour_for(event.category().unwrap_or(event.title()));
        canvas.bar(colour, BAR_WIDTH, block_height);
        for line in &lines {
            canvas.line(TEXT_INDENT, line.font, line.size, &line.text);
        }
        canvas.gap(BLOCK_GAP);
    }

    let pages = canvas.page_count();
    let bytes = canvas.finish(
        |page, total| bundle.page_footer(page, total),
        Info {
            title: &heading,
            created: options.created,
        },
        options.compress,
    )?;

    if bytes.is_empty() {
        return Err(RenderError::Empty);
    }

    debug!(
        "rendered {} events for `{}` on {pages} page(s), {} bytes",
        snapshot.len(),
        bundle.code(),
        bytes.len()
    );

    Ok(RenderedDocument {
        locale: bundle.code().to_string(),
        snapshot_id: snapshot.identity(),
        bytes,
    })
}
