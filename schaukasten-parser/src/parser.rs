use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;

use crate::error::{EntryError, Locator};
use crate::structs::{Draft, Event, Invalid, Snapshot};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];
const TIME_FORMATS: [&str; 2] = ["%H:%M", "%H.%M"];
const ALL_DAY: [&str; 3] = ["all day", "all-day", "ganztägig"];

/// How entries that fail to parse are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Stop at the first broken entry.
    #[default]
    Strict,
    /// Skip broken entries and collect their errors.
    Lenient,
}

/// Outcome of a successful parse. `errors` is only ever non-empty in
/// [`Mode::Lenient`].
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub snapshot: Snapshot,
    pub errors: Vec<EntryError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Date,
    Time,
    Start,
    End,
    Title,
    Location,
    Description,
    Category,
}

static LABELS: Lazy<HashMap<&'static str, Field>> = Lazy::new(|| {
    HashMap::from([
        ("date", Field::Date),
        ("datum", Field::Date),
        ("time", Field::Time),
        ("zeit", Field::Time),
        ("start", Field::Start),
        ("beginn", Field::Start),
        ("end", Field::End),
        ("ende", Field::End),
        ("title", Field::Title),
        ("titel", Field::Title),
        ("location", Field::Location),
        ("ort", Field::Location),
        ("description", Field::Description),
        ("beschreibung", Field::Description),
        ("category", Field::Category),
        ("kategorie", Field::Category),
    ])
});

impl Field {
    fn lookup(label: &str) -> Option<Field> {
        LABELS.get(label.trim().to_lowercase().as_str()).copied()
    }

    fn overlaps(self, other: Field) -> bool {
        use Field::*;
        self == other || matches!((self, other), (Time, Start | End) | (Start | End, Time))
    }

    fn apply(self, draft: &mut Draft, value: &str) -> Result<(), String> {
        let value = value.trim();
        match self {
            Field::Date => draft.date = Some(parse_date(value)?),
            Field::Time => (draft.start, draft.end) = parse_time_range(value)?,
            Field::Start => draft.start = Some(parse_time(value)?),
            Field::End => draft.end = Some(parse_time(value)?),
            Field::Title => draft.title = Some(value.to_string()),
            Field::Location => draft.location = Some(value.to_string()),
            Field::Description => draft.description = Some(value.to_string()),
            Field::Category => draft.category = Some(value.to_string()),
        }
        Ok(())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .ok_or_else(|| format!("invalid date `{value}`, expected YYYY-MM-DD or DD.MM.YYYY"))
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value.trim(), format).ok())
        .ok_or_else(|| format!("invalid time `{}`, expected HH:MM", value.trim()))
}

fn parse_time_range(value: &str) -> Result<(Option<NaiveTime>, Option<NaiveTime>), String> {
    if value.is_empty() || ALL_DAY.contains(&value.to_lowercase().as_str()) {
        return Ok((None, None));
    }

    match value.split_once(&['-', '–'][..]) {
        Some((start, end)) => Ok((Some(parse_time(start)?), Some(parse_time(end)?))),
        None => Ok((Some(parse_time(value)?), None)),
    }
}

/// A `label:` line starts with a single word followed by a colon.
fn is_labeled(line: &str) -> bool {
    line.split_once(':').is_some_and(|(label, _)| {
        let label = label.trim_end();
        !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_alphabetic() || c == '_' || c == '-')
    })
}

#[derive(Debug, PartialEq, Eq)]
enum Block<'a> {
    Labeled(Vec<(usize, &'a str)>),
    Compact(usize, &'a str),
}

fn segment(source: &str) -> Vec<Block<'_>> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let number = idx + 1;

        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(Block::Labeled(std::mem::take(&mut current)));
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if line.starts_with(char::is_whitespace) || is_labeled(line) {
            current.push((number, line));
            continue;
        }

        if !current.is_empty() {
            blocks.push(Block::Labeled(std::mem::take(&mut current)));
        }
        blocks.push(Block::Compact(number, line));
    }

    if !current.is_empty() {
        blocks.push(Block::Labeled(current));
    }

    blocks
}

fn finish(draft: Draft, locator: Locator) -> Result<Event, EntryError> {
    draft.build().map_err(|invalid| match invalid {
        Invalid::MissingTitle | Invalid::MissingDate => {
            EntryError::parse(locator, invalid.to_string())
        }
        Invalid::EndBeforeStart { .. } | Invalid::EndWithoutStart(_) => {
            EntryError::validation(locator, invalid.to_string())
        }
    })
}

fn parse_labeled(entry: usize, lines: &[(usize, &str)]) -> Result<Event, EntryError> {
    let first = Locator {
        entry,
        line: lines.first().map_or(0, |(line, _)| *line),
    };

    let mut draft = Draft::default();
    let mut seen: Vec<Field> = Vec::new();

    for &(line, text) in lines {
        let locator = Locator { entry, line };

        if text.starts_with(char::is_whitespace) {
            if seen.last() != Some(&Field::Description) {
                return Err(EntryError::parse(
                    locator,
                    "continuation line outside of a description",
                ));
            }
            let description = draft.description.get_or_insert_with(String::new);
            if !description.is_empty() {
                description.push('\n');
            }
            description.push_str(text.trim());
            continue;
        }

        let Some((label, value)) = text.split_once(':') else {
            return Err(EntryError::parse(locator, format!("expected `label: value`, got `{text}`")));
        };

        let Some(field) = Field::lookup(label) else {
            return Err(EntryError::parse(locator, format!("unknown label `{}`", label.trim())));
        };

        if seen.iter().any(|other| other.overlaps(field)) {
            return Err(EntryError::parse(locator, format!("label `{}` given twice", label.trim())));
        }

        field
            .apply(&mut draft, value)
            .map_err(|message| EntryError::parse(locator, message))?;
        seen.push(field);
    }

    finish(draft, first)
}

/// Splits a compact line on commas outside of double quotes.
fn split_compact(text: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in text.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }

    if quoted {
        return Err("unterminated quote".into());
    }

    fields.push(current.trim().to_string());
    Ok(fields)
}

fn parse_compact(entry: usize, line: usize, text: &str) -> Result<Event, EntryError> {
    let locator = Locator { entry, line };
    let fail = |message: String| EntryError::parse(locator, message);

    let fields = split_compact(text).map_err(fail)?;
    if fields.len() < 3 || fields.len() > 5 {
        return Err(fail(format!(
            "expected `date, time, \"title\"[, \"location\"[, \"category\"]]`, got {} fields",
            fields.len()
        )));
    }

    let mut draft = Draft::default();
    let order = [
        Field::Date,
        Field::Time,
        Field::Title,
        Field::Location,
        Field::Category,
    ];
    for (field, value) in order.into_iter().zip(&fields) {
        field.apply(&mut draft, value).map_err(fail)?;
    }

    finish(draft, locator)
}

impl Block<'_> {
    fn parse(&self, entry: usize) -> Result<Event, EntryError> {
        match self {
            Block::Labeled(lines) => parse_labeled(entry, lines),
            Block::Compact(line, text) => parse_compact(entry, *line, text),
        }
    }
}

/// Parses calendar source text into a sorted [`Snapshot`].
///
/// Entries are either blocks of `label: value` lines separated by blank
/// lines, or single compact lines such as
/// `2024-03-01, 18:00, "Plenum", "Raum A"`. Lines starting with `#` are
/// comments. An unknown label makes its entry invalid.
pub fn parse_calendar<S: AsRef<str>>(source: S, mode: Mode) -> Result<Parsed, EntryError> {
    let mut events = Vec::new();
    let mut errors = Vec::new();

    for (idx, block) in segment(source.as_ref()).iter().enumerate() {
        match block.parse(idx + 1) {
            Ok(event) => events.push(event),
            Err(err) if mode == Mode::Strict => return Err(err),
            Err(err) => errors.push(err),
        }
    }

    Ok(Parsed {
        snapshot: Snapshot::new(events),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn strict(source: &str) -> Snapshot {
        parse_calendar(source, Mode::Strict).unwrap().snapshot
    }

    #[test]
    fn empty_input_is_an_empty_snapshot() {
        assert!(strict("").is_empty());
        assert!(strict("\n\n# nothing here\n").is_empty());
    }

    #[test]
    fn compact_entries_sort_by_start_time() {
        let snapshot = strict(
            "2024-03-01, 18:00, \"Plenum\", \"Raum A\"\n\
             2024-03-01, 10:00, \"Frühstück\", \"Raum B\"\n",
        );

        let titles: Vec<_> = snapshot.iter().map(Event::title).collect();
        assert_eq!(titles, ["Frühstück", "Plenum"]);
        assert_eq!(snapshot.events()[0].location(), Some("Raum B"));
        assert_eq!(snapshot.events()[1].start(), Some(time(18, 0)));
    }

    #[test]
    fn compact_quotes_may_contain_commas() {
        let snapshot = strict("01.03.2024, 18:00-20:00, \"Kino, Popcorn\", Raum A, film");
        let event = &snapshot.events()[0];
        assert_eq!(event.title(), "Kino, Popcorn");
        assert_eq!(event.end(), Some(time(20, 0)));
        assert_eq!(event.category(), Some("film"));
    }

    #[test]
    fn labeled_entry_with_all_fields() {
        let source = "\
# Veranstaltungen
Datum: 05.03.2024
Zeit: 19:00 – 22:00
Titel: Spieleabend
Ort: Gerlachstraße 20
Kategorie: games
Beschreibung: Brettspiele und Snacks.
  ----
  Board games and snacks.
";
        let snapshot = strict(source);
        let event = &snapshot.events()[0];
        assert_eq!(event.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(event.start(), Some(time(19, 0)));
        assert_eq!(event.end(), Some(time(22, 0)));
        assert_eq!(event.title(), "Spieleabend");
        assert_eq!(event.location(), Some("Gerlachstraße 20"));
        assert_eq!(event.category(), Some("games"));
        assert_eq!(
            event.description(),
            Some("Brettspiele und Snacks.\n----\nBoard games and snacks.")
        );
    }

    #[test]
    fn separate_start_and_end_labels() {
        let snapshot = strict("date: 2024-03-01\nstart: 9.30\nend: 11:00\ntitle: Café");
        let event = &snapshot.events()[0];
        assert_eq!(event.start(), Some(time(9, 30)));
        assert_eq!(event.end(), Some(time(11, 0)));
    }

    #[test]
    fn all_day_marker_leaves_times_empty() {
        let snapshot = strict("date: 2024-03-01\ntime: ganztägig\ntitle: Flohmarkt");
        assert!(snapshot.events()[0].is_all_day());
    }

    #[test]
    fn blank_lines_separate_entries() {
        let snapshot = strict("date: 2024-03-02\ntitle: B\n\n\ndate: 2024-03-01\ntitle: A\n");
        let titles: Vec<_> = snapshot.iter().map(Event::title).collect();
        assert_eq!(titles, ["A", "B"]);
    }

    #[test]
    fn missing_title_fails_in_strict_mode() {
        let err = parse_calendar("date: 2024-03-01\ntime: 18:00", Mode::Strict).unwrap_err();
        assert!(matches!(err, EntryError::Parse(_)));
        assert_eq!(err.locator(), Locator { entry: 1, line: 1 });
    }

    #[test]
    fn missing_title_is_collected_in_lenient_mode() {
        let source = "\
date: 2024-03-01
title: Plenum

date: 2024-03-02
time: 18:00
";
        let parsed = parse_calendar(source, Mode::Lenient).unwrap();
        assert_eq!(parsed.snapshot.len(), 1);
        assert_eq!(parsed.snapshot.events()[0].title(), "Plenum");
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].locator(), Locator { entry: 2, line: 4 });
    }

    #[test]
    fn end_before_start_is_a_validation_error() {
        let err = parse_calendar("2024-03-01, 20:00-18:00, Plenum", Mode::Strict).unwrap_err();
        assert!(matches!(err, EntryError::Validation(_)));
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = parse_calendar("date: 2024-03-01\ntitle: A\nraum: 3", Mode::Strict).unwrap_err();
        assert_eq!(err.locator(), Locator { entry: 1, line: 3 });
        assert!(err.to_string().contains("unknown label `raum`"));
    }

    #[test]
    fn repeated_or_overlapping_labels_are_rejected() {
        assert!(parse_calendar("date: 2024-03-01\ntitle: A\ntitle: B", Mode::Strict).is_err());
        assert!(
            parse_calendar("date: 2024-03-01\ntitle: A\ntime: 10:00\nstart: 11:00", Mode::Strict)
                .is_err()
        );
    }

    #[test]
    fn continuation_outside_description_is_rejected() {
        let err = parse_calendar("date: 2024-03-01\ntitle: A\n  more", Mode::Strict).unwrap_err();
        assert_eq!(err.locator().line, 3);
    }

    #[test]
    fn bad_dates_and_times_are_reported_per_entry() {
        let source = "\
2024-02-30, 18:00, A
2024-03-01, 25:00, B
2024-03-01, 10:00, C
";
        let parsed = parse_calendar(source, Mode::Lenient).unwrap();
        assert_eq!(parsed.snapshot.len(), 1);
        let lines: Vec<_> = parsed.errors.iter().map(|err| err.locator().line).collect();
        assert_eq!(lines, [1, 2]);
    }

    #[test]
    fn compact_line_with_wrong_arity_is_rejected() {
        assert!(parse_calendar("2024-03-01, 18:00", Mode::Strict).is_err());
        assert!(parse_calendar("a, b, c, d, e, f", Mode::Strict).is_err());
        assert!(parse_calendar("2024-03-01, 18:00, \"open", Mode::Strict).is_err());
    }

    #[test]
    fn compact_line_ends_a_labeled_block() {
        let source = "date: 2024-03-01\ntitle: A\n2024-03-01, 10:00, B";
        assert_eq!(strict(source).len(), 2);
    }

    #[test]
    fn label_detection() {
        assert!(is_labeled("title: x"));
        assert!(is_labeled("Beschreibung:"));
        assert!(!is_labeled("2024-03-01, 18:00, x"));
        assert!(!is_labeled("no colon here"));
    }

    fn text() -> impl Strategy<Value = String> {
        "[A-Za-zÄÖÜäöüß][A-Za-z0-9äöüß .,:!?()&/-]{0,30}[A-Za-z0-9]"
    }

    prop_compose! {
        fn arb_event()(
            day in 0i64..730,
            times in proptest::option::of((0u32..24, 0u32..60, proptest::option::of(0u32..120))),
            title in text(),
            location in proptest::option::of(text()),
            category in proptest::option::of(text()),
            description in proptest::option::of(proptest::collection::vec(text(), 1..4)),
        ) -> Event {
            let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(day);
            let (start, end) = match times {
                Some((h, m, extra)) => {
                    let start = time(h, m);
                    let end = extra.map(|minutes| {
                        let end = start + chrono::Duration::minutes(i64::from(minutes));
                        if end < start { start } else { end }
                    });
                    (Some(start), end)
                }
                None => (None, None),
            };
            Draft {
                date: Some(date),
                start,
                end,
                title: Some(title),
                location,
                description: description.map(|lines| lines.join("\n")),
                category,
            }
            .build()
            .unwrap()
        }
    }

    proptest! {
        #[test]
        fn serialized_snapshot_parses_back(events in proptest::collection::vec(arb_event(), 0..12)) {
            let snapshot = Snapshot::new(events);
            let reparsed = strict(&snapshot.to_source());
            prop_assert_eq!(reparsed, snapshot);
        }

        #[test]
        fn parsing_is_idempotent(events in proptest::collection::vec(arb_event(), 0..12)) {
            let source = Snapshot::new(events).to_source();
            let first = parse_calendar(&source, Mode::Lenient).unwrap();
            let second = parse_calendar(&source, Mode::Lenient).unwrap();
            prop_assert_eq!(first.snapshot, second.snapshot);
            prop_assert_eq!(first.errors, second.errors);
        }

        #[test]
        fn snapshots_are_sorted(events in proptest::collection::vec(arb_event(), 0..24)) {
            let snapshot = strict(&Snapshot::new(events).to_source());
            for pair in snapshot.events().windows(2) {
                prop_assert!((pair[0].date(), pair[0].start()) <= (pair[1].date(), pair[1].start()));
            }
        }

        #[test]
        fn arbitrary_input_never_panics(source in "\\PC{0,200}") {
            let _ = parse_calendar(&source, Mode::Lenient);
        }
    }
}
