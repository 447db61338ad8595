//! Display strings and date formatting per output language.
//!
//! Every formatting call takes its [`LocaleBundle`] explicitly; nothing here
//! consults the process locale, so the same inputs always produce the same
//! text.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;

static BUILTIN: Lazy<Vec<LocaleBundle>> = Lazy::new(|| {
    parse_bundles(include_str!("../locales/builtin.json")).expect("built-in locales are valid")
});

/// Keys every bundle has to define.
pub const REQUIRED_KEYS: [&str; 15] = [
    "month_names",
    "weekday_names",
    "date_pattern",
    "short_date_pattern",
    "time_range_pattern",
    "time_start_pattern",
    "all_day_label",
    "section_pattern",
    "heading_overview",
    "heading_week",
    "no_events_label",
    "location_label",
    "page_pattern",
    "description_section",
    "code",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no locale bundle registered for `{locale}`")]
pub struct LocaleNotFound {
    pub locale: String,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("locale `{locale}` is missing required key `{key}`")]
    MissingKey { locale: String, key: &'static str },
    #[error("locale `{locale}` has an empty value for `{key}`")]
    EmptyKey { locale: String, key: &'static str },
    #[error("locale `{locale}`: `{key}` needs {expected} entries, found {found}")]
    WrongLength {
        locale: String,
        key: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid locale definitions: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read locale file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBundle {
    month_names: Option<Vec<String>>,
    weekday_names: Option<Vec<String>>,
    date_pattern: Option<String>,
    short_date_pattern: Option<String>,
    time_range_pattern: Option<String>,
    time_start_pattern: Option<String>,
    all_day_label: Option<String>,
    section_pattern: Option<String>,
    heading_overview: Option<String>,
    heading_week: Option<String>,
    no_events_label: Option<String>,
    location_label: Option<String>,
    page_pattern: Option<String>,
    description_section: Option<usize>,
}

/// Display strings for one output language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleBundle {
    code: String,
    month_names: [String; 12],
    weekday_names: [String; 7],
    date_pattern: String,
    short_date_pattern: String,
    time_range_pattern: String,
    time_start_pattern: String,
    all_day_label: String,
    section_pattern: String,
    heading_overview: String,
    heading_week: String,
    no_events_label: String,
    location_label: String,
    page_pattern: String,
    description_section: usize,
}

fn required<T>(locale: &str, key: &'static str, value: Option<T>) -> Result<T, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingKey {
        locale: locale.to_string(),
        key,
    })
}

fn text(locale: &str, key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    let value = required(locale, key, value)?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyKey {
            locale: locale.to_string(),
            key,
        });
    }
    Ok(value)
}

fn names<const N: usize>(
    locale: &str,
    key: &'static str,
    value: Option<Vec<String>>,
) -> Result<[String; N], ConfigError> {
    let values = required(locale, key, value)?;
    if values.iter().any(|value| value.trim().is_empty()) {
        return Err(ConfigError::EmptyKey {
            locale: locale.to_string(),
            key,
        });
    }
    let found = values.len();
    values.try_into().map_err(|_| ConfigError::WrongLength {
        locale: locale.to_string(),
        key,
        expected: N,
        found,
    })
}

impl LocaleBundle {
    fn from_raw(code: &str, raw: RawBundle) -> Result<Self, ConfigError> {
        Ok(Self {
            code: text(code, "code", Some(code.to_string()))?,
            month_names: names(code, "month_names", raw.month_names)?,
            weekday_names: names(code, "weekday_names", raw.weekday_names)?,
            date_pattern: text(code, "date_pattern", raw.date_pattern)?,
            short_date_pattern: text(code, "short_date_pattern", raw.short_date_pattern)?,
            time_range_pattern: text(code, "time_range_pattern", raw.time_range_pattern)?,
            time_start_pattern: text(code, "time_start_pattern", raw.time_start_pattern)?,
            all_day_label: text(code, "all_day_label", raw.all_day_label)?,
            section_pattern: text(code, "section_pattern", raw.section_pattern)?,
            heading_overview: text(code, "heading_overview", raw.heading_overview)?,
            heading_week: text(code, "heading_week", raw.heading_week)?,
            no_events_label: text(code, "no_events_label", raw.no_events_label)?,
            location_label: text(code, "location_label", raw.location_label)?,
            page_pattern: text(code, "page_pattern", raw.page_pattern)?,
            description_section: required(code, "description_section", raw.description_section)?,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn no_events_label(&self) -> &str {
        &self.no_events_label
    }

    pub fn location_label(&self) -> &str {
        &self.location_label
    }

    /// The value behind a required key, rendered as text.
    pub fn value(&self, key: &str) -> Option<String> {
        let value = match key {
            "code" => self.code.clone(),
            "month_names" => self.month_names.join(", "),
            "weekday_names" => self.weekday_names.join(", "),
            "date_pattern" => self.date_pattern.clone(),
            "short_date_pattern" => self.short_date_pattern.clone(),
            "time_range_pattern" => self.time_range_pattern.clone(),
            "time_start_pattern" => self.time_start_pattern.clone(),
            "all_day_label" => self.all_day_label.clone(),
            "section_pattern" => self.section_pattern.clone(),
            "heading_overview" => self.heading_overview.clone(),
            "heading_week" => self.heading_week.clone(),
            "no_events_label" => self.no_events_label.clone(),
            "location_label" => self.location_label.clone(),
            "page_pattern" => self.page_pattern.clone(),
            "description_section" => self.description_section.to_string(),
            _ => return None,
        };
        Some(value)
    }

    fn month_name(&self, month: u32) -> &str {
        &self.month_names[month.saturating_sub(1) as usize % 12]
    }

    fn fill_date(&self, pattern: &str, date: NaiveDate) -> String {
        let weekday = &self.weekday_names[date.weekday().num_days_from_monday() as usize];
        fill(
            pattern,
            &[
                ("weekday", weekday.as_str()),
                ("day", date.day().to_string().as_str()),
                ("day2", format!("{:02}", date.day()).as_str()),
                ("month", self.month_name(date.month())),
                ("month2", format!("{:02}", date.month()).as_str()),
                ("year", date.year().to_string().as_str()),
            ],
        )
    }

    pub fn format_date(&self, date: NaiveDate) -> String {
        self.fill_date(&self.date_pattern, date)
    }

    pub fn format_short_date(&self, date: NaiveDate) -> String {
        self.fill_date(&self.short_date_pattern, date)
    }

    pub fn format_time(&self, start: Option<NaiveTime>, end: Option<NaiveTime>) -> String {
        let hhmm = |time: NaiveTime| time.format("%H:%M").to_string();
        match (start, end) {
            (Some(start), Some(end)) => fill(
                &self.time_range_pattern,
                &[("start", hhmm(start).as_str()), ("end", hhmm(end).as_str())],
            ),
            (Some(start), None) => {
                fill(&self.time_start_pattern, &[("start", hhmm(start).as_str())])
            }
            (None, _) => self.all_day_label.clone(),
        }
    }

    pub fn format_section(&self, year: i32, month: u32) -> String {
        fill(
            &self.section_pattern,
            &[
                ("month", self.month_name(month)),
                ("month2", format!("{month:02}").as_str()),
                ("year", year.to_string().as_str()),
            ],
        )
    }

    /// Document heading; names the date range when one is given.
    pub fn heading(&self, range: Option<(NaiveDate, NaiveDate)>) -> String {
        match range {
            Some((first, last)) => fill(
                &self.heading_week,
                &[
                    ("start", self.format_short_date(first).as_str()),
                    ("end", self.format_short_date(last).as_str()),
                ],
            ),
            None => self.heading_overview.clone(),
        }
    }

    pub fn page_footer(&self, page: usize, pages: usize) -> String {
        fill(
            &self.page_pattern,
            &[
                ("page", page.to_string().as_str()),
                ("pages", pages.to_string().as_str()),
            ],
        )
    }

    /// Picks this language's part of a multi-language description.
    ///
    /// Sections are separated by lines made of at least four `-` or `_`.
    /// Without separators the whole text is returned; an index past the
    /// last section picks the last one.
    pub fn localized_description(&self, description: &str) -> String {
        let mut sections = vec![Vec::new()];
        for line in description.lines() {
            if is_separator(line) {
                sections.push(Vec::new());
            } else if let Some(section) = sections.last_mut() {
                section.push(line);
            }
        }

        let idx = self.description_section.min(sections.len() - 1);
        sections[idx].join("\n").trim().to_string()
    }
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 4 && (line.chars().all(|c| c == '-') || line.chars().all(|c| c == '_'))
}

fn fill(pattern: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(pattern.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

fn parse_bundles(json: &str) -> Result<Vec<LocaleBundle>, ConfigError> {
    let raw: HashMap<String, RawBundle> = serde_json::from_str(json)?;
    let mut bundles = raw
        .into_iter()
        .map(|(code, raw)| LocaleBundle::from_raw(&code, raw))
        .collect::<Result<Vec<_>, _>>()?;
    bundles.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(bundles)
}

/// Locale bundles by exact code.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    bundles: HashMap<String, LocaleBundle>,
}

impl Registry {
    /// A registry holding the built-in `de` and `en` bundles.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for bundle in BUILTIN.iter() {
            registry.insert(bundle.clone());
        }
        registry
    }

    pub fn insert(&mut self, bundle: LocaleBundle) {
        self.bundles.insert(bundle.code.clone(), bundle);
    }

    /// Adds or replaces bundles from a JSON object keyed by locale code.
    /// Returns how many bundles were loaded.
    pub fn load_json(&mut self, json: &str) -> Result<usize, ConfigError> {
        let bundles = parse_bundles(json)?;
        let count = bundles.len();
        for bundle in bundles {
            self.insert(bundle);
        }
        Ok(count)
    }

    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_json(&json)
    }

    pub fn get(&self, code: &str) -> Result<&LocaleBundle, LocaleNotFound> {
        self.bundles.get(code).ok_or_else(|| LocaleNotFound {
            locale: code.to_string(),
        })
    }

    /// Registered codes in sorted order.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<_> = self.bundles.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}
