//! Source file in, one verified PDF per locale out.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc, Weekday};
use log::{debug, info, warn};
use schaukasten_parser::{parse_calendar, EntryError, Mode, Parsed};
use thiserror::Error;
use tokio::{fs, task};

use crate::locale::{ConfigError, LocaleNotFound, Registry};
use crate::render::{render, RenderError, RenderOptions, RenderedDocument};

const FILE_STEM: &str = "event_overview";

/// An ISO 8601 week, e.g. `2024-W09`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Week {
    year: i32,
    week: u32,
}

impl Week {
    pub fn new(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self { year, week })
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon).unwrap_or_default()
    }

    pub fn last_day(&self) -> NaiveDate {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Sun).unwrap_or_default()
    }

    /// File name suffix such as `_2024-09`.
    pub fn suffix(&self) -> String {
        format!("_{}-{:02}", self.year, self.week)
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for Week {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid week `{s}`, expected YYYY-Www");
        let (year, week) = s.trim().split_once('-').ok_or_else(invalid)?;
        let week = week.trim_start_matches(['W', 'w']);
        let year = year.parse().map_err(|_| invalid())?;
        let week = week.parse().map_err(|_| invalid())?;
        Week::new(year, week).ok_or_else(invalid)
    }
}

/// Parses 1-based positions like `1:3,5` into inclusive ranges.
pub fn parse_positions(s: &str) -> Result<Vec<RangeInclusive<usize>>, String> {
    let mut ranges = Vec::new();
    for part in s.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let invalid = || format!("invalid position `{part}`");
        let (first, last) = part.split_once(':').unwrap_or((part, part));
        let first: usize = first.trim().parse().map_err(|_| invalid())?;
        let last: usize = last.trim().parse().map_err(|_| invalid())?;
        if first == 0 || last < first {
            return Err(invalid());
        }
        ranges.push(first..=last);
    }
    Ok(ranges)
}

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    pub source_path: PathBuf,
    pub locales: Vec<String>,
    pub strict_parsing: bool,
    pub output_dir: PathBuf,
    pub suffix: Option<String>,
    pub week: Option<Week>,
    pub exclude: Vec<RangeInclusive<usize>>,
    pub locale_file: Option<PathBuf>,
    pub home_location: Option<String>,
    pub keep_existing: bool,
    pub timestamp: bool,
    pub ics: bool,
}

impl Config {
    pub fn new<P: Into<PathBuf>>(source_path: P) -> Self {
        Self {
            source_path: source_path.into(),
            locales: vec!["de".into(), "en".into()],
            strict_parsing: true,
            output_dir: PathBuf::from("."),
            suffix: None,
            week: None,
            exclude: Vec::new(),
            locale_file: None,
            home_location: None,
            keep_existing: false,
            timestamp: false,
            ics: false,
        }
    }

    /// Explicit suffix, else the selected week, else nothing.
    pub fn file_suffix(&self) -> String {
        match (&self.suffix, &self.week) {
            (Some(suffix), _) => suffix.clone(),
            (None, Some(week)) => week.suffix(),
            (None, None) => String::new(),
        }
    }
}

pub fn output_file_name(suffix: &str, locale: &str) -> String {
    format!("{FILE_STEM}{suffix}_{locale}.pdf")
}

/// Errors that stop the whole run before any output is written.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read calendar source {}: {source}", path.display())]
    Source { path: PathBuf, source: io::Error },
    #[error("calendar source {} is invalid: {source}", path.display())]
    Parse { path: PathBuf, source: EntryError },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("no locales requested")]
    NoLocales,
}

#[derive(Error, Debug)]
pub enum OutputWriteError {
    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("{} is not a readable PDF: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Why one locale has no output. Never affects the other locales.
#[derive(Error, Debug)]
pub enum LocaleError {
    #[error(transparent)]
    NotFound(#[from] LocaleNotFound),
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error(transparent)]
    Write(#[from] OutputWriteError),
    #[error("render task failed: {0}")]
    Task(String),
}

#[derive(Debug)]
pub struct LocaleOutcome {
    pub locale: String,
    pub result: Result<PathBuf, LocaleError>,
}

#[derive(Debug)]
pub struct Report {
    pub snapshot_id: String,
    pub events: usize,
    /// Entries skipped in lenient mode.
    pub parse_errors: Vec<EntryError>,
    pub outcomes: Vec<LocaleOutcome>,
    pub ics: Option<Result<PathBuf, OutputWriteError>>,
}

impl Report {
    /// True only if every requested locale (and the ICS export, if asked
    /// for) produced a verified file.
    pub fn success(&self) -> bool {
        !self.outcomes.is_empty()
            && self.outcomes.iter().all(|outcome| outcome.result.is_ok())
            && self.ics.as_ref().map_or(true, Result::is_ok)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .map(PathBuf::as_path)
    }
}

/// Reads, parses and filters the calendar source.
pub async fn load(config: &Config) -> Result<Parsed, PipelineError> {
    let path = &config.source_path;
    info!("reading calendar from {}", path.display());
    let source = fs::read_to_string(path)
        .await
        .map_err(|source| PipelineError::Source {
            path: path.clone(),
            source,
        })?;

    let mode = if config.strict_parsing {
        Mode::Strict
    } else {
        Mode::Lenient
    };

    let Parsed {
        mut snapshot,
        errors,
    } = parse_calendar(&source, mode).map_err(|source| PipelineError::Parse {
        path: path.clone(),
        source,
    })?;

    for err in &errors {
        warn!("skipping {err}");
    }
    debug!(
        "parsed {} events from {} ({} skipped)",
        snapshot.len(),
        path.display(),
        errors.len()
    );

    if let Some(week) = config.week {
        snapshot = snapshot.within(week.first_day(), week.last_day());
        debug!("{} events in week {week}", snapshot.len());
    }

    if !config.exclude.is_empty() {
        snapshot = snapshot.without(&config.exclude);
    }

    Ok(Parsed { snapshot, errors })
}

fn numbered(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}({n}).{}", ext.to_string_lossy()),
        None => format!("{stem}({n})"),
    };
    path.with_file_name(name)
}

async fn target_path(dir: &Path, name: &str, keep_existing: bool) -> Result<PathBuf, OutputWriteError> {
    let path = dir.join(name);
    if !keep_existing {
        return Ok(path);
    }

    let mut candidate = path.clone();
    let mut n = 1;
    loop {
        match fs::try_exists(&candidate).await {
            Ok(false) => return Ok(candidate),
            Ok(true) => {
                candidate = numbered(&path, n);
                n += 1;
            }
            Err(source) => {
                return Err(OutputWriteError::Io {
                    path: candidate,
                    source,
                })
            }
        }
    }
}

/// Reads a written document back; it has to be non-empty and load as a PDF.
async fn verify_output(path: &Path) -> Result<(), OutputWriteError> {
    let written = fs::read(path).await.map_err(|source| OutputWriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let unreadable = |reason: String| OutputWriteError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };
    if written.is_empty() {
        return Err(unreadable("file is empty".into()));
    }
    lopdf::Document::load_mem(&written).map_err(|err| unreadable(err.to_string()))?;

    Ok(())
}

async fn write_document(
    dir: &Path,
    name: &str,
    keep_existing: bool,
    document: &RenderedDocument,
) -> Result<PathBuf, OutputWriteError> {
    let path = target_path(dir, name, keep_existing).await?;
    if let Err(source) = fs::write(&path, &document.bytes).await {
        return Err(OutputWriteError::Io { path, source });
    }
    verify_output(&path).await?;
    Ok(path)
}

async fn write_ics(dir: &Path, name: &str, keep_existing: bool, ics: String) -> Result<PathBuf, OutputWriteError> {
    let path = target_path(dir, name, keep_existing).await?;
    match fs::write(&path, ics).await {
        Ok(()) => Ok(path),
        Err(source) => Err(OutputWriteError::Io { path, source }),
    }
}

/// Renders every requested locale from an already parsed calendar.
///
/// Renders run concurrently on blocking tasks that share the snapshot
/// read-only; a failing locale is recorded in the report and the others
/// carry on.
pub async fn render_all(config: &Config, parsed: Parsed) -> Result<Report, PipelineError> {
    let mut seen = HashSet::new();
    let locales: Vec<String> = config
        .locales
        .iter()
        .filter(|locale| seen.insert(locale.as_str()))
        .cloned()
        .collect();
    if locales.is_empty() {
        return Err(PipelineError::NoLocales);
    }

    let mut registry = Registry::builtin();
    if let Some(path) = &config.locale_file {
        let count = registry.load_file(path)?;
        debug!("loaded {count} locale(s) from {}", path.display());
    }

    fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|source| PipelineError::OutputDir {
            path: config.output_dir.clone(),
            source,
        })?;

    let snapshot = Arc::new(parsed.snapshot);
    let registry = Arc::new(registry);
    let options = Arc::new(RenderOptions {
        range: config.week.map(|week| (week.first_day(), week.last_day())),
        home_location: config.home_location.clone(),
        created: config.timestamp.then(|| Utc::now().naive_utc()),
        compress: true,
    });

    let handles: Vec<_> = locales
        .into_iter()
        .map(|locale| {
            let snapshot = Arc::clone(&snapshot);
            let registry = Arc::clone(&registry);
            let options = Arc::clone(&options);
            let code = locale.clone();
            let handle = task::spawn_blocking(move || -> Result<RenderedDocument, LocaleError> {
                let bundle = registry.get(&code)?;
                Ok(render(&snapshot, bundle, &options)?)
            });
            (locale, handle)
        })
        .collect();

    info!("rendering {} events for {}", snapshot.len(), config.locales.join(", "));
    let suffix = config.file_suffix();
    let mut outcomes = Vec::with_capacity(handles.len());

    for (locale, handle) in handles {
        let result = match handle.await {
            Ok(Ok(document)) => {
                let name = output_file_name(&suffix, &locale);
                write_document(&config.output_dir, &name, config.keep_existing, &document)
                    .await
                    .map_err(LocaleError::from)
            }
            Ok(Err(err)) => Err(err),
            Err(err) => Err(LocaleError::Task(err.to_string())),
        };

        match &result {
            Ok(path) => info!("wrote {}", path.display()),
            Err(err) => warn!("locale `{locale}` failed: {err}"),
        }

        outcomes.push(LocaleOutcome { locale, result });
    }

    let ics = if config.ics {
        let name = format!("{FILE_STEM}{suffix}.ics");
        let text = snapshot.to_ics(FILE_STEM).to_string();
        let result = write_ics(&config.output_dir, &name, config.keep_existing, text).await;
        match &result {
            Ok(path) => info!("wrote {}", path.display()),
            Err(err) => warn!("ICS export failed: {err}"),
        }
        Some(result)
    } else {
        None
    };

    Ok(Report {
        snapshot_id: snapshot.identity(),
        events: snapshot.len(),
        parse_errors: parsed.errors,
        outcomes,
        ics,
    })
}

/// Parses once, then renders and writes every requested locale.
pub async fn run(config: &Config) -> Result<Report, PipelineError> {
    let parsed = load(config).await?;
    render_all(config, parsed).await
}
