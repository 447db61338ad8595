use std::fs;
use std::path::Path;

use lopdf::Document;
use schaukasten::pipeline::{load, render_all};
use schaukasten::{run, Config, ConfigError, LocaleError, OutputWriteError, PipelineError};
use schaukasten_parser::EntryError;
use tempfile::TempDir;

const CALENDAR: &str = "\
# Programm März

2024-03-01, 18:00-20:00, \"Plenum\", \"Gerlachstraße 20\", Plenum
2024-03-01, 10:00, \"Frühstück\", \"Gerlachstraße 20\"

date: 2024-03-05
time: 19:00
title: Filmabend
location: Kino im Keller
description: Wir schauen gemeinsam einen Film.
  ----
  We watch a movie together.
";

const MISSING_TITLE: &str = "\
date: 2024-03-04
time: 19:00
location: Raum A

date: 2024-03-05
time: 19:00
title: Spieleabend
";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(source: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("calendar.txt"), source).unwrap();
        fs::create_dir(dir.path().join("out")).unwrap();
        Self { dir }
    }

    fn config(&self, locales: &[&str]) -> Config {
        let mut config = Config::new(self.dir.path().join("calendar.txt"));
        config.locales = locales.iter().map(|locale| locale.to_string()).collect();
        config.output_dir = self.out();
        config
    }

    fn out(&self) -> std::path::PathBuf {
        self.dir.path().join("out")
    }

    fn outputs(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.out())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn assert_readable_pdf(path: &Path) {
    let bytes = fs::read(path).unwrap();
    assert!(!bytes.is_empty(), "{} is empty", path.display());
    assert!(Document::load_mem(&bytes).is_ok());
}

#[tokio::test]
async fn renders_one_document_per_locale() {
    let fixture = Fixture::new(CALENDAR);
    let report = run(&fixture.config(&["de", "en"])).await.unwrap();

    assert!(report.success());
    assert_eq!(report.events, 3);
    assert!(report.parse_errors.is_empty());
    assert_eq!(
        fixture.outputs(),
        ["event_overview_de.pdf", "event_overview_en.pdf"]
    );
    for path in report.outputs() {
        assert_readable_pdf(path);
    }
}

#[tokio::test]
async fn unknown_locale_does_not_stop_the_others() {
    let fixture = Fixture::new(CALENDAR);
    let report = run(&fixture.config(&["de", "fr", "en"])).await.unwrap();

    assert!(!report.success());
    let locales: Vec<_> = report.outcomes.iter().map(|o| o.locale.as_str()).collect();
    assert_eq!(locales, ["de", "fr", "en"]);

    let fr = &report.outcomes[1];
    assert!(matches!(&fr.result, Err(LocaleError::NotFound(err)) if err.locale == "fr"));
    assert!(report.outcomes[0].result.is_ok());
    assert!(report.outcomes[2].result.is_ok());
    assert_eq!(
        fixture.outputs(),
        ["event_overview_de.pdf", "event_overview_en.pdf"]
    );
}

#[tokio::test]
async fn duplicate_locales_render_once() {
    let fixture = Fixture::new(CALENDAR);
    let report = run(&fixture.config(&["en", "en"])).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(fixture.outputs(), ["event_overview_en.pdf"]);
}

#[tokio::test]
async fn strict_mode_aborts_before_writing() {
    let fixture = Fixture::new(MISSING_TITLE);
    let err = run(&fixture.config(&["de", "en"])).await.unwrap_err();

    match err {
        PipelineError::Parse {
            source: EntryError::Parse(err),
            ..
        } => assert_eq!(err.locator.entry, 1),
        other => panic!("unexpected error: {other}"),
    }
    assert!(fixture.outputs().is_empty());
}

#[tokio::test]
async fn lenient_mode_skips_and_reports() {
    let fixture = Fixture::new(MISSING_TITLE);
    let mut config = fixture.config(&["de"]);
    config.strict_parsing = false;

    let report = run(&config).await.unwrap();
    assert!(report.success());
    assert_eq!(report.events, 1);
    assert_eq!(report.parse_errors.len(), 1);
    assert_eq!(fixture.outputs(), ["event_overview_de.pdf"]);
}

#[tokio::test]
async fn missing_source_is_reported() {
    let fixture = Fixture::new(CALENDAR);
    let mut config = fixture.config(&["de"]);
    config.source_path = fixture.dir.path().join("missing.txt");

    assert!(matches!(
        run(&config).await,
        Err(PipelineError::Source { .. })
    ));
}

#[tokio::test]
async fn keep_existing_numbers_new_outputs() {
    let fixture = Fixture::new(CALENDAR);
    let mut config = fixture.config(&["en"]);
    config.keep_existing = true;

    run(&config).await.unwrap();
    run(&config).await.unwrap();
    run(&config).await.unwrap();

    assert_eq!(
        fixture.outputs(),
        [
            "event_overview_en(1).pdf",
            "event_overview_en(2).pdf",
            "event_overview_en.pdf"
        ]
    );
}

#[tokio::test]
async fn overwrites_by_default() {
    let fixture = Fixture::new(CALENDAR);
    let config = fixture.config(&["en"]);
    fs::write(fixture.out().join("event_overview_en.pdf"), b"stale").unwrap();

    run(&config).await.unwrap();

    assert_eq!(fixture.outputs(), ["event_overview_en.pdf"]);
    assert_readable_pdf(&fixture.out().join("event_overview_en.pdf"));
}

#[tokio::test]
async fn week_selection_filters_and_names_outputs() {
    let fixture = Fixture::new(CALENDAR);
    let mut config = fixture.config(&["de"]);
    config.week = Some("2024-W09".parse().unwrap());

    let report = run(&config).await.unwrap();
    assert_eq!(report.events, 2);
    assert_eq!(fixture.outputs(), ["event_overview_2024-09_de.pdf"]);
}

#[tokio::test]
async fn excluded_positions_are_dropped() {
    let fixture = Fixture::new(CALENDAR);
    let mut config = fixture.config(&["de"]);
    config.exclude = vec![1..=1, 3..=3];

    let parsed = load(&config).await.unwrap();
    let titles: Vec<_> = parsed.snapshot.iter().map(|event| event.title()).collect();
    assert_eq!(titles, ["Plenum"]);
}

#[tokio::test]
async fn empty_selection_still_renders() {
    let fixture = Fixture::new(CALENDAR);
    let mut config = fixture.config(&["en"]);
    config.week = Some("2024-W20".parse().unwrap());

    let report = run(&config).await.unwrap();
    assert!(report.success());
    assert_eq!(report.events, 0);
    assert_readable_pdf(&fixture.out().join("event_overview_2024-20_en.pdf"));
}

#[tokio::test]
async fn locale_file_adds_bundles() {
    let fixture = Fixture::new(CALENDAR);
    let builtin: serde_json::Value =
        serde_json::from_str(include_str!("../locales/builtin.json")).unwrap();
    let locales = serde_json::json!({ "en-GB": builtin["en"] });
    let path = fixture.dir.path().join("locales.json");
    fs::write(&path, locales.to_string()).unwrap();

    let mut config = fixture.config(&["en-GB"]);
    config.locale_file = Some(path);

    let report = run(&config).await.unwrap();
    assert!(report.success());
    assert_eq!(fixture.outputs(), ["event_overview_en-GB.pdf"]);
}

#[tokio::test]
async fn broken_locale_file_is_a_config_error() {
    let fixture = Fixture::new(CALENDAR);
    let mut builtin: serde_json::Value =
        serde_json::from_str(include_str!("../locales/builtin.json")).unwrap();
    builtin["en"]
        .as_object_mut()
        .unwrap()
        .remove("no_events_label");
    let path = fixture.dir.path().join("locales.json");
    fs::write(&path, builtin.to_string()).unwrap();

    let mut config = fixture.config(&["en"]);
    config.locale_file = Some(path);

    let parsed = load(&config).await.unwrap();
    assert!(matches!(
        render_all(&config, parsed).await,
        Err(PipelineError::Config(ConfigError::MissingKey {
            key: "no_events_label",
            ..
        }))
    ));
    assert!(fixture.outputs().is_empty());
}

#[tokio::test]
async fn writes_ics_export() {
    let fixture = Fixture::new(CALENDAR);
    let mut config = fixture.config(&["de"]);
    config.ics = true;

    let report = run(&config).await.unwrap();
    assert!(report.success());

    let ics = fs::read_to_string(fixture.out().join("event_overview.ics")).unwrap();
    assert!(ics.starts_with("BEGIN:VCALENDAR"));
    assert_eq!(ics.matches("BEGIN:VEVENT").count(), 3);
}

#[tokio::test]
async fn identical_inputs_produce_identical_files() {
    let first = Fixture::new(CALENDAR);
    let second = Fixture::new(CALENDAR);

    let a = run(&first.config(&["de"])).await.unwrap();
    let b = run(&second.config(&["de"])).await.unwrap();
    assert_eq!(a.snapshot_id, b.snapshot_id);

    let a = fs::read(first.out().join("event_overview_de.pdf")).unwrap();
    let b = fs::read(second.out().join("event_overview_de.pdf")).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn open_ended_exclusion_is_cheap() {
    let fixture = Fixture::new(CALENDAR);
    let mut config = fixture.config(&["de"]);
    config.exclude = schaukasten::pipeline::parse_positions(&format!("2:{}", usize::MAX)).unwrap();

    let parsed = load(&config).await.unwrap();
    let titles: Vec<_> = parsed.snapshot.iter().map(|event| event.title()).collect();
    assert_eq!(titles, ["Frühstück"]);
}

#[tokio::test]
async fn failed_write_stays_with_its_locale() {
    let fixture = Fixture::new(CALENDAR);
    fs::create_dir(fixture.out().join("event_overview_de.pdf")).unwrap();

    let report = run(&fixture.config(&["de", "en"])).await.unwrap();

    assert!(!report.success());
    assert!(matches!(
        &report.outcomes[0].result,
        Err(LocaleError::Write(OutputWriteError::Io { .. }))
    ));
    assert!(report.outcomes[1].result.is_ok());
    assert_readable_pdf(&fixture.out().join("event_overview_en.pdf"));
}

#[tokio::test]
async fn unusable_output_dir_is_reported_as_such() {
    let fixture = Fixture::new(CALENDAR);
    let blocker = fixture.dir.path().join("blocker");
    fs::write(&blocker, b"").unwrap();

    let mut config = fixture.config(&["de"]);
    config.output_dir = blocker.join("out");

    let err = run(&config).await.unwrap_err();
    match &err {
        PipelineError::OutputDir { path, .. } => assert_eq!(path, &blocker.join("out")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("output directory"));
}
