use std::env;
use std::path::PathBuf;
use std::process;

use getopts::{Matches, Options};

use schaukasten::pipeline::{parse_positions, Config, Week};
use schaukasten::Registry;

pub struct Args {
    pub config: Config,
    pub json: bool,
}

fn opts() -> Options {
    let mut opts = Options::new();
    opts.optflag(
        "h",
        "help",
        concat!("Print the help output of ", env!("CARGO_PKG_NAME")),
    );
    opts.optopt(
        "s",
        "source",
        "Calendar source file [Env: SCHAUKASTEN_SOURCE]",
        "FILE",
    );
    opts.optopt(
        "l",
        "locales",
        "Comma separated locales to render [Default: all built-in, Env: SCHAUKASTEN_LOCALES]",
        "LOCALES",
    );
    opts.optflag(
        "",
        "lenient",
        "Skip invalid entries instead of failing [Default: false]",
    );
    opts.optopt(
        "o",
        "output-dir",
        "Directory to write documents to [Default: ., Env: SCHAUKASTEN_OUTPUT_DIR]",
        "DIR",
    );
    opts.optopt("", "suffix", "Suffix appended to output file names", "SUFFIX");
    opts.optopt("w", "week", "Only include events of an ISO week", "YYYY-Www");
    opts.optopt(
        "x",
        "exclude",
        "Leave out events by 1-based position, ranges inclusive",
        "1:3,5",
    );
    opts.optopt("", "locale-file", "Additional locale bundles as JSON", "FILE");
    opts.optopt(
        "",
        "home-location",
        "Location that is not printed on events",
        "TEXT",
    );
    opts.optflag(
        "",
        "keep-existing",
        "Number new outputs instead of overwriting existing ones [Default: false]",
    );
    opts.optflag(
        "",
        "timestamp",
        "Embed the creation time in documents [Default: false]",
    );
    opts.optflag("", "ics", "Also write an iCalendar export [Default: false]");
    opts.optflag("", "json", "Print the parsed events as JSON [Default: false]");
    opts
}

fn opt_or_env(matches: &Matches, name: &str, var: &str) -> Option<String> {
    matches
        .opt_str(name)
        .or_else(|| env::var(var).ok())
        .filter(|value| !value.trim().is_empty())
}

pub fn parse(args: Vec<String>) -> Args {
    let opts = opts();

    let matches = match opts.parse(args) {
        Ok(matches) => matches,
        Err(fail) => {
            eprintln!("{fail}");
            process::exit(1);
        }
    };

    if matches.opt_present("help") {
        let brief = format!("{} [options] [SOURCE]", env!("CARGO_PKG_NAME"));
        println!("{}", opts.usage(&brief));
        process::exit(0);
    }

    let source = match matches
        .free
        .first()
        .cloned()
        .or_else(|| opt_or_env(&matches, "source", "SCHAUKASTEN_SOURCE"))
    {
        Some(source) => PathBuf::from(source),
        None => {
            eprintln!("No calendar source given");
            process::exit(1);
        }
    };

    let mut config = Config::new(source);

    config.locales = match opt_or_env(&matches, "locales", "SCHAUKASTEN_LOCALES") {
        Some(locales) => locales
            .split(',')
            .map(str::trim)
            .filter(|locale| !locale.is_empty())
            .map(String::from)
            .collect(),
        None => Registry::builtin()
            .codes()
            .into_iter()
            .map(String::from)
            .collect(),
    };

    config.strict_parsing = !matches.opt_present("lenient");

    if let Some(dir) = opt_or_env(&matches, "output-dir", "SCHAUKASTEN_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(dir);
    }

    config.suffix = matches.opt_str("suffix");

    config.week = match matches.opt_get::<Week>("week") {
        Ok(week) => week,
        Err(err) => {
            eprintln!("Provided value for option 'week' is invalid: {err}");
            process::exit(1);
        }
    };

    if let Some(exclude) = matches.opt_str("exclude") {
        config.exclude = match parse_positions(&exclude) {
            Ok(positions) => positions,
            Err(err) => {
                eprintln!("Provided value for option 'exclude' is invalid: {err}");
                process::exit(1);
            }
        };
    }

    config.locale_file = matches.opt_str("locale-file").map(PathBuf::from);
    config.home_location = matches.opt_str("home-location");
    config.keep_existing = matches.opt_present("keep-existing");
    config.timestamp = matches.opt_present("timestamp");
    config.ics = matches.opt_present("ics");

    Args {
        config,
        json: matches.opt_present("json"),
    }
}
