use std::borrow::Cow;

use ics::{
    parameters::{TzIDParam, Value},
    properties::{Categories, Description, DtEnd, DtStart, Location, RRule, Summary, TzName},
    Daylight, Standard, TimeZone,
};

use crate::{Event, Snapshot};

const TZID: &str = "Europe/Berlin";

impl Snapshot {
    #[must_use]
    pub fn to_ics<'a, S: Into<Cow<'a, str>>>(&'a self, name: S) -> ics::ICalendar<'a> {
        let mut cet_standard = Standard::new("19701025T030000", "+0200", "+0100");
        cet_standard.push(TzName::new("CET"));
        cet_standard.push(RRule::new("FREQ=YEARLY;BYMONTH=10;BYDAY=-1SU"));

        let mut cest_daylight = Daylight::new("19700329T020000", "+0100", "+0200");
        cest_daylight.push(TzName::new("CEST"));
        cest_daylight.push(RRule::new("FREQ=YEARLY;BYMONTH=3;BYDAY=-1SU"));

        let mut timezone = TimeZone::daylight(TZID, cest_daylight);
        timezone.add_standard(cet_standard);

        let mut icalendar = ics::ICalendar::new("2.0", name);
        icalendar.add_timezone(timezone);

        for event in self {
            icalendar.add_event(event.to_ics());
        }

        icalendar
    }
}

impl Event {
    #[must_use]
    pub fn to_ics(&self) -> ics::Event<'_> {
        let day = self.date().format("%Y%m%d").to_string();

        let (dtstart, dtend) = match self.start() {
            Some(start) => {
                let mut dtstart = DtStart::new(format!("{day}T{}00", start.format("%H%M")));
                dtstart.add(TzIDParam::new(TZID));

                let dtend = self.end().map(|end| {
                    let mut dtend = DtEnd::new(format!("{day}T{}00", end.format("%H%M")));
                    dtend.add(TzIDParam::new(TZID));
                    dtend
                });
                (dtstart, dtend)
            }
            None => {
                let mut dtstart = DtStart::new(day.clone());
                dtstart.add(Value::new("DATE"));
                (dtstart, None)
            }
        };

        let stamp = match self.start() {
            Some(start) => format!("{day}T{}00", start.format("%H%M")),
            None => format!("{day}T000000"),
        };
        let id = format!("{}_{}", stamp, self.title().replace(' ', "-"));

        let mut ics_event = ics::Event::new(id, stamp);

        ics_event.push(dtstart);

        if let Some(dtend) = dtend {
            ics_event.push(dtend);
        }

        ics_event.push(Summary::new(self.title()));

        if let Some(location) = self.location() {
            ics_event.push(Location::new(location));
        }

        if let Some(description) = self.description() {
            ics_event.push(Description::new(ics::escape_text(description)));
        }

        if let Some(category) = self.category() {
            ics_event.push(Categories::new(category));
        }

        ics_event
    }
}
