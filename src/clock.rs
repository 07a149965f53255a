use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Jerusalem;
pub const ACTIVITY_WINDOW_DAYS: i64 = 7;

/// Source of "now" and of calendar-day boundaries.
///
/// Calendar days are always taken in the reference timezone, never in UTC.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    tz: Tz,
    fixed: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn system(tz: Tz) -> Self {
        Clock { tz, fixed: None }
    }

    pub fn fixed(now: DateTime<Utc>, tz: Tz) -> Self {
        Clock {
            tz,
            fixed: Some(now),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.fixed.unwrap_or_else(Utc::now)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    /// First instant of `date` in the reference timezone.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        // A DST jump at midnight skips it; the day then starts at the first
        // local quarter hour that exists.
        (0..96)
            .map(|step| midnight + Duration::minutes(15 * step))
            .find_map(|local| self.tz.from_local_datetime(&local).earliest())
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    /// Start of the activity window: local midnight six days before today,
    /// so the window spans today and the six previous calendar days.
    pub fn activity_window_start(&self) -> DateTime<Utc> {
        self.start_of_day(self.today() - Duration::days(ACTIVITY_WINDOW_DAYS - 1))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system(DEFAULT_TIMEZONE)
    }
}
