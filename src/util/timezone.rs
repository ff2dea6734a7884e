use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let seconds = utc.unix_timestamp();
    let nanos: u32 = utc.nanosecond();
    let datetime_utc = DateTime::<Utc>::from_timestamp(seconds, nanos).unwrap_or_else(|| {
        DateTime::<Utc>::from_timestamp(seconds, 0).expect("valid UTC timestamp")
    });
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

/// Next occurrence of `hour:00:00` local time in `tz`, strictly after
/// `now`. Falls on the same local day when `now` is still before the
/// reference hour, otherwise on the following day.
pub fn next_reference_hour(now: OffsetDateTime, tz: Tz, hour: u8) -> OffsetDateTime {
    let local_now = localized_datetime(now, tz);
    let mut date = local_now.date_naive();

    loop {
        let naive = date
            .and_hms_opt(u32::from(hour), 0, 0)
            .expect("reference hour is validated to be below 24");
        let candidate = resolve_local(tz, naive);
        if candidate > local_now {
            let utc = candidate.with_timezone(&Utc);
            return OffsetDateTime::from_unix_timestamp(utc.timestamp())
                .expect("valid UTC timestamp");
        }
        date = date.succ_opt().expect("calendar date in range");
    }
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(datetime) => datetime,
        // Clocks rolled back; the earlier reading keeps the pause shorter.
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Clocks jumped over the reference hour; read it as UTC-anchored.
        LocalResult::None => tz.from_utc_datetime(&naive),
    }
}
