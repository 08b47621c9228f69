//! Wire encoding of dates and times.
//!
//! Dates travel as a day offset from the Modified Julian Day epoch
//! (1858-11-17); times of day in units of 1/10,000 second. Timestamps are a
//! date and a time side by side, normalized to UTC.
use time::{Date, Duration, PrimitiveDateTime, Time};

/// Ticks per second of the wire time unit.
const TICKS: i64 = 10_000;

const EPOCH: Date = {
    // Modified Julian Day 0
    match Date::from_julian_day(2_400_001) {
        Ok(ok) => ok,
        Err(_) => panic!("epoch is a valid julian day"),
    }
};

pub fn decode_date(days: i32) -> Date {
    EPOCH.saturating_add(Duration::days(days as i64))
}

pub fn encode_date(date: Date) -> i32 {
    date.to_julian_day() - EPOCH.to_julian_day()
}

pub fn decode_time(ticks: u32) -> Time {
    let secs = ticks as i64 / TICKS;
    let micros = (ticks as i64 % TICKS) * 100;
    Time::from_hms_micro(
        (secs / 3600) as u8,
        (secs / 60 % 60) as u8,
        (secs % 60) as u8,
        micros as u32,
    )
    .unwrap_or(Time::MIDNIGHT)
}

pub fn encode_time(time: Time) -> u32 {
    let (h, m, s, micro) = time.as_hms_micro();
    let secs = h as i64 * 3600 + m as i64 * 60 + s as i64;
    (secs * TICKS + micro as i64 / 100) as u32
}

pub fn decode_timestamp(days: i32, ticks: u32) -> PrimitiveDateTime {
    PrimitiveDateTime::new(decode_date(days), decode_time(ticks))
}

pub fn encode_timestamp(ts: PrimitiveDateTime) -> (i32, u32) {
    (encode_date(ts.date()), encode_time(ts.time()))
}

#[cfg(test)]
mod test {
    use super::*;
    use time::Month;

    #[test]
    fn epoch_is_mjd_zero() {
        assert_eq!(decode_date(0), Date::from_calendar_date(1858, Month::November, 17).unwrap());
    }

    #[test]
    fn date_round_trip() {
        for days in [0, 1, 40_000, 60_000, -365] {
            assert_eq!(encode_date(decode_date(days)), days);
        }
    }

    #[test]
    fn time_round_trip_to_the_tick() {
        // exact to the protocol unit of 1/10,000 second
        for ticks in [0, 1, 9_999, 10_000, 863_999_999] {
            assert_eq!(encode_time(decode_time(ticks)), ticks);
        }
    }

    #[test]
    fn timestamp_round_trip() {
        let (days, ticks) = (45_000, 123_456_789);
        let ts = decode_timestamp(days, ticks);
        assert_eq!(encode_timestamp(ts), (days, ticks));
    }
}
