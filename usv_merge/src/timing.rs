use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{MergeError, MergedRecord};

/// Text format of regenerated timestamps, e.g. `2024-01-01 00:00:02.000`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Second,
    Millisecond,
}

impl Default for IntervalUnit {
    fn default() -> Self {
        IntervalUnit::Second
    }
}

impl IntervalUnit {
    fn millis(self) -> u64 {
        match self {
            IntervalUnit::Second => 1000,
            IntervalUnit::Millisecond => 1,
        }
    }
}

/// Step between consecutive regenerated timestamps.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interval {
    millis: u64,
}

impl Default for Interval {
    fn default() -> Self {
        Self { millis: 1000 }
    }
}

impl Interval {
    pub fn new(count: u64, unit: IntervalUnit) -> Self {
        Self {
            millis: count.saturating_mul(unit.millis()),
        }
    }

    /// Coerce user text to a non-negative whole count of `unit`.
    ///
    /// Fractions are truncated and negative values clamp to zero.
    pub fn parse(text: &str, unit: IntervalUnit) -> Result<Self, MergeError> {
        let trimmed = text.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| MergeError::InvalidParameter(format!("interval '{trimmed}' is not a number")))?;
        if !value.is_finite() {
            return Err(MergeError::InvalidParameter(format!(
                "interval '{trimmed}' is not finite"
            )));
        }
        let count = value.trunc().max(0.0) as u64;
        Ok(Self::new(count, unit))
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeConfig {
    pub start: Option<NaiveDateTime>,
    pub interval: Interval,
}

impl TimeConfig {
    /// Build from the raw form inputs. An empty date or time leaves the start unset.
    pub fn from_inputs(
        date: &str,
        time: &str,
        interval: &str,
        unit: IntervalUnit,
    ) -> Result<Self, MergeError> {
        let interval = Interval::parse(interval, unit)?;
        let (date, time) = (date.trim(), time.trim());
        if date.is_empty() || time.is_empty() {
            return Ok(Self {
                start: None,
                interval,
            });
        }
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| MergeError::InvalidParameter(format!("date '{date}': {e}")))?;
        let clock = NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
            .map_err(|e| MergeError::InvalidParameter(format!("time '{time}': {e}")))?;
        Ok(Self {
            start: Some(day.and_time(clock)),
            interval,
        })
    }

    /// Timestamp of the record at `index`, if a start is set.
    pub fn time_at(&self, index: usize) -> Result<Option<NaiveDateTime>, MergeError> {
        let Some(start) = self.start else {
            return Ok(None);
        };
        let offset = (index as u64)
            .checked_mul(self.interval.as_millis())
            .and_then(|ms| i64::try_from(ms).ok())
            .and_then(Duration::try_milliseconds)
            .and_then(|delta| start.checked_add_signed(delta))
            .ok_or_else(|| {
                MergeError::InvalidParameter(format!("timestamp for record {index} is out of range"))
            })?;
        Ok(Some(offset))
    }
}

/// Overwrite each record's time with `start + index * interval`.
///
/// Without a start the records keep the time they were loaded with.
pub fn assign_times(records: &mut [MergedRecord], config: &TimeConfig) -> Result<(), MergeError> {
    if config.start.is_none() {
        return Ok(());
    }
    for (index, record) in records.iter_mut().enumerate() {
        if let Some(at) = config.time_at(index)? {
            record.time = Some(at.format(TIME_FORMAT).to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrimaryRecord;

    fn records(n: usize) -> Vec<MergedRecord> {
        (0..n)
            .map(|i| {
                MergedRecord::from(
                    PrimaryRecord::new("1.0", format!("2.{i}")).with_time(format!("orig{i}")),
                )
            })
            .collect()
    }

    #[test]
    fn two_second_interval_from_midnight() {
        let config = TimeConfig::from_inputs("2024-01-01", "00:00:00", "2", IntervalUnit::Second)
            .unwrap();
        let mut recs = records(3);
        assign_times(&mut recs, &config).unwrap();
        let times: Vec<_> = recs.iter().map(|r| r.time.clone().unwrap()).collect();
        assert_eq!(
            times,
            vec![
                "2024-01-01 00:00:00.000",
                "2024-01-01 00:00:02.000",
                "2024-01-01 00:00:04.000",
            ]
        );
    }

    #[test]
    fn timestamps_follow_start_plus_index_times_interval() {
        let config =
            TimeConfig::from_inputs("2023-12-31", "23:59", "250", IntervalUnit::Millisecond)
                .unwrap();
        let start = config.start.unwrap();
        let mut recs = records(10);
        assign_times(&mut recs, &config).unwrap();
        for (i, record) in recs.iter().enumerate() {
            let parsed =
                NaiveDateTime::parse_from_str(record.time.as_deref().unwrap(), TIME_FORMAT).unwrap();
            assert_eq!(parsed - start, Duration::milliseconds(250 * i as i64));
            assert!(!record.time.as_deref().unwrap().contains(','));
        }
    }

    #[test]
    fn unset_start_passes_time_through() {
        for (date, time) in [("", "00:00:00"), ("2024-01-01", ""), ("", "")] {
            let config = TimeConfig::from_inputs(date, time, "1", IntervalUnit::Second).unwrap();
            assert!(config.start.is_none());
            let mut recs = records(3);
            assign_times(&mut recs, &config).unwrap();
            assert_eq!(recs, records(3));
        }
    }

    #[test]
    fn interval_coercion() {
        assert_eq!(Interval::parse("2.9", IntervalUnit::Second).unwrap().as_millis(), 2000);
        assert_eq!(Interval::parse(" 15 ", IntervalUnit::Millisecond).unwrap().as_millis(), 15);
        assert_eq!(Interval::parse("-4", IntervalUnit::Second).unwrap().as_millis(), 0);
        assert!(Interval::parse("abc", IntervalUnit::Second).is_err());
        assert!(Interval::parse("inf", IntervalUnit::Second).is_err());
    }

    #[test]
    fn zero_interval_repeats_start() {
        let config = TimeConfig::from_inputs("2024-01-01", "12:00:00", "0", IntervalUnit::Second)
            .unwrap();
        let mut recs = records(2);
        assign_times(&mut recs, &config).unwrap();
        assert_eq!(recs[0].time, recs[1].time);
    }

    #[test]
    fn bad_date_is_rejected() {
        let err = TimeConfig::from_inputs("01/02/2024", "00:00", "1", IntervalUnit::Second)
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidParameter(_)));
    }
}
