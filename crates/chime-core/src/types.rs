use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChimeError, Result};

/// Stable identifier for a reminder (UUIDv7, survives edits and reorders).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(pub String);

impl ReminderId {
    pub fn new() -> Self {
        // UUIDv7 is time-sortable, so ids list in creation order in logs
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ReminderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ReminderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReminderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Monday-first weekday order; position in this array is the stored day index.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Set of weekdays on which a reminder may fire.
///
/// Bit `n` is set when weekday index `n` (0 = Monday … 6 = Sunday) is active.
/// Serialised as a sorted list of indices, e.g. `[0, 2, 4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DayMask(u8);

impl DayMask {
    pub const EMPTY: DayMask = DayMask(0);
    pub const EVERY_DAY: DayMask = DayMask(0b111_1111);
    pub const WEEKDAYS: DayMask = DayMask(0b001_1111);
    pub const WEEKENDS: DayMask = DayMask(0b110_0000);

    /// Build a mask from day indices. Duplicates are ignored.
    pub fn from_indices(indices: &[u8]) -> Result<Self> {
        let mut mask = DayMask::EMPTY;
        for &idx in indices {
            let day = WEEK.get(idx as usize).copied().ok_or_else(|| {
                ChimeError::InvalidDefinition(format!("day index {idx} is outside 0..=6"))
            })?;
            mask.insert(day);
        }
        Ok(mask)
    }

    pub fn from_weekdays(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut mask = DayMask::EMPTY;
        for day in days {
            mask.insert(day);
        }
        mask
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= bit(day);
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Active weekdays in Monday-first order.
    pub fn weekdays(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |d| self.contains(*d))
    }

    pub fn indices(self) -> Vec<u8> {
        self.weekdays()
            .map(|d| d.num_days_from_monday() as u8)
            .collect()
    }
}

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

impl FromStr for DayMask {
    type Err = ChimeError;

    /// Accepts `daily`, `weekdays`, `weekends`, or a comma list mixing day
    /// names (`mon`, `Tuesday`) and indices (`0`..`6`).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "everyday" | "all" => return Ok(DayMask::EVERY_DAY),
            "weekdays" => return Ok(DayMask::WEEKDAYS),
            "weekends" => return Ok(DayMask::WEEKENDS),
            _ => {}
        }

        let mut mask = DayMask::EMPTY;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Ok(idx) = part.parse::<u8>() {
                mask.0 |= DayMask::from_indices(&[idx])?.0;
            } else {
                let day = parse_weekday(part).ok_or_else(|| {
                    ChimeError::InvalidDefinition(format!("unknown weekday: {part}"))
                })?;
                mask.insert(day);
            }
        }
        Ok(mask)
    }
}

impl fmt::Display for DayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DayMask::EVERY_DAY => return write!(f, "daily"),
            DayMask::WEEKDAYS => return write!(f, "weekdays"),
            DayMask::WEEKENDS => return write!(f, "weekends"),
            _ => {}
        }
        let names: Vec<String> = self.weekdays().map(|d| d.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl TryFrom<Vec<u8>> for DayMask {
    type Error = ChimeError;

    fn try_from(indices: Vec<u8>) -> Result<Self> {
        DayMask::from_indices(&indices)
    }
}

impl From<DayMask> for Vec<u8> {
    fn from(mask: DayMask) -> Self {
        mask.indices()
    }
}

/// AM/PM marker for 12-hour clock input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

impl FromStr for Meridiem {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "am" | "a.m." => Ok(Meridiem::Am),
            "pm" | "p.m." => Ok(Meridiem::Pm),
            other => Err(ChimeError::InvalidDefinition(format!(
                "expected AM or PM, got {other:?}"
            ))),
        }
    }
}

/// Local wall-clock time of day at minute precision (seconds are always 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(ChimeError::InvalidDefinition(format!(
                "time {hour:02}:{minute:02} is out of range"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Convert a 12-hour reading: 12 AM is 00, 12 PM is 12, n PM is n + 12.
    pub fn from_12h(hour: u8, minute: u8, meridiem: Meridiem) -> Result<Self> {
        if !(1..=12).contains(&hour) {
            return Err(ChimeError::InvalidDefinition(format!(
                "12-hour clock hour must be 1..=12, got {hour}"
            )));
        }
        let hour = match (meridiem, hour) {
            (Meridiem::Am, 12) => 0,
            (Meridiem::Am, h) => h,
            (Meridiem::Pm, 12) => 12,
            (Meridiem::Pm, h) => h + 12,
        };
        Self::new(hour, minute)
    }

    /// Truncate a wall-clock time to the minute.
    pub fn from_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or_default()
    }
}

impl FromStr for TimeOfDay {
    type Err = ChimeError;

    /// Accepts `HH:MM` (24-hour) or `h:MM AM` / `h:MMpm` (12-hour).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || ChimeError::InvalidDefinition(format!("invalid time of day: {s:?}"));

        let lower = s.to_ascii_lowercase();
        let (clock, meridiem) = if let Some(rest) = lower.strip_suffix("am") {
            (rest.trim().to_string(), Some(Meridiem::Am))
        } else if let Some(rest) = lower.strip_suffix("pm") {
            (rest.trim().to_string(), Some(Meridiem::Pm))
        } else {
            (lower, None)
        };

        let (h, m) = clock.split_once(':').ok_or_else(invalid)?;
        let hour: u8 = h.trim().parse().map_err(|_| invalid())?;
        let minute: u8 = m.trim().parse().map_err(|_| invalid())?;

        match meridiem {
            Some(mer) => Self::from_12h(hour, minute, mer),
            None => Self::new(hour, minute),
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ChimeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

/// How urgently the alarm should be surfaced by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Priority {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ChimeError::InvalidDefinition(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

pub const SYSTEM_DEFAULT_SOUND: &str = "SYSTEM_DEFAULT";
pub const VIBRATE_ONLY_SOUND: &str = "VIBRATE_ONLY";

/// Opaque sound selection; resolution to real audio is the dispatcher's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SoundRef {
    #[default]
    SystemDefault,
    VibrateOnly,
    /// URI or file path of a user-chosen ringtone.
    Custom(String),
}

impl From<String> for SoundRef {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | SYSTEM_DEFAULT_SOUND => SoundRef::SystemDefault,
            VIBRATE_ONLY_SOUND => SoundRef::VibrateOnly,
            _ => SoundRef::Custom(s),
        }
    }
}

impl From<&str> for SoundRef {
    fn from(s: &str) -> Self {
        SoundRef::from(s.to_string())
    }
}

impl From<SoundRef> for String {
    fn from(sound: SoundRef) -> Self {
        match sound {
            SoundRef::SystemDefault => SYSTEM_DEFAULT_SOUND.to_string(),
            SoundRef::VibrateOnly => VIBRATE_ONLY_SOUND.to_string(),
            SoundRef::Custom(uri) => uri,
        }
    }
}

impl fmt::Display for SoundRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundRef::SystemDefault => write!(f, "{SYSTEM_DEFAULT_SOUND}"),
            SoundRef::VibrateOnly => write!(f, "{VIBRATE_ONLY_SOUND}"),
            SoundRef::Custom(uri) => write!(f, "{uri}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_mask_indices_are_monday_first() {
        let mask = DayMask::from_indices(&[0, 2, 6]).unwrap();
        assert!(mask.contains(Weekday::Mon));
        assert!(mask.contains(Weekday::Wed));
        assert!(mask.contains(Weekday::Sun));
        assert!(!mask.contains(Weekday::Tue));
        assert_eq!(mask.indices(), vec![0, 2, 6]);
        assert_eq!(mask.len(), 3);
    }

    #[test]
    fn day_mask_rejects_out_of_range_index() {
        assert!(DayMask::from_indices(&[7]).is_err());
    }

    #[test]
    fn day_mask_parses_names_and_aliases() {
        let mask: DayMask = "mon, Wednesday,5".parse().unwrap();
        assert_eq!(mask.indices(), vec![0, 2, 5]);
        assert_eq!("daily".parse::<DayMask>().unwrap(), DayMask::EVERY_DAY);
        assert_eq!("weekends".parse::<DayMask>().unwrap(), DayMask::WEEKENDS);
        assert!("funday".parse::<DayMask>().is_err());
    }

    #[test]
    fn day_mask_json_is_index_list() {
        let json = serde_json::to_string(&DayMask::WEEKENDS).unwrap();
        assert_eq!(json, "[5,6]");
        let back: DayMask = serde_json::from_str("[1,3]").unwrap();
        assert_eq!(back.to_string(), "Tue,Thu");
        assert!(serde_json::from_str::<DayMask>("[9]").is_err());
    }

    #[test]
    fn time_of_day_parses_24h() {
        let t: TimeOfDay = "07:05".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (7, 5));
        assert_eq!(t.to_string(), "07:05");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn time_of_day_converts_12h_edges() {
        let midnight = TimeOfDay::from_12h(12, 0, Meridiem::Am).unwrap();
        assert_eq!(midnight.hour(), 0);
        let noon = TimeOfDay::from_12h(12, 30, Meridiem::Pm).unwrap();
        assert_eq!(noon.hour(), 12);
        let evening: TimeOfDay = "7:45 PM".parse().unwrap();
        assert_eq!(evening.to_string(), "19:45");
        let morning: TimeOfDay = "9:15am".parse().unwrap();
        assert_eq!(morning.to_string(), "09:15");
        assert!(TimeOfDay::from_12h(0, 0, Meridiem::Am).is_err());
        assert!("13:00 pm".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn sound_ref_string_mapping() {
        assert_eq!(SoundRef::from(""), SoundRef::SystemDefault);
        assert_eq!(SoundRef::from("SYSTEM_DEFAULT"), SoundRef::SystemDefault);
        assert_eq!(SoundRef::from("VIBRATE_ONLY"), SoundRef::VibrateOnly);
        assert_eq!(
            SoundRef::from("content://media/42"),
            SoundRef::Custom("content://media/42".into())
        );
        assert_eq!(String::from(SoundRef::VibrateOnly), "VIBRATE_ONLY");
    }

    #[test]
    fn priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(Priority::default(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
