use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// Second precision, UTC. Sorts lexicographically in chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Restart,
    /// A frame ended with the restart limit reached and the longer wait was served.
    MaxRestartsReached,
    DoNotTouch,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Restart => "restart",
            EventType::MaxRestartsReached => "max-restarts-reached",
            EventType::DoNotTouch => "do-not-touch",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "restart" => Some(EventType::Restart),
            "max-restarts-reached" => Some(EventType::MaxRestartsReached),
            "do-not-touch" => Some(EventType::DoNotTouch),
            _ => None,
        }
    }
}

impl ToSql for EventType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EventType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        EventType::parse(raw).ok_or_else(|| {
            FromSqlError::Other(format!("Unknown journal event type \"{raw}\"").into())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEvent {
    pub id: i64,
    pub container_name: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub archived: bool,
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT).map(|date| date.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        for event_type in [
            EventType::Restart,
            EventType::MaxRestartsReached,
            EventType::DoNotTouch,
        ] {
            assert_eq!(EventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::parse("restart.max-reached"), None);
    }

    #[test]
    fn test_dates_sort_chronologically() {
        let earlier = DateTime::from_timestamp(999_999_999, 0).unwrap();
        let later = DateTime::from_timestamp(1_000_000_000, 0).unwrap();

        assert!(format_date(earlier) < format_date(later));
        assert_eq!(format_date(later), "2001-09-09 01:46:40");
        assert_eq!(parse_date("2001-09-09 01:46:40").unwrap(), later);
        assert!(parse_date("yesterday").is_err());
    }
}
