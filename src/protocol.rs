use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::Ms;

/// One request line, parsed. Keywords are case-insensitive; arguments are
/// separated by whitespace. A booking label is the rest of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tenant {
        name: String,
    },
    Slots {
        resource_id: Ulid,
        date: NaiveDate,
    },
    Available {
        resource_id: Ulid,
        date: NaiveDate,
    },
    Check {
        resource_id: Ulid,
        start: Ms,
        end: Ms,
    },
    Book {
        resource_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        label: Option<String>,
    },
    Cancel {
        booking_id: Ulid,
    },
    Bookings {
        resource_id: Ulid,
    },
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnknownCommand(String),
    WrongArity(&'static str, usize, usize),
    Parse(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::UnknownCommand(c) => write!(f, "unknown command: {c}"),
            ParseError::WrongArity(cmd, expected, got) => {
                write!(f, "{cmd} expects {expected} arguments, got {got}")
            }
            ParseError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}

pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((k, r)) => (k, r.trim_start()),
        None => (line, ""),
    };
    if keyword.is_empty() {
        return Err(ParseError::Empty);
    }

    match keyword.to_ascii_uppercase().as_str() {
        "TENANT" => {
            let [name] = args::<1>("TENANT", rest)?;
            Ok(Command::Tenant {
                name: name.to_string(),
            })
        }
        "SLOTS" => {
            let [rid, date] = args::<2>("SLOTS", rest)?;
            Ok(Command::Slots {
                resource_id: parse_ulid(rid)?,
                date: parse_date(date)?,
            })
        }
        "AVAILABLE" => {
            let [rid, date] = args::<2>("AVAILABLE", rest)?;
            Ok(Command::Available {
                resource_id: parse_ulid(rid)?,
                date: parse_date(date)?,
            })
        }
        "CHECK" => {
            let [rid, start, end] = args::<3>("CHECK", rest)?;
            let (start, end) = (parse_i64(start)?, parse_i64(end)?);
            if start >= end {
                return Err(ParseError::Parse("start must be before end".into()));
            }
            Ok(Command::Check {
                resource_id: parse_ulid(rid)?,
                start,
                end,
            })
        }
        "BOOK" => {
            let (rid, rest) = next_token(rest);
            let (start, rest) = next_token(rest);
            let (duration, rest) = next_token(rest);
            let got = [rid, start, duration].iter().filter(|t| !t.is_empty()).count();
            if got < 3 {
                return Err(ParseError::WrongArity("BOOK", 3, got));
            }
            let label = Some(rest.trim()).filter(|l| !l.is_empty()).map(str::to_string);
            Ok(Command::Book {
                resource_id: parse_ulid(rid)?,
                start: parse_i64(start)?,
                duration_minutes: parse_u32(duration)?,
                label,
            })
        }
        "CANCEL" => {
            let [id] = args::<1>("CANCEL", rest)?;
            Ok(Command::Cancel {
                booking_id: parse_ulid(id)?,
            })
        }
        "BOOKINGS" => {
            let [rid] = args::<1>("BOOKINGS", rest)?;
            Ok(Command::Bookings {
                resource_id: parse_ulid(rid)?,
            })
        }
        "QUIT" => Ok(Command::Quit),
        _ => Err(ParseError::UnknownCommand(keyword.to_string())),
    }
}

/// First whitespace-delimited token and the remainder after it.
fn next_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    s.split_once(char::is_whitespace).unwrap_or((s, ""))
}

/// Exactly `N` whitespace-separated arguments.
fn args<'a, const N: usize>(cmd: &'static str, rest: &'a str) -> Result<[&'a str; N], ParseError> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let got = parts.len();
    parts
        .try_into()
        .map_err(|_| ParseError::WrongArity(cmd, N, got))
}

fn parse_ulid(s: &str) -> Result<Ulid, ParseError> {
    Ulid::from_string(s).map_err(|e| ParseError::Parse(format!("invalid id {s}: {e}")))
}

fn parse_i64(s: &str) -> Result<i64, ParseError> {
    s.parse()
        .map_err(|_| ParseError::Parse(format!("expected integer, got {s}")))
}

fn parse_u32(s: &str) -> Result<u32, ParseError> {
    s.parse()
        .map_err(|_| ParseError::Parse(format!("expected non-negative integer, got {s}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ParseError::Parse(format!("expected YYYY-MM-DD, got {s}")))
}

/// Local midnight of `date` for a zone `utc_offset_minutes` ahead of UTC.
pub fn day_start(date: NaiveDate, utc_offset_minutes: i32) -> Option<Ms> {
    let midnight_utc = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
    Some(midnight_utc - utc_offset_minutes as Ms * crate::model::MINUTE_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_slots() {
        let rid = Ulid::new();
        let cmd = parse_line(&format!("slots {rid} 2030-01-07")).unwrap();
        assert_eq!(
            cmd,
            Command::Slots {
                resource_id: rid,
                date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            }
        );
    }

    #[test]
    fn parse_book_with_multiword_label() {
        let rid = Ulid::new();
        let cmd = parse_line(&format!("BOOK {rid} 1893999600000 45 annual physical  exam")).unwrap();
        assert_eq!(
            cmd,
            Command::Book {
                resource_id: rid,
                start: 1_893_999_600_000,
                duration_minutes: 45,
                label: Some("annual physical  exam".into()),
            }
        );
    }

    #[test]
    fn parse_book_without_label() {
        let rid = Ulid::new();
        match parse_line(&format!("BOOK {rid} 1000 30")).unwrap() {
            Command::Book { label, .. } => assert_eq!(label, None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_book_missing_duration() {
        let rid = Ulid::new();
        assert_eq!(
            parse_line(&format!("BOOK {rid} 1000")),
            Err(ParseError::WrongArity("BOOK", 3, 2))
        );
    }

    #[test]
    fn parse_check_rejects_inverted_range() {
        let rid = Ulid::new();
        assert!(matches!(
            parse_line(&format!("CHECK {rid} 2000 1000")),
            Err(ParseError::Parse(_))
        ));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse_line("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_line("RESCHEDULE x"),
            Err(ParseError::UnknownCommand("RESCHEDULE".into()))
        );
        assert_eq!(
            parse_line("CANCEL"),
            Err(ParseError::WrongArity("CANCEL", 1, 0))
        );
        assert!(matches!(parse_line("CANCEL not-a-ulid"), Err(ParseError::Parse(_))));
        assert!(matches!(
            parse_line(&format!("SLOTS {} 07/01/2030", Ulid::new())),
            Err(ParseError::Parse(_))
        ));
        assert!(matches!(
            parse_line(&format!("BOOK {} 1000 -5", Ulid::new())),
            Err(ParseError::Parse(_))
        ));
    }

    #[test]
    fn parse_tenant_and_quit() {
        assert_eq!(
            parse_line("tenant clinic_north"),
            Ok(Command::Tenant {
                name: "clinic_north".into()
            })
        );
        assert_eq!(parse_line("QUIT"), Ok(Command::Quit));
    }

    #[test]
    fn day_start_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        assert_eq!(day_start(date, 0), Some(1_893_974_400_000));
        // UTC+1: local midnight is 23:00 UTC the day before.
        assert_eq!(day_start(date, 60), Some(1_893_974_400_000 - 3_600_000));
    }
}
