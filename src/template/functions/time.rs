use chrono::{DateTime, Utc};
use minijinja::{Environment, Error, ErrorKind};

/// Reference time layout shared by every time function, so every caller
/// sees an identical format: RFC3339 with fractional seconds, e.g.
/// `2026-07-26T14:03:00Z`.
pub const TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn register(env: &mut Environment<'static>) {
    env.add_function("now", || Utc::now().format(TIME_LAYOUT).to_string());
    env.add_function("formatTime", format_time);
    env.add_function("parseTime", parse_time);
    env.add_function("unixTime", unix_time);
}

fn format_time(iso: String, layout: String) -> Result<String, Error> {
    let dt = DateTime::parse_from_rfc3339(&iso)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("bad time {iso:?}: {e}")))?;
    Ok(dt.format(&layout).to_string())
}

fn parse_time(s: String, layout: String) -> Result<String, Error> {
    let naive = chrono::NaiveDateTime::parse_from_str(&s, &layout)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("bad time {s:?}: {e}")))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).to_rfc3339())
}

fn unix_time(iso: String) -> Result<i64, Error> {
    let dt = DateTime::parse_from_rfc3339(&iso)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("bad time {iso:?}: {e}")))?;
    Ok(dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_time_known_value() {
        assert_eq!(unix_time("1970-01-01T00:00:00Z".to_string()).unwrap(), 0);
    }
}
