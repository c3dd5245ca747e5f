//! Small helpers shared by handlers.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current UTC time as an RFC 3339 (ISO-8601) string.
pub fn rfc3339_now() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_now_parses_back() {
        let stamp = rfc3339_now();
        assert!(OffsetDateTime::parse(&stamp, &Rfc3339).is_ok());
        assert!(stamp.ends_with('Z'));
    }
}
