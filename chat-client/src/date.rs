use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Форматирует дату сообщения для списка.
///
/// Сегодняшние даты показываются как `HH:MM`, остальные как `DD Mon YYYY`.
/// Нераспознанная строка возвращается как есть.
pub fn format_date<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let Some(parsed) = parse_date(raw) else {
        return raw.to_string();
    };
    let local = parsed.with_timezone(&now.timezone());

    if local.date_naive() == now.date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%d %b %Y").to_string()
    }
}

/// RFC 3339 или наивная дата без зоны (трактуется как UTC).
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
