//! Header-only bulk fetch feeding the inbox statistics.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::mailstore::{MailStore, MessageFormat, ProviderMessage};
use crate::models::MetadataRecord;
use crate::parser::extract_address;

/// Sub-requests per provider batch call.
pub const METADATA_BATCH_SIZE: usize = 100;

/// Optional calendar bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }
}

/// Provider search string for the inbox, bounded by `range`.
pub fn metadata_query(range: &DateRange) -> String {
    let mut parts = vec!["in:inbox".to_string()];
    if let Some(start) = range.start {
        parts.push(format!("after:{}", start.format("%Y/%m/%d")));
    }
    if let Some(end) = range.end {
        parts.push(format!("before:{}", end.format("%Y/%m/%d")));
    }
    parts.join(" ")
}

/// Fetch up to `max_emails` metadata records. Never fails: provider errors
/// are logged and produce an empty batch, same as "no matching mail".
pub async fn fetch_metadata(
    store: &dyn MailStore,
    range: &DateRange,
    max_emails: usize,
) -> Vec<MetadataRecord> {
    match try_fetch_metadata(store, range, max_emails).await {
        Ok(records) => records,
        Err(error) => {
            warn!("metadata fetch from {} failed: {error}", store.name());
            Vec::new()
        }
    }
}

async fn try_fetch_metadata(
    store: &dyn MailStore,
    range: &DateRange,
    max_emails: usize,
) -> Result<Vec<MetadataRecord>> {
    let query = metadata_query(range);
    info!("fetching metadata for up to {max_emails} emails with query '{query}'");

    let ids = store.list(&query, max_emails).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::with_capacity(ids.len());
    for (batch, chunk) in ids.chunks(METADATA_BATCH_SIZE).enumerate() {
        let start = batch * METADATA_BATCH_SIZE;
        info!("metadata batch for emails {} to {}", start + 1, start + chunk.len());

        let fetched = store.batch_get(chunk, MessageFormat::Metadata).await?;
        for error in &fetched.errors {
            warn!("metadata fetch skipped {error}");
        }
        records.extend(fetched.messages.iter().filter_map(metadata_record));
    }

    Ok(records)
}

/// Project a message onto a [`MetadataRecord`]. `None` when the `Date`
/// header is missing or unparseable.
pub fn metadata_record(message: &ProviderMessage) -> Option<MetadataRecord> {
    let sender = message.payload.header("From").unwrap_or_default().to_string();
    let Some(date) = message.payload.header("Date").and_then(parse_header_date) else {
        warn!("dropping metadata for {}: unusable Date header", message.id);
        return None;
    };

    let sender_email = extract_address(&sender);
    let sender_domain = sender_email
        .split_once('@')
        .map(|(_, domain)| domain.to_string())
        .unwrap_or_default();

    Some(MetadataRecord {
        sender,
        sender_email,
        sender_domain,
        hour: date.hour(),
        day_of_week: date.format("%A").to_string(),
        date,
    })
}

/// RFC 2822 with an optional trailing comment such as `(UTC)`, or RFC 3339.
pub fn parse_header_date(raw: &str) -> Option<DateTime<Utc>> {
    let mut value = raw.trim();
    if value.ends_with(')') {
        if let Some(open) = value.rfind('(') {
            value = value[..open].trim_end();
        }
    }

    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    use super::{fetch_metadata, metadata_query, metadata_record, parse_header_date, DateRange};
    use crate::mailstore::{InMemoryMailStore, ProviderMessage};

    fn message(id: usize, from: &str, date: &str) -> ProviderMessage {
        serde_json::from_value(json!({
            "id": format!("m{id}"),
            "labelIds": ["INBOX"],
            "payload": {
                "headers": [
                    { "name": "From", "value": from },
                    { "name": "Date", "value": date }
                ]
            }
        }))
        .expect("build message")
    }

    #[test]
    fn query_includes_optional_bounds() {
        assert_eq!(metadata_query(&DateRange::default()), "in:inbox");
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 5),
            NaiveDate::from_ymd_opt(2025, 2, 1),
        );
        assert_eq!(
            metadata_query(&range),
            "in:inbox after:2025/01/05 before:2025/02/01"
        );
        let open_start = DateRange::new(None, NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(metadata_query(&open_start), "in:inbox before:2024/12/31");
    }

    #[test]
    fn record_derives_sender_and_time_features() {
        let record = metadata_record(&message(
            1,
            "News Team <news@shop.example.com>",
            "Mon, 06 Jan 2025 17:45:00 +0200",
        ))
        .expect("record");

        assert_eq!(record.sender_email, "news@shop.example.com");
        assert_eq!(record.sender_domain, "shop.example.com");
        assert_eq!(record.hour, 15);
        assert_eq!(record.day_of_week, "Monday");
        assert_eq!(
            record.date,
            Utc.with_ymd_and_hms(2025, 1, 6, 15, 45, 0).unwrap()
        );
    }

    #[test]
    fn sender_without_at_has_empty_domain() {
        let record =
            metadata_record(&message(1, "Mailer Daemon", "Tue, 7 Jan 2025 08:00:00 GMT"))
                .expect("record");
        assert_eq!(record.sender_email, "Mailer Daemon");
        assert_eq!(record.sender_domain, "");
    }

    #[test]
    fn bad_dates_drop_the_record() {
        assert!(metadata_record(&message(1, "a@x.com", "yesterday-ish")).is_none());
        let no_date: ProviderMessage = serde_json::from_value(json!({
            "id": "m9",
            "payload": { "headers": [{ "name": "From", "value": "a@x.com" }] }
        }))
        .expect("build message");
        assert!(metadata_record(&no_date).is_none());
    }

    #[test]
    fn date_parsing_accepts_comments_and_rfc3339() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        assert_eq!(
            parse_header_date("Tue, 4 Mar 2025 10:00:00 +0000 (UTC)"),
            Some(expected)
        );
        assert_eq!(parse_header_date("2025-03-04T10:00:00Z"), Some(expected));
        assert_eq!(parse_header_date(""), None);
    }

    #[tokio::test]
    async fn zero_matches_yield_empty_collection() {
        let store = InMemoryMailStore::new(Vec::new());
        let records = fetch_metadata(&store, &DateRange::default(), 200).await;
        assert!(records.is_empty());
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn fetch_is_chunked_and_skips_failures() {
        let messages = (0..250)
            .map(|i| message(i, "a@x.com", "Wed, 08 Jan 2025 09:00:00 +0000"))
            .collect();
        let store = InMemoryMailStore::new(messages).failing_on("m3");

        let records = fetch_metadata(&store, &DateRange::default(), 250).await;
        assert_eq!(records.len(), 249);
        assert_eq!(store.batch_sizes(), vec![100, 100, 50]);
        assert_eq!(store.queries(), vec!["in:inbox"]);
    }

    #[tokio::test]
    async fn max_emails_bounds_the_listing() {
        let messages = (0..30)
            .map(|i| message(i, "a@x.com", "Wed, 08 Jan 2025 09:00:00 +0000"))
            .collect();
        let store = InMemoryMailStore::new(messages);
        let records = fetch_metadata(&store, &DateRange::default(), 10).await;
        assert_eq!(records.len(), 10);
    }
}
