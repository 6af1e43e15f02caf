use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::models::{AnalyzedEmail, UnsubscribeCandidate};
use crate::stats::CountEntry;
use crate::workflow::{ActionStatus, DashboardReport};

const PRIORITY_WIDTH: usize = 3;
const CATEGORY_WIDTH: usize = 22;
const FROM_WIDTH: usize = 28;
const SUBJECT_WIDTH: usize = 48;
const URL_WIDTH: usize = 60;
const KEY_WIDTH: usize = 36;
const BAR_WIDTH: usize = 40;
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

pub fn format_analyzed_emails(emails: &[AnalyzedEmail]) -> String {
    if emails.is_empty() {
        return "No emails to show.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:>pri$}  {:<cat$}  {:<from$}  {:<subject$}\n",
        "Pri",
        "Category",
        "From",
        "Subject",
        pri = PRIORITY_WIDTH,
        cat = CATEGORY_WIDTH,
        from = FROM_WIDTH,
        subject = SUBJECT_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  {}  {}\n",
        "-".repeat(PRIORITY_WIDTH),
        "-".repeat(CATEGORY_WIDTH),
        "-".repeat(FROM_WIDTH),
        "-".repeat(SUBJECT_WIDTH)
    ));

    for item in emails {
        out.push_str(&format!(
            "{}  {}  {}  {}\n",
            colorize_priority(item.priority()),
            pad(&truncate_for_width(item.analysis.category.label(), CATEGORY_WIDTH), CATEGORY_WIDTH),
            pad(&truncate_for_width(&item.email.sender, FROM_WIDTH), FROM_WIDTH),
            truncate_for_width(&item.email.subject, SUBJECT_WIDTH)
        ));
        out.push_str(&format!(
            "{}  {}\n",
            " ".repeat(PRIORITY_WIDTH),
            item.analysis.summary
        ));
        out.push_str(&format!("{}  id: {}\n", " ".repeat(PRIORITY_WIDTH), item.email.id));
    }

    out
}

pub fn format_unsubscribe_candidates(candidates: &[UnsubscribeCandidate]) -> String {
    if candidates.is_empty() {
        return "No unsubscribe links found.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<from$}  {:<subject$}  {}\n",
        "From",
        "Subject",
        "Unsubscribe",
        from = FROM_WIDTH,
        subject = SUBJECT_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  {}\n",
        "-".repeat(FROM_WIDTH),
        "-".repeat(SUBJECT_WIDTH),
        "-".repeat(URL_WIDTH)
    ));
    for candidate in candidates {
        out.push_str(&format!(
            "{}  {}  {}\n",
            pad(&truncate_for_width(&candidate.sender, FROM_WIDTH), FROM_WIDTH),
            pad(&truncate_for_width(&candidate.subject, SUBJECT_WIDTH), SUBJECT_WIDTH),
            candidate.url
        ));
    }
    out
}

pub fn format_dashboard(dashboard: &DashboardReport) -> String {
    let stats = &dashboard.stats;
    let mut out = String::new();
    out.push_str(&dashboard.report);
    out.push('\n');
    if stats.is_empty() {
        return out;
    }

    push_ranking(&mut out, "Top senders", &stats.top_senders);
    push_ranking(&mut out, "Top domains", &stats.top_domains);

    out.push_str("\nEmails by hour (UTC)\n");
    out.push_str("--------------------\n");
    let hour_max = stats.by_hour.iter().copied().max().unwrap_or(0);
    for (hour, count) in stats.by_hour.iter().enumerate() {
        out.push_str(&format!("{hour:02}:00 {count:>6}  {}\n", bar(*count, hour_max)));
    }

    out.push_str("\nEmails by weekday\n");
    out.push_str("-----------------\n");
    let weekday_max = stats.by_weekday.iter().copied().max().unwrap_or(0);
    for (name, count) in WEEKDAYS.iter().zip(stats.by_weekday.iter()) {
        out.push_str(&format!("{name:<5} {count:>6}  {}\n", bar(*count, weekday_max)));
    }

    out.push_str("\nEmails per day\n");
    out.push_str("--------------\n");
    let day_max = stats.by_day.iter().map(|d| d.count).max().unwrap_or(0);
    for day in &stats.by_day {
        out.push_str(&format!(
            "{} {:>6}  {}\n",
            day.day.format("%Y-%m-%d"),
            day.count,
            bar(day.count, day_max)
        ));
    }

    out
}

pub fn format_action_status(status: &ActionStatus) -> String {
    status.message.clone()
}

fn push_ranking(out: &mut String, title: &str, entries: &[CountEntry]) {
    if entries.is_empty() {
        return;
    }
    out.push('\n');
    out.push_str(title);
    out.push('\n');
    out.push_str(&"-".repeat(title.len()));
    out.push('\n');
    for entry in entries {
        out.push_str(&format!(
            "{}  {:>6}\n",
            pad(&truncate_for_width(&entry.key, KEY_WIDTH), KEY_WIDTH),
            entry.count
        ));
    }
}

fn bar(count: usize, max: usize) -> String {
    if max == 0 || count == 0 {
        return String::new();
    }
    let len = (count * BAR_WIDTH).div_ceil(max);
    "#".repeat(len)
}

fn colorize_priority(priority: u8) -> String {
    let cell = format!("{priority:>width$}", width = PRIORITY_WIDTH);
    match priority {
        8..=u8::MAX => format!("\u{1b}[31m{cell}\u{1b}[0m"),
        0..=3 => format!("\u{1b}[32m{cell}\u{1b}[0m"),
        _ => format!("\u{1b}[33m{cell}\u{1b}[0m"),
    }
}

/// Left-align to a display width; `format!` pads by chars, not columns.
fn pad(value: &str, width: usize) -> String {
    let used = UnicodeWidthStr::width(value);
    format!("{value}{}", " ".repeat(width.saturating_sub(used)))
}

fn truncate_for_width(value: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(value) <= max_width {
        return value.to_string();
    }

    if max_width <= 1 {
        return "…".to_string();
    }

    let mut out = String::new();
    let mut width = 0usize;
    for c in value.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            break;
        }
        out.push(c);
        width += cw;
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike, Utc};

    use crate::models::{Analysis, AnalyzedEmail, Category, Email, MetadataRecord};
    use crate::stats::{build_stats, summary_report};
    use crate::workflow::DashboardReport;

    use super::{bar, format_analyzed_emails, format_dashboard, pad, truncate_for_width};

    fn sample_email() -> AnalyzedEmail {
        AnalyzedEmail {
            email: Email {
                id: "msg-1".to_string(),
                sender: "sender@example.com".to_string(),
                subject: "A very long subject line that should be truncated in table output because it exceeds width".to_string(),
                body: "Body".to_string(),
                headers: Vec::new(),
            },
            analysis: Analysis {
                category: Category::UrgentActionRequired,
                priority: 9,
                summary: "Pay the invoice today.".to_string(),
            },
        }
    }

    #[test]
    fn analyzed_table_has_headers_and_summary() {
        let rendered = format_analyzed_emails(&[sample_email()]);
        assert!(rendered.contains("Category"));
        assert!(rendered.contains("Subject"));
        assert!(rendered.contains("Urgent/Action Required"));
        assert!(rendered.contains("Pay the invoice today."));
        assert!(rendered.contains('…'));
        assert_eq!(format_analyzed_emails(&[]), "No emails to show.");
    }

    #[test]
    fn dashboard_lists_rankings_and_histograms() {
        let date = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let records = vec![MetadataRecord {
            sender: "A <a@shop.com>".to_string(),
            sender_email: "a@shop.com".to_string(),
            sender_domain: "shop.com".to_string(),
            hour: date.hour(),
            day_of_week: "Monday".to_string(),
            date,
        }];
        let stats = build_stats(&records);
        let report = summary_report(&stats);
        let rendered = format_dashboard(&DashboardReport { stats, report });

        assert!(rendered.starts_with("Analysis complete!"));
        assert!(rendered.contains("Top senders"));
        assert!(rendered.contains("shop.com"));
        assert!(rendered.contains("09:00"));
        assert!(rendered.contains("2025-01-06"));
    }

    #[test]
    fn width_helpers_handle_wide_chars() {
        assert_eq!(truncate_for_width("日本語テキスト", 7), "日本語…");
        assert_eq!(pad("日本", 6), "日本  ");
        assert_eq!(bar(0, 10), "");
        assert_eq!(bar(10, 10).len(), 40);
        assert_eq!(bar(1, 100), "#");
    }
}
