//! Formatted terminal output for ingestion runs and query views.
//!
//! We keep formatting code in one place so:
//! - the pipeline and store code stay free of presentation concerns
//! - output changes are localized (important for future snapshot tests)

use serde_json::json;

use crate::app::pipeline::IngestReport;
use crate::domain::PriceRecord;
use crate::query::QueryView;

/// Human-readable summary of one run.
pub fn format_ingest_report(report: &IngestReport) -> String {
    let mut out = String::new();

    out.push_str("=== mandi - Commodity data update ===\n");
    out.push_str(&format!("Source: {}\n", report.source));
    out.push_str(&format!(
        "Started: {} | took {}ms\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        (report.finished_at - report.started_at).num_milliseconds(),
    ));
    out.push_str(&format!("Fetched: {}\n", report.fetched));
    out.push_str(&format!(
        "successCount={} failureCount={}\n",
        report.success_count, report.failure_count
    ));

    out.push_str("\nOutcomes:\n");
    for (label, count) in [
        ("new states", report.created_states),
        ("new commodities", report.added_commodities),
        ("new markets", report.added_markets),
        ("inserted", report.inserted),
        ("duplicate dates", report.duplicates),
        ("evicted", report.evicted),
    ] {
        out.push_str(&format!("- {label:<16} {count:>8}\n"));
    }

    if !report.failures_by_kind.is_empty() {
        out.push_str("\nFailures:\n");
        for (kind, count) in &report.failures_by_kind {
            out.push_str(&format!("- {kind:<16} {count:>8}\n"));
        }
    }

    out
}

/// Machine-readable run result: `{"message", "successCount", "failureCount"}`.
pub fn format_ingest_json(report: &IngestReport) -> String {
    json!({
        "message": "Commodity data updated",
        "successCount": report.success_count,
        "failureCount": report.failure_count,
    })
    .to_string()
}

pub fn format_query_view(view: &QueryView) -> String {
    let mut out = String::new();
    match view {
        QueryView::States { states } => {
            out.push_str("States:\n");
            push_list(&mut out, states);
        }
        QueryView::Commodities { state, commodities } => {
            out.push_str(&format!("Commodities in {state}:\n"));
            push_list(&mut out, commodities);
        }
        QueryView::Markets {
            state,
            commodity,
            markets,
        } => {
            out.push_str(&format!("Markets for {commodity} in {state}:\n"));
            push_list(&mut out, markets);
        }
        QueryView::Records {
            state,
            commodity,
            market,
            records,
        } => {
            out.push_str(&format!("{commodity} at {market}, {state}:\n"));
            if records.is_empty() {
                out.push_str("  (none)\n");
            } else {
                out.push_str(&format_records_table(records));
            }
        }
    }
    out
}

pub fn format_records_table(rows: &[PriceRecord]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<10} {:<16} {:<14} {:<10} {:>10} {:>10} {:>10}",
            "date", "district", "variety", "grade", "min", "modal", "max"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(&format!(
        "{:-<10} {:-<16} {:-<14} {:-<10} {:-<10} {:-<10} {:-<10}\n",
        "", "", "", "", "", "", ""
    ));

    for r in rows {
        out.push_str(&format!(
            "{:<10} {:<16} {:<14} {:<10} {:>10.2} {:>10.2} {:>10.2}\n",
            r.arrival_date.format("%Y-%m-%d").to_string(),
            truncate(&r.district, 16),
            truncate(&r.variety, 14),
            truncate(&r.grade, 10),
            r.min_price,
            r.modal_price,
            r.max_price,
        ));
    }

    out
}

fn push_list(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("  (none)\n");
    }
    for item in items {
        out.push_str(&format!("  {item}\n"));
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    fn report() -> IngestReport {
        let started_at = Utc.with_ymd_and_hms(2024, 6, 5, 10, 0, 0).unwrap();
        let mut failures_by_kind = BTreeMap::new();
        failures_by_kind.insert("invalid_date", 2);
        IngestReport {
            source: "sample".to_string(),
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(250),
            fetched: 12,
            success_count: 10,
            failure_count: 2,
            created_states: 1,
            added_commodities: 2,
            added_markets: 3,
            inserted: 3,
            duplicates: 1,
            evicted: 0,
            failures_by_kind,
        }
    }

    #[test]
    fn json_body_matches_update_response() {
        let value: serde_json::Value = serde_json::from_str(&format_ingest_json(&report())).unwrap();
        assert_eq!(value["message"], "Commodity data updated");
        assert_eq!(value["successCount"], 10);
        assert_eq!(value["failureCount"], 2);
    }

    #[test]
    fn text_summary_lists_counts_and_failures() {
        let text = format_ingest_report(&report());
        assert!(text.contains("successCount=10 failureCount=2"));
        assert!(text.contains("took 250ms"));
        assert!(text.contains("invalid_date"));
    }

    #[test]
    fn records_table_has_one_row_per_record() {
        let rec = PriceRecord {
            arrival_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            district: "A very long district name".to_string(),
            variety: "Red".to_string(),
            grade: "FAQ".to_string(),
            min_price: 1800.0,
            max_price: 2400.0,
            modal_price: 2200.0,
        };
        let view = QueryView::Records {
            state: "Maharashtra".to_string(),
            commodity: "Onion".to_string(),
            market: "Lasalgaon".to_string(),
            records: vec![rec.clone(), rec],
        };
        let text = format_query_view(&view);
        assert_eq!(text.lines().filter(|l| l.starts_with("2024-06-05")).count(), 2);
        assert!(text.contains("A very long dis."));
        assert!(text.contains("2200.00"));
    }

    #[test]
    fn empty_lists_say_so() {
        let view = QueryView::States { states: Vec::new() };
        assert_eq!(format_query_view(&view), "States:\n  (none)\n");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Kerala", 10), "Kerala");
        assert_eq!(truncate("Tamil Nadu", 6), "Tamil.");
        assert_eq!(truncate("ÅÅÅÅÅÅ", 4), "ÅÅÅ.");
    }
}
