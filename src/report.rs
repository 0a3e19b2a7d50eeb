use chrono::NaiveDateTime;
use crate::models::BookingStatus;

/// One line of the event schedule export.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub company_name: String,
    pub interviewer: Option<String>,
    pub sector: Option<String>,
    pub stand: Option<String>,
    pub candidate_id: Option<String>,
    pub status: Option<BookingStatus>,
}

const HEADER: &str = "date,start,end,company,interviewer,sector,stand,candidate,status";

/// Renders the schedule as CSV. Prefixed with a UTF-8 byte-order mark so
/// spreadsheet imports pick the right encoding; fields holding a comma, quote
/// or newline are quoted with embedded quotes doubled.
pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = String::from("\u{feff}");
    out.push_str(HEADER);
    out.push('\n');

    for row in rows {
        let status = match row.status {
            Some(BookingStatus::PENDING) => "pending",
            Some(BookingStatus::CONFIRMED) => "confirmed",
            Some(BookingStatus::REJECTED) => "rejected",
            None => "",
        };
        let fields = [
            row.start_at.format("%Y-%m-%d").to_string(),
            row.start_at.format("%H:%M").to_string(),
            row.end_at.format("%H:%M").to_string(),
            row.company_name.clone(),
            row.interviewer.clone().unwrap_or_default(),
            row.sector.clone().unwrap_or_default(),
            row.stand.clone().unwrap_or_default(),
            row.candidate_id.clone().unwrap_or_default(),
            status.to_string(),
        ];
        let line = fields
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }

    out
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(company: &str, candidate: Option<&str>, status: Option<BookingStatus>) -> ReportRow {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        ReportRow {
            start_at: date.and_hms_opt(9, 0, 0).unwrap(),
            end_at: date.and_hms_opt(9, 30, 0).unwrap(),
            company_name: company.to_string(),
            interviewer: Some("Ana".to_string()),
            sector: None,
            stand: Some("B12".to_string()),
            candidate_id: candidate.map(|c| c.to_string()),
            status,
        }
    }

    #[test]
    fn starts_with_bom_and_header() {
        let csv = render_csv(&[]);
        assert!(csv.starts_with('\u{feff}'));
        assert!(csv[3..].starts_with("date,start,end,company"));
    }

    #[test]
    fn plain_fields_are_not_quoted() {
        let csv = render_csv(&[row("Acme", Some("cand1"), Some(BookingStatus::CONFIRMED))]);
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(line, "2025-03-14,09:00,09:30,Acme,Ana,,B12,cand1,confirmed");
    }

    #[test]
    fn commas_and_quotes_are_escaped() {
        let csv = render_csv(&[row("Foo, Bar \"SA\"", None, None)]);
        let line = csv.lines().nth(1).unwrap();
        assert!(line.contains("\"Foo, Bar \"\"SA\"\"\""));
        // Unbooked allocation renders empty candidate and status columns.
        assert!(line.ends_with(",,"));
    }
}
