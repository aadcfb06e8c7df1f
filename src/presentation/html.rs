// HTML rendering of alert reports
use crate::application::alert::{AlertReport, Headline, Section, SectionGroup, Tone};
use std::fmt::Write;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn tone_color(tone: Tone) -> Option<&'static str> {
    match tone {
        Tone::Alarm => Some("red"),
        Tone::Recovery => Some("green"),
        Tone::Info => None,
    }
}

fn render_section(out: &mut String, section: &Section) {
    let title = escape(&section.title);
    match tone_color(section.tone) {
        Some(color) => {
            let _ = writeln!(out, "<p><b><font color=\"{}\">{}</font></b></p>", color, title);
        }
        None => {
            let _ = writeln!(out, "<p><b>{}</b></p>", title);
        }
    }

    out.push_str("<table border=\"1\">\n<thead><tr>");
    for column in &section.columns {
        let _ = write!(out, "<th>{}</th>", escape(column));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in &section.rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n<br>\n");
}

pub fn render_report(report: &AlertReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>",
        escape(&report.subject)
    );

    match report.headline {
        Headline::NewAlert => {
            let _ = writeln!(out, "<h2><font color=\"red\">{}</font></h2>", report.headline.title());
        }
        Headline::OngoingIssues => {
            let _ = writeln!(out, "<h2>{}</h2>", report.headline.title());
        }
        Headline::StatsCompleted => {
            let _ = writeln!(out, "<h2>{} {}</h2>", escape(&report.array), report.headline.title());
        }
    }

    if let Some(notice) = &report.notice {
        let _ = writeln!(out, "<p><b><font color=\"red\">{}</font></b></p>", escape(notice));
    }

    for section in report.sections_in(SectionGroup::Changes) {
        render_section(&mut out, section);
    }

    let mut summary = report.sections_in(SectionGroup::Summary).peekable();
    if report.headline == Headline::NewAlert && summary.peek().is_some() {
        out.push_str("<h2>Summary of New and Ongoing Issues</h2>\n");
    }
    for section in summary {
        render_section(&mut out, section);
    }

    out.push_str("</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::alert::ReportKind;
    use chrono::NaiveDate;

    fn section(title: &str, tone: Tone, group: SectionGroup) -> Section {
        Section {
            title: title.to_string(),
            tone,
            group,
            columns: vec!["Reference Designator", "Stream"],
            rows: vec![vec!["CE01ISSM-MFD35-02-PRESFA000".to_string(), "presf<dcl>".to_string()]],
        }
    }

    fn report(headline: Headline, sections: Vec<Section>) -> AlertReport {
        AlertReport {
            kind: ReportKind::DataAlert,
            array: "CE".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            subject: "Data Quality and Availability Alert for CE on 2024-03-02".to_string(),
            headline,
            notice: None,
            sections,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_new_alert_layout() {
        let html = render_report(&report(
            Headline::NewAlert,
            vec![
                section("Silent streams", Tone::Alarm, SectionGroup::Changes),
                section("Not producing data", Tone::Info, SectionGroup::Summary),
            ],
        ));

        assert!(html.contains("<h2><font color=\"red\">New Alert</font></h2>"));
        assert!(html.contains("<font color=\"red\">Silent streams</font>"));
        assert!(html.contains("<td>presf&lt;dcl&gt;</td>"));
        let changes = html.find("Silent streams").unwrap();
        let summary = html.find("Summary of New and Ongoing Issues").unwrap();
        assert!(changes < summary);
        assert!(summary < html.find("Not producing data").unwrap());
    }

    #[test]
    fn test_ongoing_issues_has_no_summary_heading() {
        let html = render_report(&report(
            Headline::OngoingIssues,
            vec![section("Not producing data", Tone::Info, SectionGroup::Summary)],
        ));

        assert!(html.contains("<h2>Ongoing Issues</h2>"));
        assert!(!html.contains("Summary of New and Ongoing Issues"));
        assert!(html.contains("<p><b>Not producing data</b></p>"));
    }

    #[test]
    fn test_notice_precedes_sections() {
        let mut report = report(
            Headline::NewAlert,
            vec![section("Silent engineering streams", Tone::Alarm, SectionGroup::Changes)],
        );
        report.notice = Some("No platform engineering data return.".to_string());
        let html = render_report(&report);

        let notice = html.find("No platform engineering data return.").unwrap();
        assert!(notice < html.find("Silent engineering streams").unwrap());
    }

    #[test]
    fn test_stats_heading_names_array() {
        let mut report = report(
            Headline::StatsCompleted,
            vec![section("Deployed days scored", Tone::Info, SectionGroup::Summary)],
        );
        report.kind = ReportKind::StatsSummary;
        let html = render_report(&report);

        assert!(html.contains("<h2>CE Stats Run Completed</h2>"));
        assert!(!html.contains("Summary of New and Ongoing Issues"));
    }
}
