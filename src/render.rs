//! Turning assembled tables and pages into markup.
//!
//! Renderers only lay out what they are given; totals and labels are already
//! in the [`Table`].

use std::fmt::Write as _;

use anyhow::Result;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table as TextTable};
use html_escape::{encode_double_quoted_attribute, encode_text};
use log::error;
use serde::Serialize;

use crate::page::Page;
use crate::report::{ReportOptions, Table, Value, SUMS_LABEL};

/// Column whose cells may be rendered as links to a network report.
pub const CODE_COLUMN: &str = "networkCode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Html,
    Text,
    Json,
}

pub trait TableRenderer {
    fn render(&self, table: &Table, options: &ReportOptions) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

fn code_link(template: &str, code: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(code.as_bytes()).collect();
    template.replace("{code}", &encoded)
}

fn html_cell(column: &str, cell: &Value, options: &ReportOptions) -> String {
    match cell {
        Value::Flag(true) => r#"<span style="color: green">Y</span>"#.to_string(),
        Value::Flag(false) => r#"<span style="color: red">N</span>"#.to_string(),
        Value::Text(code) if column == CODE_COLUMN => match &options.link_codes {
            Some(template) => format!(
                r#"<a href="{}">{}</a>"#,
                encode_double_quoted_attribute(&code_link(template, code)),
                encode_text(code)
            ),
            None => encode_text(code).into_owned(),
        },
        other => encode_text(&other.to_string()).into_owned(),
    }
}

impl TableRenderer for HtmlRenderer {
    fn render(&self, table: &Table, options: &ReportOptions) -> String {
        let mut out = String::from("<table width=\"100%\">\n  <thead><tr>");
        for col in &table.header {
            let label = encode_text(col);
            match options.header_links.get(col) {
                Some(href) => {
                    let _ = write!(
                        out,
                        r#"<th><a href="{}">{label}</a></th>"#,
                        encode_double_quoted_attribute(href)
                    );
                }
                None => {
                    let _ = write!(out, "<th>{label}</th>");
                }
            }
        }
        out.push_str("</tr></thead>\n  <tbody>\n");

        for row in &table.rows {
            out.push_str("  <tr>");
            for (col, cell) in table.header.iter().zip(table.cells(row)) {
                let _ = write!(out, "<td>{}</td>", html_cell(col, cell, options));
            }
            out.push_str("</tr>\n");
        }

        if let Some(sums) = &table.sums {
            out.push_str("  <tr class=\"col_sums\">");
            for (idx, col) in table.header.iter().enumerate() {
                if idx == 0 {
                    let _ = write!(out, "<td>{SUMS_LABEL}</td>");
                    continue;
                }
                match sums.get(col) {
                    Some(total) => {
                        let _ = write!(
                            out,
                            r#"<td><span class="col_total">{}</span></td>"#,
                            encode_text(&total.to_string())
                        );
                    }
                    None => out.push_str("<td>&nbsp;</td>"),
                }
            }
            out.push_str("</tr>\n");
        }
        out.push_str("  </tbody>\n</table>\n");
        out
    }
}

fn themed_table() -> TextTable {
    let mut table = TextTable::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn text_cell(cell: &Value) -> Cell {
    match cell {
        Value::Flag(true) => Cell::new("Y").fg(Color::Green),
        Value::Flag(false) => Cell::new("N").fg(Color::Red),
        Value::Integer(_) | Value::Real(_) => {
            Cell::new(cell.to_string()).set_alignment(CellAlignment::Right)
        }
        other => Cell::new(other.to_string()),
    }
}

impl TableRenderer for TextRenderer {
    fn render(&self, table: &Table, _options: &ReportOptions) -> String {
        let mut text = themed_table();
        let header: Vec<Cell> = table
            .header
            .iter()
            .map(|label| {
                Cell::new(label)
                    .add_attribute(Attribute::Bold)
                    .fg(Color::Cyan)
            })
            .collect();
        text.set_header(header);
        for row in &table.rows {
            text.add_row(table.cells(row).map(text_cell).collect::<Vec<Cell>>());
        }
        if let Some(sums) = &table.sums {
            let totals: Vec<Cell> = table
                .header
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    if idx == 0 {
                        return Cell::new(SUMS_LABEL).add_attribute(Attribute::Bold);
                    }
                    match sums.get(col) {
                        Some(total) => Cell::new(total.to_string())
                            .set_alignment(CellAlignment::Right)
                            .add_attribute(Attribute::Bold),
                        None => Cell::new(""),
                    }
                })
                .collect();
            text.add_row(totals);
        }
        text.to_string()
    }
}

#[derive(Serialize)]
struct JsonTable<'a> {
    table: &'a Table,
    options: &'a ReportOptions,
}

impl TableRenderer for JsonRenderer {
    fn render(&self, table: &Table, options: &ReportOptions) -> String {
        serde_json::to_string_pretty(&JsonTable { table, options }).unwrap_or_else(|err| {
            error!("Cannot serialise table {}: {err}", table.name);
            String::new()
        })
    }
}

const PAGE_CSS: &str = r#"
body { font-family: sans-serif; margin: 1em 2em; }
table { border-collapse: collapse; }
th, td { padding: 2px 6px; border-bottom: 1px solid #ddd; text-align: left; }
tr.col_sums td { font-weight: bold; border-top: 2px solid #888; }
span.col_total { white-space: nowrap; }
p.error { color: #a00; font-family: monospace; }
ol.nav li { display: inline; margin-right: 1em; }
"#;

fn html_page(page: &Page) -> String {
    let renderer = HtmlRenderer;
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", encode_text(&page.title));
    if let Some(updated) = &page.updated {
        let _ = writeln!(body, "<p>Database last updated {}</p>", encode_text(updated));
    }

    if !page.navigation.is_empty() {
        body.push_str("<table><tr>");
        for item in &page.navigation {
            let label = encode_text(&item.label);
            match &item.href {
                Some(href) => {
                    let _ = write!(
                        body,
                        r#"<td><a href="{}">{label}</a></td>"#,
                        encode_double_quoted_attribute(href)
                    );
                }
                None => {
                    let _ = write!(body, "<td>{label}</td>");
                }
            }
        }
        body.push_str("</tr></table>\n");
    }

    if page.sections.len() > 1 {
        body.push_str("<p>Tables:</p><ol class=\"nav\">");
        for section in &page.sections {
            let _ = write!(
                body,
                "<li><a href=\"#{}\">{}</a></li>",
                encode_double_quoted_attribute(&section.anchor),
                encode_text(&section.title)
            );
        }
        body.push_str("</ol>\n");
    }

    for section in &page.sections {
        let _ = writeln!(
            body,
            "<h2><a name=\"{}\"></a>{}</h2>",
            encode_double_quoted_attribute(&section.anchor),
            encode_text(&section.title)
        );
        for note in &section.notes {
            let _ = writeln!(body, "<p>{}</p>", encode_text(note));
        }
        if let Some(err) = &section.error {
            let _ = writeln!(body, "<p class=\"error\">{}</p>", encode_text(err));
        }
        body.push_str(&renderer.render(&section.table, &section.options));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>{css}</style>
</head>
<body>
{body}</body>
</html>
"#,
        title = encode_text(&page.title),
        css = PAGE_CSS,
    )
}

fn text_page(page: &Page) -> String {
    let renderer = TextRenderer;
    let mut out = format!("{}\n", page.title);
    if let Some(updated) = &page.updated {
        let _ = writeln!(out, "Database last updated {updated}");
    }
    if !page.navigation.is_empty() {
        let labels: Vec<&str> = page.navigation.iter().map(|item| item.label.as_str()).collect();
        let _ = writeln!(out, "{}", labels.join(" | "));
    }
    for section in &page.sections {
        let _ = writeln!(out, "\n{}", section.title);
        for note in &section.notes {
            let _ = writeln!(out, "{note}");
        }
        if let Some(err) = &section.error {
            let _ = writeln!(out, "Error: {err}");
        }
        let _ = writeln!(out, "{}", renderer.render(&section.table, &section.options));
    }
    out
}

/// Render a whole report page.
pub fn render_page(page: &Page, format: Format) -> Result<String> {
    Ok(match format {
        Format::Html => html_page(page),
        Format::Text => text_page(page),
        Format::Json => serde_json::to_string_pretty(page)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{NavItem, Section};
    use crate::report::{assemble, Row, SourceLabels};

    fn sample_table(options: &ReportOptions) -> Table {
        let mut first = Row::new();
        first.insert("networkCode".to_string(), Value::from("GE"));
        first.insert("requests".to_string(), Value::Integer(3));
        first.insert("size".to_string(), Value::from("1.0 kiB"));
        let mut second = Row::new();
        second.insert("networkCode".to_string(), Value::from("<CH>"));
        second.insert("requests".to_string(), Value::Integer(5));
        second.insert("size".to_string(), Value::from("1.0 kiB"));
        assemble(
            "Networks",
            ["networkCode", "requests", "size"],
            vec![first, second],
            options,
            &SourceLabels::default(),
        )
    }

    #[test]
    fn html_table_has_sums_row_and_escapes_cells() {
        let options = ReportOptions::summing(["requests", "size"]);
        let html = HtmlRenderer.render(&sample_table(&options), &options);
        assert!(html.contains("<th>networkCode</th>"));
        assert!(html.contains("<td>&lt;CH&gt;</td>"));
        assert!(html.contains(r#"<tr class="col_sums"><td>Column sums</td>"#));
        assert!(html.contains(r#"<span class="col_total">8</span>"#));
        assert!(html.contains(r#"<span class="col_total">2 kiB</span>"#));
    }

    #[test]
    fn html_links_codes_when_asked() {
        let options = ReportOptions::summing(["requests"]).with_code_links("reqlognetwork?code={code}");
        let html = HtmlRenderer.render(&sample_table(&options), &options);
        assert!(html.contains(r#"<a href="reqlognetwork?code=GE">GE</a>"#));
        assert!(html.contains(r#"<a href="reqlognetwork?code=%3CCH%3E">&lt;CH&gt;</a>"#));
    }

    #[test]
    fn code_links_encode_query_characters() {
        assert_eq!(
            code_link("reqlognetwork?code={code}&date=2024-01-05", "A&B#1"),
            "reqlognetwork?code=A%26B%231&date=2024-01-05"
        );
    }

    #[test]
    fn html_header_only_table_for_empty_result() {
        let options = ReportOptions::summing(["requests"]);
        let table = assemble("Empty", ["start_day", "requests"], Vec::new(), &options, &SourceLabels::default());
        let html = HtmlRenderer.render(&table, &options);
        assert!(html.contains("<th>start_day</th><th>requests</th>"));
        assert!(!html.contains("<td>"));
    }

    #[test]
    fn text_table_shows_sums() {
        let options = ReportOptions::summing(["requests", "size"]);
        let text = TextRenderer.render(&sample_table(&options), &options);
        assert!(text.contains("Column sums"));
        assert!(text.contains("2 kiB"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let options = ReportOptions::summing(["requests", "size"]);
        let table = sample_table(&options);
        assert_eq!(HtmlRenderer.render(&table, &options), HtmlRenderer.render(&table, &options));
        let json = JsonRenderer.render(&table, &options);
        assert!(json.contains("\"sums\""));
        assert_eq!(json, JsonRenderer.render(&table, &options));
    }

    #[test]
    fn page_renders_sections_and_errors() {
        let options = ReportOptions::summing(["requests"]);
        let page = Page {
            title: "EIDA Arclink Request Statistics".to_string(),
            updated: None,
            navigation: vec![NavItem::link("<< Prev", "reqlogdisplay?date=2024-01-04")],
            sections: vec![
                Section::new("Table Summary", "TableSummary", sample_table(&options), options.clone()),
                Section::failed(
                    "Table Volume",
                    "TableVolume",
                    Table::new("Volume", ["start_day"]),
                    "no such table: ArcStatsVolume".to_string(),
                ),
            ],
        };
        let html = render_page(&page, Format::Html).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<a href="reqlogdisplay?date=2024-01-04">&lt;&lt; Prev</a>"#));
        assert!(html.contains(r##"<a href="#TableVolume">"##));
        assert!(html.contains("no such table: ArcStatsVolume"));

        let text = render_page(&page, Format::Text).unwrap();
        assert!(text.contains("Error: no such table"));

        let json = render_page(&page, Format::Json).unwrap();
        assert!(json.contains("\"Table Summary\""));
    }
}
