use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{AppResult, ErrorCategory, QueryError, output_error},
    executor::ResultRow,
    fallback::TemplateAudit,
    pipeline::QueryResponse
};

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml
}

/// Output options
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool,
    pub verbose: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true,
            verbose: false
        }
    }
}

/// Result of the `vet` command for serialization
#[derive(Debug, Clone, Serialize)]
pub struct VetReport {
    pub sql:            String,
    pub accepted:       bool,
    /// What the executor would run, row limit included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check:          Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason:         Option<String>,
    pub tables:         Vec<String>
}

/// Result of the `status` command for serialization
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status:                 &'static str,
    pub generation_configured:  bool,
    pub provider:               String,
    pub model:                  String,
    pub database_configured:    bool,
    pub allowed_tables:         Vec<String>,
    pub max_rows:               u32,
    pub fallback_enabled:       bool,
    pub fallback_templates:     usize,
    pub strict_parse:           bool
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    category: ErrorCategory,
    message:  &'a str
}

fn serialize<T: Serialize>(value: &T, format: OutputFormat) -> AppResult<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| output_error(format!("JSON serialization failed: {}", e))),
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map_err(|e| output_error(format!("YAML serialization failed: {}", e))),
        OutputFormat::Text => Err(output_error("text output is not structured"))
    }
}

fn paint(text: &str, colored: bool, style: fn(&str) -> colored::ColoredString) -> String {
    if colored {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

/// Format a pipeline answer
pub fn format_response(response: &QueryResponse, opts: &OutputOptions) -> AppResult<String> {
    if opts.format != OutputFormat::Text {
        return serialize(response, opts.format);
    }

    let mut output = String::new();
    if opts.verbose {
        let header = format!("SQL ({}):", response.source);
        output.push_str(&paint(&header, opts.colored, |s| s.cyan().bold()));
        output.push('\n');
        output.push_str(&response.sql);
        output.push_str("\n\n");
    }

    if response.columns.is_empty() {
        output.push_str("(no rows)\n");
        return Ok(output);
    }

    output.push_str(&format_table(&response.columns, &response.rows, opts.colored));

    let footer = format!(
        "({} row{}{})",
        response.rows.len(),
        if response.rows.len() == 1 { "" } else { "s" },
        if response.truncated { ", truncated at row cap" } else { "" }
    );
    if response.truncated {
        output.push_str(&paint(&footer, opts.colored, |s| s.yellow()));
    } else {
        output.push_str(&footer);
    }
    output.push('\n');
    Ok(output)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::from("NULL"),
        Value::String(s) => s.clone(),
        other => other.to_string()
    }
}

fn format_table(columns: &[String], rows: &[ResultRow], colored: bool) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut table = String::new();
    table.push_str(&paint(&line(columns), colored, |s| s.bold()));
    table.push('\n');
    table.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    table.push('\n');
    for row in &cells {
        table.push_str(&line(row));
        table.push('\n');
    }
    table
}

/// Format the verdict of the `vet` command
pub fn format_verdict(report: &VetReport, opts: &OutputOptions) -> AppResult<String> {
    if opts.format != OutputFormat::Text {
        return serialize(report, opts.format);
    }

    let mut output = String::new();
    if report.accepted {
        output.push_str(&paint("ACCEPTED", opts.colored, |s| s.green().bold()));
        output.push('\n');
        if let Some(sql) = &report.executable_sql {
            output.push_str(&format!("Executes as: {}\n", sql));
        }
    } else {
        let label = match report.check {
            Some(id) => format!("REJECTED [{}]", id),
            None => String::from("REJECTED")
        };
        output.push_str(&paint(&label, opts.colored, |s| s.red().bold()));
        output.push('\n');
        if let Some(reason) = &report.reason {
            output.push_str(&format!("Reason: {}\n", reason));
        }
    }
    if opts.verbose && !report.tables.is_empty() {
        output.push_str(&format!("Tables: {}\n", report.tables.join(", ")));
    }
    Ok(output)
}

/// Format the template audit of the `templates` command
pub fn format_templates(audits: &[TemplateAudit], opts: &OutputOptions) -> AppResult<String> {
    if opts.format != OutputFormat::Text {
        return serialize(&audits, opts.format);
    }

    let mut output = String::from("Fallback templates:\n\n");
    for (i, audit) in audits.iter().enumerate() {
        let mark = if audit.accepted {
            paint("ok", opts.colored, |s| s.green())
        } else {
            paint("REJECTED", opts.colored, |s| s.red().bold())
        };
        let header = format!("#{} {}", i + 1, audit.name);
        output.push_str(&format!("{} [{}]\n", paint(&header, opts.colored, |s| s.cyan()), mark));
        output.push_str(&format!("  {}\n", audit.sql));
        if let Some(reason) = &audit.reason {
            output.push_str(&format!("  Reason: {}\n", reason));
        }
        output.push('\n');
    }
    Ok(output)
}

/// Format the `status` report
pub fn format_status(report: &StatusReport, opts: &OutputOptions) -> AppResult<String> {
    if opts.format != OutputFormat::Text {
        return serialize(report, opts.format);
    }

    let yes_no = |flag: bool| {
        if flag {
            paint("yes", opts.colored, |s| s.green())
        } else {
            paint("no", opts.colored, |s| s.yellow())
        }
    };

    let mut output = String::new();
    output.push_str(&format!(
        "Generation:     {} ({}, {})\n",
        yes_no(report.generation_configured),
        report.provider,
        report.model
    ));
    output.push_str(&format!("Database:       {}\n", yes_no(report.database_configured)));
    output.push_str(&format!("Allowed tables: {}\n", report.allowed_tables.join(", ")));
    output.push_str(&format!("Row cap:        {}\n", report.max_rows));
    output.push_str(&format!(
        "Fallback:       {} ({} templates)\n",
        yes_no(report.fallback_enabled),
        report.fallback_templates
    ));
    output.push_str(&format!("Strict parse:   {}\n", yes_no(report.strict_parse)));
    Ok(output)
}

/// Format a pipeline failure for the caller. Internal details never appear.
pub fn format_query_error(err: &QueryError, opts: &OutputOptions) -> String {
    let body = ErrorBody {
        error: ErrorDetail {
            category: err.category(),
            message:  err.client_message()
        }
    };
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(&body).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(&body).unwrap_or_default(),
        OutputFormat::Text => {
            let label = format!("{} error:", err.category());
            format!("{} {}", paint(&label, opts.colored, |s| s.red().bold()), err.client_message())
        }
    }
}
