// Report generation for tasks and category trees
use crate::model::{CategoryNode, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Errors shown per task in reports; the rest is summarized as a count.
pub const REPORT_ERROR_LIMIT: usize = 20;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: String,
    pub kind: String,
    pub status: TaskStatus,
    pub done: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products_found: Option<usize>,
    pub errors: Vec<String>,
    pub errors_omitted: usize,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskReport {
    pub fn from_task(task: &Task) -> Self {
        let shown = task.errors.len().min(REPORT_ERROR_LIMIT);
        Self {
            id: task.id.clone(),
            kind: task.kind.clone(),
            status: task.status,
            done: task.done,
            total: task.total,
            summary: task.summary.clone(),
            products_found: task.products_found,
            errors: task.errors[..shown].to_vec(),
            errors_omitted: task.errors.len() - shown,
            created_at: task.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            updated_at: task.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }

    fn status_to_string(&self) -> &str {
        match self.status {
            TaskStatus::Running => "Running",
            TaskStatus::Finished => "Finished",
            TaskStatus::Failed => "Failed",
        }
    }

    fn percent(&self) -> usize {
        if self.total == 0 {
            if self.status.is_terminal() { 100 } else { 0 }
        } else {
            (self.done * 100 / self.total).min(100)
        }
    }
}

pub fn generate_text_report(report: &TaskReport) -> String {
    let mut out = String::new();

    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("TASK {}\n", report.id));
    out.push_str(RULE);
    out.push_str("\n\n");

    out.push_str(&format!("Type:         {}\n", report.kind));
    out.push_str(&format!("Status:       {}\n", report.status_to_string()));
    out.push_str(&format!(
        "Progress:     {}/{} ({}%)\n",
        report.done,
        report.total,
        report.percent()
    ));
    if let Some(found) = report.products_found {
        out.push_str(&format!("New products: {}\n", found));
    }
    out.push_str(&format!("Started:      {}\n", report.created_at));
    out.push_str(&format!("Updated:      {}\n", report.updated_at));
    out.push('\n');

    if let Some(summary) = &report.summary {
        out.push_str("Summary:\n");
        for line in summary.lines() {
            out.push_str(&wrap_text(line, 80, "  "));
        }
        out.push('\n');
    }

    if !report.errors.is_empty() {
        out.push_str(&format!(
            "Errors ({}):\n",
            report.errors.len() + report.errors_omitted
        ));
        for error in &report.errors {
            out.push_str(&wrap_text(&format!("- {}", error), 80, "  "));
        }
        if report.errors_omitted > 0 {
            out.push_str(&format!("  ... and {} more\n", report.errors_omitted));
        }
        out.push('\n');
    }

    out
}

pub fn generate_json_report(report: &TaskReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "shelfsync",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "task": report
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// One line per task, for listings.
pub fn task_line(task: &Task) -> String {
    format!(
        "{}  {:<26} {:<9} {:>4}/{:<4} {}",
        task.id,
        task.kind,
        task.status.as_str(),
        task.done,
        task.total,
        task.updated_at.format("%Y-%m-%d %H:%M")
    )
}

/// Render a category tree with box-drawing prefixes. Flagged nodes are
/// marked `[review]`, manual ones `[manual]`.
pub fn render_category_tree(nodes: &[CategoryNode]) -> String {
    if nodes.is_empty() {
        return "  (empty)\n".to_string();
    }
    let mut out = String::new();
    render_level(nodes, "", &mut out);
    out
}

fn render_level(nodes: &[CategoryNode], indent: &str, out: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        let prefix = if is_last { "└── " } else { "├── " };

        let mut marks = String::new();
        if node.needs_manual_review {
            marks.push_str(" [review]");
        }
        if node.manually_added {
            marks.push_str(" [manual]");
        }

        out.push_str(&format!(
            "{}{}{} ({}){}  {}\n",
            indent, prefix, node.name, node.id, marks, node.url
        ));

        let child_indent = format!("{}{}", indent, if is_last { "    " } else { "│   " });
        render_level(&node.children, &child_indent, out);
    }
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.chars().count() + word.chars().count() + 1 > width - indent.len()
            && !current_line.is_empty()
        {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
