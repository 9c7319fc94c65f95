//! Plain-text rendering of derived rows

use ferrum_treeview::{Annotation, Row};
use std::fmt::Write;

fn flags(row: &Row) -> String {
    let mut flags = String::new();
    if row.flags.must_support {
        flags.push('S');
    }
    if row.flags.modifier {
        flags.push('?');
    }
    if row.flags.summary {
        flags.push('Σ');
    }
    if row.flags.constrained {
        flags.push('I');
    }
    flags
}

fn annotation(annotation: &Annotation) -> String {
    let mut text = format!("{}: ", annotation.title);
    match (&annotation.description, &annotation.url) {
        (Some(description), Some(url)) => {
            let _ = write!(text, "{} <{}>", description, url);
        }
        (Some(description), None) => text.push_str(description),
        (None, Some(url)) => {
            let _ = write!(text, "<{}>", url);
        }
        (None, None) => {}
    }
    if let Some(qualifier) = &annotation.qualifier {
        let _ = write!(text, " {}", qualifier);
    }
    text
}

/// One line per row: tree label, flags, cardinality, types, annotations
pub fn render_rows(rows: &[Row]) -> String {
    let width = rows
        .iter()
        .map(|r| r.tree_label().chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for row in rows {
        let label = row.tree_label();
        let padding = width - label.chars().count();
        let types: Vec<&str> = row.type_links.iter().map(|l| l.code.as_str()).collect();
        let mut line = format!(
            "{}{}  {:<4} {:<6} {}",
            label,
            " ".repeat(padding),
            flags(row),
            row.cardinality.as_deref().unwrap_or(""),
            types.join(" | ")
        );
        if row.removed_by_profile {
            line.push_str("  (removed)");
        }
        for a in &row.annotations {
            let _ = write!(line, "\n{}    {}", " ".repeat(width), annotation(a));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrum_models::{ElementDefinition, FhirVersion};
    use ferrum_treeview::{build_snapshot_tree, EventRecorder, RowDeriver, TreeViewConfig};
    use serde_json::json;

    #[test]
    fn test_render_rows() {
        let elements: Vec<ElementDefinition> = vec![
            json!({"path": "Patient", "min": 0, "max": "*"}),
            json!({"path": "Patient.gender", "min": 1, "max": "1", "mustSupport": true, "type": [{"code": "code"}]}),
        ]
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();
        let tree = build_snapshot_tree(&elements, FhirVersion::R4).unwrap();
        let config = TreeViewConfig::default();
        let rows = RowDeriver::new(&tree, &config)
            .rows(&mut EventRecorder::default())
            .unwrap();

        let text = render_rows(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Patient"));
        assert!(lines[1].starts_with("└─ gender"));
        assert!(lines[1].contains("S"));
        assert!(lines[1].contains("1..1"));
        assert!(lines[1].ends_with("code"));
    }
}
