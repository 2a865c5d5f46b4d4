use crate::{RecordBatch, RecordLocation, Row};
use tabled::{builder::Builder, settings, Table};
use types::Value;

/// Predefined output styles that map to `tabled` styles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TableStyleKind {
    #[default]
    Ascii,
    Modern,
    Plain,
}

impl TableStyleKind {
    fn apply(self, table: &mut Table) {
        match self {
            Self::Ascii => table.with(settings::Style::ascii()),
            Self::Modern => table.with(settings::Style::modern()),
            Self::Plain => table.with(settings::Style::empty()),
        };
    }
}

/// Render a `RecordBatch` as a table with a header row.
pub fn render_record_batch(batch: &RecordBatch, style: TableStyleKind) -> String {
    if batch.columns.is_empty() && batch.rows.is_empty() {
        return "<empty>".into();
    }

    let mut builder = Builder::default();
    if !batch.columns.is_empty() {
        builder.push_record(batch.columns.iter().cloned());
    }
    for row in &batch.rows {
        builder.push_record(row.values.iter().map(format_value));
    }

    let mut table = builder.build();
    style.apply(&mut table);
    table.to_string()
}

/// Format a full row into a comma-separated string.
pub fn format_row(row: &Row) -> String {
    row.values
        .iter()
        .map(format_value)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a single value for display.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Double(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                format!("{v:.1}")
            } else {
                v.to_string()
            }
        }
        Value::Text(text) => format!("'{text}'"),
        Value::Null => "NULL".into(),
    }
}

/// Format a `RecordLocation` as `(page_id, slot)`.
pub fn format_location(loc: &RecordLocation) -> String {
    format!("({}, {})", loc.page_id.0, loc.slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_batch_renders_headers_and_values() {
        let batch = RecordBatch {
            columns: vec!["id".into(), "name".into()],
            rows: vec![Row::new(vec![Value::Int(1), Value::Text("Ada".into())])],
        };

        let rendered = render_record_batch(&batch, TableStyleKind::Ascii);
        assert!(rendered.contains("id"));
        assert!(rendered.contains("'Ada'"));
        assert!(rendered.contains("---"));
    }

    #[test]
    fn doubles_always_show_a_fraction() {
        assert_eq!(format_value(&Value::Double(5500.0)), "5500.0");
        assert_eq!(format_value(&Value::Double(0.25)), "0.25");
    }

    #[test]
    fn empty_batches_render_placeholder() {
        assert_eq!(
            render_record_batch(&RecordBatch::empty(), TableStyleKind::Plain),
            "<empty>"
        );
    }
}
