//! Delimited tables (CSV, TSV) rendered as a Markdown pipe table.
//!
//! The first record is the header row. Ragged rows are padded with empty
//! cells to the widest row.

use super::FormatConverter;
use crate::error::ConverterError;
use crate::platform::ObjectContent;
use async_trait::async_trait;

const CSV_TYPES: &[&str] = &["text/csv", "application/csv"];
const TSV_TYPE: &str = "text/tab-separated-values";

#[derive(Debug, Clone, Copy, Default)]
pub struct TableConverter;

#[async_trait]
impl FormatConverter for TableConverter {
    fn supports(&self, mime_type: &str) -> bool {
        mime_type == TSV_TYPE || CSV_TYPES.contains(&mime_type)
    }

    async fn convert(
        &self,
        content: ObjectContent,
        mime_type: &str,
    ) -> Result<String, ConverterError> {
        let bytes = content.read_to_end().await?;
        let delimiter = if mime_type == TSV_TYPE { b'\t' } else { b',' };
        let rows = read_rows(&bytes, delimiter)?;
        Ok(pipe_table(&rows))
    }
}

fn read_rows(bytes: &[u8], delimiter: u8) -> Result<Vec<Vec<String>>, ConverterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes));

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| ConverterError::Unreadable {
                    format: "CSV".into(),
                    detail: e.to_string(),
                })
        })
        .collect()
}

fn pipe_table(rows: &[Vec<String>]) -> String {
    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);

    let mut out = String::new();
    push_row(&mut out, header, width);
    out.push('|');
    out.push_str(&" --- |".repeat(width));
    out.push('\n');
    for row in body {
        push_row(&mut out, row, width);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], width: usize) {
    out.push('|');
    for i in 0..width {
        let cell = cells.get(i).map(String::as_str).unwrap_or_default();
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

/// Pipes would end the cell and newlines the row.
fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(bytes: &'static [u8], mime: &str) -> Result<String, ConverterError> {
        TableConverter
            .convert(ObjectContent::from_bytes(bytes), mime)
            .await
    }

    #[tokio::test]
    async fn csv_becomes_pipe_table() {
        let md = run(b"name,qty\nbolts,10\nnuts,25\n", "text/csv").await.unwrap();
        assert_eq!(
            md,
            "| name | qty |\n| --- | --- |\n| bolts | 10 |\n| nuts | 25 |\n"
        );
    }

    #[tokio::test]
    async fn quoted_cells_with_pipes_and_newlines_are_escaped() {
        let md = run(b"a,b\n\"x|y\",\"line 1\nline 2\"\n", "text/csv").await.unwrap();
        assert!(md.contains("| x\\|y | line 1<br>line 2 |"), "got {md:?}");
    }

    #[tokio::test]
    async fn ragged_rows_are_padded() {
        let md = run(b"a,b,c\n1\n", "text/csv").await.unwrap();
        assert!(md.ends_with("| 1 |  |  |\n"), "got {md:?}");
    }

    #[tokio::test]
    async fn tsv_uses_tabs() {
        let md = run(b"k\tv\none\t1\n", "text/tab-separated-values")
            .await
            .unwrap();
        assert!(md.contains("| one | 1 |"));
    }

    #[tokio::test]
    async fn empty_input_gives_empty_output() {
        assert_eq!(run(b"", "text/csv").await.unwrap(), "");
    }

    #[tokio::test]
    async fn invalid_utf8_is_unreadable() {
        let err = run(b"a,b\n\xff\xfe,1\n", "text/csv").await.unwrap_err();
        assert!(matches!(err, ConverterError::Unreadable { .. }));
    }
}
