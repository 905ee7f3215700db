//! Tabular data with typed cells.

use crate::data::seqs::Info;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            Cell::Text(_) => None,
        }
    }

    /// Integer value, accepting floats with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{}", v),
            // Debug keeps the decimal point so floats re-parse as floats.
            Cell::Float(v) => write!(f, "{:?}", v),
            Cell::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    #[serde(default)]
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    #[serde(default)]
    pub info: Info,
}

impl Table {
    /// Build a table, rejecting rows whose width differs from the header.
    pub fn new<H: Into<String>>(
        header: impl IntoIterator<Item = H>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, String> {
        let header: Vec<String> = header.into_iter().map(Into::into).collect();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != header.len()) {
            return Err(format!(
                "row {} has {} columns, header has {}",
                i,
                row.len(),
                header.len()
            ));
        }
        Ok(Self {
            title: String::new(),
            header,
            rows,
            info: Info::default(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.header.len())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let col = self.column_index(name)?;
        self.rows.iter().map(|r| r.get(col)).collect()
    }

    /// Delimited text with one header line. Fields holding the separator,
    /// a quote, a line break or surrounding whitespace are double-quoted, as
    /// are text cells that would otherwise read back as numbers.
    pub fn to_delimited(&self, sep: char) -> String {
        let sep_s = sep.to_string();
        let header: Vec<Cow<'_, str>> = self
            .header
            .iter()
            .map(|h| quote_field(h, sep, false))
            .collect();
        let mut out = header.join(&sep_s);
        out.push('\n');
        for row in &self.rows {
            let line: Vec<Cow<'_, str>> = row
                .iter()
                .map(|cell| match cell {
                    Cell::Text(v) => quote_field(v, sep, infer_number(v)),
                    other => Cow::Owned(other.to_string()),
                })
                .collect();
            out.push_str(&line.join(&sep_s));
            out.push('\n');
        }
        out
    }

    /// Parse delimited text. Column types are inferred: a column is integer
    /// when every cell parses as one, float when every cell parses as a
    /// number, text otherwise. A quoted cell is always text.
    pub fn from_delimited(text: &str, sep: char, with_header: bool) -> Result<Self, String> {
        let mut records = parse_records(text, sep)?.into_iter();
        let header: Vec<String> = if with_header {
            let first = records.next().ok_or("no header line")?;
            first.into_iter().map(|f| f.value).collect()
        } else {
            Vec::new()
        };
        let raw_rows: Vec<Vec<Field>> = records.collect();
        let header = if with_header {
            header
        } else {
            let width = raw_rows.first().map_or(0, Vec::len);
            (0..width).map(|i| i.to_string()).collect()
        };
        for (i, row) in raw_rows.iter().enumerate() {
            if row.len() != header.len() {
                return Err(format!(
                    "data row {} has {} columns, header has {}",
                    i,
                    row.len(),
                    header.len()
                ));
            }
        }

        let mut rows: Vec<Vec<Cell>> = vec![Vec::with_capacity(header.len()); raw_rows.len()];
        for col in 0..header.len() {
            let values: Vec<&Field> = raw_rows.iter().map(|r| &r[col]).collect();
            for (row, cell) in rows.iter_mut().zip(infer_column(&values)) {
                row.push(cell);
            }
        }
        Table::new(header, rows)
    }
}

/// Validates row widths when a table is deserialised.
#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    title: String,
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
    #[serde(default)]
    info: Info,
}

impl TryFrom<RawTable> for Table {
    type Error = String;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let mut table = Table::new(raw.header, raw.rows)?;
        table.title = raw.title;
        table.info = raw.info;
        Ok(table)
    }
}

fn infer_number(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

fn quote_field(value: &str, sep: char, force: bool) -> Cow<'_, str> {
    let needs_quotes = force
        || value.contains([sep, '"', '\n', '\r'])
        || value.trim() != value;
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

struct Field {
    value: String,
    quoted: bool,
}

impl Field {
    fn take(buf: &mut String, quoted: &mut bool) -> Self {
        let value = if *quoted {
            std::mem::take(buf)
        } else {
            let v = buf.trim().to_string();
            buf.clear();
            v
        };
        let field = Field {
            value,
            quoted: *quoted,
        };
        *quoted = false;
        field
    }
}

fn end_record(record: &mut Vec<Field>, records: &mut Vec<Vec<Field>>) {
    let blank = record.len() == 1 && !record[0].quoted && record[0].value.is_empty();
    let fields = std::mem::take(record);
    if !blank {
        records.push(fields);
    }
}

/// Split text into records of fields. Double-quoted fields may hold the
/// separator, line breaks and `""` escaped quotes. Blank lines are skipped.
fn parse_records(text: &str, sep: char) -> Result<Vec<Vec<Field>>, String> {
    let mut records = Vec::new();
    let mut record: Vec<Field> = Vec::new();
    let mut buf = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    buf.push('"');
                }
                '"' => in_quotes = false,
                c => {
                    if c == '\n' {
                        line += 1;
                    }
                    buf.push(c);
                }
            }
            continue;
        }
        match c {
            c if c == sep => record.push(Field::take(&mut buf, &mut quoted)),
            '\n' => {
                record.push(Field::take(&mut buf, &mut quoted));
                end_record(&mut record, &mut records);
                line += 1;
            }
            '\r' => {}
            '"' if !quoted && buf.trim().is_empty() => {
                buf.clear();
                quoted = true;
                in_quotes = true;
            }
            c if quoted => {
                if !c.is_whitespace() {
                    return Err(format!("unexpected '{}' after closing quote on line {}", c, line));
                }
            }
            c => buf.push(c),
        }
    }
    if in_quotes {
        return Err(format!("unterminated quoted field on line {}", line));
    }
    if quoted || !buf.is_empty() || !record.is_empty() {
        record.push(Field::take(&mut buf, &mut quoted));
        end_record(&mut record, &mut records);
    }
    Ok(records)
}

fn infer_column(values: &[&Field]) -> Vec<Cell> {
    let text = || -> Vec<Cell> { values.iter().map(|f| Cell::Text(f.value.clone())).collect() };
    if values.iter().any(|f| f.quoted) {
        return text();
    }
    if let Ok(ints) = values.iter().map(|f| f.value.parse::<i64>()).collect::<Result<Vec<_>, _>>() {
        return ints.into_iter().map(Cell::Int).collect();
    }
    if let Ok(floats) = values.iter().map(|f| f.value.parse::<f64>()).collect::<Result<Vec<_>, _>>() {
        return floats.into_iter().map(Cell::Float).collect();
    }
    text()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_cell_types() {
        let table = Table::new(
            ["A", "B"],
            vec![
                vec![Cell::Int(1), Cell::Float(2.0)],
                vec![Cell::Int(3), Cell::Float(4.0)],
                vec![Cell::Int(5), Cell::Float(6.5)],
            ],
        )
        .unwrap();
        let text = table.to_delimited('\t');
        assert_eq!(text, "A\tB\n1\t2.0\n3\t4.0\n5\t6.5\n");
        assert_eq!(Table::from_delimited(&text, '\t', true).unwrap(), table);
    }

    #[test]
    fn test_column_mismatch() {
        let err = Table::from_delimited("A\n1\t2\n", '\t', true).unwrap_err();
        assert!(err.contains("2 columns"));
        assert!(Table::new(["A"], vec![vec![Cell::Int(1), Cell::Int(2)]]).is_err());
    }

    #[test]
    fn test_without_header() {
        let t = Table::from_delimited("x,1\ny,2\n", ',', false).unwrap();
        assert_eq!(t.header, vec!["0", "1"]);
        assert_eq!(t.get(1, "0"), Some(&Cell::Text("y".into())));
        assert_eq!(t.get(1, "1"), Some(&Cell::Int(2)));
    }

    #[test]
    fn test_mixed_numeric_column_is_float() {
        let t = Table::from_delimited("v\n1\n2.5\n", '\t', true).unwrap();
        assert_eq!(t.column("v").unwrap(), vec![&Cell::Float(1.0), &Cell::Float(2.5)]);
    }

    #[test]
    fn test_text_with_separator_and_quotes_round_trips() {
        let table = Table::new(
            ["author", "note"],
            vec![
                vec![Cell::from("Smith, J"), Cell::from("said \"hi\"")],
                vec![Cell::from("Lee"), Cell::from("two\nlines")],
                vec![Cell::from(" padded "), Cell::from("12")],
            ],
        )
        .unwrap();
        let text = table.to_delimited(',');
        assert!(text.starts_with("author,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n"));
        assert_eq!(Table::from_delimited(&text, ',', true).unwrap(), table);
    }

    #[test]
    fn test_unterminated_quote_is_an_error() {
        let err = Table::from_delimited("a,b\n\"x,1\n", ',', true).unwrap_err();
        assert!(err.contains("unterminated"), "{}", err);
        assert!(Table::from_delimited("a\n\"x\"y\n", ',', true).is_err());
    }

    #[test]
    fn test_deserialise_rejects_ragged_rows() {
        let raw = r#"{"header": ["a", "b"], "rows": [[1, 2], [3]]}"#;
        assert!(serde_json::from_str::<Table>(raw).is_err());
        let ok: Table = serde_json::from_str(r#"{"header": ["a"], "rows": [[1]]}"#).unwrap();
        assert_eq!(ok.shape(), (1, 1));
    }
}
