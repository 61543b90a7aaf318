/// Minimal delimited-text reader for the static input tables (GIS feature
/// export, GeoNames city list).
///
/// Handles a header row, `,` or `;` delimiters (sniffed from the header),
/// double-quoted fields with `""` escapes, a UTF-8 BOM and blank lines.
/// Quoted fields spanning several lines are not supported; neither input
/// needs them.
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Table {
    columns: HashMap<String, usize>,
    rows: Vec<(usize, Vec<String>)>,
}

/// One data row with by-name column access.
pub struct Row<'a> {
    table: &'a Table,
    fields: &'a [String],
    /// 1-based line number in the source text, for error messages.
    pub line: usize,
}

impl Table {
    pub fn parse(text: &str) -> Result<Table, String> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines.next().ok_or("table is empty")?;
        let delimiter = sniff_delimiter(header);
        let columns = split_line(header, delimiter)
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();

        let rows = lines
            .map(|(i, line)| (i + 1, split_line(line, delimiter)))
            .collect();

        Ok(Table { columns, rows })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Fails with the first missing column name.
    pub fn require_columns(&self, names: &[&str]) -> Result<(), String> {
        match names.iter().find(|n| !self.has_column(n)) {
            Some(missing) => Err(format!("missing column '{}'", missing)),
            None => Ok(()),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |(line, fields)| Row {
            table: self,
            fields,
            line: *line,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<'a> Row<'a> {
    /// Trimmed field by column name; `None` when the column or cell is
    /// missing or blank.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = *self.table.columns.get(column)?;
        let value = self.fields.get(idx)?.trim();
        if value.is_empty() { None } else { Some(value) }
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column)?.parse().ok().filter(|v: &f64| v.is_finite())
    }
}

fn sniff_delimiter(header: &str) -> char {
    let commas = header.matches(',').count();
    let semicolons = header.matches(';').count();
    if semicolons > commas { ';' } else { ',' }
}

fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}
