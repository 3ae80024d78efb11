//! Comma-delimited tables with RFC 4180 quoting.
//!
//! Used for both the catalog's per-project dumps and the endpoint registry
//! file. The first row is always the header.

/// One data row, keyed by header name in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRecord {
    fields: Vec<(String, String)>,
}

impl TableRecord {
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Value of `column`, or the empty string when the column is absent.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub records: Vec<TableRecord>,
}

impl Table {
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|header| header == column)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn parse_table(content: &str) -> Table {
    let rows = split_rows(strip_bom(content));
    let Some((header_row, data_rows)) = rows.split_first() else {
        return Table::default();
    };

    let headers = header_row
        .iter()
        .map(|value| value.trim().to_string())
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for row in data_rows {
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        let mut fields = Vec::with_capacity(headers.len());
        for (index, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            fields.push((header.clone(), row.get(index).cloned().unwrap_or_default()));
        }
        records.push(TableRecord { fields });
    }

    Table { headers, records }
}

/// Render one CRLF-terminated row, quoting only the fields that need it.
pub fn render_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|field| quote_field(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

fn quote_field(value: &str) -> String {
    let needs_quotes = value.contains([',', '"', '\r', '\n'])
        || value.starts_with(' ')
        || value.ends_with(' ');
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn split_rows(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if quoted {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => quoted = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}
