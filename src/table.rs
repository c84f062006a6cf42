// Append-only result tables. A row is an ordered mapping from column name to
// a scalar; a table keeps its column set in first-seen order.

use std::fmt;

#[derive(Clone, Debug)]
pub enum Value {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

// Floats compare by bit pattern so that NaN results from identical runs
// compare equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultRow {
    cells: Vec<(String, Value)>,
}

impl ResultRow {
    pub fn new() -> Self {
        ResultRow { cells: Vec::new() }
    }

    // Setting an existing column overwrites it in place.
    pub fn set<V: Into<Value>>(&mut self, column: &str, value: V) {
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| name == column) {
            Some((_, v)) => *v = value,
            None => self.cells.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(|v| v.as_f64())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        ResultTable::default()
    }

    pub fn push(&mut self, row: ResultRow) {
        for (name, _) in row.iter() {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
            }
        }
        self.rows.push(row);
    }

    // Append all rows of another table after this one's.
    pub fn append(&mut self, other: ResultTable) {
        for row in other.rows {
            self.push(row);
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Vec<Option<&Value>> {
        self.rows.iter().map(|row| row.get(name)).collect()
    }

    pub fn column_f64(&self, name: &str) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.get_f64(name).unwrap_or(f64::NAN))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_set_overwrites() {
        let mut row = ResultRow::new();
        row.set("X", 1.0);
        row.set("Object ID", 7u32);
        row.set("X", 2.0);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get_f64("X"), Some(2.0));
        assert_eq!(row.get("Object ID"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_table_column_order() {
        let mut table = ResultTable::new();
        let mut a = ResultRow::new();
        a.set("X", 1.0);
        a.set("Mean", 3.0);
        let mut b = ResultRow::new();
        b.set("X", 2.0);
        b.set("Type", "End");
        table.push(a);
        table.push(b);

        assert_eq!(table.columns(), &["X", "Mean", "Type"]);
        assert_eq!(table.column_f64("X"), vec![1.0, 2.0]);
        assert_eq!(table.column("Type")[0], None);
    }

    #[test]
    fn test_nan_values_compare_equal() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(1.0), Value::Int(1));
    }
}
