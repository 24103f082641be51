//! Wide attribute table keyed by feature id.

use crate::Result;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Double,
    Integer,
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    field_type: FieldType,
    values: Vec<Option<f64>>,
}

/// Table with one row per feature and nullable numeric fields.
///
/// Rows keep the order in which ids were given; fields keep the order in
/// which they were added.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureTable {
    id_field: String,
    ids: Vec<String>,
    rows: HashMap<String, usize>,
    columns: Vec<Column>,
}

impl ExposureTable {
    /// Create a table with the given feature ids and no fields.
    ///
    /// Repeated ids are kept once.
    pub fn new<I, S>(id_field: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self {
            id_field: id_field.into(),
            ids: Vec::new(),
            rows: HashMap::new(),
            columns: Vec::new(),
        };
        for id in ids {
            let id = id.into();
            if !table.rows.contains_key(&id) {
                table.rows.insert(id.clone(), table.ids.len());
                table.ids.push(id);
            }
        }
        table
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Field names in order.
    pub fn fields(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Add a field of nulls; an existing field is left as is.
    pub fn add_field(&mut self, name: &str, field_type: FieldType) {
        if !self.has_field(name) {
            self.columns.push(Column {
                name: name.to_string(),
                field_type,
                values: vec![None; self.ids.len()],
            });
        }
    }

    /// Set a value, adding the field as `Double` if needed. Unknown ids are ignored.
    pub fn set(&mut self, id: &str, field: &str, value: Option<f64>) {
        let Some(&row) = self.rows.get(id) else {
            return;
        };
        self.add_field(field, FieldType::Double);
        if let Some(column) = self.column_mut(field) {
            column.values[row] = value;
        }
    }

    pub fn get(&self, id: &str, field: &str) -> Option<f64> {
        let row = *self.rows.get(id)?;
        self.column(field)?.values[row]
    }

    /// Values of a field in row order.
    pub fn values(&self, field: &str) -> Option<&[Option<f64>]> {
        self.column(field).map(|c| c.values.as_slice())
    }

    /// Remove a field; returns whether it existed.
    pub fn drop_field(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        self.columns.len() != before
    }

    /// Copy every field of `other` into this table, matching rows by id.
    ///
    /// Rows of `other` without a counterpart are ignored; rows of this table
    /// missing from `other` get nulls. Fields already present are overwritten.
    pub fn join(&mut self, other: &ExposureTable) {
        for column in &other.columns {
            self.add_field(&column.name, column.field_type);
            let mut values = vec![None; self.ids.len()];
            for (id, &row) in &self.rows {
                if let Some(&other_row) = other.rows.get(id) {
                    values[row] = column.values[other_row];
                }
            }
            if let Some(target) = self.column_mut(&column.name) {
                target.field_type = column.field_type;
                target.values = values;
            }
        }
    }

    /// Write the table as CSV with the id as first column. Nulls are empty cells.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        let mut header = vec![self.id_field.as_str()];
        header.extend(self.columns.iter().map(|c| c.name.as_str()));
        csv_writer.write_record(&header)?;

        for (row, id) in self.ids.iter().enumerate() {
            let mut record = vec![id.clone()];
            record.extend(
                self.columns
                    .iter()
                    .map(|c| format_value(c.values[row], c.field_type)),
            );
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

fn format_value(value: Option<f64>, field_type: FieldType) -> String {
    match (value, field_type) {
        (None, _) => String::new(),
        (Some(v), FieldType::Integer) => format!("{}", v.round() as i64),
        (Some(v), FieldType::Double) => format!("{}", v),
    }
}
