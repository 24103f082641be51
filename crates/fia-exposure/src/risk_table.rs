//! Risk level table: risk types, attribute base names and ordered levels.
//!
//! The table is the CSV form of the `riskLevels` sheet. Each row holds a risk
//! type key, the attribute base name used for output fields, then the level
//! values. Blank cells are skipped.
//!
//! ```text
//! NOAA Sea Level Rise,SLR,10,9,8,7,6,5,4,3,2,1
//! FEMA Flood Percent,FEMA,10,4,2,1,0.2
//! ```

use crate::{ExposureError, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Order in which levels were authored in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceOrder {
    Ascending,
    Descending,
    /// Neither; the levels were sorted.
    Unordered,
}

/// Ordered levels of one risk type.
///
/// Index 0 is the least severe level: the lowest value for absolute levels
/// (water heights, sea level rise) and the highest value for percent levels
/// (annual chance of flooding, where 10% is a smaller flood than 0.2%).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskLevelSpec {
    pub risk_type: String,
    /// Prefix of every output field for this risk type.
    pub attribute_base_name: String,
    pub levels: Vec<f64>,
    /// Labels matched against dataset names, e.g. `0_2` for level 0.2.
    pub level_labels: Vec<String>,
    pub is_percent: bool,
    pub source_order: SourceOrder,
}

impl RiskLevelSpec {
    /// Build a spec from level values; labels use the float form (`1.0` → `1_0`).
    pub fn new(
        risk_type: impl Into<String>,
        attribute_base_name: impl Into<String>,
        levels: Vec<f64>,
    ) -> Result<Self> {
        let labelled = levels
            .into_iter()
            .map(|v| (v, level_label(v, false)))
            .collect();
        Self::from_labelled(risk_type.into(), attribute_base_name.into(), labelled)
    }

    /// Build a spec from table cells. Integer cells get integer labels.
    pub fn from_cells<S: AsRef<str>>(
        risk_type: impl Into<String>,
        attribute_base_name: impl Into<String>,
        cells: &[S],
    ) -> Result<Self> {
        let risk_type = risk_type.into();
        let mut labelled = Vec::new();
        for cell in cells {
            let text = cell.as_ref().trim();
            if text.is_empty() {
                continue;
            }
            let value: f64 = text.parse().map_err(|_| {
                ExposureError::InvalidRiskTable(format!(
                    "level '{}' of '{}' is not a number",
                    text, risk_type
                ))
            })?;
            let integral = !text.contains(['.', 'e', 'E']) && value.fract() == 0.0;
            labelled.push((value, level_label(value, integral)));
        }
        Self::from_labelled(risk_type, attribute_base_name.into(), labelled)
    }

    fn from_labelled(
        risk_type: String,
        attribute_base_name: String,
        mut labelled: Vec<(f64, String)>,
    ) -> Result<Self> {
        if labelled.is_empty() {
            return Err(ExposureError::InvalidRiskTable(format!(
                "'{}' has no levels",
                risk_type
            )));
        }
        if let Some((v, _)) = labelled.iter().find(|(v, _)| !v.is_finite()) {
            return Err(ExposureError::InvalidRiskTable(format!(
                "level {} of '{}' is not finite",
                v, risk_type
            )));
        }

        let is_percent = labelled.iter().any(|(v, _)| *v > 0.0 && *v < 1.0);
        let values: Vec<f64> = labelled.iter().map(|(v, _)| *v).collect();
        let source_order = detect_order(&values);

        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(ExposureError::InvalidRiskTable(format!(
                "'{}' has duplicate levels",
                risk_type
            )));
        }

        // Least severe first: ascending for absolute levels, descending for percent.
        let wanted = if is_percent {
            SourceOrder::Descending
        } else {
            SourceOrder::Ascending
        };
        match source_order {
            order if order == wanted => {}
            SourceOrder::Unordered => {
                warn!("Risk levels for '{}' are not in order, sorting them", risk_type);
                labelled.sort_by(|a, b| a.0.total_cmp(&b.0));
                if is_percent {
                    labelled.reverse();
                }
            }
            _ => labelled.reverse(),
        }

        let (levels, level_labels) = labelled.into_iter().unzip();
        Ok(Self {
            risk_type,
            attribute_base_name,
            levels,
            level_labels,
            is_percent,
            source_order,
        })
    }

    /// Override the percent inference; flips the severity order when it changes.
    pub fn with_percent(mut self, is_percent: bool) -> Self {
        if is_percent != self.is_percent {
            self.is_percent = is_percent;
            self.levels.reverse();
            self.level_labels.reverse();
        }
        self
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Severity index of a label.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.level_labels.iter().position(|l| l == label)
    }

    /// Level value at a severity index.
    pub fn level(&self, index: usize) -> Option<f64> {
        self.levels.get(index).copied()
    }
}

fn detect_order(values: &[f64]) -> SourceOrder {
    if values.windows(2).all(|w| w[0] < w[1]) {
        SourceOrder::Ascending
    } else if values.windows(2).all(|w| w[0] > w[1]) {
        SourceOrder::Descending
    } else {
        SourceOrder::Unordered
    }
}

/// Label of a level value: its string form with `.` replaced by `_`.
pub fn level_label(value: f64, integral: bool) -> String {
    let text = if integral {
        format!("{}", value as i64)
    } else {
        // Debug keeps the trailing `.0` on whole numbers.
        format!("{:?}", value)
    };
    text.replace('.', "_")
}

/// One row of the risk table.
#[derive(Debug, Clone, PartialEq)]
struct RiskTableRow {
    key: String,
    base_name: String,
    cells: Vec<String>,
}

/// The `riskLevels` table.
#[derive(Debug, Clone, Default)]
pub struct RiskTable {
    rows: Vec<RiskTableRow>,
}

impl RiskTable {
    /// Read the table from a CSV file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading risk table {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Read the table from CSV data without a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let mut fields = record.iter();
            let Some(key) = fields.next().filter(|k| !k.is_empty()) else {
                continue;
            };
            let base_name = fields.next().unwrap_or_default().to_string();
            rows.push(RiskTableRow {
                key: key.to_string(),
                base_name,
                cells: fields.map(str::to_string).collect(),
            });
        }
        Ok(Self { rows })
    }

    /// Risk type keys in table order.
    pub fn risk_types(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.key.as_str()).collect()
    }

    /// Levels of one risk type; the first matching row wins.
    pub fn load(&self, risk_type: &str) -> Result<RiskLevelSpec> {
        let row = self
            .rows
            .iter()
            .find(|r| r.key == risk_type)
            .ok_or_else(|| ExposureError::NoRiskTable {
                risk_type: risk_type.to_string(),
            })?;
        if row.base_name.is_empty() {
            return Err(ExposureError::InvalidRiskTable(format!(
                "'{}' has no attribute base name",
                risk_type
            )));
        }
        RiskLevelSpec::from_cells(row.key.clone(), row.base_name.clone(), &row.cells)
    }
}
