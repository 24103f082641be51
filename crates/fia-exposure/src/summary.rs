//! Per-level totals over all features.

use crate::exposure::{level_field, slider_field};
use crate::table::ExposureTable;
use crate::{Result, RiskLevelSpec};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Totals for one level. Row 0 is the no-flood baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummaryRow {
    /// Row index; level index plus one.
    pub slider: usize,
    /// Level value, `None` for the baseline.
    pub level: Option<f64>,
    /// Features first exposed at this level or a less severe one.
    pub number_affected: usize,
    pub damage_area: f64,
    pub loss_potential: f64,
    pub volume: f64,
}

/// Per-level summary table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelSummary {
    pub rows: Vec<LevelSummaryRow>,
}

impl LevelSummary {
    /// Build the summary from a finalized table holding `Slider` and the
    /// per-level `AREA`, `LossPotential` and `Volume` fields.
    pub fn from_table(table: &ExposureTable, spec: &RiskLevelSpec, processed: &[usize]) -> Self {
        let base = spec.attribute_base_name.as_str();
        let sliders: Vec<usize> = table
            .values(&slider_field(base))
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.map(|s| s as usize))
            .collect();

        let sum_field = |label: &str, stat: &str| -> f64 {
            table
                .values(&level_field(base, label, stat))
                .unwrap_or_default()
                .iter()
                .flatten()
                .sum()
        };

        let mut rows = vec![LevelSummaryRow {
            slider: 0,
            level: None,
            number_affected: 0,
            damage_area: 0.0,
            loss_potential: 0.0,
            volume: 0.0,
        }];
        for (index, (level, label)) in spec.levels.iter().zip(&spec.level_labels).enumerate() {
            let was_processed = processed.contains(&index);
            let total = |stat: &str| if was_processed { sum_field(label, stat) } else { 0.0 };
            rows.push(LevelSummaryRow {
                slider: index + 1,
                level: Some(*level),
                number_affected: sliders.iter().filter(|s| **s <= index).count(),
                damage_area: total("AREA"),
                loss_potential: total("LossPotential"),
                volume: total("Volume"),
            });
        }
        Self { rows }
    }

    /// Write the summary as CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "Slider",
            "Level",
            "NumberAffected",
            "DamageArea",
            "LossPotential",
            "Volume",
        ])?;
        for row in &self.rows {
            csv_writer.write_record([
                row.slider.to_string(),
                row.level.map(|l| l.to_string()).unwrap_or_default(),
                row.number_affected.to_string(),
                row.damage_area.to_string(),
                row.loss_potential.to_string(),
                row.volume.to_string(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_and_sums() {
        let spec = RiskLevelSpec::new("synthetic", "SYN", vec![1.0, 2.0, 3.0]).unwrap();
        let mut table = ExposureTable::new("OBJECTID", ["a", "b", "c"]);
        table.set("a", "SYNSlider", Some(0.0));
        table.set("b", "SYNSlider", Some(2.0));
        table.set("a", "SYN1_0AREA", Some(4.0));
        table.set("a", "SYN3_0AREA", Some(5.0));
        table.set("b", "SYN3_0AREA", Some(2.5));
        table.set("b", "SYN3_0Volume", Some(1.25));

        let summary = LevelSummary::from_table(&table, &spec, &[0, 2]);
        assert_eq!(summary.rows.len(), 4);

        let baseline = &summary.rows[0];
        assert_eq!((baseline.number_affected, baseline.damage_area, baseline.level), (0, 0.0, None));

        let affected: Vec<usize> = summary.rows.iter().map(|r| r.number_affected).collect();
        assert_eq!(affected, vec![0, 1, 1, 2]);
        assert_eq!(summary.rows[1].damage_area, 4.0);
        assert_eq!(summary.rows[2].damage_area, 0.0);
        assert_eq!(summary.rows[3].damage_area, 7.5);
        assert_eq!(summary.rows[3].volume, 1.25);
        assert_eq!(summary.rows[3].loss_potential, 0.0);
    }

    #[test]
    fn test_write_csv() {
        let summary = LevelSummary {
            rows: vec![LevelSummaryRow {
                slider: 0,
                level: None,
                number_affected: 0,
                damage_area: 0.0,
                loss_potential: 0.0,
                volume: 0.0,
            }],
        };
        let mut out = Vec::new();
        summary.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Slider,Level,NumberAffected,DamageArea,LossPotential,Volume\n0,,0,0,0,0\n"
        );
    }
}
