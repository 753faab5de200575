use std::{fmt, time::Duration};

use arrow::datatypes::DataType;

use crate::measure::ratio;

/// Everything one harness run measured.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub iterations: usize,
    pub sources: Vec<SourceReport>,
    pub combined: CombinedReport,
}

/// Measurements for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub backend: String,
    /// `{backend}` fetched as a whole table.
    pub full: Aggregate,
    /// `{backend}_values`, in the store's native numeric type.
    pub values: Aggregate,
    pub values_type: DataType,
    /// `{backend}` aggregated batch by batch without building the table.
    pub streamed: Aggregate,
    /// `{backend}_json`, transfer plus parsing.
    pub text: TextMeasurement,
}

impl SourceReport {
    /// How many times slower the text path was than the columnar one.
    pub fn text_slowdown(&self) -> Option<f64> {
        ratio(self.text.elapsed, self.full.elapsed)
    }
}

/// Row count and mean `value` of one measured request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub rows: usize,
    pub mean: Option<f64>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMeasurement {
    /// Records found in the parsed payload.
    pub records: usize,
    pub elapsed: Duration,
}

/// The concatenation of every source's full table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedReport {
    pub rows: usize,
    pub mean: Option<f64>,
    /// Unweighted mean of the per-source means.
    pub mean_of_means: Option<f64>,
    /// Mean computed over the value column directly.
    pub columnar: Duration,
    /// Mean computed after materializing every row.
    pub row_oriented: Duration,
}

impl CombinedReport {
    pub fn row_slowdown(&self) -> Option<f64> {
        ratio(self.row_oriented, self.columnar)
    }
}

struct Mean(Option<f64>);

impl fmt::Display for Mean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.2}"),
            None => write!(f, "-"),
        }
    }
}

struct Ratio(Option<f64>);

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.1}x"),
            None => write!(f, "n/a"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Sources ({} iteration(s)) ---", self.iterations)?;
        for s in &self.sources {
            writeln!(f, "{}", s.backend)?;
            writeln!(
                f,
                "  full:     {} rows, mean {} in {:?}",
                s.full.rows,
                Mean(s.full.mean),
                s.full.elapsed
            )?;
            writeln!(
                f,
                "  values:   {} rows ({}), mean {} in {:?}",
                s.values.rows,
                s.values_type,
                Mean(s.values.mean),
                s.values.elapsed
            )?;
            writeln!(
                f,
                "  streamed: {} rows, mean {} in {:?}",
                s.streamed.rows,
                Mean(s.streamed.mean),
                s.streamed.elapsed
            )?;
            writeln!(
                f,
                "  json:     {} records in {:?}, columnar {} faster",
                s.text.records,
                s.text.elapsed,
                Ratio(s.text_slowdown())
            )?;
        }

        let c = &self.combined;
        writeln!(f, "--- Combined ---")?;
        writeln!(
            f,
            "  {} rows, mean {}, mean of means {}",
            c.rows,
            Mean(c.mean),
            Mean(c.mean_of_means)
        )?;
        writeln!(
            f,
            "  columnar mean {:?}, row-oriented mean {:?}, columnar {} faster",
            c.columnar,
            c.row_oriented,
            Ratio(c.row_slowdown())
        )
    }
}
