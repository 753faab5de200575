//! A collection of testing functions for table based code
use std::sync::Arc;

use arrow::{
    array::{Float64Array, Int64Array, StringArray, TimestampMicrosecondArray},
    record_batch::RecordBatch,
};

use crate::{Table, canonical_schema};

/// Timestamp shared by every row of [`sensor_table`]:
/// 2024-01-01T00:00:00 in microseconds.
pub const FIXTURE_TIMESTAMP_MICROS: i64 = 1_704_067_200_000_000;

/// Build a canonical-schema table from `(id, name, value)` triples, all
/// stamped with [`FIXTURE_TIMESTAMP_MICROS`].
pub fn sensor_table(rows: &[(i64, &str, f64)]) -> Table {
    Table::from_batch(sensor_batch(rows))
}

pub fn sensor_batch(rows: &[(i64, &str, f64)]) -> RecordBatch {
    RecordBatch::try_new(
        canonical_schema(),
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.1))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.2))),
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                rows.iter().map(|_| FIXTURE_TIMESTAMP_MICROS),
            )),
        ],
    )
    .expect("fixture batch matches the canonical schema")
}

/// Pretty-print `batches` the way [`assert_batches_eq`] compares them.
pub fn format_batches(batches: &[RecordBatch]) -> String {
    arrow::util::pretty::pretty_format_batches(batches)
        .expect("formatting record batches")
        .to_string()
}

/// Compares the formatted output with the pretty formatted results of
/// record batches. This is a macro so errors appear on the correct line
///
/// Designed so that failure output can be directly copy/pasted
/// into the test code as expected results.
///
/// Expects to be called about like this:
/// assert_batches_eq(expected_lines: &[&str], chunks: &[RecordBatch])
#[macro_export]
macro_rules! assert_batches_eq {
    ($EXPECTED_LINES: expr, $CHUNKS: expr) => {
        let expected_lines: Vec<String> =
            $EXPECTED_LINES.into_iter().map(|s| s.to_string()).collect();

        let formatted = $crate::test_util::format_batches($CHUNKS);

        let actual_lines = formatted.trim().split('\n').collect::<Vec<_>>();

        assert_eq!(
            expected_lines, actual_lines,
            "\n\nexpected:\n\n{:#?}\nactual:\n\n{:#?}\n\n",
            expected_lines, actual_lines
        );
    };
}

/// Compares formatted output of a record batch with an expected
/// vector of strings in a way that order does not matter.
///
/// `assert_batches_sorted_eq!(expected_lines: &[&str], batches: &[RecordBatch])`
#[macro_export]
macro_rules! assert_batches_sorted_eq {
    ($EXPECTED_LINES: expr, $CHUNKS: expr) => {
        let mut expected_lines: Vec<String> = $EXPECTED_LINES.iter().map(|&s| s.into()).collect();

        // sort except for header + footer
        let num_lines = expected_lines.len();
        if num_lines > 3 {
            expected_lines.as_mut_slice()[2..num_lines - 1].sort_unstable()
        }

        let formatted = $crate::test_util::format_batches($CHUNKS);

        let mut actual_lines: Vec<&str> = formatted.trim().lines().collect();

        // sort except for header + footer
        let num_lines = actual_lines.len();
        if num_lines > 3 {
            actual_lines.as_mut_slice()[2..num_lines - 1].sort_unstable()
        }

        assert_eq!(
            expected_lines, actual_lines,
            "\n\nexpected:\n\n{:#?}\nactual:\n\n{:#?}\n\n",
            expected_lines, actual_lines
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_pretty_prints() {
        let table = sensor_table(&[(1, "Sensor_1", 20.0), (2, "Sensor_2", 40.0)]);
        assert_batches_eq!(
            [
                "+----+----------+-------+---------------------+",
                "| id | name     | value | timestamp           |",
                "+----+----------+-------+---------------------+",
                "| 1  | Sensor_1 | 20.0  | 2024-01-01T00:00:00 |",
                "| 2  | Sensor_2 | 40.0  | 2024-01-01T00:00:00 |",
                "+----+----------+-------+---------------------+",
            ],
            table.batches()
        );
    }
}
