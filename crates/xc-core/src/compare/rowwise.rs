//! Row-by-row comparison of two prediction tables.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;
use xc_common::{Error, MismatchDetail, MismatchKind, Result};
use xc_config::{ColumnAlignment, ComparisonDefaults, MissingPolicy};
use xc_frame::{Cell, PredictionTable};
use xc_math::{within_tolerance, DiffMeasure};

use super::result::{ComparisonKind, ComparisonResult};

/// How two tables are compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    pub tolerance: f64,
    pub measure: DiffMeasure,
    pub missing: MissingPolicy,
    pub align: ColumnAlignment,
    /// Each row is compared with this probability; 1.0 compares all rows.
    pub sample_probability: f64,
    pub seed: u64,
    /// Restrict the comparison to these columns (by name).
    pub columns: Option<Vec<String>>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self::from_defaults(&ComparisonDefaults::default())
    }
}

impl CompareOptions {
    pub fn from_defaults(defaults: &ComparisonDefaults) -> Self {
        Self {
            tolerance: defaults.tolerance,
            measure: defaults.measure,
            missing: defaults.missing,
            align: defaults.align,
            sample_probability: defaults.sample_probability,
            seed: defaults.seed,
            columns: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_measure(mut self, measure: DiffMeasure) -> Self {
        self.measure = measure;
        self
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_align(mut self, align: ColumnAlignment) -> Self {
        self.align = align;
        self
    }

    pub fn with_sampling(mut self, probability: f64, seed: u64) -> Self {
        self.sample_probability = probability;
        self.seed = seed;
        self
    }

    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// (name for reports, column index in a, column index in b)
type ColumnPair = (String, usize, usize);

fn structural(detail: MismatchDetail) -> Error {
    Error::from(detail)
}

fn pair_columns(
    a: &PredictionTable,
    b: &PredictionTable,
    options: &CompareOptions,
) -> Result<Vec<ColumnPair>> {
    let (left, right) = (a.names(), b.names());

    let pairs: Vec<ColumnPair> = match options.align {
        ColumnAlignment::ByPosition => {
            if left.len() != right.len() {
                return Err(structural(MismatchDetail::new(
                    MismatchKind::Columns,
                    format!("{} columns {:?}", left.len(), left),
                    format!("{} columns {:?}", right.len(), right),
                )));
            }
            left.iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i, i))
                .collect()
        }
        ColumnAlignment::ByName => {
            let missing: Vec<&String> = left.iter().filter(|n| !right.contains(n)).collect();
            let extra: Vec<&String> = right.iter().filter(|n| !left.contains(n)).collect();
            if !missing.is_empty() || !extra.is_empty() {
                return Err(structural(MismatchDetail::new(
                    MismatchKind::Columns,
                    format!("columns {:?}", left),
                    format!("columns {:?} (missing {:?}, unexpected {:?})", right, missing, extra),
                )));
            }
            left.iter()
                .enumerate()
                .filter_map(|(i, name)| b.frame().position(name).map(|j| (name.clone(), i, j)))
                .collect()
        }
    };

    match &options.columns {
        None => Ok(pairs),
        Some(wanted) => wanted
            .iter()
            .map(|name| {
                pairs.iter().find(|(n, _, _)| n == name).cloned().ok_or_else(|| {
                    structural(
                        MismatchDetail::new(
                            MismatchKind::Columns,
                            format!("column '{}'", name),
                            format!("columns {:?}", left),
                        )
                        .in_column(name.clone()),
                    )
                })
            })
            .collect(),
    }
}

/// Rows to compare, in order.
fn sampled_rows(nrows: usize, probability: f64, seed: u64) -> Vec<usize> {
    if probability >= 1.0 {
        return (0..nrows).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..nrows)
        .filter(|_| rng.random::<f64>() < probability)
        .collect()
}

enum CellOutcome {
    /// Discrepancy under the measure.
    Numeric(f64),
    /// Labels (or text) compared for equality.
    Label(bool),
}

fn compare_cells(left: Cell<'_>, right: Cell<'_>, measure: DiffMeasure) -> CellOutcome {
    match (left.as_f64(), right.as_f64()) {
        (Some(x), Some(y)) => CellOutcome::Numeric(measure.apply(x, y)),
        (Some(x), None) => match label_text(right).and_then(|s| s.trim().parse::<f64>().ok()) {
            Some(y) => CellOutcome::Numeric(measure.apply(x, y)),
            None => CellOutcome::Label(false),
        },
        (None, Some(y)) => match label_text(left).and_then(|s| s.trim().parse::<f64>().ok()) {
            Some(x) => CellOutcome::Numeric(measure.apply(x, y)),
            None => CellOutcome::Label(false),
        },
        (None, None) => CellOutcome::Label(label_text(left) == label_text(right)),
    }
}

fn label_text(cell: Cell<'_>) -> Option<&str> {
    match cell {
        Cell::Label(s) | Cell::Text(s) => Some(s),
        _ => None,
    }
}

/// Compare `a` (expected) against `b` (actual) cell by cell.
///
/// Row count and column layout must match, otherwise the comparison fails
/// with a structural `ComparisonFailure` error. Value disagreements produce
/// `Ok` with `passed == false`.
pub fn compare_tables(
    a: &PredictionTable,
    b: &PredictionTable,
    options: &CompareOptions,
) -> Result<ComparisonResult> {
    compare_tables_as(ComparisonKind::Tables, a, b, options)
}

pub(crate) fn compare_tables_as(
    kind: ComparisonKind,
    a: &PredictionTable,
    b: &PredictionTable,
    options: &CompareOptions,
) -> Result<ComparisonResult> {
    if a.nrows() != b.nrows() {
        return Err(structural(MismatchDetail::new(
            MismatchKind::RowCount,
            format!("{} rows", a.nrows()),
            format!("{} rows", b.nrows()),
        )));
    }
    let pairs = pair_columns(a, b, options)?;
    let rows = sampled_rows(a.nrows(), options.sample_probability, options.seed);

    let mut result = ComparisonResult::new(kind, options.tolerance);
    result.measure = Some(options.measure);
    result.rows_skipped = a.nrows() - rows.len();

    let (fa, fb) = (a.frame(), b.frame());
    for &row in &rows {
        let missing_cells: Vec<(bool, bool)> = pairs
            .iter()
            .map(|(_, i, j)| (fa.cell(row, *i).is_missing(), fb.cell(row, *j).is_missing()))
            .collect();

        if options.missing == MissingPolicy::Exclude
            && missing_cells.iter().any(|&(l, r)| l || r)
        {
            result.rows_skipped += 1;
            continue;
        }
        result.rows_compared += 1;

        for ((name, i, j), &(left_missing, right_missing)) in pairs.iter().zip(&missing_cells) {
            let (left, right) = (fa.cell(row, *i), fb.cell(row, *j));
            if left_missing || right_missing {
                // only reachable under RequireMatchingPattern
                let matched = left_missing && right_missing;
                result.cells_compared += 1;
                let magnitude = if matched { 0.0 } else { f64::INFINITY };
                result.observe(magnitude, !matched, || {
                    MismatchDetail::new(MismatchKind::Missingness, left.to_string(), right.to_string())
                        .at_row(row)
                        .in_column(name.clone())
                        .with_magnitude(magnitude, options.tolerance)
                });
                continue;
            }

            result.cells_compared += 1;
            match compare_cells(left, right, options.measure) {
                CellOutcome::Numeric(d) => {
                    let failed = !within_tolerance(d, options.tolerance);
                    result.observe(d, failed, || {
                        MismatchDetail::new(MismatchKind::Value, left.to_string(), right.to_string())
                            .at_row(row)
                            .in_column(name.clone())
                            .with_magnitude(d, options.tolerance)
                    });
                }
                CellOutcome::Label(equal) => {
                    let magnitude = if equal { 0.0 } else { f64::INFINITY };
                    result.observe(magnitude, !equal, || {
                        MismatchDetail::new(MismatchKind::Label, left.to_string(), right.to_string())
                            .at_row(row)
                            .in_column(name.clone())
                            .with_magnitude(magnitude, options.tolerance)
                    });
                }
            }
        }
    }

    debug!(
        kind = %kind,
        passed = result.passed,
        rows_compared = result.rows_compared,
        rows_skipped = result.rows_skipped,
        max_discrepancy = result.max_discrepancy,
        "table comparison finished"
    );
    Ok(result)
}
