//! Test utilities for xc-core.
//!
//! This module provides:
//! - Assertion macros
//! - Synthetic datasets shaped like the survival, logistic and anomaly
//!   fixtures the checks were calibrated on
//! - Deterministic predictors for [`MemoryBackend`](crate::backend::MemoryBackend)

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use xc_common::Result;
use xc_frame::{Column, Frame, PredictionTable};

use crate::backend::memory::numeric_values;
use crate::backend::TrainedModelHandle;

// ============================================================================
// Macros
// ============================================================================

/// Assert that two floating point numbers are approximately equal.
#[macro_export]
macro_rules! assert_approx_eq {
    ($a:expr, $b:expr) => {
        $crate::assert_approx_eq!($a, $b, 1e-9_f64)
    };
    ($a:expr, $b:expr, $epsilon:expr) => {{
        let a: f64 = $a;
        let b: f64 = $b;
        let eps: f64 = $epsilon;
        let diff = (a - b).abs();
        if !(diff <= eps) {
            panic!(
                "assertion failed: `(left ~= right)` (left: `{}`, right: `{}`, diff: `{}`, epsilon: `{}`)",
                a, b, diff, eps
            );
        }
    }};
}

// ============================================================================
// Fixtures
// ============================================================================

pub const HEART_FILE: &str = "heart_random_num_enum_cols.csv";
pub const HEART_NA_FILE: &str = "heart_random_num_enum_cols_NAs.csv";
pub const PROSTATE_FILE: &str = "prostate.csv";
pub const ANOMALY_FILE: &str = "anomaly.csv";

/// Rows in the heart fixture.
pub const HEART_ROWS: usize = 172;

/// Rows in the anomaly fixture; row 0 is the planted outlier.
pub const ANOMALY_ROWS: usize = 500;

fn write_fixture(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    if let Err(err) = std::fs::write(&path, body) {
        panic!("cannot write fixture {}: {}", path.display(), err);
    }
    path
}

/// Survival data with counting-process intervals, two random numeric and two
/// random enum columns. With `with_na`, some `age` and `C2` cells are empty.
pub fn write_heart_fixture(dir: &Path, with_na: bool) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(0x4EA7);
    let mut body = String::from("start,stop,event,age,year,surgery,transplant,C1,C2,C3,C4\n");
    let enum2 = ["a", "b", "c"];
    let enum4 = ["low", "mid", "high", "max"];
    for i in 0..HEART_ROWS {
        let start = rng.random_range(0..40u32);
        let stop = start + rng.random_range(1..400u32);
        let event = u8::from(rng.random::<f64>() < 0.6);
        let age = if with_na && i % 9 == 4 {
            "NA".to_string()
        } else {
            format!("{:.4}", rng.random_range(-25.0..20.0))
        };
        let year = format!("{:.4}", rng.random_range(0.0..6.5));
        let surgery = u8::from(rng.random::<f64>() < 0.2);
        let transplant = u8::from(rng.random::<f64>() < 0.5);
        let c1 = format!("{:.4}", rng.random_range(-1.0..1.0));
        let c2 = if with_na && i % 13 == 6 {
            ""
        } else {
            enum2[rng.random_range(0..enum2.len())]
        };
        let c3 = format!("{:.4}", rng.random_range(0.0..10.0));
        let c4 = enum4[rng.random_range(0..enum4.len())];
        body.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{}\n",
            start, stop, event, age, year, surgery, transplant, c1, c2, c3, c4
        ));
    }
    let name = if with_na { HEART_NA_FILE } else { HEART_FILE };
    write_fixture(dir, name, &body)
}

/// Binary response `CAPSULE` with numeric covariates.
pub fn write_prostate_fixture(dir: &Path) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(0x9057);
    let mut body = String::from("ID,CAPSULE,AGE,RACE,DPROS,DCAPS,PSA,VOL,GLEASON\n");
    for id in 1..=380 {
        let age = rng.random_range(47..80u32);
        let race = rng.random_range(0..3u32);
        let dpros = rng.random_range(1..5u32);
        let dcaps = rng.random_range(1..3u32);
        let psa = rng.random_range(0.3..140.0f64);
        let vol = rng.random_range(0.0..97.6f64);
        let gleason = rng.random_range(0..10u32);
        let eta = -6.0 + 0.35 * f64::from(dpros) + 0.03 * psa + 0.6 * f64::from(gleason);
        let capsule = u8::from(rng.random::<f64>() < sigmoid(eta));
        body.push_str(&format!(
            "{},{},{},{},{},{},{:.1},{:.1},{}\n",
            id, capsule, age, race, dpros, dcaps, psa, vol, gleason
        ));
    }
    write_fixture(dir, PROSTATE_FILE, &body)
}

/// Two-dimensional points in the unit square with an outlier at row 0.
pub fn write_anomaly_fixture(dir: &Path) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(0xBEEF);
    let mut body = String::from("x,y\n8.0,8.0\n");
    for _ in 1..ANOMALY_ROWS {
        body.push_str(&format!(
            "{:.5},{:.5}\n",
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0)
        ));
    }
    write_fixture(dir, ANOMALY_FILE, &body)
}

// ============================================================================
// Predictors
// ============================================================================

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// Fixed pseudo-coefficient for a model term.
fn coefficient(term: &str) -> f64 {
    let h = term
        .bytes()
        .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    (f64::from(h % 200) - 100.0) / 1000.0
}

/// Design-matrix columns for one predictor.
///
/// Categorical columns whose labels all parse as numbers are used as
/// numbers, so a coerced 0/1 column and the same column re-read from CSV
/// produce the same term. Other categoricals expand to indicators for every
/// level but the first.
fn features(frame: &Frame, name: &str) -> Result<Vec<(String, Vec<f64>)>> {
    let column = frame.column(name)?;
    let labels = match column {
        Column::Categorical(labels) | Column::Str(labels) => labels,
        other => return Ok(vec![(name.to_string(), numeric_values(other))]),
    };
    if labels.iter().flatten().all(|l| l.parse::<f64>().is_ok()) {
        return Ok(vec![(name.to_string(), numeric_values(column))]);
    }
    let levels: BTreeSet<&str> = labels.iter().filter_map(|l| l.as_deref()).collect();
    Ok(levels
        .into_iter()
        .skip(1)
        .map(|level| {
            let indicator = labels
                .iter()
                .map(|l| match l.as_deref() {
                    None => f64::NAN,
                    Some(v) if v == level => 1.0,
                    Some(_) => 0.0,
                })
                .collect();
            (format!("{}.{}", name, level), indicator)
        })
        .collect())
}

/// Linear predictor over main effects and interaction pairs. Interaction
/// terms are keyed by their sorted member names, so pair order does not
/// change the result.
fn linear_predictor(frame: &Frame, model: &TrainedModelHandle) -> Result<Vec<f64>> {
    let mut eta = vec![0.0; frame.nrows()];
    let mut add = |term: &str, values: &[f64]| {
        let beta = coefficient(term);
        for (e, v) in eta.iter_mut().zip(values) {
            *e += beta * v;
        }
    };

    for name in model.config.effective_predictors(&frame.schema()) {
        for (term, values) in features(frame, &name)? {
            add(&term, &values);
        }
    }
    for pair in &model.config.interaction_pairs {
        let (left, right) = (features(frame, &pair.0)?, features(frame, &pair.1)?);
        for (lt, lv) in &left {
            for (rt, rv) in &right {
                let mut members = [lt.as_str(), rt.as_str()];
                members.sort_unstable();
                let product: Vec<f64> = lv.iter().zip(rv).map(|(a, b)| a * b).collect();
                add(&members.join(":"), &product);
            }
        }
    }
    Ok(eta)
}

/// Survival model: a single `lp` column.
pub fn coxph_predictor(frame: &Frame, model: &TrainedModelHandle) -> Result<PredictionTable> {
    Ok(PredictionTable::from_values("lp", linear_predictor(frame, model)?))
}

/// Logistic model: `predict`, `p0`, `p1`.
pub fn logistic_predictor(frame: &Frame, model: &TrainedModelHandle) -> Result<PredictionTable> {
    let p1: Vec<f64> = linear_predictor(frame, model)?
        .into_iter()
        .map(sigmoid)
        .collect();
    let predict: Vec<f64> = p1
        .iter()
        .map(|p| if p.is_nan() { f64::NAN } else { f64::from(u8::from(*p > 0.5)) })
        .collect();
    let p0: Vec<f64> = p1.iter().map(|p| 1.0 - p).collect();
    Ok(Frame::new(vec![
        ("predict".to_string(), Column::from_f64(predict)),
        ("p0".to_string(), Column::from_f64(p0)),
        ("p1".to_string(), Column::from_f64(p1)),
    ])?
    .into())
}

/// Isolation-style anomaly score: grows with distance from the origin, plus
/// seeded per-row jitter so refits with the same seed agree exactly.
pub fn anomaly_predictor(frame: &Frame, model: &TrainedModelHandle) -> Result<PredictionTable> {
    let names = model.config.effective_predictors(&frame.schema());
    let columns = names
        .iter()
        .map(|n| frame.column(n).map(numeric_values))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let seed = model.config.seed.unwrap_or(0) as u64;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut scores = Vec::with_capacity(frame.nrows());
    let mut lengths = Vec::with_capacity(frame.nrows());
    for row in 0..frame.nrows() {
        let r2: f64 = columns.iter().map(|c| c[row] * c[row]).sum();
        let score = 0.4 + 0.6 * (1.0 - (-r2 / 20.0).exp()) + 0.01 * rng.random::<f64>();
        scores.push(score);
        lengths.push(8.0 * (1.0 - score));
    }
    Ok(Frame::new(vec![
        ("anomaly_score".to_string(), Column::from_f64(scores)),
        ("mean_length".to_string(), Column::from_f64(lengths)),
    ])?
    .into())
}
