//! Labelled 2-D arrays: motif counts, motif frequencies, position-specific
//! scoring matrices and pairwise distances.
//!
//! All of them flatten to the long format used for tabular storage: one row
//! per cell with columns `dim-1`, `dim-2`, `value`, in row-major order.

use crate::data::seqs::Info;
use crate::data::table::{Cell, Table};
use serde::{Deserialize, Serialize};

pub const DIM_1: &str = "dim-1";
pub const DIM_2: &str = "dim-2";
pub const VALUE: &str = "value";

fn check_widths<T>(motifs: &[String], rows: &[Vec<T>]) -> Result<(), String> {
    match rows.iter().position(|r| r.len() != motifs.len()) {
        Some(i) => Err(format!(
            "row {} has {} values for {} motifs",
            i,
            rows[i].len(),
            motifs.len()
        )),
        None => Ok(()),
    }
}

fn to_strings<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Vec<String> {
    labels.into_iter().map(Into::into).collect()
}

/// Long-format table over a grid, skipping cells for which `value` is `None`.
fn long_form(
    row_labels: &[Cell],
    col_labels: &[Cell],
    value: impl Fn(usize, usize) -> Option<Cell>,
) -> Table {
    let mut rows = Vec::new();
    for (i, r) in row_labels.iter().enumerate() {
        for (j, c) in col_labels.iter().enumerate() {
            if let Some(v) = value(i, j) {
                rows.push(vec![r.clone(), c.clone(), v]);
            }
        }
    }
    Table {
        title: String::new(),
        header: to_strings([DIM_1, DIM_2, VALUE]),
        rows,
        info: Info::default(),
    }
}

/// Grid recovered from a long-format table. Labels keep first-appearance order.
struct Grid {
    rows: Vec<String>,
    cols: Vec<String>,
    values: Vec<Vec<Option<Cell>>>,
}

impl Grid {
    fn from_table(table: &Table) -> Result<Self, String> {
        let idx = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| format!("long-format table is missing column '{}'", name))
        };
        let (d1, d2, v) = (idx(DIM_1)?, idx(DIM_2)?, idx(VALUE)?);

        let mut rows: Vec<String> = Vec::new();
        let mut cols: Vec<String> = Vec::new();
        let mut cells = Vec::with_capacity(table.rows.len());
        for (n, record) in table.rows.iter().enumerate() {
            let (Some(r), Some(c), Some(value)) = (record.get(d1), record.get(d2), record.get(v)) else {
                return Err(format!("long-format row {} is too short", n));
            };
            let ri = position_or_push(&mut rows, r.to_string());
            let ci = position_or_push(&mut cols, c.to_string());
            cells.push((ri, ci, value.clone()));
        }
        let mut values = vec![vec![None; cols.len()]; rows.len()];
        for (ri, ci, cell) in cells {
            values[ri][ci] = Some(cell);
        }
        Ok(Self { rows, cols, values })
    }

    fn dense<T>(&self, convert: impl Fn(&Cell) -> Option<T>) -> Result<Vec<Vec<T>>, String> {
        let mut out = Vec::with_capacity(self.rows.len());
        for (i, row) in self.values.iter().enumerate() {
            let mut converted = Vec::with_capacity(row.len());
            for (j, cell) in row.iter().enumerate() {
                let cell = cell.as_ref().ok_or_else(|| {
                    format!("no value for ({}, {})", self.rows[i], self.cols[j])
                })?;
                converted.push(convert(cell).ok_or_else(|| {
                    format!("invalid value '{}' at ({}, {})", cell, self.rows[i], self.cols[j])
                })?);
            }
            out.push(converted);
        }
        Ok(out)
    }
}

fn position_or_push(labels: &mut Vec<String>, label: String) -> usize {
    match labels.iter().position(|l| *l == label) {
        Some(i) => i,
        None => {
            labels.push(label);
            labels.len() - 1
        }
    }
}

fn index_labels(n: usize) -> Vec<Cell> {
    (0..n as i64).map(Cell::Int).collect()
}

fn text_labels(labels: &[String]) -> Vec<Cell> {
    labels.iter().map(|l| Cell::Text(l.clone())).collect()
}

/// Deserialise through the validating constructor so a stored record with
/// ragged rows is rejected on load.
macro_rules! validated_serde {
    ($ty:ident, $raw:ident, $labels:ident, $values:ident: $value:ty) => {
        #[derive(Deserialize)]
        struct $raw {
            $labels: Vec<String>,
            $values: Vec<Vec<$value>>,
            #[serde(default)]
            info: Info,
        }

        impl TryFrom<$raw> for $ty {
            type Error = String;

            fn try_from(raw: $raw) -> Result<Self, Self::Error> {
                let mut out = $ty::new(raw.$labels, raw.$values)?;
                out.info = raw.info;
                Ok(out)
            }
        }
    };
}

validated_serde!(MotifCountsArray, RawMotifCounts, motifs, counts: i64);
validated_serde!(MotifFreqsArray, RawMotifFreqs, motifs, freqs: f64);
validated_serde!(Pssm, RawPssm, motifs, scores: f64);
validated_serde!(DistanceMatrix, RawDistances, names, dists: f64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMotifCounts")]
pub struct MotifCountsArray {
    pub motifs: Vec<String>,
    pub counts: Vec<Vec<i64>>,
    #[serde(default)]
    pub info: Info,
}

impl MotifCountsArray {
    pub fn new<S: Into<String>>(
        motifs: impl IntoIterator<Item = S>,
        counts: Vec<Vec<i64>>,
    ) -> Result<Self, String> {
        let motifs = to_strings(motifs);
        check_widths(&motifs, &counts)?;
        Ok(Self {
            motifs,
            counts,
            info: Info::default(),
        })
    }

    /// Row-normalised frequencies. Rows summing to zero stay zero.
    pub fn to_freqs(&self) -> MotifFreqsArray {
        let freqs = self
            .counts
            .iter()
            .map(|row| {
                let total: i64 = row.iter().sum();
                row.iter()
                    .map(|&c| if total == 0 { 0.0 } else { c as f64 / total as f64 })
                    .collect()
            })
            .collect();
        MotifFreqsArray {
            motifs: self.motifs.clone(),
            freqs,
            info: self.info.clone(),
        }
    }

    pub fn to_long_form(&self) -> Table {
        long_form(
            &index_labels(self.counts.len()),
            &text_labels(&self.motifs),
            |i, j| Some(Cell::Int(self.counts[i][j])),
        )
    }

    pub fn from_long_form(table: &Table) -> Result<Self, String> {
        let grid = Grid::from_table(table)?;
        let counts = grid.dense(Cell::as_i64)?;
        Self::new(grid.cols, counts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMotifFreqs")]
pub struct MotifFreqsArray {
    pub motifs: Vec<String>,
    pub freqs: Vec<Vec<f64>>,
    #[serde(default)]
    pub info: Info,
}

impl MotifFreqsArray {
    pub fn new<S: Into<String>>(
        motifs: impl IntoIterator<Item = S>,
        freqs: Vec<Vec<f64>>,
    ) -> Result<Self, String> {
        let motifs = to_strings(motifs);
        check_widths(&motifs, &freqs)?;
        if freqs.iter().flatten().any(|&p| !(0.0..=1.0).contains(&p)) {
            return Err("frequencies must lie in [0, 1]".to_string());
        }
        Ok(Self {
            motifs,
            freqs,
            info: Info::default(),
        })
    }

    pub fn to_long_form(&self) -> Table {
        long_form(
            &index_labels(self.freqs.len()),
            &text_labels(&self.motifs),
            |i, j| Some(Cell::Float(self.freqs[i][j])),
        )
    }

    pub fn from_long_form(table: &Table) -> Result<Self, String> {
        let grid = Grid::from_table(table)?;
        let freqs = grid.dense(Cell::as_f64)?;
        Self::new(grid.cols, freqs)
    }
}

/// Log2 that maps non-positive input to 0.
fn safe_log2(x: f64) -> f64 {
    if x > 0.0 { x.log2() } else { 0.0 }
}

/// Position-specific scoring matrix of log-odds scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPssm")]
pub struct Pssm {
    pub motifs: Vec<String>,
    pub scores: Vec<Vec<f64>>,
    #[serde(default)]
    pub info: Info,
}

impl Pssm {
    pub fn new<S: Into<String>>(
        motifs: impl IntoIterator<Item = S>,
        scores: Vec<Vec<f64>>,
    ) -> Result<Self, String> {
        let motifs = to_strings(motifs);
        check_widths(&motifs, &scores)?;
        Ok(Self {
            motifs,
            scores,
            info: Info::default(),
        })
    }

    /// Log-odds of `freqs` against `background` (uniform when `None`).
    pub fn from_freqs(freqs: &MotifFreqsArray, background: Option<&[f64]>) -> Result<Self, String> {
        let n = freqs.motifs.len();
        let uniform = vec![1.0 / n as f64; n];
        let background = background.unwrap_or(&uniform);
        if background.len() != n {
            return Err(format!(
                "background has {} values for {} motifs",
                background.len(),
                n
            ));
        }
        let scores = freqs
            .freqs
            .iter()
            .map(|row| {
                row.iter()
                    .zip(background)
                    .map(|(&p, &b)| safe_log2(p) - safe_log2(b))
                    .collect()
            })
            .collect();
        Ok(Self {
            motifs: freqs.motifs.clone(),
            scores,
            info: freqs.info.clone(),
        })
    }

    pub fn to_long_form(&self) -> Table {
        long_form(
            &index_labels(self.scores.len()),
            &text_labels(&self.motifs),
            |i, j| Some(Cell::Float(self.scores[i][j])),
        )
    }

    pub fn from_long_form(table: &Table) -> Result<Self, String> {
        let grid = Grid::from_table(table)?;
        let scores = grid.dense(Cell::as_f64)?;
        Self::new(grid.cols, scores)
    }
}

/// Symmetric pairwise distances between named items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDistances")]
pub struct DistanceMatrix {
    pub names: Vec<String>,
    pub dists: Vec<Vec<f64>>,
    #[serde(default)]
    pub info: Info,
}

impl DistanceMatrix {
    /// Build from a square matrix in `names` order.
    pub fn new<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
        dists: Vec<Vec<f64>>,
    ) -> Result<Self, String> {
        let names = to_strings(names);
        if dists.len() != names.len() {
            return Err(format!(
                "{} rows of distances for {} names",
                dists.len(),
                names.len()
            ));
        }
        check_widths(&names, &dists)?;
        Ok(Self {
            names,
            dists,
            info: Info::default(),
        })
    }

    /// Build from `((a, b), distance)` pairs. Names keep first-appearance
    /// order, the diagonal is zero and a missing `(b, a)` mirrors `(a, b)`.
    pub fn from_pairs<S: Into<String>>(
        pairs: impl IntoIterator<Item = ((S, S), f64)>,
    ) -> Result<Self, String> {
        let mut names: Vec<String> = Vec::new();
        let mut entries = Vec::new();
        for ((a, b), d) in pairs {
            let ai = position_or_push(&mut names, a.into());
            let bi = position_or_push(&mut names, b.into());
            entries.push((ai, bi, d));
        }
        let n = names.len();
        let mut dists = vec![vec![None; n]; n];
        for (i, row) in dists.iter_mut().enumerate() {
            row[i] = Some(0.0);
        }
        for &(a, b, d) in &entries {
            dists[a][b] = Some(d);
        }
        for &(a, b, d) in &entries {
            dists[b][a].get_or_insert(d);
        }
        let mut dense = Vec::with_capacity(n);
        for (i, row) in dists.into_iter().enumerate() {
            let mut out = Vec::with_capacity(n);
            for (j, d) in row.into_iter().enumerate() {
                out.push(d.ok_or_else(|| {
                    format!("no distance between '{}' and '{}'", names[i], names[j])
                })?);
            }
            dense.push(out);
        }
        Ok(Self {
            names,
            dists: dense,
            info: Info::default(),
        })
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.dists[i][j])
    }

    /// Long form of the off-diagonal cells.
    pub fn to_long_form(&self) -> Table {
        let labels = text_labels(&self.names);
        long_form(&labels, &labels, |i, j| {
            (i != j).then(|| Cell::Float(self.dists[i][j]))
        })
    }

    pub fn from_long_form(table: &Table) -> Result<Self, String> {
        let grid = Grid::from_table(table)?;
        let mut pairs = Vec::new();
        for (i, row) in grid.values.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                if let Some(cell) = cell {
                    let d = cell
                        .as_f64()
                        .ok_or_else(|| format!("invalid distance '{}'", cell))?;
                    pairs.push(((grid.rows[i].clone(), grid.cols[j].clone()), d));
                }
            }
        }
        Self::from_pairs(pairs)
    }
}
