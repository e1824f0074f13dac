//! Agreement between reference and predicted burn severity labels

use crate::types::BurnSeverity;
use ndarray::Array2;
use serde::Serialize;

/// Label of the column-sum row
pub const PREDICTED_TOTAL: &str = "Predicted Total";
/// Label of the row-sum column
pub const ACTUAL_TOTAL: &str = "Actual Total";

/// Reference (rows) x predicted (columns) counts over the burn severity classes
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    classes: Vec<BurnSeverity>,
    counts: Array2<u64>,
    ignored: usize,
}

impl ConfusionMatrix {
    /// Count label pairs. Pairs with a label outside the class vocabulary are
    /// skipped and reported by [`ConfusionMatrix::ignored`].
    pub fn from_labels(reference: &[i64], predicted: &[i64]) -> Self {
        let classes = BurnSeverity::ALL.to_vec();
        let k = classes.len();
        let mut counts = Array2::<u64>::zeros((k, k));
        let mut ignored = 0;

        if reference.len() != predicted.len() {
            log::warn!(
                "Label lengths differ ({} reference vs {} predicted); extra labels ignored",
                reference.len(),
                predicted.len()
            );
            ignored += reference.len().abs_diff(predicted.len());
        }

        for (&actual, &guess) in reference.iter().zip(predicted) {
            match (BurnSeverity::from_code(actual), BurnSeverity::from_code(guess)) {
                (Some(a), Some(p)) => {
                    counts[[class_index(a), class_index(p)]] += 1;
                }
                _ => ignored += 1,
            }
        }
        if ignored > 0 {
            log::warn!("{} label pair(s) outside the burn severity classes were ignored", ignored);
        }

        Self { classes, counts, ignored }
    }

    pub fn classes(&self) -> &[BurnSeverity] {
        &self.classes
    }

    /// k x k counts without margins
    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn ignored(&self) -> usize {
        self.ignored
    }

    pub fn count(&self, actual: BurnSeverity, predicted: BurnSeverity) -> u64 {
        self.counts[[class_index(actual), class_index(predicted)]]
    }

    /// Number of pixels per reference class
    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.rows().into_iter().map(|r| r.sum()).collect()
    }

    /// Number of pixels per predicted class
    pub fn column_totals(&self) -> Vec<u64> {
        self.counts.columns().into_iter().map(|c| c.sum()).collect()
    }

    pub fn correct(&self) -> u64 {
        self.counts.diag().sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    /// (k+1) x (k+1) table: counts, a row of column totals and a column of
    /// row totals. The corner cell is `None`.
    pub fn margin_table(&self) -> Vec<Vec<Option<u64>>> {
        let row_totals = self.row_totals();
        let mut table: Vec<Vec<Option<u64>>> = self
            .counts
            .rows()
            .into_iter()
            .zip(&row_totals)
            .map(|(row, &total)| row.iter().map(|&c| Some(c)).chain(Some(Some(total))).collect())
            .collect();
        table.push(self.column_totals().into_iter().map(Some).chain(Some(None)).collect());
        table
    }

    /// [`ConfusionMatrix::margin_table`] with the empty corner filled with 0
    pub fn with_margins(&self) -> Array2<u64> {
        let table = self.margin_table();
        let n = table.len();
        Array2::from_shape_fn((n, n), |(i, j)| table[i][j].unwrap_or(0))
    }

    /// Row labels of the margin table
    pub fn row_labels(&self) -> Vec<String> {
        self.classes
            .iter()
            .map(|c| c.label().to_string())
            .chain(std::iter::once(PREDICTED_TOTAL.to_string()))
            .collect()
    }

    /// Column labels of the margin table
    pub fn column_labels(&self) -> Vec<String> {
        self.classes
            .iter()
            .map(|c| c.label().to_string())
            .chain(std::iter::once(ACTUAL_TOTAL.to_string()))
            .collect()
    }
}

fn class_index(class: BurnSeverity) -> usize {
    (class.code() - 1) as usize
}

/// Per-class scores in percent, rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub class: BurnSeverity,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Precision/recall/F1 for every class of the vocabulary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsTable {
    pub rows: Vec<ClassMetrics>,
    /// Classes with an undefined ratio (absent from reference or prediction)
    pub degenerate_classes: Vec<BurnSeverity>,
}

impl MetricsTable {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let row_totals = cm.row_totals();
        let column_totals = cm.column_totals();
        let mut rows = Vec::with_capacity(cm.classes().len());
        let mut degenerate_classes = Vec::new();

        for (i, &class) in cm.classes().iter().enumerate() {
            let hits = cm.counts()[[i, i]] as f64;
            let precision = hits / column_totals[i] as f64;
            let recall = hits / row_totals[i] as f64;
            let f1 = 2.0 * precision * recall / (precision + recall);

            if !(precision.is_finite() && recall.is_finite() && f1.is_finite()) {
                log::debug!("Class {} has an undefined ratio; filling with 0", class);
                degenerate_classes.push(class);
            }

            rows.push(ClassMetrics {
                class,
                precision: percent(precision),
                recall: percent(recall),
                f1: percent(f1),
            });
        }

        Self { rows, degenerate_classes }
    }

    pub fn get(&self, class: BurnSeverity) -> Option<&ClassMetrics> {
        self.rows.iter().find(|r| r.class == class)
    }

    /// (class label, precision, recall, F1) per class, vocabulary order
    pub fn labelled_rows(&self) -> Vec<(String, f64, f64, f64)> {
        self.rows
            .iter()
            .map(|m| (m.class.label().to_string(), m.precision, m.recall, m.f1))
            .collect()
    }
}

/// Ratio as a percentage rounded to 2 decimals; undefined ratios become 0
fn percent(ratio: f64) -> f64 {
    if ratio.is_finite() {
        (ratio * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    }
}

/// Confusion matrix and metrics table for one (reference, prediction) pairing
pub fn confusion_and_metrics(reference: &[i64], predicted: &[i64]) -> (ConfusionMatrix, MetricsTable) {
    let cm = ConfusionMatrix::from_labels(reference, predicted);
    let metrics = MetricsTable::from_confusion(&cm);
    log::info!(
        "Agreement: {}/{} pixels ({} degenerate classes)",
        cm.correct(),
        cm.total(),
        metrics.degenerate_classes.len()
    );
    (cm, metrics)
}
