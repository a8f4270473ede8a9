//! Tabular RDC input.
//!
//! The format is plain text with one spin pair per row: comment lines
//! (starting with '#') and blank lines are stripped, columns are separated
//! by whitespace or a custom separator, and the column positions of the two
//! spin IDs, the value, and the error are configurable (1-based). A literal
//! "None" marks a missing value or error.

use crate::core::models::context::AnalysisContext;
use crate::core::models::spin::{RdcDataType, RdcDatum, unit_conversion_factor};
use std::io::BufRead;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error while reading RDC data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse '{token}' as a number on line {line}")]
    MalformedNumber { line: usize, token: String },

    #[error("No RDC data could be read for alignment '{align_id}'")]
    NoData { align_id: String },
}

/// Column layout and interpretation of one RDC table.
#[derive(Debug, Clone)]
pub struct RdcTableConfig {
    /// 1-based column indices.
    pub spin_id1_col: usize,
    pub spin_id2_col: usize,
    pub value_col: Option<usize>,
    pub error_col: Option<usize>,
    /// `None` splits on whitespace.
    pub separator: Option<char>,
    pub data_type: RdcDataType,
    pub absolute: bool,
}

impl Default for RdcTableConfig {
    fn default() -> Self {
        Self {
            spin_id1_col: 1,
            spin_id2_col: 2,
            value_col: Some(3),
            error_col: Some(4),
            separator: None,
            data_type: RdcDataType::D,
            absolute: false,
        }
    }
}

/// Reads RDC values for one alignment into the context, returning the number
/// of data points stored.
///
/// Rows whose spin pair cannot be resolved are skipped with a warning. A row
/// with an error of exactly zero deselects the pair, since a zero variance
/// cannot enter the chi-squared statistic. Values are converted to the
/// canonical 'D' representation on storage.
pub fn read_rdc<R: BufRead>(
    context: &mut AnalysisContext,
    align_id: &str,
    reader: R,
    config: &RdcTableConfig,
) -> Result<usize, TableError> {
    let factor = unit_conversion_factor(config.data_type);
    let mut count = 0;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = match config.separator {
            Some(sep) => trimmed.split(sep).map(str::trim).collect(),
            None => trimmed.split_whitespace().collect(),
        };

        let column = |index: usize| fields.get(index - 1).copied();

        let (Some(id1), Some(id2)) = (column(config.spin_id1_col), column(config.spin_id2_col))
        else {
            warn!(line = line_number + 1, "row is missing the spin ID columns, skipping");
            continue;
        };

        let value = match config.value_col.and_then(column) {
            Some(token) => parse_optional(token, line_number + 1)?,
            None => None,
        };
        let error = match config.error_col.and_then(column) {
            Some(token) => parse_optional(token, line_number + 1)?,
            None => None,
        };

        let Some(pair) = context.pair_mut(id1, id2) else {
            warn!(spin_id1 = id1, spin_id2 = id2, "no interatomic pair for the spin IDs, skipping row");
            continue;
        };

        if error == Some(0.0) {
            warn!(
                spin_id1 = id1,
                spin_id2 = id2,
                "the RDC error is zero, deselecting the pair"
            );
            pair.select = false;
            continue;
        }

        let mut datum = RdcDatum::new(value.map(|v| v * factor), error.map(|e| e * factor));
        datum.data_type = config.data_type;
        datum.absolute = config.absolute;
        pair.rdc.insert(align_id.to_string(), datum);
        count += 1;
    }

    if count == 0 {
        return Err(TableError::NoData {
            align_id: align_id.to_string(),
        });
    }

    context.add_rdc_id(align_id);
    Ok(count)
}

fn parse_optional(token: &str, line: usize) -> Result<Option<f64>, TableError> {
    if token == "None" {
        return Ok(None);
    }
    token
        .parse::<f64>()
        .map(Some)
        .map_err(|_| TableError::MalformedNumber {
            line,
            token: token.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::spin::InteratomicPair;
    use std::io::Cursor;

    fn context_with_pairs(pairs: &[(&str, &str)]) -> AnalysisContext {
        let mut context = AnalysisContext::new();
        for (id1, id2) in pairs {
            context.pairs.push(InteratomicPair::new(id1, id2));
        }
        context
    }

    #[test]
    fn reads_whitespace_separated_rows_with_comments() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H"), (":2@N", ":2@H")]);
        let input = "\
# spin1    spin2     value    error
:1@N       :1@H      10.5     1.0

:2@N       :2@H      -4.2     0.5
";
        let count = read_rdc(
            &mut context,
            "Dy",
            Cursor::new(input),
            &RdcTableConfig::default(),
        )
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(context.rdc_ids, vec!["Dy".to_string()]);

        let datum = &context.pair(":1@N", ":1@H").unwrap().rdc["Dy"];
        assert_eq!(datum.value, Some(10.5));
        assert_eq!(datum.error, Some(1.0));
    }

    #[test]
    fn none_literal_is_a_missing_value() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H")]);
        let input = ":1@N :1@H None 1.0\n";
        read_rdc(
            &mut context,
            "Dy",
            Cursor::new(input),
            &RdcTableConfig::default(),
        )
        .unwrap();
        let datum = &context.pair(":1@N", ":1@H").unwrap().rdc["Dy"];
        assert_eq!(datum.value, None);
        assert_eq!(datum.error, Some(1.0));
    }

    #[test]
    fn zero_error_deselects_the_pair() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H"), (":2@N", ":2@H")]);
        let input = ":1@N :1@H 10.5 0.0\n:2@N :2@H 1.0 0.5\n";
        let count = read_rdc(
            &mut context,
            "Dy",
            Cursor::new(input),
            &RdcTableConfig::default(),
        )
        .unwrap();
        assert_eq!(count, 1);
        assert!(!context.pair(":1@N", ":1@H").unwrap().select);
        assert!(context.pair(":1@N", ":1@H").unwrap().rdc.is_empty());
    }

    #[test]
    fn unresolved_spin_ids_are_skipped_with_remaining_rows_kept() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H")]);
        let input = ":9@N :9@H 3.0 0.1\n:1@N :1@H 1.0 0.1\n";
        let count = read_rdc(
            &mut context,
            "Dy",
            Cursor::new(input),
            &RdcTableConfig::default(),
        )
        .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn two_d_data_is_halved_on_read() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H")]);
        let config = RdcTableConfig {
            data_type: RdcDataType::TwoD,
            ..Default::default()
        };
        read_rdc(&mut context, "Dy", Cursor::new(":1@N :1@H 10.0 1.0\n"), &config).unwrap();
        let datum = &context.pair(":1@N", ":1@H").unwrap().rdc["Dy"];
        assert_eq!(datum.value, Some(5.0));
        assert_eq!(datum.error, Some(0.5));
    }

    #[test]
    fn custom_separator_and_column_layout() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H")]);
        let config = RdcTableConfig {
            spin_id1_col: 2,
            spin_id2_col: 3,
            value_col: Some(4),
            error_col: Some(5),
            separator: Some(','),
            ..Default::default()
        };
        read_rdc(
            &mut context,
            "Dy",
            Cursor::new("row1, :1@N, :1@H, 2.5, 0.2\n"),
            &config,
        )
        .unwrap();
        let datum = &context.pair(":1@N", ":1@H").unwrap().rdc["Dy"];
        assert_eq!(datum.value, Some(2.5));
    }

    #[test]
    fn malformed_number_is_a_hard_error() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H")]);
        let err = read_rdc(
            &mut context,
            "Dy",
            Cursor::new(":1@N :1@H ten 0.1\n"),
            &RdcTableConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TableError::MalformedNumber { line: 1, .. }));
    }

    #[test]
    fn zero_parsed_rows_is_an_error() {
        let mut context = context_with_pairs(&[(":1@N", ":1@H")]);
        let err = read_rdc(
            &mut context,
            "Dy",
            Cursor::new("# only comments\n"),
            &RdcTableConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TableError::NoData { .. }));
    }
}
