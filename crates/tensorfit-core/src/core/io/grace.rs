//! Measured versus back-calculated RDC correlation plots.

use crate::core::models::context::AnalysisContext;
use crate::core::models::spin::{RdcDataType, unit_conversion_factor};
use std::io;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Plot file write failed: {0}")]
    Io(#[from] io::Error),

    #[error("No RDC data is available for the correlation plot")]
    NoData,
}

/// The output dialect of the correlation plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotFormat {
    #[default]
    Grace,
    Text,
}

/// One plotted point, in the external representation of its data type.
struct PlotPoint {
    spin_id1: String,
    spin_id2: String,
    back_calc: f64,
    value: f64,
    error: Option<f64>,
}

/// One per-alignment data set.
struct PlotSet {
    align_id: String,
    q_factor: Option<f64>,
    points: Vec<PlotPoint>,
}

fn collect_sets(context: &AnalysisContext) -> Vec<PlotSet> {
    let mut sets = Vec::new();
    for align_id in &context.rdc_ids {
        let mut points = Vec::new();
        for pair in &context.pairs {
            if !pair.select {
                continue;
            }
            let Some(datum) = pair.rdc.get(align_id) else {
                continue;
            };
            let (Some(value), Some(back_calc)) = (datum.value, datum.back_calc) else {
                continue;
            };

            // Back out the internal representation on write.
            let factor = unit_conversion_factor(datum.data_type);
            let mut value = value / factor;
            let mut back_calc = back_calc / factor;

            // T = J + D data is plotted as the residual coupling alone.
            if datum.data_type == RdcDataType::T && !datum.absolute {
                let Some(j) = pair.j_coupling else {
                    warn!(
                        spin_id1 = %pair.spin_id1,
                        spin_id2 = %pair.spin_id2,
                        "Skipping a T-type point with no scalar coupling"
                    );
                    continue;
                };
                value -= j;
                back_calc -= j;
            }
            if datum.absolute {
                value = value.abs();
                back_calc = back_calc.abs();
            }

            points.push(PlotPoint {
                spin_id1: pair.spin_id1.clone(),
                spin_id2: pair.spin_id2.clone(),
                back_calc,
                value,
                error: datum.error.map(|e| e / factor),
            });
        }
        if points.is_empty() {
            continue;
        }
        sets.push(PlotSet {
            align_id: align_id.clone(),
            q_factor: context.q_rdc_norm2.get(align_id).copied(),
            points,
        });
    }
    sets
}

fn world_bounds(sets: &[PlotSet]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for set in sets {
        for point in &set.points {
            min = min.min(point.value).min(point.back_calc);
            max = max.max(point.value).max(point.back_calc);
        }
    }
    (min.floor(), max.ceil())
}

fn write_grace<W: io::Write>(sets: &[PlotSet], writer: &mut W) -> Result<(), PlotError> {
    let (min, max) = world_bounds(sets);
    let any_errors = sets
        .iter()
        .any(|set| set.points.iter().any(|p| p.error.is_some()));

    writeln!(writer, "@version 50121")?;
    writeln!(writer, "@with g0")?;
    writeln!(writer, "@    world {min}, {min}, {max}, {max}")?;
    writeln!(writer, "@    xaxis  label \"Back-calculated RDC (Hz)\"")?;
    writeln!(writer, "@    yaxis  label \"Measured RDC (Hz)\"")?;

    // The perfect-correlation diagonal is always the first set.
    writeln!(writer, "@    s0 linestyle 2")?;
    writeln!(writer, "@    s0 symbol 0")?;
    writeln!(writer, "@    s0 legend \"Diagonal\"")?;
    for (i, set) in sets.iter().enumerate() {
        let s = i + 1;
        writeln!(writer, "@    s{s} linestyle 0")?;
        writeln!(writer, "@    s{s} symbol 1")?;
        match set.q_factor {
            Some(q) => writeln!(
                writer,
                "@    s{s} legend \"{} (Q = {q:.3})\"",
                set.align_id
            )?,
            None => writeln!(writer, "@    s{s} legend \"{}\"", set.align_id)?,
        }
    }

    writeln!(writer, "@target G0.S0")?;
    writeln!(writer, "@type xy")?;
    writeln!(writer, "-100.0 -100.0")?;
    writeln!(writer, "100.0 100.0")?;
    writeln!(writer, "&")?;

    for (i, set) in sets.iter().enumerate() {
        writeln!(writer, "@target G0.S{}", i + 1)?;
        if any_errors {
            writeln!(writer, "@type xydy")?;
        } else {
            writeln!(writer, "@type xy")?;
        }
        for point in &set.points {
            if any_errors {
                writeln!(
                    writer,
                    "{:.6} {:.6} {:.6}",
                    point.back_calc,
                    point.value,
                    point.error.unwrap_or(0.0)
                )?;
            } else {
                writeln!(writer, "{:.6} {:.6}", point.back_calc, point.value)?;
            }
        }
        writeln!(writer, "&")?;
    }
    Ok(())
}

fn write_text<W: io::Write>(sets: &[PlotSet], writer: &mut W) -> Result<(), PlotError> {
    writeln!(
        writer,
        "# {:<15} {:<15} {:<15} {:>20} {:>20} {:>20}",
        "align_id", "spin_id1", "spin_id2", "value", "back_calc", "error"
    )?;
    for set in sets {
        for point in &set.points {
            let error = match point.error {
                Some(e) => format!("{e:>20.6}"),
                None => format!("{:>20}", "None"),
            };
            writeln!(
                writer,
                "  {:<15} {:<15} {:<15} {:>20.6} {:>20.6} {error}",
                set.align_id, point.spin_id1, point.spin_id2, point.value, point.back_calc
            )?;
        }
    }
    Ok(())
}

/// Writes the measured versus back-calculated RDC correlation plot.
///
/// One data set is produced per alignment, preceded in the Grace dialect by
/// the perfect-correlation diagonal. Fails with [`PlotError::NoData`] when no
/// pair carries both a measured and a back-calculated value.
pub fn corr_plot<W: io::Write>(
    context: &AnalysisContext,
    format: PlotFormat,
    writer: &mut W,
) -> Result<(), PlotError> {
    let sets = collect_sets(context);
    if sets.is_empty() {
        return Err(PlotError::NoData);
    }
    match format {
        PlotFormat::Grace => write_grace(&sets, writer),
        PlotFormat::Text => write_text(&sets, writer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::spin::{InteratomicPair, RdcDatum};

    fn context_with_data() -> AnalysisContext {
        let mut context = AnalysisContext::new();
        context.add_rdc_id("Dy");
        for (i, (value, back_calc)) in [(5.2, 5.0), (-12.4, -12.0), (3.1, 3.3)]
            .into_iter()
            .enumerate()
        {
            let mut pair = InteratomicPair::new(&format!(":{}@N", i + 1), &format!(":{}@H", i + 1));
            let mut datum = RdcDatum::new(Some(value), Some(0.5));
            datum.back_calc = Some(back_calc);
            pair.rdc.insert("Dy".to_string(), datum);
            context.pairs.push(pair);
        }
        context
    }

    #[test]
    fn grace_plot_starts_with_the_diagonal() {
        let context = context_with_data();
        let mut out = Vec::new();
        corr_plot(&context, PlotFormat::Grace, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let diag = text.find("@target G0.S0").unwrap();
        let data = text.find("@target G0.S1").unwrap();
        assert!(diag < data);
        assert!(text.contains("-100.0 -100.0"));
        assert!(text.contains("@    s0 linestyle 2"));
        assert!(text.contains("@type xydy"));
    }

    #[test]
    fn world_bounds_are_floored_and_ceiled() {
        let context = context_with_data();
        let mut out = Vec::new();
        corr_plot(&context, PlotFormat::Grace, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("@    world -13, -13, 6, 6"));
    }

    #[test]
    fn xy_type_is_used_without_errors() {
        let mut context = context_with_data();
        for pair in &mut context.pairs {
            if let Some(datum) = pair.rdc.get_mut("Dy") {
                datum.error = None;
            }
        }
        let mut out = Vec::new();
        corr_plot(&context, PlotFormat::Grace, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("@type xy\n"));
        assert!(!text.contains("@type xydy"));
    }

    #[test]
    fn t_type_data_subtracts_the_scalar_coupling() {
        let mut context = AnalysisContext::new();
        context.add_rdc_id("Tb");
        let mut pair = InteratomicPair::new(":1@N", ":1@H");
        pair.j_coupling = Some(-93.0);
        let mut datum = RdcDatum::new(Some(-88.0), None);
        datum.back_calc = Some(-87.5);
        datum.data_type = RdcDataType::T;
        pair.rdc.insert("Tb".to_string(), datum);
        context.pairs.push(pair);

        let mut out = Vec::new();
        corr_plot(&context, PlotFormat::Text, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("5.000000"));
        assert!(text.contains("5.500000"));
    }

    #[test]
    fn deselected_pairs_and_missing_values_are_skipped() {
        let mut context = context_with_data();
        context.pairs[0].select = false;
        if let Some(datum) = context.pairs[1].rdc.get_mut("Dy") {
            datum.back_calc = None;
        }
        let mut out = Vec::new();
        corr_plot(&context, PlotFormat::Text, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains(":1@N"));
        assert!(!text.contains(":2@N"));
        assert!(text.contains(":3@N"));
    }

    #[test]
    fn empty_context_is_an_error() {
        let context = AnalysisContext::new();
        let mut out = Vec::new();
        assert!(matches!(
            corr_plot(&context, PlotFormat::Grace, &mut out),
            Err(PlotError::NoData)
        ));
    }
}
