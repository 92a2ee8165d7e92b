use super::ExportError;
use crate::banister::{BanisterResponse, MultiSystemResponse, TrainingVerdict};
use crate::fatigue::FatigueCurve;
use crate::recovery::{RecoveryEstimate, RecoveryUpdate};
use crate::self_improvement::{CorrectionResponse, SelfImprovementReport};
use colored::Colorize;
use std::io::Write;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Longest table printed for a timeline before it is thinned out
const MAX_TABLE_ROWS: usize = 25;

fn heading<W: Write>(writer: &mut W, title: &str) -> Result<(), ExportError> {
    writeln!(writer, "{}", title.bold())?;
    writeln!(writer, "{}", "-".repeat(title.len()))?;
    Ok(())
}

fn optional_hours(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |h| format!("{} h", h))
}

/// Indices of an evenly thinned timeline that always keeps the last sample
fn sample_indices(len: usize) -> Vec<usize> {
    if len <= MAX_TABLE_ROWS {
        return (0..len).collect();
    }
    let stride = len.div_ceil(MAX_TABLE_ROWS - 1);
    let mut indices: Vec<usize> = (0..len).step_by(stride).collect();
    if indices.last() != Some(&(len - 1)) {
        indices.push(len - 1);
    }
    indices
}

#[derive(Tabled)]
struct PriorRow {
    #[tabled(rename = "Muscle")]
    muscle: String,
    #[tabled(rename = "Alpha")]
    alpha: f64,
    #[tabled(rename = "Beta")]
    beta: f64,
    #[tabled(rename = "Recovery (h)")]
    hours: String,
    #[tabled(rename = "Credible interval")]
    interval: String,
    #[tabled(rename = "Change (h)")]
    delta: String,
}

pub fn write_recovery_update<W: Write>(
    update: &RecoveryUpdate,
    mut writer: W,
) -> Result<(), ExportError> {
    heading(&mut writer, "RECOVERY PRIORS")?;
    writeln!(
        writer,
        "Observations: {} accepted, {} skipped ({} total)",
        update.accepted_observations,
        update.skipped_observations,
        update.updated_priors.total_observations
    )?;
    writeln!(writer)?;

    let rows: Vec<PriorRow> = update
        .updated_priors
        .muscle_priors
        .iter()
        .map(|(muscle, prior)| PriorRow {
            muscle: muscle.clone(),
            alpha: prior.alpha,
            beta: prior.beta,
            hours: update
                .personalized_hours
                .get(muscle)
                .map_or_else(|| "-".to_string(), |h| h.to_string()),
            interval: update
                .confidence_intervals
                .get(muscle)
                .map_or_else(|| "-".to_string(), |ci| format!("{} - {}", ci.lower, ci.upper)),
            delta: match update.delta.get(muscle) {
                Some(d) if *d < 0.0 => format!("{}", d).green().to_string(),
                Some(d) if *d > 0.0 => format!("+{}", d).yellow().to_string(),
                Some(d) => d.to_string(),
                None => "-".to_string(),
            },
        })
        .collect();

    if rows.is_empty() {
        writeln!(writer, "No muscle priors yet")?;
    } else {
        writeln!(writer, "{}", Table::new(rows).with(Style::rounded()))?;
    }
    Ok(())
}

pub fn write_recovery_estimate<W: Write>(
    estimate: &RecoveryEstimate,
    mut writer: W,
) -> Result<(), ExportError> {
    heading(&mut writer, "RECOVERY ESTIMATE")?;
    writeln!(writer, "Muscle: {}", estimate.muscle)?;
    writeln!(
        writer,
        "Estimated recovery: {} h",
        estimate.estimated_recovery_hours.to_string().cyan().bold()
    )?;
    writeln!(
        writer,
        "Source: {}",
        if estimate.is_personalized {
            "personalized prior"
        } else {
            "population default"
        }
    )?;
    writeln!(writer, "Confidence: {}", estimate.confidence.label())?;
    Ok(())
}

#[derive(Tabled)]
struct FatigueRow {
    #[tabled(rename = "Hour")]
    hour: f64,
    #[tabled(rename = "Fatigue")]
    mean: f64,
    #[tabled(rename = "Lower")]
    lower: f64,
    #[tabled(rename = "Upper")]
    upper: f64,
}

pub fn write_fatigue_curve<W: Write>(
    curve: &FatigueCurve,
    mut writer: W,
) -> Result<(), ExportError> {
    heading(&mut writer, "FATIGUE CURVE")?;
    writeln!(writer, "Model: {:?}", curve.model_source)?;
    writeln!(writer, "Peak fatigue at: {} h", curve.peak_fatigue_hour)?;
    writeln!(writer, "Full recovery at: {} h", curve.full_recovery_hour)?;
    writeln!(
        writer,
        "Supercompensation: {}",
        optional_hours(curve.supercompensation_hour)
    )?;
    writeln!(writer)?;

    let rows: Vec<FatigueRow> = (0..curve.hours.len())
        .map(|i| FatigueRow {
            hour: curve.hours[i],
            mean: curve.mean_fatigue[i],
            lower: curve.lower_bound[i],
            upper: curve.upper_bound[i],
        })
        .collect();
    writeln!(writer, "{}", Table::new(rows).with(Style::rounded()))?;
    Ok(())
}

#[derive(Tabled)]
struct TimelineRow {
    #[tabled(rename = "Hour")]
    hour: f64,
    #[tabled(rename = "Fitness")]
    fitness: f64,
    #[tabled(rename = "Fatigue")]
    fatigue: f64,
    #[tabled(rename = "Performance")]
    performance: f64,
}

pub fn write_timeline<W: Write>(
    response: &BanisterResponse,
    mut writer: W,
) -> Result<(), ExportError> {
    heading(&mut writer, "FITNESS-FATIGUE MODEL")?;
    writeln!(
        writer,
        "Peak performance: {}",
        optional_hours(response.predicted_peak_performance_hour)
    )?;
    writeln!(
        writer,
        "Next optimal session: {}",
        optional_hours(response.next_optimal_session_hour)
    )?;
    if let Some(params) = &response.optimal_params {
        writeln!(
            writer,
            "Fitted parameters: p0={} k1={} k2={} tau1={} tau2={}",
            params.p0, params.k1, params.k2, params.tau1, params.tau2
        )?;
    }
    writeln!(writer)?;

    let rows: Vec<TimelineRow> = sample_indices(response.timeline_hours.len())
        .into_iter()
        .map(|i| TimelineRow {
            hour: response.timeline_hours[i],
            fitness: response.fitness[i],
            fatigue: response.fatigue[i],
            performance: response.performance[i],
        })
        .collect();
    writeln!(writer, "{}", Table::new(rows).with(Style::rounded()))?;
    Ok(())
}

#[derive(Tabled)]
struct SystemRow {
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Peak")]
    peak: String,
    #[tabled(rename = "Next session")]
    next: String,
}

fn edge(values: &[f64], last: bool) -> String {
    let value = if last { values.last() } else { values.first() };
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn write_multi_system<W: Write>(
    response: &MultiSystemResponse,
    mut writer: W,
) -> Result<(), ExportError> {
    heading(&mut writer, "MULTI-SYSTEM FITNESS-FATIGUE")?;

    let label = format!("{:?}", response.verdict);
    let verdict = match response.verdict {
        TrainingVerdict::SupercompensationWindow => label.as_str().green().bold(),
        TrainingVerdict::DeloadNeeded | TrainingVerdict::ReduceVolume => label.as_str().red().bold(),
        TrainingVerdict::Stable | TrainingVerdict::InsufficientData => label.as_str().normal(),
    };
    writeln!(writer, "Verdict: {}", verdict)?;
    writeln!(writer, "{}", response.verdict_text)?;
    writeln!(
        writer,
        "Next optimal session: {}",
        optional_hours(response.optimal_next_session_hour)
    )?;
    writeln!(writer)?;

    let mut rows: Vec<SystemRow> = response
        .systems
        .iter()
        .map(|s| SystemRow {
            system: s.system.name().to_string(),
            start: edge(&s.response.performance, false),
            end: edge(&s.response.performance, true),
            peak: optional_hours(s.response.predicted_peak_performance_hour),
            next: optional_hours(s.response.next_optimal_session_hour),
        })
        .collect();
    rows.push(SystemRow {
        system: "combined".to_string(),
        start: edge(&response.combined_performance, false),
        end: edge(&response.combined_performance, true),
        peak: "-".to_string(),
        next: optional_hours(response.optimal_next_session_hour),
    });
    writeln!(writer, "{}", Table::new(rows).with(Style::rounded()))?;
    Ok(())
}

#[derive(Tabled)]
struct AccuracyRow {
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "MAE")]
    mae: f64,
    #[tabled(rename = "RMSE")]
    rmse: f64,
    #[tabled(rename = "Bias")]
    bias: f64,
    #[tabled(rename = "R²")]
    r_squared: f64,
    #[tabled(rename = "Samples")]
    samples: usize,
}

pub fn write_accuracy<W: Write>(
    report: &SelfImprovementReport,
    mut writer: W,
) -> Result<(), ExportError> {
    heading(&mut writer, "PREDICTION ACCURACY")?;
    writeln!(
        writer,
        "Overall score: {}",
        report.overall_prediction_score.to_string().cyan().bold()
    )?;
    writeln!(writer)?;

    let rows: Vec<AccuracyRow> = report
        .accuracy_by_system
        .iter()
        .map(|a| AccuracyRow {
            system: a.system.clone(),
            mae: a.mae,
            rmse: a.rmse,
            bias: a.bias,
            r_squared: a.r_squared,
            samples: a.sample_size,
        })
        .collect();
    if rows.is_empty() {
        writeln!(writer, "No system has enough matched predictions")?;
    } else {
        writeln!(writer, "{}", Table::new(rows).with(Style::rounded()))?;
    }

    if !report.suggested_adjustments.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Suggested adjustments:")?;
        for (system, adjustment) in &report.suggested_adjustments {
            writeln!(writer, "  {}: {:+}", system, adjustment)?;
        }
    }

    if !report.improvement_trend.is_empty() {
        let trend: Vec<String> = report
            .improvement_trend
            .iter()
            .map(|v| v.to_string())
            .collect();
        writeln!(writer)?;
        writeln!(writer, "Rolling MAE: {}", trend.join(" → "))?;
    }

    if !report.recommendations.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Recommendations:")?;
        for recommendation in &report.recommendations {
            writeln!(writer, "• {}", recommendation)?;
        }
    }
    Ok(())
}

pub fn write_corrections<W: Write>(
    response: &CorrectionResponse,
    mut writer: W,
) -> Result<(), ExportError> {
    heading(&mut writer, "CALIBRATION CORRECTIONS")?;
    writeln!(writer, "Neural (CNS): {:+}", response.corrections.cns_delta)?;
    writeln!(writer, "Muscular: {:+}", response.corrections.muscular_delta)?;
    writeln!(writer, "Connective (spinal): {:+}", response.corrections.spinal_delta)?;
    writeln!(writer, "Accuracy score: {}", response.accuracy_score)?;
    writeln!(writer)?;
    write_accuracy(&response.details, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banister::FitnessFatigueSolver;
    use crate::recovery::ConfidenceTier;

    #[test]
    fn test_sample_indices_keep_last() {
        assert_eq!(sample_indices(3), vec![0, 1, 2]);

        let indices = sample_indices(169);
        assert!(indices.len() <= MAX_TABLE_ROWS + 1);
        assert_eq!(indices[0], 0);
        assert_eq!(*indices.last().unwrap(), 168);
    }

    #[test]
    fn test_estimate_text() {
        colored::control::set_override(false);
        let estimate = RecoveryEstimate {
            muscle: "hamstrings".to_string(),
            estimated_recovery_hours: 60.0,
            is_personalized: false,
            confidence: ConfidenceTier::Low,
        };

        let mut out = Vec::new();
        write_recovery_estimate(&estimate, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("RECOVERY ESTIMATE"));
        assert!(text.contains("Estimated recovery: 60 h"));
        assert!(text.contains("population default"));
    }

    #[test]
    fn test_multi_system_table_lists_every_system() {
        let response = FitnessFatigueSolver::new()
            .solve_multi_system(&[], 24.0)
            .unwrap();

        let mut out = Vec::new();
        write_multi_system(&response, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        for name in ["muscular", "neural", "connective", "combined"] {
            assert!(text.contains(name), "missing {name}");
        }
    }
}
