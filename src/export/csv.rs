use super::ExportError;
use crate::banister::{BanisterResponse, MultiSystemResponse};
use crate::fatigue::FatigueCurve;
use crate::recovery::{RecoveryEstimate, RecoveryUpdate};
use crate::self_improvement::{CorrectionResponse, SelfImprovementReport};
use ::csv::Writer;
use std::io::Write;

fn cell(value: f64) -> String {
    value.to_string()
}

fn optional_cell(value: Option<f64>) -> String {
    value.map_or_else(String::new, cell)
}

/// One row per muscle with its posterior, interval and change
pub fn write_recovery_update<W: Write>(
    update: &RecoveryUpdate,
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record([
        "muscle",
        "alpha",
        "beta",
        "personalized_recovery_hours",
        "ci_lower",
        "ci_upper",
        "improvement_delta",
    ])?;

    for (muscle, prior) in &update.updated_priors.muscle_priors {
        let interval = update.confidence_intervals.get(muscle);
        writer.write_record([
            muscle.clone(),
            cell(prior.alpha),
            cell(prior.beta),
            optional_cell(update.personalized_hours.get(muscle).copied()),
            optional_cell(interval.map(|ci| ci.lower)),
            optional_cell(interval.map(|ci| ci.upper)),
            optional_cell(update.delta.get(muscle).copied()),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_recovery_estimate<W: Write>(
    estimate: &RecoveryEstimate,
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record([
        "muscle",
        "estimated_recovery_hours",
        "is_personalized",
        "confidence",
    ])?;
    writer.write_record([
        estimate.muscle.clone(),
        cell(estimate.estimated_recovery_hours),
        estimate.is_personalized.to_string(),
        estimate.confidence.label().to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}

/// Fatigue curve with its uncertainty band, one row per hour
pub fn write_fatigue_curve<W: Write>(curve: &FatigueCurve, writer: W) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(["hours", "mean_fatigue", "lower_bound", "upper_bound"])?;

    for i in 0..curve.hours.len() {
        writer.write_record([
            cell(curve.hours[i]),
            cell(curve.mean_fatigue[i]),
            cell(curve.lower_bound[i]),
            cell(curve.upper_bound[i]),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Fitness, fatigue and performance timeline (suitable for plotting)
pub fn write_timeline<W: Write>(response: &BanisterResponse, writer: W) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(["timeline_hours", "fitness", "fatigue", "performance"])?;

    for i in 0..response.timeline_hours.len() {
        writer.write_record([
            cell(response.timeline_hours[i]),
            cell(response.fitness[i]),
            cell(response.fatigue[i]),
            cell(response.performance[i]),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Per-system performance columns plus the weighted combination
pub fn write_multi_system<W: Write>(
    response: &MultiSystemResponse,
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);

    let mut header = vec!["timeline_hours".to_string()];
    header.extend(response.systems.iter().map(|s| s.system.name().to_string()));
    header.push("combined".to_string());
    writer.write_record(&header)?;

    let timeline = response
        .systems
        .first()
        .map(|s| s.response.timeline_hours.as_slice())
        .unwrap_or(&[]);

    for (i, hour) in timeline.iter().enumerate() {
        let mut row = vec![cell(*hour)];
        row.extend(
            response
                .systems
                .iter()
                .map(|s| optional_cell(s.response.performance.get(i).copied())),
        );
        row.push(optional_cell(response.combined_performance.get(i).copied()));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Accuracy table, one row per scored system
pub fn write_accuracy<W: Write>(
    report: &SelfImprovementReport,
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(["system", "mae", "rmse", "bias", "r_squared", "sample_size"])?;

    for accuracy in &report.accuracy_by_system {
        writer.write_record([
            accuracy.system.clone(),
            cell(accuracy.mae),
            cell(accuracy.rmse),
            cell(accuracy.bias),
            cell(accuracy.r_squared),
            accuracy.sample_size.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_corrections<W: Write>(
    response: &CorrectionResponse,
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(["channel", "delta"])?;
    writer.write_record(["cnsDelta".to_string(), cell(response.corrections.cns_delta)])?;
    writer.write_record([
        "muscularDelta".to_string(),
        cell(response.corrections.muscular_delta),
    ])?;
    writer.write_record(["spinalDelta".to_string(), cell(response.corrections.spinal_delta)])?;
    writer.write_record(["accuracy_score".to_string(), cell(response.accuracy_score)])?;
    writer.flush()?;
    Ok(())
}
