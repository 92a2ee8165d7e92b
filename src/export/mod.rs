//! Rendering of results as JSON, CSV or terminal tables
//!
//! Every result type is rendered from its `rounded()` presentation copy;
//! the values handed back by the library stay at full precision.

use crate::banister::{BanisterResponse, MultiSystemResponse};
use crate::error::AdaptError;
use crate::fatigue::FatigueCurve;
use crate::recovery::{RecoveryEstimate, RecoveryUpdate};
use crate::self_improvement::{CorrectionResponse, SelfImprovementReport};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub mod csv;
pub mod json;
pub mod text;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Text,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "text" | "txt" | "table" => Ok(ExportFormat::Text),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),
}

impl From<ExportError> for AdaptError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::IoError(io) => AdaptError::Io(io),
            other => AdaptError::Export(other.to_string()),
        }
    }
}

/// A result that can be rendered in every export format
pub trait Exportable: Serialize {
    /// Presentation copy with section-specific rounding
    fn presentation(&self) -> Self
    where
        Self: Sized;

    fn write_csv<W: Write>(&self, writer: W) -> Result<(), ExportError>;

    fn write_text<W: Write>(&self, writer: W) -> Result<(), ExportError>;
}

/// Render a result to any writer
pub fn render<T, W>(value: &T, format: ExportFormat, mut writer: W) -> Result<(), ExportError>
where
    T: Exportable,
    W: Write,
{
    let rounded = value.presentation();
    match format {
        ExportFormat::Json => json::write_json(&rounded, &mut writer)?,
        ExportFormat::Csv => rounded.write_csv(&mut writer)?,
        ExportFormat::Text => rounded.write_text(&mut writer)?,
    }
    writer.flush()?;
    Ok(())
}

/// Render a result into a file
pub fn export_to_file<T, P>(value: &T, format: ExportFormat, path: P) -> Result<(), ExportError>
where
    T: Exportable,
    P: AsRef<Path>,
{
    let file = File::create(path)?;
    render(value, format, BufWriter::new(file))
}

macro_rules! exportable {
    ($ty:ty, $csv:path, $text:path) => {
        impl Exportable for $ty {
            fn presentation(&self) -> Self {
                self.rounded()
            }

            fn write_csv<W: Write>(&self, writer: W) -> Result<(), ExportError> {
                $csv(self, writer)
            }

            fn write_text<W: Write>(&self, writer: W) -> Result<(), ExportError> {
                $text(self, writer)
            }
        }
    };
}

exportable!(RecoveryUpdate, self::csv::write_recovery_update, self::text::write_recovery_update);
exportable!(RecoveryEstimate, self::csv::write_recovery_estimate, self::text::write_recovery_estimate);
exportable!(FatigueCurve, self::csv::write_fatigue_curve, self::text::write_fatigue_curve);
exportable!(BanisterResponse, self::csv::write_timeline, self::text::write_timeline);
exportable!(MultiSystemResponse, self::csv::write_multi_system, self::text::write_multi_system);
exportable!(SelfImprovementReport, self::csv::write_accuracy, self::text::write_accuracy);
exportable!(CorrectionResponse, self::csv::write_corrections, self::text::write_corrections);
