// Library interface for adaptrs
// Adaptive recovery and fatigue modelling: Bayesian recovery priors,
// Gaussian-process fatigue curves, the fitness-fatigue ODE and
// self-improving calibration.

pub mod banister;
pub mod config;
pub mod error;
pub mod export;
pub mod fatigue;
pub mod logging;
pub mod ode;
pub mod optimize;
pub mod precision;
pub mod recovery;
pub mod self_improvement;
pub mod validation;

use serde::Serialize;

// Re-export commonly used types for convenience
pub use banister::{
    BanisterParams, BanisterResponse, BodySystem, FitnessFatigueSolver, MultiSystemRequest,
    MultiSystemResponse, PerformanceObservation, SolveRequest, SolverConfig, TrainingImpulse,
    TrainingVerdict,
};
pub use config::AppConfig;
pub use error::{AdaptError, CalculationError, Result};
pub use export::{render, ExportFormat, Exportable};
pub use fatigue::{
    FatigueContext, FatigueCurve, FatigueCurveRegressor, FatigueDataPoint,
    FatiguePredictionRequest, ModelSource,
};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use recovery::{
    ConfidenceTier, GammaPrior, NutritionStatus, RecoveryContext, RecoveryEstimate,
    RecoveryEstimateRequest, RecoveryEstimator, RecoveryObservation, RecoveryUpdate,
    RecoveryUpdateRequest, UserRecoveryPriors,
};
pub use self_improvement::{
    CalibrationDeltas, CorrectionRequest, CorrectionResponse, ModelAccuracy, OutcomeRecord,
    PredictionRecord, SelfImprovementEvaluator, SelfImprovementReport, SelfImprovementRequest,
};
pub use validation::Validate;

/// Which numerical engines are compiled in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub bayesian_recovery: bool,
    pub gaussian_process: bool,
    pub ode_solver: bool,
    pub self_improvement: bool,
}

/// Health summary reported by `adaptrs status`
pub fn engine_status() -> EngineStatus {
    EngineStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        bayesian_recovery: true,
        gaussian_process: true,
        ode_solver: true,
        self_improvement: true,
    }
}
