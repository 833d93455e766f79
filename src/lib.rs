#![forbid(unsafe_code)]
//! Garde : génération de rotas de gardes médicales par étapes (sans BD).
//!
//! - Pipeline d'étapes : nuits, week-ends, journées ; chaque étape produit un instantané.
//! - Règles de repos et de blocs de nuits, équité pondérée WTE.
//! - Manques de capacité signalés (locum) plutôt que bloquants.
//! - Stockage fichiers (JSON/CSV).

pub mod config;
pub mod engine;
pub mod fairness;
pub mod io;
pub mod model;
pub mod report;
pub mod rest;
pub mod scheduler;
pub mod state;
pub mod storage;

pub use config::{
    export_config_json, load_config_from_file, CoverageCatalog, CoverageRule, CoverageSlot,
    DayFilter, RotaConfig, Rules, SolverSettings,
};
pub use engine::{MilpEngine, SolveEngine, SolveParams, SolveStatus};
pub use fairness::FairnessScorer;
pub use model::{Calendar, Day, Grade, LeavePeriod, Person, PersonId, ShiftCategory, ShiftKind};
pub use report::{PersonReport, RosterReport};
pub use rest::{RestDenial, RestPeriodEvaluator};
pub use scheduler::{
    audit, default_stages, InfeasibilityReport, ObjectiveWeights, PipelineOutcome, SchedError,
    SolveOptions, StagePipeline, StageSpec, StageStrategy, ValidationError, Violation,
    ViolationKind,
};
pub use state::{
    Assignment, BlockException, CapacityGap, Exclusion, ExclusionReason, RosterState,
    RunningTotals,
};
pub use storage::{JsonStorage, RosterSnapshot, Storage};
