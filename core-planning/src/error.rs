use bridge_traits::BridgeError;
use core_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("{component} is {actual}, expected {expected}")]
    StateConflict {
        component: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{0} has been destroyed")]
    Destroyed(&'static str),

    #[error("Solver is not started")]
    SolverNotStarted,

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, PlanningError>;
