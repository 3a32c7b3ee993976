//! Client-side netcode: prediction, reconciliation and the session view

pub mod predictor;
pub mod reconcile;
pub mod session;

pub use predictor::ClientPredictor;
pub use reconcile::{ReconcileOutcome, ReconciliationEngine, CORRECTION_THRESHOLD};
pub use session::{ClientSession, RemotePlayer};

/// Client-side errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection to the server is closed")]
    Disconnected,
}
