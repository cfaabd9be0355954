use thiserror::Error;

/// The error taxonomy surfaced by the MRI driver, standing in for ARKODE's
/// `ARK_*` return-code family. Variants are grouped roughly as the original
/// groups them: allocation/setup failures, coupling-table validation,
/// right-hand-side/solver failures, and user-callback failures.
#[derive(Error, Debug)]
pub enum MriError {
    #[error("driver memory is null; call MriDriver::create first")]
    MemNull,
    #[error("memory allocation failed")]
    MemFail,
    #[error("illegal input: {0}")]
    IllInput(String),
    #[error("no memory allocated for {0}; a prior init step must run first")]
    NoMalloc(&'static str),

    #[error("invalid coupling table: {0}")]
    InvalidTable(String),

    #[error("slow right-hand-side evaluation failed unrecoverably")]
    UnrecRhsfuncErr,
    #[error("slow right-hand-side evaluation failed recoverably")]
    RhsfuncFail,

    #[error("inner stepper evolve failed")]
    InnerStepFail,

    #[error("nonlinear solver failed to initialize")]
    NlsInitFail,
    #[error("nonlinear solver setup failed unrecoverably")]
    NlsSetupFail,
    #[error("nonlinear solver setup failed recoverably")]
    NlsSetupRecvr,
    #[error("nonlinear solver failed to converge recoverably")]
    NlsConvRecvr,

    #[error("linear solver failed to initialize")]
    LinitFail,

    #[error("a required vector operation failed")]
    VectorOpErr,

    #[error("user-supplied predictor failed unrecoverably")]
    UserPredictFail,

    #[error("user post-processing of a stage failed")]
    PostprocessStageFail,

    #[error("conversion from outer to inner state failed")]
    OuterToInnerFail,
    #[error("conversion from inner to outer state failed")]
    InnerToOuterFail,

    #[error("stage solve should be retried with a smaller step")]
    TryAgain,
}

/// Recoverable vs. unrecoverable outcome of a single call into the stage
/// machinery, matching the `TRY_AGAIN` / hard-failure distinction
/// `mriStep_TakeStep` makes internally, surfaced to the host's `evolve`
/// loop so it can decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Recoverable,
    Unrecoverable,
}

impl MriError {
    /// Whether a host driving `evolve` could plausibly retry after this
    /// error (with a smaller step, a fresh predictor, ...). This core does
    /// not itself shrink `h` (adaptive step-size control is out of scope),
    /// but still classifies the error so a host can.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MriError::RhsfuncFail
                | MriError::NlsSetupRecvr
                | MriError::NlsConvRecvr
                | MriError::TryAgain
        )
    }
}

pub type MriResult<T> = Result<T, MriError>;
