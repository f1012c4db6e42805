use thiserror::Error;

/// Errors that can end a research run.
///
/// Everything else (search timeouts, empty results, unparseable reflection
/// queries, exhausted extraction budgets) degrades in place and never
/// surfaces here.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The generator's report-structure proposal could not be obtained or
    /// parsed. This is the one fatal precondition of a run.
    #[error("could not derive a report structure for \"{topic}\": {source}")]
    StructureParse {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    /// A required generation step kept failing after its retry budget.
    #[error("text generation failed after {attempts} attempt(s): {source}")]
    Generation {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The run was cancelled while a unit of work was in flight.
    #[error("run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EngineError>;
