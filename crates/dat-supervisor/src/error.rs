use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid connection: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job pool is shut down")]
    PoolClosed,

    #[error("Job task failed: {0}")]
    TaskFailed(String),
}
