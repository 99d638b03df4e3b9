use thiserror::Error;

/// Fatal conditions of the engine. None of these are recovered; any of them
/// terminates the step and takes the whole process group down with the
/// matching abort code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("number of bodies ({number}) is not divisible by number of processes ({size})")]
    Divisibility { number: usize, size: usize },

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("body {body} shares an exact position with an already inserted body")]
    CoincidentBodies { body: usize },

    #[error("floating point error: {0}")]
    FloatingPoint(String),

    #[error("{0}")]
    Failure(String),
}

impl Error {
    /// Process-group abort code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Divisibility { .. } => 3,
            Error::Io(_) => 4,
            Error::CoincidentBodies { .. } => 5,
            Error::FloatingPoint(_) => 6,
            Error::Failure(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
