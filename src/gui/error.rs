use std::{error::Error, fmt::Display, sync::mpsc};

/// Anything that can go wrong while driving the terminal screens.
#[derive(Debug)]
pub enum GloveGuiError {
    /// Terminal io failed.
    IOError(std::io::Error),
    /// The worker thread exited without handing back its state.
    MPSCRecvError(mpsc::RecvError),
    /// The worker thread panicked.
    JoinError,
}

impl Display for GloveGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#?}", self)
    }
}

impl Error for GloveGuiError {}

impl From<std::io::Error> for GloveGuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<mpsc::RecvError> for GloveGuiError {
    fn from(value: mpsc::RecvError) -> Self {
        Self::MPSCRecvError(value)
    }
}
