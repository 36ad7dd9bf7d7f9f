#![forbid(unsafe_code)]

use np_core::model::{ItemDetail, ItemSummary};

#[derive(Debug)]
pub(crate) enum SurfaceError {
    Spawn(String),
    Io(std::io::Error),
    Protocol(String),
    Read(String),
    Timeout { waited_ms: u64 },
    Closed,
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(message) => write!(f, "surface spawn failed: {message}"),
            Self::Io(err) => write!(f, "surface io: {err}"),
            Self::Protocol(message) => write!(f, "surface protocol: {message}"),
            Self::Read(message) => write!(f, "surface read failed: {message}"),
            Self::Timeout { waited_ms } => {
                write!(f, "surface did not settle within {waited_ms}ms")
            }
            Self::Closed => write!(f, "surface closed its end of the pipe"),
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<std::io::Error> for SurfaceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// One stateful cursor over the note list, positioned on the first item
/// when handed to the controller.
///
/// Contract the traversal relies on:
/// - repeated reads of the same logical item return the same fields
///   within one pass;
/// - `advance` past the last item leaves the cursor where it is, which
///   is what makes repeat-of-previous the end-of-list signal;
/// - every call may fail with a surface-level error; the controller
///   never retries a failed read.
pub(crate) trait ItemSurface {
    fn summary(&mut self) -> Result<ItemSummary, SurfaceError>;
    fn detail(&mut self) -> Result<ItemDetail, SurfaceError>;
    fn tags(&mut self) -> Result<Vec<String>, SurfaceError>;
    fn advance(&mut self) -> Result<(), SurfaceError>;
}
