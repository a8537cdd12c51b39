use std::fmt;
use std::io;

use kwbus_frame::FrameError;
use kwbus_hub::HubError;
use kwbus_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn context(code: i32, context: &str, err: impl fmt::Display) -> Self {
        Self::new(code, format!("{context}: {err}"))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::context(code, context, err)
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Frame(err) => frame_error(context, err),
        TransportError::LockTimeout { .. } => CliError::context(TIMEOUT, context, err),
        TransportError::InvalidAddress { .. } => CliError::context(USAGE, context, err),
        TransportError::NotFound { .. } => CliError::context(FAILURE, context, err),
        other => CliError::context(TRANSPORT_ERROR, context, other),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::context(DATA_INVALID, context, err)
        }
        FrameError::ConnectionClosed => CliError::context(FAILURE, context, err),
        other => CliError::context(TRANSPORT_ERROR, context, other),
    }
}

pub fn hub_error(context: &str, err: HubError) -> CliError {
    match err {
        HubError::Transport(err) => transport_error(context, err),
        HubError::Io { source, .. } => io_error(context, source),
        HubError::Json(_) | HubError::Config(_) => {
            CliError::context(DATA_INVALID, context, err)
        }
    }
}
