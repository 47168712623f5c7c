use std::{error::Error, fmt};

pub type BoxedErr = Box<dyn Error + Sync + Send>;
pub type OptionalErr = Option<BoxedErr>;

#[derive(Debug, Clone)]
pub enum ErrorType {
  // General errors
  InvalidOperation,
  NotFound,
  MissingField,
  InvalidData,

  // Database errors
  DBConnectionError,
  DBInsertError,

  // External service errors
  InternalError,
  Connection,
  ConfigError,
  HttpRequestError,
  HttpResponseError,

  // Task & async errors
  TimedOut,

  // JSON errors
  JsonMarshal,
  JsonUnmarshal,
}

impl fmt::Display for ErrorType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorType::InvalidOperation => write!(f, "Invalid operation"),
      ErrorType::NotFound => write!(f, "Resource not found"),
      ErrorType::MissingField => write!(f, "Missing required field"),
      ErrorType::InvalidData => write!(f, "Invalid data"),
      ErrorType::DBConnectionError => write!(f, "Database connection error"),
      ErrorType::DBInsertError => write!(f, "Database insert error"),
      ErrorType::InternalError => write!(f, "Internal error"),
      ErrorType::Connection => write!(f, "Connection error"),
      ErrorType::ConfigError => write!(f, "Configuration error"),
      ErrorType::HttpRequestError => write!(f, "HTTP request error"),
      ErrorType::HttpResponseError => write!(f, "HTTP response error"),
      ErrorType::TimedOut => write!(f, "Operation timed out"),
      ErrorType::JsonMarshal => write!(f, "JSON marshaling error"),
      ErrorType::JsonUnmarshal => write!(f, "JSON unmarshaling error"),
    }
  }
}

#[derive(Debug)]
pub struct SimpleError {
  pub message: String,
  pub err_type: ErrorType,
  pub err: BoxedErr,
}

impl fmt::Display for SimpleError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.err_type, self.message)
  }
}

impl Error for SimpleError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(self.err.as_ref())
  }
}

/// Internal error carrying the originating module path and a recoverability flag
#[derive(Debug)]
pub struct InternalError {
  pub err_type: ErrorType,
  /// Whether the condition is temporary and worth retrying
  pub temp: bool,
  pub err: BoxedErr,
  pub msg: String,
  pub path: String,
}

impl fmt::Display for InternalError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts = Vec::new();

    if !self.path.is_empty() {
      parts.push(format!("path: {}", self.path));
    }
    parts.push(format!("err_type: {}", self.err_type));
    if !self.msg.is_empty() {
      parts.push(format!("msg: {}", self.msg));
    }
    parts.push(format!("err: {}", self.err));

    write!(f, "{}", parts.join(", "))
  }
}

impl Error for InternalError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(self.err.as_ref())
  }
}

impl InternalError {
  pub fn new(
    path: impl Into<String>,
    err: BoxedErr,
    err_type: ErrorType,
    msg: impl Into<String>,
  ) -> Self {
    Self { err_type, temp: false, err, msg: msg.into(), path: path.into() }
  }
}
