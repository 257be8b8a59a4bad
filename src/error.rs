use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Input file not found: {}", .0.display())]
    InputUnavailable(PathBuf),

    #[error("Output folder not found: {}", .0.display())]
    OutputUnavailable(PathBuf),

    #[error("Malformed roster row at line {line}: {reason}")]
    MalformedInput { line: u64, reason: String },

    #[error("Failed to read roster: {0}")]
    InputReadFailure(csv::Error),

    #[error("Processor returned {status}: {message}")]
    Fetch { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transaction timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_io_error() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let error = ExportError::Io(io_error);

        assert!(error.to_string().contains("I/O error"));
        assert!(error.source().is_some());

        let error_from: ExportError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        match error_from {
            ExportError::Io(_) => {}
            _ => panic!("Wrong error variant"),
        }
    }

    #[test]
    fn test_csv_error() {
        let reader = csv::Reader::from_reader("name,key\nacme,bad".as_bytes());
        let csv_error = reader.into_deserialize::<(String, u16)>().next().unwrap().unwrap_err();
        let error: ExportError = csv_error.into();

        assert!(error.to_string().contains("CSV error"));
        assert!(matches!(error, ExportError::Csv(_)));
    }

    #[test]
    fn test_startup_errors_name_the_path() {
        let error = ExportError::InputUnavailable(PathBuf::from("companies.csv"));
        assert_eq!(error.to_string(), "Input file not found: companies.csv");

        let error = ExportError::OutputUnavailable(PathBuf::from("out"));
        assert_eq!(error.to_string(), "Output folder not found: out");
    }

    #[test]
    fn test_malformed_input() {
        let error = ExportError::MalformedInput {
            line: 3,
            reason: "expected at least 2 fields, found 1".to_string(),
        };

        assert!(error.to_string().contains("line 3"));
        assert!(error.source().is_none());
    }

    #[test]
    fn test_fetch_error() {
        let error = ExportError::Fetch {
            status: 401,
            message: "Invalid API Key provided".to_string(),
        };
        assert_eq!(error.to_string(), "Processor returned 401: Invalid API Key provided");
    }
}
