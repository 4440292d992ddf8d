use std::{io,fmt};
use std::convert::From;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IO(io::Error),
    CSV(csv::Error),
    JSON(serde_json::Error),
    Reqwest(reqwest::Error),
    HttpError(reqwest::StatusCode),
    ParseDate(chrono::format::ParseError),
    Shape(ndarray::ShapeError),
    UnknownSource(String),
    UnknownLevel(String),
    UnknownScale(String),
    UnsupportedLevel(&'static str, &'static str),
    MissingColumn(String),
    MergeCardinality(String),
    ShapeMismatch(&'static str, usize, usize),
    MissingRegion(String),
    DateOutOfRange(f64),
    MissingData,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
	Self::IO(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
	Self::CSV(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
	Self::JSON(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
	Self::Reqwest(err)
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
	Self::ParseDate(err)
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
	Self::Shape(err)
    }
}


impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match self {
	    Self::IO(err) => write!(f, "I/O error: {}", err),
	    Self::CSV(err) => write!(f, "CSV error: {}", err),
	    Self::JSON(err) => write!(f, "JSON error: {}", err),
	    Self::Reqwest(err) => write!(f, "Request error: {}", err),
	    Self::HttpError(err) => write!(f, "HTTP error: {}", err),
	    Self::ParseDate(err) => write!(f, "Date parse error: {}", err),
	    Self::Shape(err) => write!(f, "Array shape error: {}", err),
	    Self::UnknownSource(name) => write!(f, "Unknown source: {} (expected ms, wcota or fiocruz)", name),
	    Self::UnknownLevel(name) => write!(f, "Unknown level: {} (expected state or city)", name),
	    Self::UnknownScale(name) => write!(f, "Unknown scale: {} (expected log or linear)", name),
	    Self::UnsupportedLevel(source, level) => write!(f, "Source {} does not provide data by {}", source, level),
	    Self::MissingColumn(name) => write!(f, "No column named {}. Variable name must refer to a table column", name),
	    Self::MergeCardinality(msg) => write!(f, "Merge keys are not one-to-one: {}", msg),
	    Self::ShapeMismatch(what, expected, actual) => write!(f, "Shape mismatch for {}: expected {}, got {}", what, expected, actual),
	    Self::MissingRegion(name) => write!(f, "Missing region: {}", name),
	    Self::DateOutOfRange(offset) => write!(f, "Date offset out of range: {} days", offset),
	    Self::MissingData => write!(f, "No data!"),
	}
    }
}

impl std::error::Error for Error {}
