//! Inbound query shape and validation.

use serde::{Deserialize, Serialize};

/// Longest accepted cadastral number.
const MAX_CADASTRAL_LEN: usize = 25;

/// Longest accepted cadastral quarter (third group).
const MAX_QUARTER_DIGITS: usize = 7;

/// Why a query was rejected before reaching the verifier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidQuery {
    #[error("cadastral_number is required")]
    MissingCadastralNumber,
    #[error("cadastral number '{0}' does not match the format AA:BB:CCCCCCC:D")]
    MalformedCadastralNumber(String),
    #[error("{field} is required")]
    MissingCoordinate { field: &'static str },
    #[error("{field} must be a finite number")]
    NonFiniteCoordinate { field: &'static str },
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// A query as received from a client. Every field is optional so that a
/// missing field is reported as [`InvalidQuery`] rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub cadastral_number: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl QueryRequest {
    pub fn new(cadastral_number: &str, latitude: f64, longitude: f64) -> Self {
        QueryRequest {
            cadastral_number: Some(cadastral_number.to_string()),
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    /// Check presence and shape of every field.
    pub fn validate(self) -> Result<ValidQuery, InvalidQuery> {
        let cadastral_number = match self.cadastral_number {
            Some(n) if !n.is_empty() => n,
            _ => return Err(InvalidQuery::MissingCadastralNumber),
        };
        validate_cadastral_number(&cadastral_number)?;

        let latitude = coordinate("latitude", self.latitude)?;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(InvalidQuery::LatitudeOutOfRange(latitude));
        }
        let longitude = coordinate("longitude", self.longitude)?;
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidQuery::LongitudeOutOfRange(longitude));
        }

        Ok(ValidQuery {
            cadastral_number,
            latitude,
            longitude,
        })
    }
}

fn coordinate(field: &'static str, value: Option<f64>) -> Result<f64, InvalidQuery> {
    match value {
        None => Err(InvalidQuery::MissingCoordinate { field }),
        Some(v) if !v.is_finite() => Err(InvalidQuery::NonFiniteCoordinate { field }),
        Some(v) => Ok(v),
    }
}

/// Check a cadastral number of the form `AA:BB:Q:P`.
///
/// `AA` and `BB` are exactly two digits, the quarter `Q` is 1 to 7 digits,
/// the parcel `P` is at least one digit, and the whole string is at most
/// 25 characters.
pub fn validate_cadastral_number(value: &str) -> Result<(), InvalidQuery> {
    let malformed = || InvalidQuery::MalformedCadastralNumber(value.to_string());

    if value.is_empty() || value.len() > MAX_CADASTRAL_LEN {
        return Err(malformed());
    }
    let groups: Vec<&str> = value.split(':').collect();
    let &[district, region, quarter, parcel] = groups.as_slice() else {
        return Err(malformed());
    };
    let digits = |g: &str| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit());

    let ok = digits(district)
        && district.len() == 2
        && digits(region)
        && region.len() == 2
        && digits(quarter)
        && quarter.len() <= MAX_QUARTER_DIGITS
        && digits(parcel);
    if ok {
        Ok(())
    } else {
        Err(malformed())
    }
}

/// A query that passed validation. Only a `ValidQuery` reaches a verifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidQuery {
    cadastral_number: String,
    latitude: f64,
    longitude: f64,
}

impl ValidQuery {
    pub fn cadastral_number(&self) -> &str {
        &self.cadastral_number
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}
