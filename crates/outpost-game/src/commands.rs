//! Command channel bodies (client to server, one request per command)

use crate::{BuildingKind, Error, HexCoord, Result};
use serde::{Deserialize, Serialize};

/// Place a building: `{"type": "Habitat" | "Mineshaft", "coord": {"i", "j"}}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaceBuildingRequest {
    #[serde(rename = "type")]
    pub kind: BuildingKind,
    pub coord: HexCoord,
}

#[derive(Deserialize)]
struct RawPlaceBuilding {
    #[serde(rename = "type")]
    kind: String,
    coord: HexCoord,
}

impl PlaceBuildingRequest {
    pub fn new(kind: BuildingKind, coord: HexCoord) -> Self {
        Self { kind, coord }
    }

    /// Decode a request body; an unknown `type` is `UnrecognizedVariant`
    pub fn decode(body: &str) -> Result<Self> {
        let raw: RawPlaceBuilding = serde_json::from_str(body)?;
        Ok(Self {
            kind: raw.kind.parse()?,
            coord: raw.coord,
        })
    }

    /// Encode as a request body
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sign in: `{"username", "password"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
}

/// Outcome of a sign-in, carried by the response status alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    Ok,
    RejectedCredentials,
    Failed(u16),
}

impl SignInOutcome {
    /// Interpret an HTTP status code
    pub fn from_status(status: u16) -> Result<Self> {
        match status {
            200..=299 => Ok(SignInOutcome::Ok),
            401 | 403 => Ok(SignInOutcome::RejectedCredentials),
            400..=599 => Ok(SignInOutcome::Failed(status)),
            other => Err(Error::unrecognized("sign-in status", other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_place_building() {
        let request =
            PlaceBuildingRequest::decode(r#"{"type": "Habitat", "coord": {"i": 1, "j": 2}}"#)
                .unwrap();
        assert_eq!(
            request,
            PlaceBuildingRequest::new(BuildingKind::Habitat, HexCoord::new(1, 2))
        );
    }

    #[test]
    fn test_unknown_building_type() {
        let err = PlaceBuildingRequest::decode(r#"{"type": "Castle", "coord": {"i": 0, "j": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::UnrecognizedVariant { ref value, .. } if value == "Castle"));
    }

    #[test]
    fn test_malformed_body() {
        let err = PlaceBuildingRequest::decode(r#"{"type": "Habitat"}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_encode_uses_type_field() {
        let body = PlaceBuildingRequest::new(BuildingKind::Mineshaft, HexCoord::new(0, -1))
            .encode()
            .unwrap();
        assert_eq!(body, r#"{"type":"Mineshaft","coord":{"i":0,"j":-1}}"#);
    }

    #[test]
    fn test_sign_in_request_shape() {
        let request: SignInRequest =
            serde_json::from_str(r#"{"username": "ada", "password": "hunter2"}"#).unwrap();
        assert_eq!(request.username, "ada");
    }

    #[test]
    fn test_sign_in_outcome() {
        assert_eq!(SignInOutcome::from_status(204).unwrap(), SignInOutcome::Ok);
        assert_eq!(
            SignInOutcome::from_status(401).unwrap(),
            SignInOutcome::RejectedCredentials
        );
        assert_eq!(
            SignInOutcome::from_status(503).unwrap(),
            SignInOutcome::Failed(503)
        );
        assert!(SignInOutcome::from_status(302).is_err());
    }
}
