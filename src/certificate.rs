//! Certificate records and issuance requests
//!
//! A certificate travels on the chain as a block payload of the form
//! `{"certificate": {...}}`.

use crate::blockchain::now_timestamp;
use crate::error::{ChainError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Payload key under which a certificate is stored in a block.
pub const CERTIFICATE_KEY: &str = "certificate";

/// Length of a certificate id, in hex characters.
pub const CERTIFICATE_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    pub recipient: String,
    pub course: String,
    #[serde(default)]
    pub grade: String,
    pub issuer: String,
    pub date_issued: String,
    pub issued_at: String,
}

impl Certificate {
    /// Wrap the certificate into a block payload.
    pub fn to_payload(&self) -> Result<Value> {
        let mut payload = Map::new();
        payload.insert(CERTIFICATE_KEY.to_string(), serde_json::to_value(self)?);
        Ok(Value::Object(payload))
    }

    /// Extract a certificate from a block payload, if it carries one.
    pub fn from_payload(data: &Value) -> Option<Certificate> {
        data.get(CERTIFICATE_KEY)
            .and_then(|cert| serde_json::from_value(cert.clone()).ok())
    }
}

/// Returns true if `data` carries a certificate whose id is `id`.
pub fn payload_has_id(data: &Value, id: &str) -> bool {
    data.get(CERTIFICATE_KEY)
        .and_then(|cert| cert.get("id"))
        .and_then(Value::as_str)
        == Some(id)
}

/// Incoming issuance request. Fields are optional here so that missing ones
/// are reported as bad input rather than rejected by the decoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub date_issued: Option<String>,
}

impl IssueRequest {
    /// Validate required fields and stamp a new certificate with an id and
    /// issuance time.
    pub fn into_certificate(self) -> Result<Certificate> {
        let recipient = required(self.recipient, "recipient")?;
        let course = required(self.course, "course")?;
        let issuer = required(self.issuer, "issuer")?;
        let date_issued = required(self.date_issued, "dateIssued")?;
        let grade = self.grade.map(|g| g.trim().to_string()).unwrap_or_default();

        let id = make_certificate_id(&recipient, &course, &issuer, &date_issued);

        Ok(Certificate {
            id,
            recipient,
            course,
            grade,
            issuer,
            date_issued,
            issued_at: now_timestamp(),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ChainError::InvalidInput(format!(
            "missing required field: {}",
            field
        ))),
    }
}

/// Short certificate id: a truncated SHA-256 over the identifying fields
/// and a random salt, so re-issuing the same certificate yields a new id.
pub fn make_certificate_id(
    recipient: &str,
    course: &str,
    issuer: &str,
    date_issued: &str,
) -> String {
    let salt: u64 = rand::thread_rng().gen();

    let mut hasher = Sha256::new();
    hasher.update(recipient);
    hasher.update(course);
    hasher.update(issuer);
    hasher.update(date_issued);
    hasher.update(salt.to_string());

    let mut id = hex::encode(hasher.finalize());
    id.truncate(CERTIFICATE_ID_LEN);
    id
}
