use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned client identifier.
pub type ClientId = i64;

const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Read an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A gym client as stored by the directory service.
///
/// Decoding tolerates partial records: the verify-access endpoint embeds
/// only a subset of the fields. Missing and `null` fields read as defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Client {
    #[serde(deserialize_with = "null_as_default")]
    pub id: ClientId,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    /// Membership expiration as sent by the server (ISO date, possibly with a time part).
    #[serde(deserialize_with = "null_as_default")]
    pub expiration_date: String,
    #[serde(deserialize_with = "null_as_default")]
    pub has_face: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub active: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Client {
    /// Parse the date portion of `expiration_date`.
    pub fn expires_on(&self) -> Option<NaiveDate> {
        let date = self.expiration_date.get(..10)?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    /// True if the membership ended strictly before `today`.
    ///
    /// Unparseable dates are not treated as expired.
    pub fn membership_expired(&self, today: NaiveDate) -> bool {
        self.expires_on().is_some_and(|d| d < today)
    }
}

/// Result of one verify-access call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    #[serde(deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub access_granted: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// Matched client, if the face was recognized.
    #[serde(default)]
    pub client: Option<Client>,
    /// Match confidence as a percentage (0–100).
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A captured still frame, carried as a JPEG data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    /// Wrap encoded JPEG bytes as a `data:image/jpeg;base64,` URL.
    pub fn from_jpeg(jpeg: &[u8]) -> Self {
        let mut url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        url.push_str(JPEG_DATA_URL_PREFIX);
        BASE64_STANDARD.encode_string(jpeg, &mut url);
        Self(url)
    }

    /// The full data URL.
    pub fn as_data_url(&self) -> &str {
        &self.0
    }

    /// Decode the JPEG payload back to bytes.
    pub fn jpeg_bytes(&self) -> Option<Vec<u8>> {
        let payload = self.0.strip_prefix(JPEG_DATA_URL_PREFIX)?;
        BASE64_STANDARD.decode(payload).ok()
    }

    /// Size of the data URL in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fields for creating a client without a face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub expiration_date: NaiveDate,
}

/// Fields for creating a client and enrolling their face in one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewClientWithFace {
    #[serde(flatten)]
    pub client: NewClient,
    pub image: Snapshot,
}

/// Partial update; absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl ClientUpdate {
    /// True if the update would not change anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.expiration_date.is_none()
            && self.active.is_none()
    }
}

/// Enroll a face for an existing client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterFace {
    pub client_id: ClientId,
    pub image: Snapshot,
}
