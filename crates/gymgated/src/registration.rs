//! Registration screen: photo + form, submitted as one create-with-face request.

use chrono::NaiveDate;
use gymgate_core::{ApiError, Client, ClientDirectory, NewClient, NewClientWithFace, Snapshot};
use gymgate_hw::{CameraError, CaptureSource};
use std::sync::Arc;
use thiserror::Error;

/// Local checks that block submission before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("capture a photo before registering the client")]
    MissingPhoto,
    #[error("all fields are required")]
    MissingFields,
    #[error("invalid expiration date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),
}

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Capture(#[from] CameraError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Raw text fields as typed by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub expiration_date: String,
}

impl RegistrationForm {
    /// Trimmed fields, or the first validation failure.
    fn to_new_client(&self) -> Result<NewClient, ValidationError> {
        let name = self.name.trim();
        let email = self.email.trim();
        let expiration = self.expiration_date.trim();
        if name.is_empty() || email.is_empty() || expiration.is_empty() {
            return Err(ValidationError::MissingFields);
        }

        let expiration_date = NaiveDate::parse_from_str(expiration, "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidDate(expiration.to_string()))?;

        Ok(NewClient {
            name: name.to_string(),
            email: email.to_string(),
            expiration_date,
        })
    }
}

/// Collects a snapshot and the client fields for one registration.
pub struct RegistrationFlow<D: ClientDirectory, C: CaptureSource> {
    directory: Arc<D>,
    camera: Arc<C>,
    form: RegistrationForm,
    photo: Option<Snapshot>,
}

impl<D: ClientDirectory, C: CaptureSource> RegistrationFlow<D, C> {
    pub fn new(directory: Arc<D>, camera: Arc<C>) -> Self {
        Self {
            directory,
            camera,
            form: RegistrationForm::default(),
            photo: None,
        }
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RegistrationForm {
        &mut self.form
    }

    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    /// Clear the form and photo.
    pub fn reset(&mut self) {
        self.form = RegistrationForm::default();
        self.photo = None;
    }

    /// Take the registration photo from the live camera, replacing any earlier one.
    pub async fn capture(&mut self) -> Result<(), RegistrationError> {
        let photo = self.camera.capture().await?;
        tracing::debug!(bytes = photo.len(), "registration photo captured");
        self.photo = Some(photo);
        Ok(())
    }

    /// Discard the current photo.
    pub fn retake(&mut self) {
        self.photo = None;
    }

    /// Build the request, checking the photo first and then the fields.
    pub fn validate(&self) -> Result<NewClientWithFace, ValidationError> {
        let image = self.photo.clone().ok_or(ValidationError::MissingPhoto)?;
        let client = self.form.to_new_client()?;
        Ok(NewClientWithFace { client, image })
    }

    /// Create the client with their enrolled face in a single request.
    ///
    /// Validation failures never reach the network. On success the form is
    /// cleared.
    pub async fn submit(&mut self) -> Result<Client, RegistrationError> {
        let request = self.validate()?;
        let client = self.directory.create_client_with_face(&request).await?;
        tracing::info!(id = client.id, name = %client.name, "client registered with face");
        self.reset();
        Ok(client)
    }
}
