//! Service seams between the kiosk and the remote API.
//!
//! The kiosk depends on these traits rather than on [`ApiClient`](crate::ApiClient)
//! directly, so tests can substitute in-memory fakes.

use crate::error::ApiError;
use crate::types::{
    Client, ClientId, ClientUpdate, NewClient, NewClientWithFace, RecognitionOutcome,
    RegisterFace, Snapshot,
};
use std::future::Future;

/// Remote face-recognition service: one still in, one access decision out.
pub trait RecognitionService: Send + Sync + 'static {
    fn verify_access(
        &self,
        image: &Snapshot,
    ) -> impl Future<Output = Result<RecognitionOutcome, ApiError>> + Send;
}

/// Remote client directory: CRUD over client records plus face enrollment.
pub trait ClientDirectory: Send + Sync + 'static {
    fn list_clients(&self) -> impl Future<Output = Result<Vec<Client>, ApiError>> + Send;

    fn get_client(&self, id: ClientId) -> impl Future<Output = Result<Client, ApiError>> + Send;

    fn create_client(
        &self,
        client: &NewClient,
    ) -> impl Future<Output = Result<Client, ApiError>> + Send;

    /// Create a client and enroll their face in a single request.
    fn create_client_with_face(
        &self,
        client: &NewClientWithFace,
    ) -> impl Future<Output = Result<Client, ApiError>> + Send;

    fn update_client(
        &self,
        id: ClientId,
        update: &ClientUpdate,
    ) -> impl Future<Output = Result<Client, ApiError>> + Send;

    fn register_face(
        &self,
        request: &RegisterFace,
    ) -> impl Future<Output = Result<Client, ApiError>> + Send;
}
