//! In-memory fakes for the API and camera seams.

use gymgate_core::{
    ApiError, Client, ClientDirectory, ClientId, ClientUpdate, NewClient, NewClientWithFace,
    RecognitionOutcome, RecognitionService, RegisterFace, Snapshot,
};
use gymgate_hw::{CameraError, CaptureSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// Let spawned tasks run to their next suspension point without moving the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn outcome_from_json(s: &str) -> RecognitionOutcome {
    serde_json::from_str(s).unwrap()
}

pub fn ana_welcome() -> RecognitionOutcome {
    outcome_from_json(
        r#"{"success":true,"access_granted":true,"message":"Welcome",
            "client":{"id":1,"name":"Ana"},"confidence":97}"#,
    )
}

pub fn granted(name: &str) -> RecognitionOutcome {
    RecognitionOutcome {
        success: true,
        access_granted: true,
        message: format!("Welcome {name}"),
        client: Some(Client {
            id: 7,
            name: name.into(),
            ..Client::default()
        }),
        confidence: Some(91.0),
    }
}

pub fn denied() -> RecognitionOutcome {
    RecognitionOutcome {
        success: true,
        access_granted: false,
        message: "Access denied".into(),
        client: None,
        confidence: None,
    }
}

pub fn client(id: ClientId, name: &str) -> Client {
    Client {
        id,
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        expiration_date: "2030-01-01".into(),
        has_face: true,
        active: true,
        ..Client::default()
    }
}

/// Scripted API. With a gate, every verify call waits for a permit.
pub struct FakeApi {
    verify_calls: AtomicUsize,
    verify_script: Mutex<VecDeque<Result<RecognitionOutcome, ApiError>>>,
    gate: Option<Semaphore>,
    list_calls: AtomicUsize,
    list_script: Mutex<VecDeque<Result<Vec<Client>, ApiError>>>,
    created: Mutex<Vec<NewClientWithFace>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            verify_calls: AtomicUsize::new(0),
            verify_script: Mutex::new(VecDeque::new()),
            gate: None,
            list_calls: AtomicUsize::new(0),
            list_script: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn push_verify(&self, result: Result<RecognitionOutcome, ApiError>) {
        self.verify_script.lock().unwrap().push_back(result);
    }

    pub fn push_list(&self, result: Result<Vec<Client>, ApiError>) {
        self.list_script.lock().unwrap().push_back(result);
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<NewClientWithFace> {
        self.created.lock().unwrap().clone()
    }
}

fn unscripted() -> ApiError {
    ApiError::Transport("no scripted response".into())
}

impl RecognitionService for FakeApi {
    async fn verify_access(&self, _image: &Snapshot) -> Result<RecognitionOutcome, ApiError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let next = self.verify_script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unscripted()))
    }
}

impl ClientDirectory for FakeApi {
    async fn list_clients(&self) -> Result<Vec<Client>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.list_script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unscripted()))
    }

    async fn get_client(&self, _id: ClientId) -> Result<Client, ApiError> {
        Err(unscripted())
    }

    async fn create_client(&self, _client: &NewClient) -> Result<Client, ApiError> {
        Err(unscripted())
    }

    async fn create_client_with_face(&self, request: &NewClientWithFace) -> Result<Client, ApiError> {
        self.created.lock().unwrap().push(request.clone());
        Ok(Client {
            id: 42,
            name: request.client.name.clone(),
            email: request.client.email.clone(),
            expiration_date: request.client.expiration_date.to_string(),
            has_face: true,
            active: true,
            ..Client::default()
        })
    }

    async fn update_client(&self, _id: ClientId, _update: &ClientUpdate) -> Result<Client, ApiError> {
        Err(unscripted())
    }

    async fn register_face(&self, _request: &RegisterFace) -> Result<Client, ApiError> {
        Err(unscripted())
    }
}

/// Camera that returns a tiny fixed JPEG, or fails on demand.
///
/// Like the V4L2 source, a capture (re)opens the device. With a gate, each
/// capture waits for a permit before grabbing the frame.
pub struct FakeCamera {
    captures: AtomicUsize,
    releases: AtomicUsize,
    open: AtomicBool,
    failing: AtomicBool,
    gate: Option<Semaphore>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            captures: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            open: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            gate: None,
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl CaptureSource for FakeCamera {
    async fn capture(&self) -> Result<Snapshot, CameraError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CameraError::DeviceNotFound("/dev/video0".into()));
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(Snapshot::from_jpeg(&[0xff, 0xd8, 0xff, 0xd9]))
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }
}
