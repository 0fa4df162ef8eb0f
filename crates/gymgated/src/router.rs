//! Screen switching. Entering the access screen runs the poller; every
//! other screen stops it. Entering the clients screen reloads the directory.

use crate::poller::{AccessPoller, PollerConfig};
use crate::registration::{RegistrationError, RegistrationFlow};
use gymgate_core::{Client, ClientDirectory, RecognitionService};
use gymgate_hw::CaptureSource;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The kiosk's screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Access,
    Clients,
    Register,
}

impl View {
    /// Screens that hold the camera open.
    fn uses_camera(self) -> bool {
        matches!(self, View::Access | View::Register)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            View::Access => "access",
            View::Clients => "clients",
            View::Register => "register",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown view {0:?} (expected access, clients, or register)")]
pub struct UnknownView(String);

impl FromStr for View {
    type Err = UnknownView;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "access" => Ok(View::Access),
            "clients" => Ok(View::Clients),
            "register" => Ok(View::Register),
            other => Err(UnknownView(other.to_string())),
        }
    }
}

/// Cached client list for the clients screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryState {
    pub clients: Vec<Client>,
    pub loading: bool,
    pub last_error: Option<String>,
}

/// Owns the active screen and reacts to changes.
pub struct ViewRouter<A, C>
where
    A: RecognitionService + ClientDirectory,
    C: CaptureSource,
{
    view: View,
    api: Arc<A>,
    camera: Arc<C>,
    poller: AccessPoller<A, C>,
    registration: RegistrationFlow<A, C>,
    directory: Arc<watch::Sender<DirectoryState>>,
    reload: Option<JoinHandle<()>>,
}

impl<A, C> ViewRouter<A, C>
where
    A: RecognitionService + ClientDirectory,
    C: CaptureSource,
{
    /// Create a router showing `initial`. Nothing is loaded or started
    /// until [`activate`](Self::activate) or the first [`switch`](Self::switch).
    pub fn new(api: Arc<A>, camera: Arc<C>, poller_config: PollerConfig, initial: View) -> Self {
        let poller = AccessPoller::new(Arc::clone(&api), Arc::clone(&camera), poller_config);
        let registration = RegistrationFlow::new(Arc::clone(&api), Arc::clone(&camera));
        let (directory, _) = watch::channel(DirectoryState::default());
        Self {
            view: initial,
            api,
            camera,
            poller,
            registration,
            directory: Arc::new(directory),
            reload: None,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn poller(&self) -> &AccessPoller<A, C> {
        &self.poller
    }

    pub fn registration(&self) -> &RegistrationFlow<A, C> {
        &self.registration
    }

    pub fn registration_mut(&mut self) -> &mut RegistrationFlow<A, C> {
        &mut self.registration
    }

    pub fn directory(&self) -> DirectoryState {
        self.directory.borrow().clone()
    }

    pub fn subscribe_directory(&self) -> watch::Receiver<DirectoryState> {
        self.directory.subscribe()
    }

    /// Make `view` the active screen and apply its side effects.
    /// Switching to the screen already shown does nothing.
    pub fn switch(&mut self, view: View) {
        let previous = std::mem::replace(&mut self.view, view);
        if previous == view {
            return;
        }

        if previous == View::Access {
            self.poller.stop();
        }
        if previous.uses_camera() {
            self.camera.release();
        }

        tracing::info!(from = %previous, to = %view, "view switched");
        self.activate();
    }

    /// Apply the entry side effects of the active screen: run or stop the
    /// poller, reload the directory, or reset the registration form.
    pub fn activate(&mut self) {
        if self.view == View::Access {
            self.poller.start();
        } else {
            self.poller.stop();
        }

        match self.view {
            View::Clients => self.reload_directory(),
            View::Register => self.registration.reset(),
            View::Access => {}
        }
    }

    /// Fetch the client list in the background.
    ///
    /// A reload already running is abandoned in favor of this one.
    pub fn reload_directory(&mut self) {
        if let Some(previous) = self.reload.take() {
            previous.abort();
        }
        self.directory.send_modify(|d| {
            d.loading = true;
            d.last_error = None;
        });

        let api = Arc::clone(&self.api);
        let directory = Arc::clone(&self.directory);
        self.reload = Some(tokio::spawn(async move {
            match api.list_clients().await {
                Ok(clients) => {
                    tracing::info!(count = clients.len(), "client directory loaded");
                    directory.send_modify(|d| {
                        d.clients = clients;
                        d.loading = false;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "client directory load failed");
                    directory.send_modify(|d| {
                        d.loading = false;
                        d.last_error = Some(e.to_string());
                    });
                }
            }
        }));
    }

    /// Submit the registration form; on success show the clients screen.
    pub async fn submit_registration(&mut self) -> Result<Client, RegistrationError> {
        let client = self.registration.submit().await?;
        self.switch(View::Clients);
        Ok(client)
    }

    /// Stop polling, cancel any reload and close the camera.
    pub fn shutdown(&mut self) {
        self.poller.stop();
        if let Some(reload) = self.reload.take() {
            reload.abort();
        }
        self.camera.release();
    }
}

impl<A, C> Drop for ViewRouter<A, C>
where
    A: RecognitionService + ClientDirectory,
    C: CaptureSource,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
