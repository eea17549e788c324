//! The single UI context.
//!
//! Control events and location samples are both handled here, one at a
//! time, so coordinators and tracker delivery never run concurrently. A
//! location start waiting on the provider runs as a tracked task and its
//! result is applied back here.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use nimbus_weather::{Coordinates, LocationError, Units};

use crate::app_services::AppServices;
use crate::coordinators::EnableStep;
use crate::tracker::SampleReceiver;

/// Control events coming from the window
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    LocationToggled(bool),
    ThemeToggled(bool),
    LanguageChanged(String),
    UnitChanged(Units),
    CitySearched(String),
    RefreshRequested,
    Shutdown,
}

pub struct UiLoop {
    services: Arc<AppServices>,
    events: mpsc::Receiver<UiEvent>,
    samples: SampleReceiver,
    /// At most one location start waiting on the provider
    enabling: JoinSet<Result<Coordinates, LocationError>>,
}

impl UiLoop {
    pub fn new(
        services: Arc<AppServices>,
        events: mpsc::Receiver<UiEvent>,
        samples: SampleReceiver,
    ) -> Self {
        Self {
            services,
            events,
            samples,
            enabling: JoinSet::new(),
        }
    }

    /// Run until `Shutdown` arrives or every event sender is gone, then shut
    /// the services down.
    pub async fn run(mut self) {
        tracing::debug!("UI loop running");
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(UiEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event).await,
                },
                Some(sample) = self.samples.recv() => {
                    self.services.tracker().deliver(sample);
                }
                Some(joined) = self.enabling.join_next(), if !self.enabling.is_empty() => {
                    let result = joined.unwrap_or_else(|e| {
                        Err(LocationError::Other(format!("location start failed: {}", e)))
                    });
                    self.services.location().finish_enable(result);
                }
            }
        }
        self.cancel_enable().await;
        self.services.shutdown().await;
    }

    async fn handle_event(&mut self, event: UiEvent) {
        tracing::debug!("UI event: {:?}", event);
        match event {
            UiEvent::LocationToggled(true) => self.begin_enable(),
            UiEvent::LocationToggled(false) => {
                self.cancel_enable().await;
                self.services.location().handle_toggle(false).await;
            }
            UiEvent::ThemeToggled(is_dark) => {
                self.services.theme().handle_toggle(is_dark);
            }
            UiEvent::LanguageChanged(language) => {
                self.services.preferences().language_changed(&language);
            }
            UiEvent::UnitChanged(unit) => {
                self.services.preferences().unit_changed(unit);
            }
            UiEvent::CitySearched(city) => {
                self.cancel_enable().await;
                self.services.preferences().city_searched(&city).await;
            }
            UiEvent::RefreshRequested => self.services.weather().request_refresh(),
            UiEvent::Shutdown => {}
        }
    }

    fn begin_enable(&mut self) {
        if !self.enabling.is_empty() {
            tracing::debug!("Location start already pending");
            return;
        }
        if let EnableStep::Start(start) = self.services.location().begin_enable() {
            self.enabling.spawn(start);
        }
    }

    /// Drop a pending location start; its permission guard returns the
    /// tracker to Idle
    async fn cancel_enable(&mut self) {
        if self.enabling.is_empty() {
            return;
        }
        self.enabling.abort_all();
        while self.enabling.join_next().await.is_some() {}
        tracing::debug!("Pending location start cancelled");
    }
}
