use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use booking_cell::{
    BookingCoordinator, BookingPolicy, BookingStore, Clock, EventPublisher, HoldExpirySweeper,
    InMemoryBookingStore, SupabaseBookingStore, SystemClock,
};
use notification_cell::{
    ConnectionRegistry, InMemoryNotificationStore, NotificationDispatcher, NotificationStore,
    SupabaseNotificationStore,
};
use shared_config::{AppConfig, StoreBackend};
use shared_database::supabase::SupabaseClient;
use shared_models::events::BookingEvent;
use slot_cell::{ExpansionConfig, SlotExpansionService, SlotStore};

const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Storage handles shared by every cell. `booking` and `slots` point at the same backend.
#[derive(Clone)]
pub struct Stores {
    pub booking: Arc<dyn BookingStore>,
    pub slots: Arc<dyn SlotStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        match config.store_backend {
            StoreBackend::Memory => {
                warn!("Using in-memory storage, nothing survives a restart");
                Ok(Self::in_memory())
            }
            StoreBackend::Supabase => {
                if !config.is_configured() {
                    bail!("SUPABASE_URL and SUPABASE_ANON_PUBLIC_KEY are required for the supabase store backend");
                }
                let client = Arc::new(SupabaseClient::new(config));
                let booking = Arc::new(SupabaseBookingStore::new(client.clone()));
                Ok(Self {
                    booking: booking.clone(),
                    slots: booking,
                    notifications: Arc::new(SupabaseNotificationStore::new(client)),
                })
            }
        }
    }

    pub fn in_memory() -> Self {
        let booking = Arc::new(InMemoryBookingStore::new());
        Self {
            booking: booking.clone(),
            slots: booking,
            notifications: Arc::new(InMemoryNotificationStore::new()),
        }
    }
}

/// Everything the routers and background tasks need, wired once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<BookingCoordinator>,
    pub expansion: Arc<SlotExpansionService>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub registry: Arc<ConnectionRegistry>,
    pub slot_store: Arc<dyn SlotStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppServices {
    pub fn new(config: Arc<AppConfig>, stores: Stores) -> Result<(Self, mpsc::Receiver<BookingEvent>)> {
        Self::with_clock(config, stores, Arc::new(SystemClock))
    }

    /// Returns the services together with the receiving end of the event queue,
    /// which belongs to the notification dispatcher.
    pub fn with_clock(
        config: Arc<AppConfig>,
        stores: Stores,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::Receiver<BookingEvent>)> {
        let expansion_config = ExpansionConfig::from_app_config(&config)
            .context("invalid slot expansion settings")?;
        let (publisher, events) = EventPublisher::channel(EVENT_QUEUE_CAPACITY);

        let coordinator = Arc::new(BookingCoordinator::with_clock(
            stores.booking.clone(),
            publisher,
            BookingPolicy::from_app_config(&config),
            clock.clone(),
        ));
        let expansion = Arc::new(SlotExpansionService::new(stores.slots.clone(), expansion_config));
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(NotificationDispatcher::from_app_config(
            stores.notifications.clone(),
            registry.clone(),
            &config,
        ));

        let services = Self {
            config,
            coordinator,
            expansion,
            dispatcher,
            registry,
            slot_store: stores.slots,
            clock,
        };
        Ok((services, events))
    }

    pub fn sweeper(&self) -> HoldExpirySweeper {
        let interval = std::time::Duration::from_secs(self.config.hold_sweep_interval_seconds.max(1));
        HoldExpirySweeper::with_clock(self.slot_store.clone(), interval, self.clock.clone())
    }

    /// Starts the dispatcher and the hold sweeper.
    pub fn spawn_background(&self, events: mpsc::Receiver<BookingEvent>) -> BackgroundTasks {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let dispatcher = tokio::spawn(self.dispatcher.clone().run(events));
        let sweeper = self.sweeper().start(shutdown_rx);

        info!("Background tasks started (sweep every {}s)", self.config.hold_sweep_interval_seconds.max(1));
        BackgroundTasks { shutdown, dispatcher, sweeper }
    }
}

pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Stops the sweeper and waits for the dispatcher to drain its queue.
    ///
    /// The dispatcher only finishes once every `AppServices` clone holding the
    /// event sender has been dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.sweeper.await {
            warn!("Hold sweeper ended abnormally: {}", e);
        }
        if let Err(e) = self.dispatcher.await {
            warn!("Notification dispatcher ended abnormally: {}", e);
        }
        info!("Background tasks stopped");
    }
}
