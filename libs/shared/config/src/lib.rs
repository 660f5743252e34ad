use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub store_backend: StoreBackend,
    pub server_port: u16,
    pub hold_ttl_seconds: i64,
    pub hold_sweep_interval_seconds: u64,
    pub slot_duration_minutes: i64,
    pub schedule_utc_offset_minutes: i32,
    pub max_expansion_days: i64,
    pub reopen_cancelled_slots: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            store_backend: match env::var("BOOKING_STORE").as_deref() {
                Ok("memory") => StoreBackend::Memory,
                Ok("supabase") | Err(_) => StoreBackend::Supabase,
                Ok(other) => {
                    warn!("Unknown BOOKING_STORE '{}', using supabase", other);
                    StoreBackend::Supabase
                }
            },
            server_port: parse_or("SERVER_PORT", 3000),
            hold_ttl_seconds: parse_or("HOLD_TTL_SECONDS", 300),
            hold_sweep_interval_seconds: parse_or("HOLD_SWEEP_INTERVAL_SECONDS", 30),
            slot_duration_minutes: parse_or("SLOT_DURATION_MINUTES", 30),
            schedule_utc_offset_minutes: parse_or("SCHEDULE_UTC_OFFSET_MINUTES", 0),
            max_expansion_days: parse_or("MAX_EXPANSION_DAYS", 90),
            reopen_cancelled_slots: parse_or("REOPEN_CANCELLED_SLOTS", false),
        };

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

impl Default for AppConfig {
    /// Booking defaults with no Supabase connection; used by tests and the memory backend.
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            store_backend: StoreBackend::Memory,
            server_port: 3000,
            hold_ttl_seconds: 300,
            hold_sweep_interval_seconds: 30,
            slot_duration_minutes: 30,
            schedule_utc_offset_minutes: 0,
            max_expansion_days: 90,
            reopen_cancelled_slots: false,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
