//! Security-focused logging module to track security events
//!
//! One `SecurityLogger` is built at startup and handed to the services that
//! report events. Counters per event kind raise an alert through
//! `log::error!` once they reach their threshold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// Types of security events to track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication events
    AuthenticationFailed { email: String, reason: String },
    AuthenticationSuccess { user_id: Uuid, device_id: String },
    TokenRejected { reason: String },
    TokenRevoked { user_id: Option<Uuid>, reason: String },
    SessionsCleared { user_id: Uuid, count: usize },

    // Authorization events
    PermissionDenied { user_id: Uuid, care_subject_id: Uuid, action: String },

    // Guardian lifecycle
    InvitationConflict { user_id: Uuid, guardian_id: Option<Uuid>, detail: String },
}

impl SecurityEvent {
    /// Counter key for the event kind
    pub fn key(&self) -> &'static str {
        match self {
            SecurityEvent::AuthenticationFailed { .. } => "auth_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "auth_success",
            SecurityEvent::TokenRejected { .. } => "token_rejected",
            SecurityEvent::TokenRevoked { .. } => "token_revoked",
            SecurityEvent::SessionsCleared { .. } => "sessions_cleared",
            SecurityEvent::PermissionDenied { .. } => "permission_denied",
            SecurityEvent::InvitationConflict { .. } => "invitation_conflict",
        }
    }
}

/// Security event with timestamp
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: SecurityEvent,
    timestamp: Instant,
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    events: Arc<RwLock<Vec<TimestampedEvent>>>,
    event_counts: Arc<RwLock<HashMap<&'static str, usize>>>,
    alert_counters: Arc<RwLock<HashMap<&'static str, usize>>>,
    max_events: usize,
    alert_thresholds: HashMap<&'static str, usize>,
}

impl SecurityLogger {
    /// Create a new security logger
    pub fn new() -> Self {
        let mut alert_thresholds = HashMap::new();
        alert_thresholds.insert("auth_failed", 5);
        alert_thresholds.insert("token_rejected", 10);
        alert_thresholds.insert("permission_denied", 20);
        alert_thresholds.insert("invitation_conflict", 10);

        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            event_counts: Arc::new(RwLock::new(HashMap::new())),
            alert_counters: Arc::new(RwLock::new(HashMap::new())),
            max_events: 10000,
            alert_thresholds,
        }
    }

    /// Override the alert threshold of one event kind
    pub fn with_threshold(mut self, key: &'static str, threshold: usize) -> Self {
        self.alert_thresholds.insert(key, threshold);
        self
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let key = event.key();

        {
            let mut events = self.events.write().await;
            events.push(TimestampedEvent {
                event: event.clone(),
                timestamp: Instant::now(),
            });

            // Limit memory usage
            if events.len() > self.max_events {
                let events_to_remove = events.len() - self.max_events;
                events.drain(0..events_to_remove);
            }
        }

        *self.event_counts.write().await.entry(key).or_insert(0) += 1;

        if let Some(&threshold) = self.alert_thresholds.get(key) {
            let mut counters = self.alert_counters.write().await;
            let count = counters.entry(key).or_insert(0);
            *count += 1;
            if *count >= threshold {
                self.trigger_alert(key, *count, &event);
                *count = 0;
            }
        }

        match &event {
            SecurityEvent::AuthenticationFailed { email, reason } => {
                log::warn!("SECURITY: Authentication failed - Email: {}, Reason: {}", email, reason);
            }
            SecurityEvent::AuthenticationSuccess { user_id, device_id } => {
                log::info!("SECURITY: Authentication success - User: {}, Device: {}", user_id, device_id);
            }
            SecurityEvent::TokenRejected { reason } => {
                log::warn!("SECURITY: Token rejected - Reason: {}", reason);
            }
            SecurityEvent::TokenRevoked { user_id, reason } => {
                log::info!("SECURITY: Token revoked - User: {:?}, Reason: {}", user_id, reason);
            }
            SecurityEvent::SessionsCleared { user_id, count } => {
                log::info!("SECURITY: Sessions cleared - User: {}, Count: {}", user_id, count);
            }
            SecurityEvent::PermissionDenied { user_id, care_subject_id, action } => {
                log::warn!(
                    "SECURITY: Permission denied - User: {}, Care subject: {}, Action: {}",
                    user_id,
                    care_subject_id,
                    action
                );
            }
            SecurityEvent::InvitationConflict { user_id, guardian_id, detail } => {
                log::warn!(
                    "SECURITY: Invitation conflict - User: {}, Guardian: {:?}, Detail: {}",
                    user_id,
                    guardian_id,
                    detail
                );
            }
        }
    }

    /// Trigger security alert
    fn trigger_alert(&self, event_type: &str, count: usize, sample_event: &SecurityEvent) {
        log::error!("SECURITY ALERT: {} events of type '{}' detected", count, event_type);
        log::error!("Sample event: {:?}", sample_event);
    }

    /// Get recent security events
    pub async fn get_recent_events(&self, duration: Duration) -> Vec<SecurityEvent> {
        let events = self.events.read().await;
        let now = Instant::now();

        events
            .iter()
            .filter(|event| now.duration_since(event.timestamp) < duration)
            .map(|event| event.event.clone())
            .collect()
    }

    /// Total events recorded per kind
    pub async fn get_event_stats(&self) -> HashMap<&'static str, usize> {
        self.event_counts.read().await.clone()
    }

    pub async fn event_count(&self, key: &str) -> usize {
        self.event_counts.read().await.get(key).copied().unwrap_or(0)
    }

    /// Clean up old events
    pub async fn cleanup_old_events(&self, max_age: Duration) {
        let mut events = self.events.write().await;
        let now = Instant::now();

        events.retain(|event| now.duration_since(event.timestamp) < max_age);
    }

    /// Start periodic cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300)); // Every 5 minutes
            loop {
                interval.tick().await;
                self.cleanup_old_events(Duration::from_secs(3600 * 24)).await; // Keep 24 hours
            }
        });
    }
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared reference to the security logger
pub type SharedSecurityLogger = Arc<SecurityLogger>;
