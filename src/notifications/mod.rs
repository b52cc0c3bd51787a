//! Notification service for lifecycle events.
//!
//! Delivery failures are logged and swallowed; a broken notifier never
//! affects the monitoring core.

pub mod telegram;

pub use telegram::TelegramNotifier;

use std::sync::Arc;

/// Alert level for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Stalls and monitor failures
    Critical,
    /// Phase milestones
    Important,
    /// Periodic progress updates
    Info,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Critical => write!(f, "CRITICAL"),
            AlertLevel::Important => write!(f, "IMPORTANT"),
            AlertLevel::Info => write!(f, "INFO"),
        }
    }
}

/// Notification event types
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// A project entered the launch window
    ProjectStarted {
        name: String,
        symbol: String,
        t0: chrono::DateTime<chrono::Utc>,
        t1: chrono::DateTime<chrono::Utc>,
    },
    /// Periodic tax-window progress
    TaxUpdate {
        net_inflow: String,
        elapsed_minutes: i64,
        remaining_minutes: i64,
    },
    /// Periodic buyback progress
    BuybackUpdate {
        spent: String,
        progress: f64,
        eta_hours: f64,
    },
    /// The receiver stopped spending mid-buyback
    BuybackStalled { idle_minutes: i64 },
    /// The run completed (budget spent or graduation)
    ProjectCompleted {
        name: String,
        tax_total: String,
        spent_total: String,
    },
    /// A monitor hit an error the machine is riding out
    MonitorError { component: String, message: String },
}

impl NotificationEvent {
    /// Get the alert level for this event
    pub fn level(&self) -> AlertLevel {
        match self {
            NotificationEvent::BuybackStalled { .. } => AlertLevel::Critical,
            NotificationEvent::MonitorError { .. } => AlertLevel::Critical,
            NotificationEvent::ProjectStarted { .. } => AlertLevel::Important,
            NotificationEvent::ProjectCompleted { .. } => AlertLevel::Important,
            NotificationEvent::TaxUpdate { .. } => AlertLevel::Info,
            NotificationEvent::BuybackUpdate { .. } => AlertLevel::Info,
        }
    }
}

/// Notification service trait
#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    /// Send a notification
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()>;

    /// Check if the service is enabled
    fn is_enabled(&self) -> bool;
}

/// Composite notifier that can send to multiple services
pub struct CompositeNotifier {
    services: Vec<Arc<dyn NotificationService>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    pub fn add_service(&mut self, service: Arc<dyn NotificationService>) {
        self.services.push(service);
    }

    /// Send notification to all enabled services
    pub async fn notify(&self, event: NotificationEvent) {
        for service in &self.services {
            if service.is_enabled() {
                if let Err(e) = service.notify(event.clone()).await {
                    tracing::error!(
                        error = %e,
                        level = %event.level(),
                        "Failed to send notification"
                    );
                }
            }
        }
    }
}

impl Default for CompositeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_levels() {
        assert_eq!(
            NotificationEvent::BuybackStalled { idle_minutes: 6 }.level(),
            AlertLevel::Critical
        );
        assert_eq!(
            NotificationEvent::ProjectStarted {
                name: "A".into(),
                symbol: "A".into(),
                t0: chrono::Utc::now(),
                t1: chrono::Utc::now(),
            }
            .level(),
            AlertLevel::Important
        );
        assert_eq!(
            NotificationEvent::TaxUpdate {
                net_inflow: "1".into(),
                elapsed_minutes: 5,
                remaining_minutes: 95,
            }
            .level(),
            AlertLevel::Info
        );
    }

    #[test]
    fn test_composite_skips_disabled_services() {
        struct Disabled;

        #[async_trait::async_trait]
        impl NotificationService for Disabled {
            async fn notify(&self, _event: NotificationEvent) -> anyhow::Result<()> {
                panic!("disabled service must never be called");
            }
            fn is_enabled(&self) -> bool {
                false
            }
        }

        let mut composite = CompositeNotifier::new();
        composite.add_service(Arc::new(Disabled));
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(composite.notify(NotificationEvent::BuybackStalled { idle_minutes: 6 }));
    }
}
