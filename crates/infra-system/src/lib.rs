// Cadence Infrastructure - System Adapters
// Implements: AlertSink (external command), instance identity detection

pub mod command_alert_sink;
pub mod identity;

pub use command_alert_sink::{AlertDeliveryError, CommandAlertSink};
pub use identity::detect_identity;
