use std::collections::BTreeMap;
use tracing::{Level, debug, error, info, trace, warn};

/// Fields attached to every message of a [`StructuredLogger`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    /// Component name (e.g., "poller", "controller", "web")
    pub component: String,
    pub station_id: Option<String>,
    /// Charge run identifier
    pub session_id: Option<String>,
    /// Emitted after the fixed fields, in key order
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            ..Self::default()
        }
    }

    pub fn with_station_id(mut self, station_id: &str) -> Self {
        self.station_id = Some(station_id.to_string());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl ToString) -> Self {
        self.extra_fields.insert(key.to_string(), value.to_string());
        self
    }

    /// `key=value` pairs joined by commas
    fn render(&self) -> String {
        let fixed = [
            Some(("component", self.component.as_str())),
            self.station_id.as_deref().map(|v| ("station_id", v)),
            self.session_id.as_deref().map(|v| ("session_id", v)),
        ];
        fixed
            .into_iter()
            .flatten()
            .chain(self.extra_fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Logger that prefixes every event with its context as a `fields` value
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
    fields: String,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        let fields = context.render();
        Self { context, fields }
    }

    /// Same component, scoped to one station
    pub fn for_station(&self, station_id: &str) -> Self {
        Self::new(self.context.clone().with_station_id(station_id))
    }

    pub fn info(&self, message: &str) {
        self.emit(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Level::ERROR, message);
    }

    pub fn debug(&self, message: &str) {
        self.emit(Level::DEBUG, message);
    }

    pub fn trace(&self, message: &str) {
        self.emit(Level::TRACE, message);
    }

    fn emit(&self, level: Level, message: &str) {
        let fields = self.fields.as_str();
        match level {
            Level::ERROR => error!(%fields, "{}", message),
            Level::WARN => warn!(%fields, "{}", message),
            Level::INFO => info!(%fields, "{}", message),
            Level::DEBUG => debug!(%fields, "{}", message),
            Level::TRACE => trace!(%fields, "{}", message),
        }
    }
}

/// Logger for a component with no further context
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context() {
        let context = LogContext::new("test")
            .with_station_id("st-7")
            .with_session_id("run-123")
            .with_field("price", 180.5);

        assert_eq!(context.component, "test");
        assert_eq!(context.station_id.as_deref(), Some("st-7"));
        assert_eq!(context.session_id.as_deref(), Some("run-123"));
        assert_eq!(context.extra_fields.get("price").map(String::as_str), Some("180.5"));
    }

    #[test]
    fn test_rendered_fields() {
        let logger = get_logger_with_context(
            LogContext::new("poller")
                .with_field("b", 2)
                .with_field("a", 1),
        )
        .for_station("st-1");
        assert_eq!(logger.fields, "component=poller,station_id=st-1,a=1,b=2");
    }

    #[test]
    fn test_get_logger() {
        let logger = get_logger("test_component");
        assert_eq!(logger.context.component, "test_component");
        assert!(logger.context.station_id.is_none());
        assert_eq!(logger.fields, "component=test_component");
    }
}
