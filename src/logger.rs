//! Destinations for the one summary line every call emits.
//!
//! A runner holds a [`Logger`], a cheap handle around an optional
//! [`CallLogger`]. Without a sink the line is dropped. Two handles compare
//! equal when both are the null sink or both point at the same sink
//! instance, which is what runner equality relies on.
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

pub trait CallLogger: Send + Sync {
    fn info(&self, line: &str);
}

impl<F> CallLogger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn info(&self, line: &str) {
        self(line)
    }
}

/// Forwards summary lines to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLogger;

impl CallLogger for LogLogger {
    fn info(&self, line: &str) {
        log::info!(target: "courier", "{line}");
    }
}

#[derive(Clone, Default)]
pub struct Logger {
    sink: Option<Arc<dyn CallLogger>>,
}

impl Logger {
    /// The no-op sink.
    pub fn null() -> Self {
        Self::default()
    }

    pub fn new(sink: impl CallLogger + 'static) -> Self {
        let sink: Arc<dyn CallLogger> = Arc::new(sink);
        Self { sink: Some(sink) }
    }

    pub fn from_arc(sink: Arc<dyn CallLogger>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn is_null(&self) -> bool {
        self.sink.is_none()
    }

    pub fn info(&self, line: &str) {
        if let Some(sink) = &self.sink {
            sink.info(line);
        }
    }

    fn addr(&self) -> Option<usize> {
        self.sink
            .as_ref()
            .map(|sink| Arc::as_ptr(sink) as *const () as usize)
    }
}

impl PartialEq for Logger {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Logger {}

impl Hash for Logger {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr() {
            None => write!(f, "Logger(null)"),
            Some(addr) => write!(f, "Logger({addr:#x})"),
        }
    }
}

impl<T: CallLogger + 'static> From<Arc<T>> for Logger {
    fn from(sink: Arc<T>) -> Self {
        let sink: Arc<dyn CallLogger> = sink;
        Self { sink: Some(sink) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn null_loggers_are_equal() {
        assert_eq!(Logger::null(), Logger::default());
        assert!(Logger::null().is_null());
        Logger::null().info("dropped");
    }

    #[test]
    fn clones_share_identity() {
        let logger = Logger::new(LogLogger);
        assert_eq!(logger, logger.clone());
        assert_ne!(logger, Logger::new(LogLogger));
        assert_ne!(logger, Logger::null());
    }

    #[test]
    fn closures_receive_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let logger = Logger::new(move |line: &str| captured.lock().unwrap().push(line.to_string()));

        logger.info("one");
        logger.info("two");
        assert_eq!(*lines.lock().unwrap(), vec!["one", "two"]);
    }
}
