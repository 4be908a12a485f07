//! Notifier that writes summaries to the log.

use crate::domain::error::QuadtraderError;
use crate::ports::notifier_port::NotifierPort;
use tracing::info;

#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotifierPort for LogNotifier {
    fn notify(&self, message: &str) -> Result<(), QuadtraderError> {
        for line in message.lines() {
            info!(target: "quadtrader::notify", "{line}");
        }
        Ok(())
    }
}
