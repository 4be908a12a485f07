//! Notification channel port trait.

use crate::domain::error::QuadtraderError;

pub trait NotifierPort {
    fn notify(&self, message: &str) -> Result<(), QuadtraderError>;
}
