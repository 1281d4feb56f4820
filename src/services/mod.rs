//! Workflows that span several collaborators (repository, storage, identity, mail).

pub mod cv;
pub mod notification;
pub mod templates;

pub use cv::{CvService, CvUpload};
pub use notification::{CvStatusNotice, NotificationOutcome, NotificationService};
