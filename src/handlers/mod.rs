//! HTTP handlers, one module per resource. Each handler resolves the caller through the
//! `AuthUser` extractor, applies the role gate for its endpoint and delegates to the
//! repository or a service.

pub mod areas;
pub mod cvs;
pub mod jobs;
pub mod notifications;
pub mod profiles;
