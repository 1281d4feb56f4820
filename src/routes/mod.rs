/// Router Module Index
///
/// Routes are split by the access check applied to them as a layer. Handlers still
/// enforce the finer role and ownership rules.

/// Unauthenticated routes (health check).
pub mod public;

/// Routes behind the `AuthUser` extractor layer. Any role may reach them.
pub mod authenticated;

/// Career-office routes: authenticated and gated on the reviewer role.
pub mod reviewer;
