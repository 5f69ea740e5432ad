//! Usage: Domain modules (account registry and rotation rules).

pub(crate) mod accounts;
pub(crate) mod rotation;
