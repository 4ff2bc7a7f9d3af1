//! Provider downloads and terminal plumbing for the CLI.

pub(crate) mod downloads;
pub(crate) mod logging;
