//! Test suites for the bridge daemon.

mod behaviour;
pub(crate) mod support;
