//! Test suites for the dispatch engine.

mod support;
