//! Behaviour of the plugins installed together in one engine.
