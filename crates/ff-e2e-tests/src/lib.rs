//! End-to-end tests for the Footfall publisher.
//!
//! This crate has no runtime code; the scenarios live under `tests/` and
//! drive `ff-publisher` against the mock transport from `ff-mqtt-channel`.
