//! MQTT topics used by the publisher.
//!
//! Every run publishes exactly one snapshot to a single fixed topic.
//! Deployments may override it through configuration; the default
//! matches the topic the devices have always reported on.

/// Default topic for telemetry snapshots.
pub const TELEMETRY: &str = "sdk/test/Python";

/// Check that a topic name is usable for publishing.
///
/// Publish topics must be non-empty, must not contain MQTT wildcards,
/// and must not contain a NUL character.
pub fn is_valid_publish_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#', '\0'])
}
