//! Wire payloads: flat records serialized into frame bodies.
//!
//! Geometry is `f32`. Identifiers and colors are opaque strings that only
//! the consumer interprets.

// Plain data records; field names are the documentation.
#![allow(missing_docs)]

use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Maximum points carried per motion trail
pub const MAX_TRAIL_POINTS: usize = 8;

/// Maximum trail points carried per projectile
pub const MAX_PROJECTILE_TRAIL_POINTS: usize = 4;

/// Stream geometry and bitrate, sent to every new consumer and on change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Target frame rate
    pub fps: u32,
    /// Target bitrate in kbit/s
    pub bitrate_kbps: u32,
}

impl StreamConfig {
    /// Create a config
    #[must_use]
    pub const fn new(width: u32, height: u32, fps: u32, bitrate_kbps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            bitrate_kbps,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(1280, 720, 30, 4500)
    }
}

/// One recorded position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

/// Point list that never holds more than `N` entries.
///
/// Building from a longer history keeps the `N` most recent points (the tail).
/// Deserialization applies the same rule, so an over-long list from a
/// misbehaving peer is clipped rather than rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundedPoints<const N: usize>(Vec<TrailPoint>);

impl<const N: usize> BoundedPoints<N> {
    /// Capacity of this list
    pub const CAPACITY: usize = N;

    /// Empty list
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Keep the last `N` points of `history`, oldest first.
    pub fn from_recent<I>(history: I) -> Self
    where
        I: IntoIterator<Item = TrailPoint>,
    {
        let mut points: Vec<TrailPoint> = history.into_iter().collect();
        if points.len() > N {
            points.drain(..points.len() - N);
        }
        Self(points)
    }

    /// Points, oldest first
    #[must_use]
    pub fn as_slice(&self) -> &[TrailPoint] {
        &self.0
    }

    /// Consume into the inner vector
    #[must_use]
    pub fn into_inner(self) -> Vec<TrailPoint> {
        self.0
    }
}

impl<const N: usize> Deref for BoundedPoints<N> {
    type Target = [TrailPoint];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> FromIterator<TrailPoint> for BoundedPoints<N> {
    fn from_iter<I: IntoIterator<Item = TrailPoint>>(iter: I) -> Self {
        Self::from_recent(iter)
    }
}

impl<const N: usize> Serialize for BoundedPoints<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, const N: usize> Deserialize<'de> for BoundedPoints<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<TrailPoint>::deserialize(deserializer).map(Self::from_recent)
    }
}

/// Participant record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub color: String,
    pub alive: bool,
    pub eliminations: u32,
    /// Non-zero while the actor flashes after taking a hit
    pub hit_flash: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: f32,
    pub color: String,
    /// Remaining life in `0.0..=1.0`
    pub life: f32,
}

/// Short-lived visual effect (explosion ring, spawn flash, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color: String,
    pub progress: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatingTextRecord {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: String,
    pub alpha: f32,
    pub scale: f32,
}

/// Motion trail behind an actor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailRecord {
    pub actor_id: String,
    pub color: String,
    pub points: BoundedPoints<MAX_TRAIL_POINTS>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenShakeRecord {
    pub intensity: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectileRecord {
    pub id: String,
    pub owner_id: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub color: String,
    pub trail: BoundedPoints<MAX_PROJECTILE_TRAIL_POINTS>,
}

/// One full point-in-time state, produced once per simulation tick.
///
/// Sequence numbers come from the producer. Consumers see gaps whenever the
/// publisher drops frames under backpressure and must accept them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub sequence: u64,
    /// Wall-clock time in Unix milliseconds
    pub timestamp_ms: i64,
    pub tick: u64,
    pub actors: Vec<ActorRecord>,
    pub particles: Vec<ParticleRecord>,
    pub effects: Vec<EffectRecord>,
    pub floating_texts: Vec<FloatingTextRecord>,
    pub trails: Vec<TrailRecord>,
    pub screen_shake: ScreenShakeRecord,
    pub projectiles: Vec<ProjectileRecord>,
    pub participant_count: u32,
    pub living_count: u32,
    pub total_eliminations: u32,
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageType, decode, encode};
    use proptest::prelude::*;

    fn pt(i: usize) -> TrailPoint {
        TrailPoint {
            x: i as f32,
            y: -(i as f32),
        }
    }

    #[test]
    fn test_bounded_points_keeps_most_recent() {
        let points = BoundedPoints::<MAX_TRAIL_POINTS>::from_recent((0..12).map(pt));
        assert_eq!(points.len(), MAX_TRAIL_POINTS);
        assert_eq!(points[0], pt(4));
        assert_eq!(points[MAX_TRAIL_POINTS - 1], pt(11));
    }

    #[test]
    fn test_bounded_points_short_history_untouched() {
        let points = BoundedPoints::<MAX_PROJECTILE_TRAIL_POINTS>::from_recent((0..3).map(pt));
        assert_eq!(points.as_slice(), &[pt(0), pt(1), pt(2)]);
    }

    #[test]
    fn test_bounded_points_clips_overlong_wire_list() {
        #[derive(Serialize)]
        struct Raw {
            points: Vec<TrailPoint>,
        }
        #[derive(Deserialize)]
        struct Clipped {
            points: BoundedPoints<MAX_PROJECTILE_TRAIL_POINTS>,
        }

        let raw = Raw {
            points: (0..9).map(pt).collect(),
        };
        let bytes = rmp_serde::to_vec_named(&raw).unwrap();
        let clipped: Clipped = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(clipped.points.as_slice(), &[pt(5), pt(6), pt(7), pt(8)]);
    }

    proptest! {
        #[test]
        fn prop_snapshot_roundtrip(snapshot in strategies::snapshot()) {
            let encoded = encode(MessageType::Snapshot, &snapshot).unwrap();
            let frame = decode(&encoded).unwrap();

            prop_assert_eq!(frame.message_type(), Some(MessageType::Snapshot));
            let decoded: SnapshotPayload = frame.decode_body().unwrap();
            prop_assert_eq!(decoded, snapshot);
        }

        #[test]
        fn prop_trails_never_exceed_capacity(pts in prop::collection::vec(strategies::point(), 0..64)) {
            let trail = BoundedPoints::<MAX_TRAIL_POINTS>::from_recent(pts.clone());
            prop_assert!(trail.len() <= MAX_TRAIL_POINTS);
            let keep = pts.len().min(MAX_TRAIL_POINTS);
            prop_assert_eq!(trail.as_slice(), &pts[pts.len() - keep..]);
        }
    }
}
