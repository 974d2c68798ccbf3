//! Mapping between the simulation's native world state and the flat wire
//! payload.
//!
//! Conversions are pure and total: every entity kind maps both ways, and
//! trail histories are clipped to the wire capacity keeping the newest
//! points.

// Plain data records; field names are the documentation.
#![allow(missing_docs)]

use std::collections::VecDeque;

use crate::protocol::payload::{
    ActorRecord, BoundedPoints, EffectRecord, FloatingTextRecord, ParticleRecord,
    ProjectileRecord, ScreenShakeRecord, SnapshotPayload, TrailPoint, TrailRecord,
};

/// 2D vector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<Vec2> for TrailPoint {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<TrailPoint> for Vec2 {
    fn from(p: TrailPoint) -> Self {
        Self { x: p.x, y: p.y }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub color: String,
    pub alive: bool,
    pub eliminations: u32,
    pub hit_flash: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub size: f32,
    pub color: String,
    pub life: f32,
}

/// Kind of transient effect. Unrecognized names survive as `Other`.
///
/// Kinds are identified by name: `Other("explosion")` equals `Explosion`
/// and comes back from the wire as `Explosion`.
#[derive(Debug, Clone, Eq)]
pub enum EffectKind {
    Explosion,
    Ring,
    Spawn,
    Other(String),
}

impl EffectKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Explosion => "explosion",
            Self::Ring => "ring",
            Self::Spawn => "spawn",
            Self::Other(name) => name,
        }
    }
}

impl PartialEq for EffectKind {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl From<&str> for EffectKind {
    fn from(name: &str) -> Self {
        match name {
            "explosion" => Self::Explosion,
            "ring" => Self::Ring,
            "spawn" => Self::Spawn,
            other => Self::Other(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub kind: EffectKind,
    pub position: Vec2,
    pub radius: f32,
    pub color: String,
    pub progress: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatingText {
    pub text: String,
    pub position: Vec2,
    pub color: String,
    pub alpha: f32,
    pub scale: f32,
}

/// Motion trail with its full recorded history, newest point last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trail {
    pub actor_id: String,
    pub color: String,
    pub history: VecDeque<Vec2>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScreenShake {
    pub intensity: f32,
    pub offset: Vec2,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projectile {
    pub id: String,
    pub owner_id: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub color: String,
    /// Recorded positions, newest last
    pub history: VecDeque<Vec2>,
}

/// The simulation's in-memory state for one tick.
///
/// Participant and living counts are derived from `actors`; they are not
/// stored separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    pub tick: u64,
    pub actors: Vec<Actor>,
    pub particles: Vec<Particle>,
    pub effects: Vec<Effect>,
    pub floating_texts: Vec<FloatingText>,
    pub trails: Vec<Trail>,
    pub screen_shake: ScreenShake,
    pub projectiles: Vec<Projectile>,
    pub total_eliminations: u32,
}

impl WorldState {
    /// Number of actors still alive
    #[must_use]
    pub fn living_count(&self) -> usize {
        self.actors.iter().filter(|a| a.alive).count()
    }

    /// Build the wire payload for this state.
    ///
    /// `sequence` and `timestamp_ms` are owned by the producer; the adapter
    /// never reads a clock.
    #[must_use]
    pub fn to_payload(&self, sequence: u64, timestamp_ms: i64) -> SnapshotPayload {
        SnapshotPayload {
            sequence,
            timestamp_ms,
            tick: self.tick,
            actors: self.actors.iter().map(ActorRecord::from).collect(),
            particles: self.particles.iter().map(ParticleRecord::from).collect(),
            effects: self.effects.iter().map(EffectRecord::from).collect(),
            floating_texts: self
                .floating_texts
                .iter()
                .map(FloatingTextRecord::from)
                .collect(),
            trails: self.trails.iter().map(TrailRecord::from).collect(),
            screen_shake: ScreenShakeRecord::from(self.screen_shake),
            projectiles: self.projectiles.iter().map(ProjectileRecord::from).collect(),
            participant_count: saturating_u32(self.actors.len()),
            living_count: saturating_u32(self.living_count()),
            total_eliminations: self.total_eliminations,
        }
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn clip<const N: usize>(history: &VecDeque<Vec2>) -> BoundedPoints<N> {
    history.iter().copied().map(TrailPoint::from).collect()
}

fn unclip(points: &[TrailPoint]) -> VecDeque<Vec2> {
    points.iter().copied().map(Vec2::from).collect()
}

impl From<&SnapshotPayload> for WorldState {
    fn from(p: &SnapshotPayload) -> Self {
        Self {
            tick: p.tick,
            actors: p.actors.iter().map(Actor::from).collect(),
            particles: p.particles.iter().map(Particle::from).collect(),
            effects: p.effects.iter().map(Effect::from).collect(),
            floating_texts: p.floating_texts.iter().map(FloatingText::from).collect(),
            trails: p.trails.iter().map(Trail::from).collect(),
            screen_shake: ScreenShake::from(p.screen_shake),
            projectiles: p.projectiles.iter().map(Projectile::from).collect(),
            total_eliminations: p.total_eliminations,
        }
    }
}

impl From<&Actor> for ActorRecord {
    fn from(a: &Actor) -> Self {
        Self {
            id: a.id.clone(),
            name: a.name.clone(),
            x: a.position.x,
            y: a.position.y,
            vx: a.velocity.x,
            vy: a.velocity.y,
            radius: a.radius,
            health: a.health,
            max_health: a.max_health,
            color: a.color.clone(),
            alive: a.alive,
            eliminations: a.eliminations,
            hit_flash: a.hit_flash,
        }
    }
}

impl From<&ActorRecord> for Actor {
    fn from(r: &ActorRecord) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            position: Vec2::new(r.x, r.y),
            velocity: Vec2::new(r.vx, r.vy),
            radius: r.radius,
            health: r.health,
            max_health: r.max_health,
            color: r.color.clone(),
            alive: r.alive,
            eliminations: r.eliminations,
            hit_flash: r.hit_flash,
        }
    }
}

impl From<&Particle> for ParticleRecord {
    fn from(p: &Particle) -> Self {
        Self {
            x: p.position.x,
            y: p.position.y,
            vx: p.velocity.x,
            vy: p.velocity.y,
            size: p.size,
            color: p.color.clone(),
            life: p.life,
        }
    }
}

impl From<&ParticleRecord> for Particle {
    fn from(r: &ParticleRecord) -> Self {
        Self {
            position: Vec2::new(r.x, r.y),
            velocity: Vec2::new(r.vx, r.vy),
            size: r.size,
            color: r.color.clone(),
            life: r.life,
        }
    }
}

impl From<&Effect> for EffectRecord {
    fn from(e: &Effect) -> Self {
        Self {
            kind: e.kind.as_str().to_owned(),
            x: e.position.x,
            y: e.position.y,
            radius: e.radius,
            color: e.color.clone(),
            progress: e.progress,
        }
    }
}

impl From<&EffectRecord> for Effect {
    fn from(r: &EffectRecord) -> Self {
        Self {
            kind: EffectKind::from(r.kind.as_str()),
            position: Vec2::new(r.x, r.y),
            radius: r.radius,
            color: r.color.clone(),
            progress: r.progress,
        }
    }
}

impl From<&FloatingText> for FloatingTextRecord {
    fn from(t: &FloatingText) -> Self {
        Self {
            text: t.text.clone(),
            x: t.position.x,
            y: t.position.y,
            color: t.color.clone(),
            alpha: t.alpha,
            scale: t.scale,
        }
    }
}

impl From<&FloatingTextRecord> for FloatingText {
    fn from(r: &FloatingTextRecord) -> Self {
        Self {
            text: r.text.clone(),
            position: Vec2::new(r.x, r.y),
            color: r.color.clone(),
            alpha: r.alpha,
            scale: r.scale,
        }
    }
}

impl From<&Trail> for TrailRecord {
    fn from(t: &Trail) -> Self {
        Self {
            actor_id: t.actor_id.clone(),
            color: t.color.clone(),
            points: clip(&t.history),
        }
    }
}

impl From<&TrailRecord> for Trail {
    fn from(r: &TrailRecord) -> Self {
        Self {
            actor_id: r.actor_id.clone(),
            color: r.color.clone(),
            history: unclip(&r.points),
        }
    }
}

impl From<ScreenShake> for ScreenShakeRecord {
    fn from(s: ScreenShake) -> Self {
        Self {
            intensity: s.intensity,
            offset_x: s.offset.x,
            offset_y: s.offset.y,
        }
    }
}

impl From<ScreenShakeRecord> for ScreenShake {
    fn from(r: ScreenShakeRecord) -> Self {
        Self {
            intensity: r.intensity,
            offset: Vec2::new(r.offset_x, r.offset_y),
        }
    }
}

impl From<&Projectile> for ProjectileRecord {
    fn from(p: &Projectile) -> Self {
        Self {
            id: p.id.clone(),
            owner_id: p.owner_id.clone(),
            x: p.position.x,
            y: p.position.y,
            vx: p.velocity.x,
            vy: p.velocity.y,
            radius: p.radius,
            color: p.color.clone(),
            trail: clip(&p.history),
        }
    }
}

impl From<&ProjectileRecord> for Projectile {
    fn from(r: &ProjectileRecord) -> Self {
        Self {
            id: r.id.clone(),
            owner_id: r.owner_id.clone(),
            position: Vec2::new(r.x, r.y),
            velocity: Vec2::new(r.vx, r.vy),
            radius: r.radius,
            color: r.color.clone(),
            history: unclip(&r.trail),
        }
    }
}
