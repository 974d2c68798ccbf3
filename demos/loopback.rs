//! Publisher and subscriber in one process, streaming a toy world.
//!
//! Run with `RUST_LOG=simlink=debug cargo run --example loopback` to watch
//! the connection lifecycle.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use simlink::adapter::{Actor, Trail, Vec2, WorldState};
use simlink::{Publisher, PublisherConfig, Subscriber, SubscriberConfig, TransportAddr};
use tracing_subscriber::EnvFilter;

const TICKS: u64 = 120;

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn step(world: &mut WorldState) {
    world.tick += 1;
    for (actor, trail) in world.actors.iter_mut().zip(world.trails.iter_mut()) {
        actor.position.x += actor.velocity.x;
        actor.position.y += actor.velocity.y;
        trail.history.push_back(actor.position);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = TransportAddr::default();
    let publisher = Publisher::new(PublisherConfig::default().with_addr(addr.clone()));
    publisher.start().await?;

    let subscriber = Subscriber::new(
        SubscriberConfig::default()
            .with_addr(publisher.local_addr().unwrap_or(addr))
            .with_reconnect_delay(Duration::from_millis(100)),
    );
    subscriber.start().await;

    let mut world = WorldState::default();
    for i in 0..4u8 {
        let id = format!("actor-{i}");
        world.actors.push(Actor {
            id: id.clone(),
            name: format!("Actor {i}"),
            velocity: Vec2::new(f32::from(i) + 1.0, 0.5),
            radius: 10.0,
            health: 100.0,
            max_health: 100.0,
            color: "#4fc3f7".into(),
            alive: true,
            ..Actor::default()
        });
        world.trails.push(Trail {
            actor_id: id,
            color: "#4fc3f7".into(),
            ..Trail::default()
        });
    }

    let mut interval = tokio::time::interval(Duration::from_millis(1000 / 60));
    for sequence in 1..=TICKS {
        interval.tick().await;
        step(&mut world);
        publisher.publish_snapshot(world.to_payload(sequence, unix_millis()));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Some(snapshot) = subscriber.latest_snapshot() {
        println!(
            "latest: sequence={} tick={} actors={} trail points={}",
            snapshot.sequence,
            snapshot.tick,
            snapshot.actors.len(),
            snapshot.trails.first().map_or(0, |t| t.points.len()),
        );
    }
    println!("publisher: {:?}", publisher.stats());
    println!("subscriber: {:?}", subscriber.stats());

    subscriber.stop().await;
    publisher.stop().await;
    Ok(())
}
