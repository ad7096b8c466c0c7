//! The authoritative dungeon simulation.
//!
//! All game state of one running game lives in a [`world::World`]; all
//! timing runs through the [`tasks::TaskScheduler`]'s global virtual time.
//! The hosting server feeds client intents into the [`engine::KnightsEngine`]
//! and ships the per-player [`knights_protocol::ServerMessage`] streams it
//! produces. Nothing in here does I/O.

pub mod config;
pub mod creature;
pub mod dungeon;
pub mod engine;
pub mod geometry;
pub mod home;
pub mod item;
pub mod monster;
pub mod player;
pub mod quest;
pub mod rng;
pub mod room;
pub mod tasks;
pub mod teleport;
pub mod tile;
pub mod view;
pub mod world;

pub use config::{ConfigError, GameConfig, Tunables};
pub use engine::{DungeonSetup, KnightsEngine};
pub use geometry::{MapAccess, MapCoord, MapDirection, MapHeight};
pub use world::World;
