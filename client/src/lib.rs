//! The client-side consumer of the game's update stream.
//!
//! The connection state machine decodes server messages and routes them:
//! lobby and lifecycle events go to a [`callbacks::ClientCallbacks`], dungeon
//! view traffic goes into a [`display::GameDisplay`], whose entity map
//! interpolates motion between server updates. LAN discovery and the
//! persistent options file live here too. Rendering is someone else's job:
//! everything in this crate is a model to read from.

pub mod callbacks;
pub mod connection;
pub mod discovery;
pub mod display;
pub mod entity_map;
pub mod icons;
pub mod mini_map;
pub mod options;
pub mod status_display;

pub use callbacks::{ClientCallbacks, NullCallbacks};
pub use connection::{ClientState, KnightsClient};
pub use display::GameDisplay;
pub use entity_map::{EntityGfx, EntityMap};
