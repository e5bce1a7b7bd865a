//! Deskpet - Library for desktop pet animation assets and playback
//!
//! This library provides functionality to:
//! - Index an asset pack's animation folders by name, activity, state and phase
//! - Pack every folder into a cached horizontal sprite sheet
//! - Play sprite sheet sequences with per-frame delays
//! - Drive the pet through layered, interruptible action flows

pub mod actions;
pub mod assets;
pub mod bus;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod gfx;
pub mod gif;
pub mod hash;
pub mod logic;
pub mod messages;
pub mod pet;
pub mod playback;
pub mod render;
pub mod sheet;
