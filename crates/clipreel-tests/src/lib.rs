//! Integration test crate for ClipReel.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It wires the project store, composition, playback and export crates
//! together against in-memory media and scripted collaborators.


#[cfg(test)]
mod playback;

#[cfg(test)]
mod mutation;

#[cfg(test)]
mod export;

#[cfg(test)]
mod persistence;
