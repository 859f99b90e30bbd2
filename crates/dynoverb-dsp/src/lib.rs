//! Dynoverb DSP library: four reverb engines and the selector that
//! crossfades between them.
//!
//! Pure DSP math with no audio framework dependencies.

// Building blocks
pub mod delay;
pub mod fdn;
pub mod filters;
pub mod lfo;
pub mod noise;

// Engine contract and shared parameters
pub mod params;
pub mod reverb;

// Engines
pub mod algorithmic;
pub mod gated;
pub mod shimmer;
pub mod spring;

// Selector, crossfade, ducking
pub mod engine;
