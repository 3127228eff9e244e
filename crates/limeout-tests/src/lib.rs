//! Integration test crate for Limeout.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every limeout crate to verify they work together.

#[cfg(test)]
mod keying;

#[cfg(test)]
mod stabilization;

#[cfg(test)]
mod export;
