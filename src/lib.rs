//! City traffic simulation library
//!
//! Congestion-aware routing, adaptive traffic signals and incidents over a
//! road network, driven headless or from a background runner.

pub mod simulation;
