//! Board-agnostic core logic for block-programmed robot arms
//!
//! This crate contains everything between a validated block program and the
//! servo bus:
//!
//! - Joint registry and arm configuration types
//! - Hardware abstraction traits (servo bus, actuator)
//! - Joint state synchronizer with the virtual interpolation scheduler
//! - Typed block programs, the block registry and the JSON program loader
//! - Block execution engine with cooperative cancellation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Actuator    ┌──────────────┐   ServoBus   ┌───────────┐
//! │    Engine    │ ────────────► │ Synchronizer │ ───────────► │ bus / twin│
//! └──────────────┘               └──────────────┘              └───────────┘
//!        ▲                              │ writes
//!        │ Program                      ▼
//! ┌──────────────┐               ┌──────────────┐   tick   ┌──────────────┐
//! │ProgramLoader │               │  JointTable  │ ◄─────── │   Animator   │
//! └──────────────┘               └──────────────┘          └──────────────┘
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod program;
pub mod sync;
pub mod traits;
