//! Virtual interpolation task
//!
//! Sleeps until a motion request wakes it, then ticks the joint table at the
//! frame rate until every joint has reached its target. Only one handle can
//! exist per table, so there is never more than one timer driving the same
//! joints.

use core::convert::Infallible;

use embassy_time::{Duration, Ticker};
use log::{debug, trace};

use super::table::JointTable;

/// Single-owner handle to the interpolation task
pub struct Animator<'a> {
    table: &'a JointTable,
    frame: Duration,
}

impl<'a> Animator<'a> {
    pub(crate) fn new(table: &'a JointTable, frame: Duration) -> Self {
        Self { table, frame }
    }

    /// Frame period
    pub fn frame(&self) -> Duration {
        self.frame
    }

    /// Run forever
    ///
    /// Drop the future (e.g. by losing a `select`) to stop the task. Motion
    /// still in progress is picked up by the next claimed handle.
    pub async fn run(&mut self) -> Infallible {
        loop {
            self.table.wait_for_motion().await;
            self.animate().await;
        }
    }

    /// Tick until the table reports nothing left to move
    pub async fn animate(&mut self) -> u32 {
        debug!("Animation started");
        let mut ticker = Ticker::every(self.frame);
        let mut frames = 0u32;

        loop {
            ticker.next().await;
            frames = frames.wrapping_add(1);
            if !self.table.tick() {
                break;
            }
            trace!("Animation frame {}", frames);
        }

        debug!("Animation idle after {} frames", frames);
        frames
    }
}

impl Drop for Animator<'_> {
    fn drop(&mut self) {
        self.table.release_animator();
    }
}
