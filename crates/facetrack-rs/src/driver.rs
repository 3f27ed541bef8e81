use crate::*;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;

/// One image of the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position of the frame in its source.
    pub index: u64,
    /// Capture time, used as the attendance timestamp.
    pub timestamp: DateTime<Utc>,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp: DateTime<Utc>, image: RgbImage) -> Frame {
        Frame {
            index,
            timestamp,
            image,
        }
    }
}

/// Produces frames until the stream ends.
pub trait FrameSource {
    /// Returns the next frame, or `None` once no more frames can be fetched.
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Requests a running `FrameDriver` to stop at the next frame boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The state exposed to callers after each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: DateTime<Utc>,
    /// Every active track after this frame was fully processed.
    pub tracks: Vec<TrackSnapshot>,
    /// Attendance recorded on this frame.
    pub new_attendance: Vec<AttendanceRecord>,
    /// The whole attendance registry, in insertion order.
    pub attendance: Vec<AttendanceRecord>,
}

/// Pulls frames from a source and pushes each one through the tracker.
pub struct FrameDriver<S, D> {
    source: S,
    detector: D,
    tracker: Tracker,
    stop: StopHandle,
}

impl<S: FrameSource, D: Detector> FrameDriver<S, D> {
    pub fn new(source: S, detector: D, tracker: Tracker) -> FrameDriver<S, D> {
        FrameDriver {
            source,
            detector,
            tracker,
            stop: StopHandle::default(),
        }
    }

    /// Returns a handle that stops `run` at the next frame boundary
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn into_tracker(self) -> Tracker {
        self.tracker
    }

    /// Process exactly one frame.
    ///
    /// # Returns
    ///
    /// `None` at the end of the stream, otherwise the state after the frame.
    pub fn step(&mut self) -> Result<Option<FrameReport>, EngineError> {
        let frame = match self.source.next_frame() {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let update = self.tracker.update(&frame, &mut self.detector)?;

        Ok(Some(FrameReport {
            frame_index: frame.index,
            timestamp: frame.timestamp,
            tracks: self.tracker.snapshots(),
            new_attendance: update.attendance,
            attendance: self.tracker.attendance().records(),
        }))
    }

    /// Process frames until the stream ends or a stop is requested, calling `on_frame` after each one.
    ///
    /// # Returns
    ///
    /// The number of frames processed.
    pub fn run<F>(&mut self, mut on_frame: F) -> Result<usize, EngineError>
    where
        F: FnMut(&FrameReport),
    {
        let mut frames = 0;
        while !self.stop.is_stopped() {
            match self.step()? {
                Some(report) => {
                    frames += 1;
                    on_frame(&report);
                }
                None => break,
            }
        }

        let attendance = self.tracker.attendance();
        info!(
            frames,
            tracks = self.tracker.len(),
            attendance = attendance.len(),
            names = ?attendance.records().iter().map(|record| record.name.as_str()).collect::<Vec<_>>(),
            "frame loop finished"
        );
        Ok(frames)
    }
}
