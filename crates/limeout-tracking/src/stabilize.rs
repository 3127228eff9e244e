//! Translational stabilization against a user-selected reference region.
//!
//! The [`Stabilizer`] holds the immutable part (settings and the reference
//! template). Everything that changes frame to frame lives in a
//! [`StabilizationState`] owned by the caller and passed in on every call, so
//! a preview and an export can track the same region independently.

use crate::pyramid::GrayImage;
use crate::template::{MatchResult, TemplateMatcher};
use crate::warp::{translate, BorderFill, Interpolation};
use glam::IVec2;
use limeout_core::{Frame, LimeoutError, PixelRect, Result, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerSettings {
    /// Search radius around the last matched position, in pixels.
    pub search_margin: u32,
    /// Scores at or above this are trusted.
    pub confidence_threshold: f32,
    /// Scores below this count as no match at all.
    pub min_score: f32,
    /// Consecutive low-confidence frames before tracking is declared lost.
    pub lost_after: u32,
    /// Search the whole frame when the bounded search is not confident.
    pub full_frame_fallback: bool,
    /// Kernel handed to the warp. Tracked offsets are whole pixels, so both
    /// kernels produce identical frames here; the choice only matters to
    /// callers of `warp::translate` with sub-pixel shifts.
    pub interpolation: Interpolation,
    pub border_fill: BorderFill,
    /// Offset samples kept in the state's history ring.
    pub history_len: usize,
}

impl Default for StabilizerSettings {
    fn default() -> Self {
        Self {
            search_margin: 50,
            confidence_threshold: 0.5,
            min_score: 0.2,
            lost_after: 3,
            full_frame_fallback: false,
            interpolation: Interpolation::Bilinear,
            border_fill: BorderFill::Transparent,
            history_len: 32,
        }
    }
}

impl StabilizerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) || !(0.0..=1.0).contains(&self.min_score)
        {
            return Err(LimeoutError::invalid(format!(
                "tracking thresholds must be in [0, 1], got confidence {} / min score {}",
                self.confidence_threshold, self.min_score
            )));
        }
        if self.min_score > self.confidence_threshold {
            return Err(LimeoutError::invalid(
                "min score must not exceed the confidence threshold",
            ));
        }
        if self.lost_after == 0 {
            return Err(LimeoutError::invalid("lost_after must be at least 1"));
        }
        if self.history_len == 0 {
            return Err(LimeoutError::invalid("history_len must be at least 1"));
        }
        Ok(())
    }
}

/// The reference feature: its box in the selection frame and its grayscale patch.
#[derive(Debug, Clone)]
pub struct TrackedRegion {
    pub rect: PixelRect,
    pub reference: GrayImage,
    /// Confidence at selection time.
    pub confidence: f32,
    frame_width: u32,
    frame_height: u32,
}

impl TrackedRegion {
    /// Capture `rect` from `frame` as the reference. The region must lie
    /// inside the frame.
    pub fn select(frame: &Frame, rect: PixelRect) -> Result<Self> {
        frame.validate()?;
        if !rect.fits_within(frame.width, frame.height) {
            return Err(LimeoutError::invalid(format!(
                "tracking region {rect:?} is outside the {}x{} frame",
                frame.width, frame.height
            )));
        }
        let reference = GrayImage::from_frame(frame).crop(rect);
        Ok(Self {
            rect,
            reference,
            confidence: 1.0,
            frame_width: frame.width,
            frame_height: frame.height,
        })
    }

    pub fn center(&self) -> Vec2 {
        self.rect.center()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackingStatus {
    /// No region selected; frames pass through untouched.
    #[default]
    Unarmed,
    Tracking,
    /// Confidence stayed low; the last valid offset is held.
    Lost,
}

/// Status transitions worth telling the user about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingSignal {
    Lost { frame: u64, offset: IVec2 },
    Reacquired { frame: u64, offset: IVec2 },
}

impl TrackingSignal {
    /// The non-fatal error describing a loss, for status reporting.
    pub fn as_error(&self) -> Option<LimeoutError> {
        match *self {
            Self::Lost { frame, offset } => Some(LimeoutError::TrackingLost {
                frame,
                dx: offset.x as f32,
                dy: offset.y as f32,
            }),
            Self::Reacquired { .. } => None,
        }
    }
}

/// One entry of the offset history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetSample {
    pub frame: u64,
    pub offset: IVec2,
    pub confidence: f32,
}

/// Per-run tracking state. Reset on region selection.
#[derive(Debug, Clone)]
pub struct StabilizationState {
    pub offset: IVec2,
    pub status: TrackingStatus,
    pub confidence: f32,
    pub low_confidence_streak: u32,
    /// Top-left of the last confident match.
    pub last_position: Option<(u32, u32)>,
    pub history: VecDeque<OffsetSample>,
    generation: u64,
}

impl StabilizationState {
    fn new(generation: u64, armed: bool) -> Self {
        Self {
            offset: IVec2::ZERO,
            status: if armed {
                TrackingStatus::Tracking
            } else {
                TrackingStatus::Unarmed
            },
            confidence: if armed { 1.0 } else { 0.0 },
            low_confidence_streak: 0,
            last_position: None,
            history: VecDeque::new(),
            generation,
        }
    }

    fn push_history(&mut self, sample: OffsetSample, cap: usize) {
        while self.history.len() >= cap {
            self.history.pop_front();
        }
        self.history.push_back(sample);
    }
}

impl Default for StabilizationState {
    fn default() -> Self {
        Self::new(0, false)
    }
}

/// Outcome of tracking one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCorrection {
    /// Translation to apply: reference center minus matched center.
    pub offset: IVec2,
    pub confidence: f32,
    pub status: TrackingStatus,
    pub signal: Option<TrackingSignal>,
}

impl FrameCorrection {
    const IDENTITY: Self = Self {
        offset: IVec2::ZERO,
        confidence: 0.0,
        status: TrackingStatus::Unarmed,
        signal: None,
    };
}

#[derive(Debug, Clone)]
struct Armed {
    region: TrackedRegion,
    matcher: TemplateMatcher,
}

/// Template-matching stabilizer.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    settings: StabilizerSettings,
    armed: Option<Armed>,
    /// Bumped on every selection; states remember the value they were made for.
    generation: u64,
}

impl Stabilizer {
    pub fn new(settings: StabilizerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            armed: None,
            generation: 0,
        })
    }

    pub fn settings(&self) -> &StabilizerSettings {
        &self.settings
    }

    pub fn region(&self) -> Option<&TrackedRegion> {
        self.armed.as_ref().map(|a| &a.region)
    }

    /// Select a new reference region and return the state to track it with.
    ///
    /// Any state created for an earlier selection is reset on its next use.
    pub fn select_region(&mut self, frame: &Frame, rect: PixelRect) -> Result<StabilizationState> {
        let region = TrackedRegion::select(frame, rect)?;
        let matcher = TemplateMatcher::new(&region.reference);
        if matcher.template().is_flat() {
            return Err(LimeoutError::invalid(format!(
                "tracking region {rect:?} has no texture to follow"
            )));
        }
        info!(
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            coarse_to_fine = matcher.is_coarse_to_fine(),
            "Tracking region selected"
        );
        self.armed = Some(Armed { region, matcher });
        self.generation += 1;
        Ok(self.fresh_state())
    }

    /// Drop the region; frames pass through untouched afterwards.
    pub fn clear_region(&mut self) {
        self.armed = None;
        self.generation += 1;
    }

    /// A new state for the current selection, independent of any other.
    pub fn fresh_state(&self) -> StabilizationState {
        StabilizationState::new(self.generation, self.armed.is_some())
    }

    /// Track one frame and update `state`. Never fails on a bad match:
    /// low confidence holds the previous offset instead.
    pub fn track(&self, state: &mut StabilizationState, frame: &Frame) -> Result<FrameCorrection> {
        if state.generation != self.generation {
            debug!("Stabilization state belongs to an earlier selection, resetting");
            *state = self.fresh_state();
        }
        let Some(armed) = &self.armed else {
            return Ok(FrameCorrection::IDENTITY);
        };
        if (frame.width, frame.height) != (armed.region.frame_width, armed.region.frame_height) {
            return Err(LimeoutError::invalid(format!(
                "frame {} is {}x{}, tracking region was selected on {}x{}",
                frame.index,
                frame.width,
                frame.height,
                armed.region.frame_width,
                armed.region.frame_height
            )));
        }

        let rect = armed.region.rect;
        let (hint_x, hint_y) = state.last_position.unwrap_or((rect.x, rect.y));
        let gray = GrayImage::from_frame(frame);
        let mut found = armed
            .matcher
            .find_near(&gray, hint_x, hint_y, self.settings.search_margin);
        if self.settings.full_frame_fallback
            && found.map_or(true, |m| m.score < self.settings.confidence_threshold)
        {
            if let Some(global) = armed.matcher.find_anywhere(&gray) {
                debug!(frame = frame.index, score = global.score, "Full-frame fallback search");
                found = Some(found.map_or(global, |local| best_score(local, global)));
            }
        }

        let score = found.map_or(0.0, |m| m.score.max(0.0));
        let was_lost = state.status == TrackingStatus::Lost;
        let mut signal = None;

        match found {
            Some(m) if score >= self.settings.confidence_threshold => {
                state.offset = IVec2::new(rect.x as i32 - m.x as i32, rect.y as i32 - m.y as i32);
                state.last_position = Some((m.x, m.y));
                state.low_confidence_streak = 0;
                state.status = TrackingStatus::Tracking;
                if was_lost {
                    info!(frame = frame.index, score, "Tracking reacquired");
                    signal = Some(TrackingSignal::Reacquired {
                        frame: frame.index,
                        offset: state.offset,
                    });
                }
            }
            _ => {
                state.low_confidence_streak = state.low_confidence_streak.saturating_add(1);
                let no_match = score < self.settings.min_score;
                if !was_lost
                    && (no_match || state.low_confidence_streak >= self.settings.lost_after)
                {
                    state.status = TrackingStatus::Lost;
                    warn!(
                        frame = frame.index,
                        score,
                        dx = state.offset.x,
                        dy = state.offset.y,
                        "Tracking lost, holding last offset"
                    );
                    signal = Some(TrackingSignal::Lost {
                        frame: frame.index,
                        offset: state.offset,
                    });
                }
            }
        }

        state.confidence = score;
        state.push_history(
            OffsetSample {
                frame: frame.index,
                offset: state.offset,
                confidence: score,
            },
            self.settings.history_len,
        );

        Ok(FrameCorrection {
            offset: state.offset,
            confidence: score,
            status: state.status,
            signal,
        })
    }

    /// Track `frame` and warp it by the resulting offset.
    pub fn stabilize(
        &self,
        state: &mut StabilizationState,
        frame: &Frame,
    ) -> Result<(Frame, FrameCorrection)> {
        let correction = self.track(state, frame)?;
        let warped = translate(
            frame,
            correction.offset.x as f32,
            correction.offset.y as f32,
            self.settings.interpolation,
            self.settings.border_fill,
        );
        Ok((warped, correction))
    }
}

fn best_score(a: MatchResult, b: MatchResult) -> MatchResult {
    if b.score > a.score {
        b
    } else {
        a
    }
}
