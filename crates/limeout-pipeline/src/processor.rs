//! Per-frame processing: stabilize, crop, key.

use crate::config::PipelineConfig;
use limeout_core::{Frame, LimeoutError, PixelRect, Result, Vec2};
use limeout_effects::{
    composite, crop, overlay_crosshair, Background, ChromaKeyEngine, ChromaKeyParams, CropMargins,
};
use limeout_tracking::{FrameCorrection, StabilizationState, Stabilizer};
use tracing::{debug, info};

const CROSSHAIR_COLOR: [u8; 4] = [255, 0, 0, 255];
const CROSSHAIR_MIN_SIZE: u32 = 20;

/// A frame after the full pipeline, with the tracking result that produced it.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub correction: FrameCorrection,
}

/// How a preview frame is displayed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewOptions {
    pub background: Background,
    /// Mark the stabilization reference point.
    pub crosshair: bool,
}

/// Stabilizer, cropper and keyer bound to one source size.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    stabilizer: Stabilizer,
    key: ChromaKeyParams,
    margins: CropMargins,
    source_size: (u32, u32),
    output_size: (u32, u32),
}

impl FrameProcessor {
    /// Parameters and margins are validated against the source size here,
    /// before any frame is touched.
    pub fn new(
        source_size: (u32, u32),
        key: ChromaKeyParams,
        stabilizer: Stabilizer,
        margins: CropMargins,
    ) -> Result<Self> {
        key.validate()?;
        let output_size = margins.output_dimensions(source_size.0, source_size.1)?;
        debug!(
            source_width = source_size.0,
            source_height = source_size.1,
            output_width = output_size.0,
            output_height = output_size.1,
            "Frame processor ready"
        );
        Ok(Self {
            stabilizer,
            key,
            margins,
            source_size,
            output_size,
        })
    }

    pub fn from_config(config: &PipelineConfig, source_size: (u32, u32)) -> Result<Self> {
        let stabilizer = Stabilizer::new(config.stabilizer.clone())?;
        Self::new(source_size, config.key.clone(), stabilizer, config.margins)
    }

    pub fn source_size(&self) -> (u32, u32) {
        self.source_size
    }

    /// Size of every processed frame.
    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    pub fn key_params(&self) -> &ChromaKeyParams {
        &self.key
    }

    pub fn margins(&self) -> CropMargins {
        self.margins
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    /// Replace the key parameters, e.g. while the user adjusts them.
    pub fn set_key_params(&mut self, key: ChromaKeyParams) -> Result<()> {
        key.validate()?;
        self.key = key;
        Ok(())
    }

    /// Replace the margins; rejected if they would leave no pixels.
    pub fn set_margins(&mut self, margins: CropMargins) -> Result<()> {
        self.output_size = margins.output_dimensions(self.source_size.0, self.source_size.1)?;
        self.margins = margins;
        Ok(())
    }

    /// Select the stabilization reference on `frame` and return a fresh state.
    pub fn select_region(&mut self, frame: &Frame, rect: PixelRect) -> Result<StabilizationState> {
        self.check_size(frame)?;
        let state = self.stabilizer.select_region(frame, rect)?;
        info!(frame = frame.index, ?rect, "Stabilization reference set");
        Ok(state)
    }

    pub fn clear_region(&mut self) {
        self.stabilizer.clear_region();
    }

    /// Independent tracking state for a new run.
    pub fn fresh_state(&self) -> StabilizationState {
        self.stabilizer.fresh_state()
    }

    /// Stabilize, crop and key one source frame.
    pub fn process(&self, state: &mut StabilizationState, frame: &Frame) -> Result<ProcessedFrame> {
        self.check_size(frame)?;
        let (stabilized, correction) = self.stabilizer.stabilize(state, frame)?;
        let cropped = crop(&stabilized, self.margins)?;
        let keyed = ChromaKeyEngine::key(&cropped, &self.key)?;
        Ok(ProcessedFrame {
            frame: keyed,
            correction,
        })
    }

    /// Process one frame and composite it for display.
    pub fn preview(
        &self,
        state: &mut StabilizationState,
        frame: &Frame,
        options: &PreviewOptions,
    ) -> Result<ProcessedFrame> {
        let processed = self.process(state, frame)?;
        let mut display = composite(&processed.frame, &options.background);
        if options.crosshair {
            if let Some(region) = self.stabilizer.region() {
                // The warp holds the reference at its selected position
                let center = region.center() - Vec2::new(self.margins.left as f32, self.margins.top as f32);
                let size = region.rect.width.max(region.rect.height).max(CROSSHAIR_MIN_SIZE);
                overlay_crosshair(&mut display, center, size, CROSSHAIR_COLOR);
            }
        }
        Ok(ProcessedFrame {
            frame: display,
            correction: processed.correction,
        })
    }

    fn check_size(&self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != self.source_size {
            return Err(LimeoutError::invalid(format!(
                "frame {} is {}x{}, processor expects {}x{}",
                frame.index, frame.width, frame.height, self.source_size.0, self.source_size.1
            )));
        }
        Ok(())
    }
}
