use crate::*;
use anyhow::{anyhow, bail, Result};
use image::RgbImage;
use ndarray::*;

/// Follows one target between detection cycles.
///
/// One instance is created per track. `update` returning an error means the target is lost for this frame.
pub trait MotionPredictor: Send {
    /// Start following `bbox` in `image`.
    fn init(&mut self, image: &RgbImage, bbox: &BoundingBox) -> Result<()>;

    /// Locate the target in the next frame.
    fn update(&mut self, image: &RgbImage) -> Result<BoundingBox>;
}

/// Creates an uninitialized motion predictor for each newly spawned track.
pub type PredictorFactory = Box<dyn Fn() -> Box<dyn MotionPredictor> + Send>;

/// A motion predictor that coasts the last known box with a constant velocity Kalman filter.
///
/// It never looks at the image. The target is reported lost once the predicted center position is more uncertain than
/// `gate` times the box height.
#[derive(Debug, Clone)]
pub struct KalmanPredictor {
    kf: KalmanFilter,
    gate: f32,
    state: Option<(Array1<f32>, Array2<f32>)>,
}

impl Default for KalmanPredictor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl KalmanPredictor {
    /// Returns a new KalmanPredictor
    ///
    /// # Parameters
    ///
    /// * `gate`: Maximum ratio of position standard deviation to box height before the target is lost. Default `1.0`.
    pub fn new(gate: Option<f32>) -> KalmanPredictor {
        KalmanPredictor {
            kf: KalmanFilter::default(),
            gate: gate.unwrap_or(1.0),
            state: None,
        }
    }

    /// Returns a factory producing predictors with this gate
    pub fn factory(gate: Option<f32>) -> PredictorFactory {
        Box::new(move || Box::new(KalmanPredictor::new(gate)))
    }
}

impl MotionPredictor for KalmanPredictor {
    fn init(&mut self, _image: &RgbImage, bbox: &BoundingBox) -> Result<()> {
        if bbox.is_empty() {
            bail!("cannot follow an empty box {:?}", bbox);
        }
        self.state = Some(self.kf.initiate(bbox));
        Ok(())
    }

    fn update(&mut self, _image: &RgbImage) -> Result<BoundingBox> {
        let (mean, covariance) = self
            .state
            .as_ref()
            .ok_or_else(|| anyhow!("predictor was never initialized"))?;

        let (mean, covariance) = self.kf.predict(mean, covariance);
        let bbox = BoundingBox::from_xyah(mean.slice(s![..4]));
        let position_std = KalmanFilter::position_std(&covariance);
        self.state = Some((mean, covariance));

        if bbox.is_empty() || position_std > self.gate * bbox.height() {
            bail!(
                "target lost: position std {:.1} exceeds gate {:.1}",
                position_std,
                self.gate * bbox.height()
            );
        }
        Ok(bbox)
    }
}
