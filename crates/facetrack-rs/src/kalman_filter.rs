use crate::BoundingBox;
use ndarray::*;

/**
A constant velocity Kalman filter for coasting bounding boxes in image space.

The 8-dimensional state space:
    x, y, a, h, vx, vy, va, vh
contains the bounding box center position (x, y), aspect ratio a, height h, and their respective velocities.

Only the prediction step is used: between detection cycles the filter propagates the last known box and its growing
uncertainty, which the motion predictor uses to decide when the target is lost.
*/
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f32>,
    std_weight_position: f32,
    std_weight_velocity: f32,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    /// Returns a new KalmanFilter
    pub fn new() -> KalmanFilter {
        let ndim = 4;

        let mut motion_mat = Array2::from_diag(&Array1::<f32>::ones(2 * ndim));
        for i in 0..ndim {
            motion_mat[[i, ndim + i]] = 1.0;
        }

        // Motion uncertainty is relative to the current height estimate.
        let std_weight_position = 1.0 / 20.0;
        let std_weight_velocity = 1.0 / 160.0;

        KalmanFilter {
            motion_mat,
            std_weight_position,
            std_weight_velocity,
        }
    }

    /// Create a state distribution from an initial box.
    ///
    /// # Arguments
    ///
    /// - `bbox`: Bounding box of the initial measurement.
    ///
    /// # Returns
    ///
    /// A tuple with the following two entries:
    /// - The mean vector (8 dimensional).
    /// - The covariance matrix (8x8 dimensional).
    ///
    /// Unobserved velocities are initialized to 0 mean.
    pub fn initiate(&self, bbox: &BoundingBox) -> (Array1<f32>, Array2<f32>) {
        self.initiate_with_velocity(bbox, &Array1::zeros(4))
    }

    /// Create a state distribution from an initial box and a known velocity in (x, y, a, h) space.
    fn initiate_with_velocity(
        &self,
        bbox: &BoundingBox,
        velocity: &Array1<f32>,
    ) -> (Array1<f32>, Array2<f32>) {
        let mean_pos = bbox.to_xyah();
        let mean = concatenate![Axis(0), mean_pos, velocity.view()];

        let std = arr1::<f32>(&[
            2.0 * self.std_weight_position * mean_pos[3],
            2.0 * self.std_weight_position * mean_pos[3],
            1e-2,
            2.0 * self.std_weight_position * mean_pos[3],
            10.0 * self.std_weight_velocity * mean_pos[3],
            10.0 * self.std_weight_velocity * mean_pos[3],
            1e-5,
            10.0 * self.std_weight_velocity * mean_pos[3],
        ]);

        let covariance = Array2::from_diag(&std.mapv(|v| v.powi(2)));

        (mean, covariance)
    }

    /// Run Kalman filter prediction step.
    ///
    /// # Arguments
    ///
    /// - `mean`: The 8 dimensional mean vector of the object state at the previous time step.
    /// - `covariance`: The 8x8 dimensional covariance matrix of the object state at the previous time step.
    ///
    /// # Returns
    ///
    /// A tuple with the following two entries of the predicted state:
    /// - The mean vector (8 dimensional).
    /// - The covariance matrix (8x8 dimensional).
    pub fn predict(
        &self,
        mean: &Array1<f32>,
        covariance: &Array2<f32>,
    ) -> (Array1<f32>, Array2<f32>) {
        let std_pos = arr1::<f32>(&[
            self.std_weight_position * mean[3],
            self.std_weight_position * mean[3],
            1e-2,
            self.std_weight_position * mean[3],
        ]);

        let std_vel = arr1::<f32>(&[
            self.std_weight_velocity * mean[3],
            self.std_weight_velocity * mean[3],
            1e-5,
            self.std_weight_velocity * mean[3],
        ]);

        let motion_cov =
            Array2::from_diag(&concatenate![Axis(0), std_pos, std_vel].mapv(|v| v.powi(2)));

        let mean = self.motion_mat.dot(mean);
        let covariance = self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + motion_cov;

        (mean, covariance)
    }

    /// Returns the standard deviation of the predicted center position, the larger of the x and y axes.
    pub fn position_std(covariance: &Array2<f32>) -> f32 {
        covariance[[0, 0]].max(covariance[[1, 1]]).max(0.0).sqrt()
    }
}
