//! Test data builders for creating frames and odometry events

use slam_coordinator::types::{
    pose_from_xyz_rpy, ImageBuffer, ImageEncoding, OdometryEvent, Pose, SensorFrame, SensorPayload,
    Uncertainty,
};

/// Builder for creating test SensorFrames
pub struct FrameBuilder {
    id: i32,
    stamp: f64,
    image_size: u32,
    user_data: Vec<u8>,
}

impl FrameBuilder {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            stamp: id as f64 * 0.1,
            image_size: 8,
            user_data: Vec::new(),
        }
    }

    pub fn stamp(mut self, stamp: f64) -> Self {
        self.stamp = stamp;
        self
    }

    pub fn image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }

    pub fn user_data(mut self, data: &[u8]) -> Self {
        self.user_data = data.to_vec();
        self
    }

    pub fn build(self) -> SensorFrame {
        let pixels = (self.image_size * self.image_size) as usize;
        let image = ImageBuffer::new(
            self.image_size,
            self.image_size,
            ImageEncoding::Mono8,
            vec![0; pixels],
        );
        let payload = SensorPayload {
            images: vec![image],
            ..Default::default()
        };
        SensorFrame::new(self.id, self.stamp, payload).with_user_data(self.user_data)
    }
}

/// Builder for creating test OdometryEvents
pub struct OdometryBuilder {
    frame: FrameBuilder,
    pose: Option<Pose>,
    uncertainty: Uncertainty,
}

impl OdometryBuilder {
    /// Event for frame `id` placed `id` meters along x
    pub fn new(id: i32) -> Self {
        Self {
            frame: FrameBuilder::new(id),
            pose: Some(pose_from_xyz_rpy(id as f64, 0.0, 0.0, 0.0, 0.0, 0.0)),
            uncertainty: Uncertainty::new(0.01, 0.01),
        }
    }

    pub fn at(mut self, x: f64, y: f64, yaw: f64) -> Self {
        self.pose = Some(pose_from_xyz_rpy(x, y, 0.0, 0.0, 0.0, yaw));
        self
    }

    pub fn identity(mut self) -> Self {
        self.pose = Some(Pose::identity());
        self
    }

    pub fn lost(mut self) -> Self {
        self.pose = None;
        self
    }

    pub fn uncertainty(mut self, rot: f64, trans: f64) -> Self {
        self.uncertainty = Uncertainty::new(rot, trans);
        self
    }

    pub fn user_data(mut self, data: &[u8]) -> Self {
        self.frame = self.frame.user_data(data);
        self
    }

    pub fn build(self) -> OdometryEvent {
        OdometryEvent::new(self.frame.build(), self.pose, self.uncertainty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odometry_builder() {
        let event = OdometryBuilder::new(3).uncertainty(0.5, 0.25).build();
        assert_eq!(event.id(), 3);
        assert_eq!(event.pose.unwrap().translation.vector.x, 3.0);
        assert_eq!(event.uncertainty, Uncertainty::new(0.5, 0.25));
        assert!(!event.frame.is_intermediate());
    }

    #[test]
    fn test_lost_builder() {
        assert!(OdometryBuilder::new(1).lost().build().pose.is_none());
    }
}
