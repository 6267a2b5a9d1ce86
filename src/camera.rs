use std::collections::HashMap;

use nalgebra_glm as glm;

/// World-space movement and look axes the camera can accumulate along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
    PosPitch,
    NegPitch,
    PosYaw,
    NegYaw,
}

/// Free-fly camera: a position plus pitch/yaw, with optional per-direction
/// speeds that `tick` integrates over time. Speeds are per second; angles in
/// radians.
#[derive(Clone, Debug, Default)]
pub struct Camera {
    speeds: HashMap<Direction, f32>,
    position: glm::Vec3,
    pitch: f32,
    yaw: f32,
}

impl Camera {
    pub fn new(position: glm::Vec3) -> Self {
        Self {
            speeds: HashMap::new(),
            position,
            pitch: 0.0,
            yaw: 0.0,
        }
    }

    pub fn set_position(&mut self, position: glm::Vec3) {
        self.position = position;
    }

    pub fn start_movement(&mut self, direction: Direction, speed: f32) {
        self.speeds.insert(direction, speed);
    }

    pub fn stop_movement(&mut self, direction: Direction) {
        self.speeds.remove(&direction);
    }

    pub fn move_by_increment(&mut self, direction: Direction, increment: f32) {
        self.apply(direction, increment);
    }

    /// `time_delta` is in milliseconds.
    pub fn tick(&mut self, time_delta: f32) {
        let pending = self
            .speeds
            .iter()
            .map(|(direction, speed)| (*direction, speed * time_delta / 1000.0))
            .collect::<Vec<_>>();
        for (direction, increment) in pending {
            self.apply(direction, increment);
        }
    }

    pub fn view_mat(&self) -> glm::Mat4 {
        glm::rotate(&glm::identity(), self.pitch, &glm::vec3(1.0, 0.0, 0.0))
            * glm::rotate(&glm::identity(), self.yaw, &glm::vec3(0.0, 1.0, 0.0))
            * glm::translate(&glm::identity(), &(-self.position))
    }

    fn apply(&mut self, direction: Direction, increment: f32) {
        match direction {
            Direction::PosX => self.position.x += increment,
            Direction::NegX => self.position.x -= increment,
            Direction::PosY => self.position.y += increment,
            Direction::NegY => self.position.y -= increment,
            Direction::PosZ => self.position.z += increment,
            Direction::NegZ => self.position.z -= increment,
            Direction::PosPitch => self.pitch += increment,
            Direction::NegPitch => self.pitch -= increment,
            Direction::PosYaw => self.yaw += increment,
            Direction::NegYaw => self.yaw -= increment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_at_rest_is_the_inverse_translation() {
        let camera = Camera::new(glm::vec3(0.0, 1.0, 3.5));
        let view = camera.view_mat();
        let expected = glm::translate(&glm::identity(), &glm::vec3(0.0, -1.0, -3.5));
        assert_eq!(view, expected);
    }

    #[test]
    fn tick_integrates_active_speeds() {
        let mut camera = Camera::new(glm::vec3(0.0, 0.0, 0.0));
        camera.start_movement(Direction::PosX, 2.0);
        camera.tick(500.0);
        camera.stop_movement(Direction::PosX);
        camera.tick(500.0);

        let view = camera.view_mat();
        let expected = glm::translate(&glm::identity(), &glm::vec3(-1.0, 0.0, 0.0));
        assert_eq!(view, expected);
    }

    #[test]
    fn increments_affect_orientation() {
        let mut camera = Camera::new(glm::vec3(0.0, 0.0, 0.0));
        camera.move_by_increment(Direction::PosYaw, std::f32::consts::FRAC_PI_2);

        // A quarter turn about Y maps world +X onto the view forward axis.
        let view = camera.view_mat();
        let forward = view * glm::vec4(1.0, 0.0, 0.0, 0.0);
        assert!((forward.z - -1.0).abs() < 1e-6);
        assert!(forward.x.abs() < 1e-6);
    }
}
