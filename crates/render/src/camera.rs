//! View and projection providers.
//!
//! [`Camera`] is the read-only capability the scene consumes;
//! [`CameraControl`] adds the mutations a frame driver applies between ticks.
//! Degenerate look directions (target at the eye, or a look-at basis that
//! collapses) leave the orientation untouched for that call.

use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;

use glam::{Mat3, Mat4, Quat, Vec3};
use lumen_common::{AXIS_FRONT, AXIS_RIGHT, AXIS_UP};
use serde::{Deserialize, Serialize};

/// Euler pitch stays strictly inside ±π/2 so the right axis never collapses.
pub const PITCH_LIMIT: f32 = FRAC_PI_2 - 1.0e-4;

/// Perspective projection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Perspective {
    /// Vertical field of view in radians.
    pub fovy: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fovy: 0.785,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Perspective {
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fovy, self.aspect, self.near, self.far)
    }
}

/// Projection matrix cached alongside the parameters it was built from.
#[derive(Debug, Clone, Copy)]
struct Projection {
    params: Perspective,
    matrix: Mat4,
}

impl Projection {
    fn new(params: Perspective) -> Self {
        Self {
            params,
            matrix: params.matrix(),
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new(Perspective::default())
    }
}

pub trait Camera {
    /// World-to-camera transform.
    fn view(&self) -> Mat4;
    /// Camera-to-clip transform.
    fn projection(&self) -> Mat4;
    fn position(&self) -> Vec3;
}

pub trait CameraControl: Camera {
    /// Apply `{pitch, yaw, roll}` deltas in radians. Roll is ignored.
    fn rotate(&mut self, delta: Vec3);

    /// Turn to face `target`.
    fn rotate_to(&mut self, target: Vec3);

    /// Move by `delta` expressed in camera-local axes (right, up, forward).
    fn translate(&mut self, delta: Vec3);

    fn move_to(&mut self, position: Vec3);

    /// Ease toward the pose at `position` looking at `center`.
    ///
    /// `amount` is not clamped: values outside `[0, 1]` extrapolate.
    fn lerp(&mut self, position: Vec3, center: Vec3, amount: f32);

    fn perspective(&self) -> Perspective;

    /// Rebuild the cached projection matrix.
    fn set_perspective(&mut self, perspective: Perspective);

    fn set_aspect(&mut self, aspect: f32) {
        let mut p = self.perspective();
        p.aspect = aspect;
        self.set_perspective(p);
    }
}

/// Rotation whose forward axis (`-Z`) points from `eye` to `center`, with up
/// reconstructed from world up. `None` when the direction is degenerate.
pub fn look_rotation(eye: Vec3, center: Vec3) -> Option<Quat> {
    let direction = (center - eye).try_normalize()?;
    let right = direction.cross(AXIS_UP).try_normalize()?;
    let up = right.cross(direction);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, -direction)).normalize())
}

/// Camera with a fixed view and projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedCamera {
    view: Mat4,
    projection: Mat4,
    position: Vec3,
}

impl FixedCamera {
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self {
            view,
            projection,
            position,
        }
    }

    pub fn looking_at(eye: Vec3, target: Vec3, perspective: Perspective) -> Self {
        Self::new(
            Mat4::look_at_rh(eye, target, AXIS_UP),
            perspective.matrix(),
            eye,
        )
    }
}

impl Camera for FixedCamera {
    fn view(&self) -> Mat4 {
        self.view
    }

    fn projection(&self) -> Mat4 {
        self.projection
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}

/// FPS-style camera driven by yaw and pitch.
#[derive(Debug, Clone, Copy)]
pub struct EulerCamera {
    eye: Vec3,
    yaw: f32,
    pitch: f32,
    center: Vec3,
    up: Vec3,
    right: Vec3,
    projection: Projection,
}

impl Default for EulerCamera {
    /// At the origin, looking down `-Z`.
    fn default() -> Self {
        Self::new(Vec3::ZERO, -FRAC_PI_2, 0.0)
    }
}

impl EulerCamera {
    pub fn new(eye: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut cam = Self {
            eye,
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            center: -AXIS_FRONT,
            up: AXIS_UP,
            right: AXIS_RIGHT,
            projection: Projection::default(),
        };
        cam.update_vectors();
        cam
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Unit forward direction.
    pub fn forward(&self) -> Vec3 {
        self.center
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    fn update_vectors(&mut self) {
        let center = Vec3::new(
            self.pitch.cos() * self.yaw.cos(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.sin(),
        )
        .normalize();
        let Some(right) = center.cross(AXIS_UP).try_normalize() else {
            tracing::debug!(pitch = self.pitch, "euler camera basis collapsed, keeping previous");
            return;
        };
        self.center = center;
        self.right = right;
        self.up = right.cross(center);
    }

    /// Yaw and pitch that face along `direction`, keeping the current yaw when
    /// looking straight up or down.
    fn angles_toward(&self, direction: Vec3) -> (f32, f32) {
        let pitch = direction.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        let yaw = if direction.x.abs() + direction.z.abs() > f32::EPSILON {
            direction.z.atan2(direction.x)
        } else {
            self.yaw
        };
        (yaw, pitch)
    }
}

impl Camera for EulerCamera {
    fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.eye + self.center, self.up)
    }

    fn projection(&self) -> Mat4 {
        self.projection.matrix
    }

    fn position(&self) -> Vec3 {
        self.eye
    }
}

impl CameraControl for EulerCamera {
    fn rotate(&mut self, delta: Vec3) {
        self.yaw += delta.y;
        // Limit vertical rotation to avoid gimbal lock.
        self.pitch = (self.pitch + delta.x).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    fn rotate_to(&mut self, target: Vec3) {
        let Some(direction) = (target - self.eye).try_normalize() else {
            tracing::debug!(?target, "rotate_to target coincides with eye");
            return;
        };
        (self.yaw, self.pitch) = self.angles_toward(direction);
        self.update_vectors();
    }

    fn translate(&mut self, delta: Vec3) {
        self.eye += self.right * delta.x + self.up * delta.y + self.center * delta.z;
    }

    fn move_to(&mut self, position: Vec3) {
        self.eye = position;
    }

    fn lerp(&mut self, position: Vec3, center: Vec3, amount: f32) {
        if let Some(direction) = (center - position).try_normalize() {
            let (yaw, pitch) = self.angles_toward(direction);
            // Shortest arc around the yaw circle.
            let dyaw = (yaw - self.yaw + PI).rem_euclid(TAU) - PI;
            self.yaw += dyaw * amount;
            self.pitch = (self.pitch + (pitch - self.pitch) * amount).clamp(-PITCH_LIMIT, PITCH_LIMIT);
            self.update_vectors();
        } else {
            tracing::debug!(?position, "lerp target looks at itself, keeping orientation");
        }
        self.eye += (position - self.eye) * amount;
    }

    fn perspective(&self) -> Perspective {
        self.projection.params
    }

    fn set_perspective(&mut self, perspective: Perspective) {
        self.projection = Projection::new(perspective);
    }
}

impl fmt::Display for EulerCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Camera:")?;
        writeln!(f, "\teye:    {}", self.eye)?;
        writeln!(f, "\tcenter: {}", self.center)?;
        writeln!(f, "\tup:     {}", self.up)?;
        writeln!(f, "\tpitch, yaw: {}, {}", self.pitch, self.yaw)
    }
}

/// Free-look camera driven by a unit quaternion.
///
/// Pitch turns about the camera's own right axis and yaw about world up.
/// Pitch is not clamped, so the camera can roll over the poles.
#[derive(Debug, Clone, Copy)]
pub struct QuatCamera {
    position: Vec3,
    rotation: Quat,
    projection: Projection,
}

impl Default for QuatCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl QuatCamera {
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::default(),
        }
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Unit direction the camera faces.
    pub fn forward(&self) -> Vec3 {
        self.rotation * -AXIS_FRONT
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * AXIS_UP
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * AXIS_RIGHT
    }
}

impl Camera for QuatCamera {
    fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), self.up())
    }

    fn projection(&self) -> Mat4 {
        self.projection.matrix
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}

impl CameraControl for QuatCamera {
    fn rotate(&mut self, delta: Vec3) {
        if delta.x != 0.0 {
            let q = Quat::from_axis_angle(AXIS_RIGHT, delta.x).normalize();
            self.rotation = (self.rotation * q).normalize();
        }
        if delta.y != 0.0 {
            let q = Quat::from_axis_angle(AXIS_UP, delta.y).normalize();
            self.rotation = (q * self.rotation).normalize();
        }
    }

    fn rotate_to(&mut self, target: Vec3) {
        match look_rotation(self.position, target) {
            Some(rotation) => self.rotation = rotation,
            None => tracing::debug!(?target, "rotate_to direction is degenerate"),
        }
    }

    fn translate(&mut self, delta: Vec3) {
        self.position += self.rotation * delta;
    }

    fn move_to(&mut self, position: Vec3) {
        self.position = position;
    }

    fn lerp(&mut self, position: Vec3, center: Vec3, amount: f32) {
        match look_rotation(position, center) {
            Some(target) => self.rotation = self.rotation.lerp(target, amount).normalize(),
            None => tracing::debug!(?position, "lerp target looks at itself, keeping orientation"),
        }
        self.position += (position - self.position) * amount;
    }

    fn perspective(&self) -> Perspective {
        self.projection.params
    }

    fn set_perspective(&mut self, perspective: Perspective) {
        self.projection = Projection::new(perspective);
    }
}

impl fmt::Display for QuatCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Camera:")?;
        writeln!(f, "\tposition: {}", self.position)?;
        writeln!(f, "\trotation: {}", self.rotation)?;
        writeln!(f, "\tcenter:   {}", self.forward())?;
        writeln!(f, "\tup:       {}", self.up())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn assert_vec_near(a: Vec3, b: Vec3) {
        assert!(a.abs_diff_eq(b, EPS), "{a} != {b}");
    }

    fn assert_unit(q: Quat) {
        assert!((q.length() - 1.0).abs() < EPS, "|{q}| = {}", q.length());
    }

    /// Deterministic pseudo-random deltas in roughly [-2, 2].
    fn deltas(n: usize) -> impl Iterator<Item = Vec3> {
        (0..n).map(|i| {
            let f = i as f32;
            Vec3::new((f * 1.7).sin() * 2.0, (f * 0.9).cos() * 2.0, (f * 3.1).sin())
        })
    }

    #[test]
    fn euler_pitch_stays_clamped() {
        let mut cam = EulerCamera::default();
        for d in deltas(500) {
            cam.rotate(d);
            assert!(cam.pitch() >= -FRAC_PI_2 && cam.pitch() <= FRAC_PI_2);
            assert!(cam.forward().is_finite());
            assert!(cam.right().is_normalized());
        }
        cam.rotate(Vec3::new(100.0, 0.0, 0.0));
        assert_eq!(cam.pitch(), PITCH_LIMIT);
        cam.rotate(Vec3::new(-1000.0, 0.0, 0.0));
        assert_eq!(cam.pitch(), -PITCH_LIMIT);
    }

    #[test]
    fn euler_default_looks_down_negative_z() {
        let cam = EulerCamera::default();
        assert_vec_near(cam.forward(), Vec3::NEG_Z);
        assert_vec_near(cam.up(), Vec3::Y);
    }

    #[test]
    fn euler_translate_uses_local_axes() {
        let mut cam = EulerCamera::default();
        cam.translate(Vec3::new(0.0, 0.0, 2.0));
        assert_vec_near(cam.position(), Vec3::new(0.0, 0.0, -2.0));
        cam.translate(Vec3::new(1.0, 0.0, 0.0));
        assert_vec_near(cam.position(), Vec3::new(1.0, 0.0, -2.0));
    }

    #[test]
    fn euler_rotate_to_faces_target() {
        let mut cam = EulerCamera::new(Vec3::new(1.0, 2.0, 3.0), 0.0, 0.0);
        let target = Vec3::new(-4.0, 0.0, 7.0);
        cam.rotate_to(target);
        assert_vec_near(cam.forward(), (target - cam.position()).normalize());
    }

    #[test]
    fn euler_rotate_to_self_is_noop() {
        let mut cam = EulerCamera::new(Vec3::ONE, 0.3, 0.2);
        let before = cam.forward();
        cam.rotate_to(Vec3::ONE);
        assert_eq!(cam.forward(), before);
    }

    #[test]
    fn euler_lerp_full_amount_reaches_pose() {
        let mut cam = EulerCamera::default();
        let pos = Vec3::new(0.0, 7.0, -3.0);
        cam.lerp(pos, Vec3::ZERO, 1.0);
        assert_vec_near(cam.position(), pos);
        assert_vec_near(cam.forward(), (Vec3::ZERO - pos).normalize());
    }

    #[test]
    fn quat_rotation_stays_unit() {
        let mut cam = QuatCamera::new();
        for (i, d) in deltas(1000).enumerate() {
            cam.rotate(d);
            assert_unit(cam.rotation());
            if i % 7 == 0 {
                cam.rotate_to(Vec3::new(d.z * 10.0, d.x, 5.0 + d.y));
                assert_unit(cam.rotation());
            }
            if i % 11 == 0 {
                cam.lerp(Vec3::new(d.y, 3.0, d.x), Vec3::ZERO, 0.1);
                assert_unit(cam.rotation());
            }
        }
    }

    #[test]
    fn quat_pitch_is_local_and_yaw_is_global() {
        let mut cam = QuatCamera::new();
        cam.rotate(Vec3::new(0.0, FRAC_PI_2, 0.0));
        // Yawed left by 90 degrees: facing -X.
        assert_vec_near(cam.forward(), Vec3::NEG_X);
        cam.rotate(Vec3::new(FRAC_PI_2, 0.0, 0.0));
        // Pitch about the camera's right axis (now -Z) tilts forward to +Y.
        assert_vec_near(cam.forward(), Vec3::Y);
    }

    #[test]
    fn quat_roll_is_ignored() {
        let mut cam = QuatCamera::new();
        cam.rotate(Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(cam.rotation(), Quat::IDENTITY);
    }

    #[test]
    fn quat_rotate_to_faces_target() {
        let mut cam = QuatCamera::new();
        cam.move_to(Vec3::new(0.0, 7.0, -3.0));
        cam.rotate_to(Vec3::ZERO);
        assert_vec_near(cam.forward(), (Vec3::ZERO - cam.position()).normalize());
        assert!(cam.up().y > 0.0);
    }

    #[test]
    fn quat_rotate_to_degenerate_keeps_orientation() {
        let mut cam = QuatCamera::new();
        cam.rotate(Vec3::new(0.2, 0.4, 0.0));
        let before = cam.rotation();
        cam.rotate_to(cam.position());
        assert_eq!(cam.rotation(), before);
        // Straight up collapses the right axis.
        cam.rotate_to(cam.position() + Vec3::Y);
        assert_eq!(cam.rotation(), before);
    }

    #[test]
    fn quat_translate_follows_orientation() {
        let mut cam = QuatCamera::new();
        cam.rotate(Vec3::new(0.0, FRAC_PI_2, 0.0));
        cam.translate(Vec3::new(0.0, 0.0, -1.0));
        assert_vec_near(cam.position(), Vec3::NEG_X);
    }

    #[test]
    fn quat_lerp_interpolates_position() {
        let mut cam = QuatCamera::new();
        cam.lerp(Vec3::new(10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, -5.0), 0.25);
        assert_vec_near(cam.position(), Vec3::new(2.5, 0.0, 0.0));
        // Extrapolation is allowed.
        let mut cam = QuatCamera::new();
        cam.lerp(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, -5.0), 2.0);
        assert_vec_near(cam.position(), Vec3::new(2.0, 0.0, 0.0));
        assert_unit(cam.rotation());
    }

    #[test]
    fn view_maps_eye_to_origin() {
        let mut cam = QuatCamera::new();
        cam.move_to(Vec3::new(3.0, 4.0, 5.0));
        cam.rotate(Vec3::new(0.3, -0.8, 0.0));
        let eye_in_view = cam.view().transform_point3(cam.position());
        assert_vec_near(eye_in_view, Vec3::ZERO);
        // A point straight ahead lands on the view's -Z axis.
        let ahead = cam.view().transform_point3(cam.position() + cam.forward() * 2.0);
        assert_vec_near(ahead, Vec3::new(0.0, 0.0, -2.0));
    }

    #[test]
    fn projection_is_cached_until_set() {
        let mut cam = QuatCamera::new();
        let before = cam.projection();
        cam.move_to(Vec3::X);
        cam.rotate(Vec3::new(0.1, 0.1, 0.0));
        assert_eq!(cam.projection(), before);
        cam.set_aspect(2.0);
        assert_ne!(cam.projection(), before);
        assert_eq!(cam.perspective().aspect, 2.0);
        assert_eq!(
            cam.projection(),
            Mat4::perspective_rh_gl(0.785, 2.0, 0.1, 100.0)
        );
    }

    #[test]
    fn fixed_camera_reports_inputs() {
        let cam = FixedCamera::looking_at(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Perspective::default());
        assert_eq!(cam.position(), Vec3::new(0.0, 1.0, 5.0));
        assert_eq!(cam.projection(), Perspective::default().matrix());
        assert_vec_near(cam.view().transform_point3(cam.position()), Vec3::ZERO);
    }

    #[test]
    fn display_mentions_fields() {
        let text = QuatCamera::new().to_string();
        assert!(text.contains("rotation"));
        let text = EulerCamera::default().to_string();
        assert!(text.contains("pitch, yaw"));
    }
}
