use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// World front axis. Cameras look down the negative of this axis by default.
pub const AXIS_FRONT: Vec3 = Vec3::Z;
/// World up axis.
pub const AXIS_UP: Vec3 = Vec3::Y;
/// World right axis.
pub const AXIS_RIGHT: Vec3 = Vec3::X;

/// A node-local transform that is either the identity or an owned matrix.
///
/// Composition never fails: an `Identity` operand simply drops out.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LocalTransform {
    #[default]
    Identity,
    Matrix(Mat4),
}

impl LocalTransform {
    pub fn matrix(&self) -> Option<&Mat4> {
        match self {
            Self::Identity => None,
            Self::Matrix(m) => Some(m),
        }
    }

    /// The transform as a plain matrix.
    pub fn to_mat4(&self) -> Mat4 {
        self.matrix().copied().unwrap_or(Mat4::IDENTITY)
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// `self × parent`, with `self` applied first. Either side may be identity.
    pub fn compose(&self, parent: &LocalTransform) -> Mat4 {
        multi_mul([self.matrix(), parent.matrix()])
    }
}

impl From<Mat4> for LocalTransform {
    fn from(m: Mat4) -> Self {
        Self::Matrix(m)
    }
}

/// Multiply every present matrix left to right. Returns identity when none are present.
pub fn multi_mul<'a, I>(matrices: I) -> Mat4
where
    I: IntoIterator<Item = Option<&'a Mat4>>,
{
    matrices
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<Mat4>, m| match acc {
            None => Some(*m),
            Some(r) => Some(r * *m),
        })
        .unwrap_or(Mat4::IDENTITY)
}
