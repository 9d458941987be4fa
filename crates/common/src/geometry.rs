//! Flat `f32` vertex builders. Every builder returns tightly packed
//! `[x, y, z]` triples ready to be used as a position attribute.

use glam::Vec3;

/// Two triangles covering the axis-aligned rectangle spanned by `a` (bottom
/// left) and `b` (top right).
pub fn quad(a: Vec3, b: Vec3) -> Vec<f32> {
    #[rustfmt::skip]
    let v = vec![
        // First triangle
        b.x, b.y, b.z, // top right
        a.x, b.y, a.z, // top left
        a.x, a.y, a.z, // bottom left
        // Second triangle
        a.x, a.y, a.z, // bottom left
        b.x, b.y, b.z, // top right
        b.x, a.y, b.z, // bottom right
    ];
    v
}

/// An arrow pointing up: a triangular head at `tip` plus a quad handle.
pub fn upvote(tip: Vec3, size: f32) -> Vec<f32> {
    let a = tip + Vec3::new(-size / 2.0, -size * 2.0, 0.0);
    let b = tip + Vec3::new(size / 2.0, -size, 0.0);
    let mut v = vec![
        tip.x,
        tip.y,
        tip.z,
        tip.x - size,
        tip.y - size,
        tip.z,
        tip.x + size,
        tip.y - size,
        tip.z,
    ];
    v.extend(quad(a, b));
    v
}

/// Unit cube corners for an indexed skybox.
#[rustfmt::skip]
pub const SKYBOX_VERTICES: [f32; 24] = [
    -1.0,  1.0, -1.0,
    -1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,
     1.0,  1.0, -1.0,
    -1.0, -1.0,  1.0,
    -1.0,  1.0,  1.0,
     1.0, -1.0,  1.0,
     1.0,  1.0,  1.0,
];

/// Triangle indices into [`SKYBOX_VERTICES`].
#[rustfmt::skip]
pub const SKYBOX_INDICES: [u8; 36] = [
    0, 1, 2, 2, 3, 0,
    4, 1, 0, 0, 5, 4,
    2, 6, 7, 7, 3, 2,
    4, 5, 7, 7, 6, 4,
    0, 3, 7, 7, 5, 0,
    1, 4, 2, 2, 4, 6,
];

/// A large floor plane at `y = 0`.
#[rustfmt::skip]
pub const FLOOR_VERTICES: [f32; 18] = [
    -100.0, 0.0, -100.0,
     100.0, 0.0, -100.0,
     100.0, 0.0,  100.0,
     100.0, 0.0,  100.0,
    -100.0, 0.0, -100.0,
    -100.0, 0.0,  100.0,
];

/// Upward normals matching [`FLOOR_VERTICES`].
#[rustfmt::skip]
pub const FLOOR_NORMALS: [f32; 18] = [
    0.0, 1.0, 0.0,
    0.0, 1.0, 0.0,
    0.0, 1.0, 0.0,
    0.0, 1.0, 0.0,
    0.0, 1.0, 0.0,
    0.0, 1.0, 0.0,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn vertices(flat: &[f32]) -> Vec<Vec3> {
        flat.chunks_exact(3).map(Vec3::from_slice).collect()
    }

    #[test]
    fn unit_quad_has_six_vertices() {
        let q = quad(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(q.len(), 18);
        let v = vertices(&q);
        assert_eq!(v.len(), 6);
        for p in &v {
            assert_eq!(p.z, 0.0);
            assert!(p.x == 0.0 || p.x == 1.0);
            assert!(p.y == 0.0 || p.y == 1.0);
        }
        // All four corners of the unit square appear.
        for corner in [
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ] {
            assert!(v.contains(&corner), "missing corner {corner}");
        }
    }

    #[test]
    fn quad_triangles_cover_unit_area() {
        let v = vertices(&quad(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)));
        let area: f32 = v
            .chunks_exact(3)
            .map(|t| (t[1] - t[0]).cross(t[2] - t[0]).length() / 2.0)
            .sum();
        assert!((area - 1.0).abs() < 1e-6);
    }

    #[test]
    fn upvote_is_head_plus_handle() {
        let v = upvote(Vec3::new(0.0, 2.0, 0.0), 0.5);
        assert_eq!(v.len(), 9 + 18);
        assert_eq!(&v[..3], &[0.0, 2.0, 0.0]);
    }

    #[test]
    fn skybox_indices_in_range() {
        let n = (SKYBOX_VERTICES.len() / 3) as u8;
        assert!(SKYBOX_INDICES.iter().all(|&i| i < n));
        assert_eq!(FLOOR_VERTICES.len(), FLOOR_NORMALS.len());
    }
}
