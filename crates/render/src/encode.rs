//! Interleaved little-endian vertex encoding.
//!
//! Rows are vertices: for every row in the requested range, each source
//! contributes `dim` elements, in source order, before the next row starts.
//! The byte layout is the binary contract with the vertex attribute layout
//! bound in [`crate::shape`].

/// One attribute array and the number of elements per row.
#[derive(Debug, Clone, Copy)]
pub enum AttribSource<'a> {
    F32 { dim: usize, data: &'a [f32] },
    U8 { dim: usize, data: &'a [u8] },
}

impl<'a> AttribSource<'a> {
    pub fn f32(dim: usize, data: &'a [f32]) -> Self {
        Self::F32 { dim, data }
    }

    pub fn u8(dim: usize, data: &'a [u8]) -> Self {
        Self::U8 { dim, data }
    }

    pub fn dim(&self) -> usize {
        match *self {
            Self::F32 { dim, .. } | Self::U8 { dim, .. } => dim,
        }
    }

    /// Encoded size of one element.
    pub fn element_size(&self) -> usize {
        match self {
            Self::F32 { .. } => size_of::<f32>(),
            Self::U8 { .. } => size_of::<u8>(),
        }
    }

    pub fn row_bytes(&self) -> usize {
        self.dim() * self.element_size()
    }

    /// Number of complete rows in the backing array.
    pub fn rows(&self) -> usize {
        let len = match self {
            Self::F32 { data, .. } => data.len(),
            Self::U8 { data, .. } => data.len(),
        };
        len / self.dim()
    }

    fn write_row(&self, row: usize, out: &mut Vec<u8>) {
        match *self {
            Self::F32 { dim, data } => {
                for v in &data[row * dim..(row + 1) * dim] {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Self::U8 { dim, data } => out.extend_from_slice(&data[row * dim..(row + 1) * dim]),
        }
    }
}

/// Bytes per interleaved row across all sources.
pub fn row_stride(sources: &[AttribSource<'_>]) -> usize {
    sources.iter().map(AttribSource::row_bytes).sum()
}

/// Encode rows `[offset, length)` of every source into a new buffer.
///
/// # Panics
/// If `offset > length`, a source has a zero dimension, or a source has fewer
/// than `length` rows.
pub fn encode_objects(offset: usize, length: usize, sources: &[AttribSource<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(offset, length, sources, &mut out);
    out
}

/// Like [`encode_objects`] but appends to `out`, reusing its allocation.
pub fn encode_into(offset: usize, length: usize, sources: &[AttribSource<'_>], out: &mut Vec<u8>) {
    assert!(
        offset <= length,
        "encode range starts at row {offset} but ends at row {length}"
    );
    for (i, source) in sources.iter().enumerate() {
        assert!(source.dim() > 0, "attribute source {i} has zero dimension");
        assert!(
            length <= source.rows(),
            "attribute source {i} has {} rows but rows up to {length} were requested",
            source.rows()
        );
    }

    out.reserve((length - offset) * row_stride(sources));
    for row in offset..length {
        for source in sources {
            source.write_row(row, out);
        }
    }
}

/// Decode a little-endian `f32` stream. Trailing bytes that do not form a
/// whole float are ignored.
pub fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(size_of::<f32>())
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value() {
        let bytes = encode_objects(0, 1, &[AttribSource::f32(1, &[42.0])]);
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes, 42.0f32.to_le_bytes());
        assert_eq!(decode_f32(&bytes), vec![42.0]);
    }

    #[test]
    fn round_trip_single_source() {
        for dim in 1..=4 {
            let rows = 5;
            let data: Vec<f32> = (0..dim * rows).map(|i| i as f32 * 0.5 - 3.0).collect();
            let bytes = encode_objects(0, rows, &[AttribSource::f32(dim, &data)]);
            assert_eq!(decode_f32(&bytes), data);
        }
    }

    #[test]
    fn output_length_matches_formula() {
        let pos = [0.0f32; 30];
        let norm = [1.0f32; 30];
        let uv = [2.0f32; 20];
        let idx = [7u8; 10];
        let cases: Vec<Vec<AttribSource<'_>>> = vec![
            vec![AttribSource::f32(3, &pos)],
            vec![AttribSource::f32(3, &pos), AttribSource::f32(3, &norm)],
            vec![
                AttribSource::f32(3, &pos),
                AttribSource::f32(3, &norm),
                AttribSource::f32(2, &uv),
            ],
            vec![AttribSource::f32(2, &uv), AttribSource::u8(1, &idx)],
        ];
        for sources in &cases {
            for (offset, length) in [(0, 10), (3, 10), (4, 4), (0, 0)] {
                let expected: usize = (length - offset)
                    * sources.iter().map(|s| s.dim() * s.element_size()).sum::<usize>();
                assert_eq!(encode_objects(offset, length, sources).len(), expected);
            }
        }
    }

    #[test]
    fn rows_are_interleaved() {
        let pos = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let uv = [10.0f32, 11.0, 12.0, 13.0];
        let bytes = encode_objects(0, 2, &[AttribSource::f32(3, &pos), AttribSource::f32(2, &uv)]);
        assert_eq!(
            decode_f32(&bytes),
            vec![1.0, 2.0, 3.0, 10.0, 11.0, 4.0, 5.0, 6.0, 12.0, 13.0]
        );
    }

    #[test]
    fn offset_encodes_tail_only() {
        let data = [1.0f32, 2.0, 3.0, 4.0];
        let bytes = encode_objects(2, 4, &[AttribSource::f32(1, &data)]);
        assert_eq!(decode_f32(&bytes), vec![3.0, 4.0]);
    }

    #[test]
    fn u8_indices_are_one_byte_each() {
        let idx = [0u8, 1, 2, 2, 3, 0];
        assert_eq!(encode_objects(0, 6, &[AttribSource::u8(1, &idx)]), idx.to_vec());
    }

    #[test]
    fn encode_into_appends() {
        let mut out = vec![0xAA];
        encode_into(0, 1, &[AttribSource::u8(2, &[1, 2])], &mut out);
        assert_eq!(out, vec![0xAA, 1, 2]);
    }

    #[test]
    fn stride_sums_sources() {
        let pos = [0.0f32; 3];
        let uv = [0.0f32; 2];
        assert_eq!(
            row_stride(&[AttribSource::f32(3, &pos), AttribSource::f32(2, &uv)]),
            20
        );
    }

    #[test]
    #[should_panic(expected = "rows but rows up to")]
    fn out_of_bounds_range_panics() {
        encode_objects(0, 3, &[AttribSource::f32(3, &[0.0; 6])]);
    }

    #[test]
    #[should_panic(expected = "encode range starts")]
    fn inverted_range_panics() {
        encode_objects(2, 1, &[AttribSource::f32(1, &[0.0; 4])]);
    }
}
