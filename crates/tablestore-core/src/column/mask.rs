//! Composite mask column values.
//!
//! A mask row correlates an image, a plane, a bounding box and a packed
//! bitmap. The sub-fields are stored as parallel arrays and always move
//! together: every operation here touches all of them at the same index.

use serde::{Deserialize, Serialize};

/// One row of a mask column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaskRow {
    /// Image the mask belongs to.
    pub image_id: i64,
    /// Z plane index.
    pub the_z: i32,
    /// T plane index.
    pub the_t: i32,
    /// Bounding box x.
    pub x: f64,
    /// Bounding box y.
    pub y: f64,
    /// Bounding box width.
    pub w: f64,
    /// Bounding box height.
    pub h: f64,
    /// Packed bitmap.
    pub bytes: Vec<u8>,
}

/// Parallel sub-arrays of a mask column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaskValues {
    /// Image ids.
    pub image_id: Vec<i64>,
    /// Z plane indices.
    pub the_z: Vec<i32>,
    /// T plane indices.
    pub the_t: Vec<i32>,
    /// Bounding box x.
    pub x: Vec<f64>,
    /// Bounding box y.
    pub y: Vec<f64>,
    /// Bounding box widths.
    pub w: Vec<f64>,
    /// Bounding box heights.
    pub h: Vec<f64>,
    /// Packed bitmaps.
    pub bytes: Vec<Vec<u8>>,
}

impl MaskValues {
    /// Creates empty mask values with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            image_id: Vec::with_capacity(capacity),
            the_z: Vec::with_capacity(capacity),
            the_t: Vec::with_capacity(capacity),
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            w: Vec::with_capacity(capacity),
            h: Vec::with_capacity(capacity),
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Number of rows, taken from the image id array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.image_id.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lengths of all eight sub-arrays, in declaration order.
    #[must_use]
    pub fn sub_lengths(&self) -> [usize; 8] {
        [
            self.image_id.len(),
            self.the_z.len(),
            self.the_t.len(),
            self.x.len(),
            self.y.len(),
            self.w.len(),
            self.h.len(),
            self.bytes.len(),
        ]
    }

    /// Whether all sub-arrays have the same length.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let lengths = self.sub_lengths();
        lengths.iter().all(|&l| l == lengths[0])
    }

    /// Appends one row.
    pub fn push(&mut self, row: MaskRow) {
        self.image_id.push(row.image_id);
        self.the_z.push(row.the_z);
        self.the_t.push(row.the_t);
        self.x.push(row.x);
        self.y.push(row.y);
        self.w.push(row.w);
        self.h.push(row.h);
        self.bytes.push(row.bytes);
    }

    /// Returns a copy of row `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<MaskRow> {
        if index >= self.len() {
            return None;
        }
        Some(MaskRow {
            image_id: self.image_id[index],
            the_z: self.the_z[index],
            the_t: self.the_t[index],
            x: self.x[index],
            y: self.y[index],
            w: self.w[index],
            h: self.h[index],
            bytes: self.bytes[index].clone(),
        })
    }

    pub(crate) fn set_row(&mut self, index: usize, src: &Self, src_index: usize) {
        self.image_id[index] = src.image_id[src_index];
        self.the_z[index] = src.the_z[src_index];
        self.the_t[index] = src.the_t[src_index];
        self.x[index] = src.x[src_index];
        self.y[index] = src.y[src_index];
        self.w[index] = src.w[src_index];
        self.h[index] = src.h[src_index];
        self.bytes[index].clone_from(&src.bytes[src_index]);
    }

    pub(crate) fn extend_from(&mut self, other: &Self) {
        self.image_id.extend_from_slice(&other.image_id);
        self.the_z.extend_from_slice(&other.the_z);
        self.the_t.extend_from_slice(&other.the_t);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.w.extend_from_slice(&other.w);
        self.h.extend_from_slice(&other.h);
        self.bytes.extend_from_slice(&other.bytes);
    }

    pub(crate) fn gather(&self, rows: &[usize]) -> Self {
        let mut out = Self::with_capacity(rows.len());
        for &r in rows {
            out.image_id.push(self.image_id[r]);
            out.the_z.push(self.the_z[r]);
            out.the_t.push(self.the_t[r]);
            out.x.push(self.x[r]);
            out.y.push(self.y[r]);
            out.w.push(self.w[r]);
            out.h.push(self.h[r]);
            out.bytes.push(self.bytes[r].clone());
        }
        out
    }

    pub(crate) fn range(&self, start: usize, stop: usize) -> Self {
        Self {
            image_id: self.image_id[start..stop].to_vec(),
            the_z: self.the_z[start..stop].to_vec(),
            the_t: self.the_t[start..stop].to_vec(),
            x: self.x[start..stop].to_vec(),
            y: self.y[start..stop].to_vec(),
            w: self.w[start..stop].to_vec(),
            h: self.h[start..stop].to_vec(),
            bytes: self.bytes[start..stop].to_vec(),
        }
    }
}

impl FromIterator<MaskRow> for MaskValues {
    fn from_iter<I: IntoIterator<Item = MaskRow>>(iter: I) -> Self {
        let mut values = Self::default();
        for row in iter {
            values.push(row);
        }
        values
    }
}
