// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type.

use crate::{DType, Lod, Place, Shape, TensorError};
use std::sync::Arc;

/// An n-dimensional tensor placed on a device.
///
/// The byte buffer is held behind an `Arc`, so cloning a `Tensor` (or
/// calling [`share_data_with`](Tensor::share_data_with)) never copies data.
/// Dropping the last handle to a buffer is what "freeing" means for the
/// garbage collectors in `memory-manager`.
///
/// # Memory Layout
/// Row-major (C) order, little-endian elements.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    place: Place,
    data: Arc<Vec<u8>>,
    lod: Lod,
}

impl Tensor {
    /// Creates a new zero-filled tensor on `place`.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Place, Shape, Tensor};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32, Place::Cpu);
    /// assert_eq!(t.size_bytes(), 24);
    /// ```
    pub fn zeros(shape: Shape, dtype: DType, place: Place) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            place,
            data: Arc::new(vec![0u8; size]),
            lod: Lod::empty(),
        }
    }

    /// Creates a tensor from raw bytes.
    ///
    /// Returns an error if the buffer size does not match `shape.size_bytes(dtype)`.
    pub fn from_bytes(
        shape: Shape,
        dtype: DType,
        place: Place,
        data: Vec<u8>,
    ) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape,
            dtype,
            place,
            data: Arc::new(data),
            lod: Lod::empty(),
        })
    }

    /// Creates a host tensor from `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(shape, DType::F32, Place::Cpu, bytes)
    }

    /// Creates a host tensor from `i64` values.
    pub fn from_i64(shape: Shape, values: &[i64]) -> Result<Self, TensorError> {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(shape, DType::I64, Place::Cpu, bytes)
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the device this tensor's buffer lives on.
    pub fn place(&self) -> Place {
        self.place
    }

    /// Returns the sequence metadata.
    pub fn lod(&self) -> &Lod {
        &self.lod
    }

    /// Replaces the sequence metadata.
    pub fn set_lod(&mut self, lod: Lod) {
        self.lod = lod;
    }

    /// Builder-style variant of [`set_lod`](Tensor::set_lod).
    pub fn with_lod(mut self, lod: Lod) -> Self {
        self.lod = lod;
        self
    }

    /// Returns the raw byte slice backing this tensor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the bytes. Copies the buffer first if it is shared
    /// (copy-on-write), so other holders never observe the write.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when both tensors point at the same buffer.
    pub fn shares_buffer_with(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Number of live handles to this tensor's buffer.
    pub fn buffer_handles(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    /// Returns a tensor that shares this tensor's buffer, shape, place and LoD.
    pub fn share_data_with(&self) -> Tensor {
        self.clone()
    }

    /// Views the same buffer under a new shape with the same element count.
    pub fn reshape(&self, shape: Shape) -> Result<Tensor, TensorError> {
        if shape.num_elements() != self.shape.num_elements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape.clone(),
                rhs: shape,
            });
        }
        Ok(Tensor {
            shape,
            ..self.clone()
        })
    }

    /// Copies the buffer into a fresh allocation on `place`.
    pub fn deep_copy_to(&self, place: Place) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            dtype: self.dtype,
            place,
            data: Arc::new(self.data.as_ref().clone()),
            lod: self.lod.clone(),
        }
    }

    /// Decodes the buffer as `f32` values.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        self.expect_dtype(DType::F32)?;
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Decodes the buffer as `i64` values.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, TensorError> {
        self.expect_dtype(DType::I64)?;
        Ok(self
            .data
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                i64::from_le_bytes(b)
            })
            .collect())
    }

    /// Number of samples along the batch dimension: the number of top-level
    /// sequences when a LoD is attached, the outer dimension otherwise.
    pub fn batch_size(&self) -> Result<usize, TensorError> {
        if let Some(n) = self.lod.num_sequences() {
            return Ok(n);
        }
        self.shape
            .outer_dim()
            .ok_or(TensorError::ScalarNotAllowed { op: "batch_size" })
    }

    /// Splits the batch into at most `places.len()` shards, copying shard
    /// `i` onto `places[i]`.
    ///
    /// Samples are distributed as evenly as possible with the remainder going
    /// to the leading shards. When the batch has fewer samples than places,
    /// only `batch_size` shards are produced; the caller decides whether that
    /// is acceptable.
    pub fn split_batch(&self, places: &[Place]) -> Result<Vec<Tensor>, TensorError> {
        let batch = self.batch_size()?;
        let parts = batch.min(places.len());
        if parts == 0 {
            return Ok(Vec::new());
        }
        let step = batch / parts;
        let remainder = batch % parts;

        let mut shards = Vec::with_capacity(parts);
        let mut begin = 0;
        for (i, place) in places.iter().take(parts).enumerate() {
            let end = begin + step + usize::from(i < remainder);
            shards.push(self.slice_samples(begin, end, *place)?);
            begin = end;
        }
        Ok(shards)
    }

    /// Concatenates tensors along the outer dimension into one host tensor.
    ///
    /// Inverse of [`split_batch`](Tensor::split_batch): shards merged in
    /// order reproduce the original bytes and LoD exactly.
    pub fn concat_batch(parts: &[Tensor]) -> Result<Tensor, TensorError> {
        let first = parts.first().ok_or(TensorError::Empty { op: "concat_batch" })?;
        if first.shape.rank() == 0 {
            return Err(TensorError::ScalarNotAllowed { op: "concat_batch" });
        }

        let mut outer = 0;
        let mut lod = Lod::empty();
        let mut data = Vec::with_capacity(parts.iter().map(|p| p.size_bytes()).sum());
        for part in parts {
            if part.dtype != first.dtype {
                return Err(TensorError::DTypeMismatch {
                    op: "concat_batch",
                    lhs: first.dtype,
                    rhs: part.dtype,
                });
            }
            if !part.shape.same_row_shape(&first.shape) {
                return Err(TensorError::ShapeMismatch {
                    op: "concat_batch",
                    lhs: first.shape.clone(),
                    rhs: part.shape.clone(),
                });
            }
            if part.lod.is_empty() != first.lod.is_empty() {
                return Err(TensorError::InvalidLod(
                    "cannot merge tensors with and without LoD".into(),
                ));
            }
            lod.append(&part.lod)?;
            outer += part.shape.outer_dim().unwrap_or(0);
            data.extend_from_slice(&part.data);
        }

        Ok(Tensor {
            shape: first.shape.with_outer_dim(outer),
            dtype: first.dtype,
            place: Place::Cpu,
            data: Arc::new(data),
            lod,
        })
    }

    fn slice_samples(&self, start: usize, end: usize, place: Place) -> Result<Tensor, TensorError> {
        let (lod, row_start, row_end) = if self.lod.is_empty() {
            (Lod::empty(), start, end)
        } else {
            self.lod.slice(start, end)
        };
        let outer = self
            .shape
            .outer_dim()
            .ok_or(TensorError::ScalarNotAllowed { op: "split_batch" })?;
        if row_end > outer {
            return Err(TensorError::InvalidLod(format!(
                "LoD refers to row {row_end} but the tensor has {outer} rows"
            )));
        }
        let row_bytes = self.shape.row_elements() * self.dtype.size_bytes();
        let bytes = self.data[row_start * row_bytes..row_end * row_bytes].to_vec();
        Ok(Tensor {
            shape: self.shape.with_outer_dim(row_end - row_start),
            dtype: self.dtype,
            place,
            data: Arc::new(bytes),
            lod,
        })
    }

    fn expect_dtype(&self, requested: DType) -> Result<(), TensorError> {
        if self.dtype != requested {
            return Err(TensorError::WrongDType {
                requested,
                actual: self.dtype,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize, width: usize) -> Tensor {
        let values: Vec<f32> = (0..n * width).map(|v| v as f32).collect();
        Tensor::from_f32(Shape::matrix(n, width), &values).unwrap()
    }

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32, Place::Accel(0));
        assert_eq!(t.size_bytes(), 24);
        assert_eq!(t.place(), Place::Accel(0));
        assert!(t.to_f32_vec().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        let result = Tensor::from_bytes(Shape::matrix(2, 3), DType::F32, Place::Cpu, vec![0u8; 10]);
        assert!(matches!(result, Err(TensorError::BufferSizeMismatch { .. })));
    }

    #[test]
    fn test_wrong_dtype_accessor() {
        let t = Tensor::from_i64(Shape::vector(2), &[1, 2]).unwrap();
        assert_eq!(t.to_i64_vec().unwrap(), vec![1, 2]);
        assert!(t.to_f32_vec().is_err());
    }

    #[test]
    fn test_share_vs_deep_copy() {
        let t = rows(2, 2);
        let shared = t.share_data_with();
        let copied = t.deep_copy_to(Place::Cpu);
        assert!(shared.shares_buffer_with(&t));
        assert!(!copied.shares_buffer_with(&t));
        assert_eq!(copied.as_bytes(), t.as_bytes());
        assert_eq!(t.buffer_handles(), 2);
    }

    #[test]
    fn test_copy_on_write() {
        let t = rows(1, 2);
        let mut other = t.share_data_with();
        other.as_bytes_mut()[0] = 0xff;
        assert!(!other.shares_buffer_with(&t));
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_split_even_and_remainder() {
        let t = rows(5, 2);
        let places = [Place::Cpu, Place::Cpu];
        let shards = t.split_batch(&places).unwrap();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].shape().dims(), &[3, 2]);
        assert_eq!(shards[1].shape().dims(), &[2, 2]);
        assert_eq!(shards[1].to_f32_vec().unwrap(), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_split_fewer_samples_than_places() {
        let t = rows(1, 4);
        let shards = t.split_batch(&[Place::Cpu, Place::Cpu, Place::Cpu]).unwrap();
        assert_eq!(shards.len(), 1);
    }

    #[test]
    fn test_split_moves_to_places() {
        let t = rows(2, 1);
        let shards = t.split_batch(&[Place::Accel(0), Place::Accel(1)]).unwrap();
        assert_eq!(shards[0].place(), Place::Accel(0));
        assert_eq!(shards[1].place(), Place::Accel(1));
    }

    #[test]
    fn test_split_then_concat_reconstructs() {
        let t = rows(7, 3);
        let shards = t.split_batch(&[Place::Cpu; 3]).unwrap();
        let merged = Tensor::concat_batch(&shards).unwrap();
        assert_eq!(merged.shape(), t.shape());
        assert_eq!(merged.as_bytes(), t.as_bytes());
    }

    #[test]
    fn test_split_with_lod() {
        // Three sequences of lengths 1, 3, 2.
        let lod = Lod::from_levels(vec![vec![0, 1, 4, 6]]).unwrap();
        let t = rows(6, 1).with_lod(lod.clone());
        assert_eq!(t.batch_size().unwrap(), 3);

        let shards = t.split_batch(&[Place::Cpu, Place::Cpu]).unwrap();
        assert_eq!(shards[0].shape().dims(), &[4, 1]);
        assert_eq!(shards[0].lod().levels(), &[vec![0, 1, 4]]);
        assert_eq!(shards[1].shape().dims(), &[2, 1]);
        assert_eq!(shards[1].lod().levels(), &[vec![0, 2]]);

        let merged = Tensor::concat_batch(&shards).unwrap();
        assert_eq!(merged.lod(), &lod);
        assert_eq!(merged.as_bytes(), t.as_bytes());
    }

    #[test]
    fn test_split_scalar_fails() {
        let t = Tensor::from_f32(Shape::scalar(), &[1.0]).unwrap();
        assert!(t.split_batch(&[Place::Cpu]).is_err());
    }

    #[test]
    fn test_concat_mismatched_rows() {
        let a = rows(1, 2);
        let b = rows(1, 3);
        assert!(matches!(
            Tensor::concat_batch(&[a, b]),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert!(Tensor::concat_batch(&[]).is_err());
    }

    #[test]
    fn test_reshape_shares_buffer() {
        let t = Tensor::from_f32(Shape::scalar(), &[4.0]).unwrap();
        let v = t.reshape(Shape::vector(1)).unwrap();
        assert_eq!(v.shape().dims(), &[1]);
        assert!(v.shares_buffer_with(&t));
        assert!(t.reshape(Shape::vector(2)).is_err());
    }
}
