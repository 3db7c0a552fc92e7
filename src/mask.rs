// src/mask.rs
//
// Single-channel binary lane mask. Values are strictly {0, 1}; conversion to
// and from 8-bit gray images happens only at the boundary (binarizer output,
// thumbnails).

use crate::error::{TrackingError, TrackingResult};
use image::{GrayImage, Luma};

/// Scalar type of every pixel coordinate handed between tracking stages.
pub type PixelCoord = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl BinaryMask {
    /// All-zero mask. Each dimension is at least 1.
    pub fn new(width: usize, height: usize) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Wrap a row-major buffer, checking shape and that every value is 0 or 1.
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> TrackingResult<Self> {
        if width == 0 || height == 0 {
            return Err(TrackingError::InvalidMask {
                reason: format!("empty shape {}x{}", width, height),
            });
        }
        if data.len() != width * height {
            return Err(TrackingError::InvalidMask {
                reason: format!(
                    "buffer holds {} values, shape {}x{} needs {}",
                    data.len(),
                    width,
                    height,
                    width * height
                ),
            });
        }
        if let Some(bad) = data.iter().find(|&&v| v > 1) {
            return Err(TrackingError::InvalidMask {
                reason: format!("non-binary value {}", bad),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Any non-zero gray value counts as set. An empty image gives a 1x1
    /// empty mask.
    pub fn from_gray(img: &GrayImage) -> Self {
        if img.width() == 0 || img.height() == 0 {
            return Self::new(1, 1);
        }
        let data = img.as_raw().iter().map(|&v| u8::from(v > 0)).collect();
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data,
        }
    }

    /// Set pixels become 255.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([if self.get(x as usize, y as usize) { 255 } else { 0 }])
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        self.data[y * self.width + x] = u8::from(on);
    }

    /// Per-column count of set pixels over rows `row_start..height`.
    pub fn column_histogram(&self, row_start: usize) -> Vec<u32> {
        let mut hist = vec![0u32; self.width];
        for row in self.data.chunks_exact(self.width).skip(row_start) {
            for (bin, &v) in hist.iter_mut().zip(row) {
                *bin += u32::from(v);
            }
        }
        hist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = BinaryMask::from_vec(4, 4, vec![0; 15]).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidMask { .. }));
    }

    #[test]
    fn test_from_vec_rejects_non_binary() {
        let mut data = vec![0; 16];
        data[3] = 255;
        assert!(BinaryMask::from_vec(4, 4, data).is_err());
    }

    #[test]
    fn test_zero_dimensions_clamp_to_one() {
        let mask = BinaryMask::new(0, 5);
        assert_eq!((mask.width(), mask.height()), (1, 5));
        assert_eq!(mask.column_histogram(0), vec![0]);

        let mask = BinaryMask::from_gray(&GrayImage::new(0, 0));
        assert_eq!((mask.width(), mask.height()), (1, 1));
        assert_eq!(mask.column_histogram(0), vec![0]);
    }

    #[test]
    fn test_column_histogram_bottom_rows() {
        let mut mask = BinaryMask::new(3, 4);
        mask.set(0, 0, true); // top row, excluded
        mask.set(2, 2, true);
        mask.set(2, 3, true);
        assert_eq!(mask.column_histogram(2), vec![0, 0, 2]);
    }

    #[test]
    fn test_gray_round_trip_thresholds() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(1, 0, Luma([7]));
        let mask = BinaryMask::from_gray(&img);
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 0));
        assert_eq!(mask.to_gray().get_pixel(1, 0).0[0], 255);
    }
}
