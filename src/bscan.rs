//! B-scan image helpers
//!
//! Depth runs along the rows, lateral position along the columns.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::to_db;

/// Decibel magnitude image
pub fn log_magnitude(image: &DMatrix<Complex64>) -> DMatrix<f64> {
    image.map(|x| to_db(x.norm()))
}

/// Rectangular region of interest, in (column, row) image coordinates
///
/// Panics on cropping if the region reaches outside the image.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}
impl Roi {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
    pub fn crop(&self, image: &DMatrix<f64>) -> DMatrix<f64> {
        image
            .view((self.y, self.x), (self.height, self.width))
            .into_owned()
    }
}

/// Median filter over the 4-connected neighborhood (disk of radius 1)
pub fn median_disk1(image: &DMatrix<f64>) -> DMatrix<f64> {
    let (rows, cols) = image.shape();
    DMatrix::from_fn(rows, cols, |r, c| {
        let mut window: Vec<f64> = [(0i64, 0i64), (-1, 0), (1, 0), (0, -1), (0, 1)]
            .iter()
            .filter_map(|&(dr, dc)| {
                let (nr, nc) = (r as i64 + dr, c as i64 + dc);
                (nr >= 0 && nr < rows as i64 && nc >= 0 && nc < cols as i64)
                    .then(|| image[(nr as usize, nc as usize)])
            })
            .collect();
        window.sort_by(f64::total_cmp);
        let n = window.len();
        if n % 2 == 0 {
            0.5 * (window[n / 2 - 1] + window[n / 2])
        } else {
            window[n / 2]
        }
    })
}

/// Dilates a boolean mask with a disk structuring element
pub fn dilate(mask: &DMatrix<bool>, radius: usize) -> DMatrix<bool> {
    morph(mask, radius, true)
}

/// Erodes a boolean mask with a disk structuring element
pub fn erode(mask: &DMatrix<bool>, radius: usize) -> DMatrix<bool> {
    morph(mask, radius, false)
}

fn morph(mask: &DMatrix<bool>, radius: usize, any: bool) -> DMatrix<bool> {
    let (rows, cols) = mask.shape();
    let r2 = (radius * radius) as i64;
    let offsets: Vec<(i64, i64)> = (-(radius as i64)..=radius as i64)
        .flat_map(|dr| (-(radius as i64)..=radius as i64).map(move |dc| (dr, dc)))
        .filter(|&(dr, dc)| dr * dr + dc * dc <= r2)
        .collect();
    DMatrix::from_fn(rows, cols, |r, c| {
        let mut hits = offsets.iter().filter_map(|&(dr, dc)| {
            let (nr, nc) = (r as i64 + dr, c as i64 + dc);
            (nr >= 0 && nr < rows as i64 && nc >= 0 && nc < cols as i64)
                .then(|| mask[(nr as usize, nc as usize)])
        });
        if any {
            hits.any(|m| m)
        } else {
            hits.all(|m| m)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_crop() {
        let image = DMatrix::from_fn(10, 8, |r, c| (r * 8 + c) as f64);
        let crop = Roi::new(2, 3, 4, 5).crop(&image);
        assert_eq!(crop.shape(), (5, 4));
        assert_eq!(crop[(0, 0)], image[(3, 2)]);
        assert_eq!(crop[(4, 3)], image[(7, 5)]);
    }

    #[test]
    fn median_removes_salt_noise() {
        let mut image = DMatrix::from_element(9, 9, 1.0);
        image[(4, 4)] = 100.0;
        let filtered = median_disk1(&image);
        assert_eq!(filtered[(4, 4)], 1.0);
        assert_eq!(filtered[(0, 0)], 1.0);
    }

    #[test]
    fn dilate_then_erode_restores_a_block() {
        let mut mask = DMatrix::from_element(12, 12, false);
        for r in 4..8 {
            for c in 4..8 {
                mask[(r, c)] = true;
            }
        }
        let closed = erode(&dilate(&mask, 1), 1);
        assert_eq!(closed, mask);
        // dilation grows the block by the disk radius
        assert!(dilate(&mask, 1)[(3, 4)]);
        assert!(!dilate(&mask, 1)[(3, 3)]);
    }

    #[test]
    fn log_magnitude_of_unit_samples_is_zero() {
        let image = DMatrix::from_element(3, 3, num_complex::Complex64::new(0., 1.));
        assert!(log_magnitude(&image).iter().all(|&x| x.abs() < 1e-12));
    }
}
