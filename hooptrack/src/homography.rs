//! Planar homography estimation from point correspondences
//!
//! Least-squares fit uses the normalised direct linear transform (DLT). The
//! robust variant is a RANSAC that enumerates minimal 4-point subsets in index
//! order instead of sampling, so repeated runs on the same input always pick the
//! same model.

use anyhow::{anyhow, bail, Result};
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

/// Minimum number of correspondences that determine a homography
pub const MIN_CORRESPONDENCES: usize = 4;

const EPS: f64 = 1e-10;
// sin of the smallest angle accepted between two sides of a point triple
const COLLINEAR_SIN: f64 = 1e-6;

/// Parameters of the deterministic RANSAC fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacParams {
    /// Reprojection error (destination units) below which a pair is an inlier
    pub inlier_threshold: f64,
    /// Upper bound on the number of 4-point subsets evaluated
    pub max_subsets: usize,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            inlier_threshold: 5.0,
            max_subsets: 500,
        }
    }
}

/// 3x3 projective transform mapping source points onto destination points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn identity() -> Self {
        Self::from_matrix(Matrix3::identity())
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Least-squares fit over all correspondences
    pub fn estimate(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Result<Self> {
        if src.len() != dst.len() {
            bail!(
                "Correspondence count mismatch: {} source vs {} destination points",
                src.len(),
                dst.len()
            );
        }
        if src.len() < MIN_CORRESPONDENCES {
            bail!(
                "Need at least {} correspondences, got {}",
                MIN_CORRESPONDENCES,
                src.len()
            );
        }
        if !has_general_quad(src, dst) {
            bail!("No four correspondences in general position");
        }

        let (src_t, src_n) = normalize(src)?;
        let (dst_t, dst_n) = normalize(dst)?;

        // Pad to at least 9 rows so the SVD exposes the full right null space
        let rows = (2 * src.len()).max(9);
        let mut a = DMatrix::<f64>::zeros(rows, 9);
        for (i, (s, d)) in src_n.iter().zip(dst_n.iter()).enumerate() {
            let (x, y) = (s.x, s.y);
            let (u, v) = (d.x, d.y);
            let r = 2 * i;
            a.row_mut(r)
                .copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
            a.row_mut(r + 1)
                .copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
        }

        let svd = a.svd(false, true);
        let v_t = svd
            .v_t
            .ok_or_else(|| anyhow!("SVD did not produce right singular vectors"))?;
        let (null_idx, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .ok_or_else(|| anyhow!("SVD produced no singular values"))?;

        let h = v_t.row(null_idx);
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let dst_t_inv = dst_t
            .try_inverse()
            .ok_or_else(|| anyhow!("Destination normalisation is not invertible"))?;
        let mut matrix = dst_t_inv * normalized * src_t;

        let scale = if matrix[(2, 2)].abs() > EPS {
            matrix[(2, 2)]
        } else {
            matrix.norm()
        };
        if scale.abs() < EPS || !scale.is_finite() {
            bail!("Homography fit collapsed to zero");
        }
        matrix /= scale;

        if matrix.determinant().abs() < EPS || matrix.iter().any(|v| !v.is_finite()) {
            bail!("Homography fit is singular");
        }

        Ok(Self { matrix })
    }

    /// Robust fit: best 4-point model by inlier count, refitted on its inliers
    ///
    /// Returns the homography and the indices of the inlier correspondences.
    pub fn estimate_ransac(
        src: &[Point2<f64>],
        dst: &[Point2<f64>],
        params: &RansacParams,
    ) -> Result<(Self, Vec<usize>)> {
        if src.len() != dst.len() {
            bail!(
                "Correspondence count mismatch: {} source vs {} destination points",
                src.len(),
                dst.len()
            );
        }
        if src.len() <= MIN_CORRESPONDENCES {
            let homography = Self::estimate(src, dst)?;
            return Ok((homography, (0..src.len()).collect()));
        }

        let n = src.len();
        let mut best: Option<(Vec<usize>, f64)> = None;
        let mut subset = [0usize, 1, 2, 3];
        let mut evaluated = 0usize;

        loop {
            let sub_src: Vec<Point2<f64>> = subset.iter().map(|&i| src[i]).collect();
            let sub_dst: Vec<Point2<f64>> = subset.iter().map(|&i| dst[i]).collect();

            if let Ok(model) = Self::estimate(&sub_src, &sub_dst) {
                evaluated += 1;
                let mut inliers = Vec::new();
                let mut error_sum = 0.0;
                for i in 0..n {
                    if let Some(err) = model.transfer_error(&src[i], &dst[i]) {
                        if err < params.inlier_threshold {
                            inliers.push(i);
                            error_sum += err;
                        }
                    }
                }

                let better = match &best {
                    None => true,
                    Some((best_inliers, best_error)) => {
                        inliers.len() > best_inliers.len()
                            || (inliers.len() == best_inliers.len() && error_sum < *best_error)
                    }
                };
                if better {
                    best = Some((inliers, error_sum));
                }
                if best.as_ref().is_some_and(|(b, _)| b.len() == n) {
                    break;
                }
            }

            if evaluated >= params.max_subsets || !next_combination(&mut subset, n) {
                break;
            }
        }

        let (inliers, _) = best.ok_or_else(|| anyhow!("No non-degenerate 4-point subset"))?;
        if inliers.len() < MIN_CORRESPONDENCES {
            bail!(
                "Best model has only {} inliers, need {}",
                inliers.len(),
                MIN_CORRESPONDENCES
            );
        }

        let in_src: Vec<Point2<f64>> = inliers.iter().map(|&i| src[i]).collect();
        let in_dst: Vec<Point2<f64>> = inliers.iter().map(|&i| dst[i]).collect();
        let homography = Self::estimate(&in_src, &in_dst)?;

        log::trace!(
            "RANSAC kept {}/{} correspondences after {} subsets",
            inliers.len(),
            n,
            evaluated
        );
        Ok((homography, inliers))
    }

    /// Map a point; `None` when it lands on the line at infinity
    pub fn project(&self, point: &Point2<f64>) -> Option<Point2<f64>> {
        let v = self.matrix * Vector3::new(point.x, point.y, 1.0);
        if v.z.abs() < EPS {
            return None;
        }
        let projected = Point2::new(v.x / v.z, v.y / v.z);
        (projected.x.is_finite() && projected.y.is_finite()).then_some(projected)
    }

    /// Distance between the projection of `src` and `dst`
    pub fn transfer_error(&self, src: &Point2<f64>, dst: &Point2<f64>) -> Option<f64> {
        self.project(src).map(|p| nalgebra::distance(&p, dst))
    }

    /// Mean transfer error over a set of correspondences
    pub fn mean_transfer_error(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<f64> {
        if src.is_empty() || src.len() != dst.len() {
            return None;
        }
        let total: Option<f64> = src
            .iter()
            .zip(dst)
            .map(|(s, d)| self.transfer_error(s, d))
            .sum();
        total.map(|t| t / src.len() as f64)
    }
}

/// True when the points cannot anchor a homography: no four of them have
/// three on a common line
pub fn is_degenerate(points: &[Point2<f64>]) -> bool {
    !has_general_quad(points, points)
}

/// Whether some 4 correspondences have no three collinear points on either side
///
/// Such a quadruple pins down the homography; without one the DLT null space
/// has more than one dimension and any fitted matrix is arbitrary.
fn has_general_quad(src: &[Point2<f64>], dst: &[Point2<f64>]) -> bool {
    let n = src.len().min(dst.len());
    if n < MIN_CORRESPONDENCES {
        return false;
    }

    let mut subset = [0usize, 1, 2, 3];
    loop {
        let src_quad = subset.map(|i| src[i]);
        let dst_quad = subset.map(|i| dst[i]);
        if !quad_degenerate(&src_quad) && !quad_degenerate(&dst_quad) {
            return true;
        }
        if !next_combination(&mut subset, n) {
            return false;
        }
    }
}

fn quad_degenerate(quad: &[Point2<f64>; 4]) -> bool {
    for i in 0..4 {
        for j in i + 1..4 {
            for k in j + 1..4 {
                if collinear(&quad[i], &quad[j], &quad[k]) {
                    return true;
                }
            }
        }
    }
    false
}

fn collinear(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> bool {
    let ab = b - a;
    let ac = c - a;
    let denom = ab.norm() * ac.norm();
    if denom < EPS {
        return true;
    }
    (ab.x * ac.y - ab.y * ac.x).abs() / denom < COLLINEAR_SIN
}

/// Similarity transform moving the centroid to the origin with mean distance sqrt(2)
fn normalize(points: &[Point2<f64>]) -> Result<(Matrix3<f64>, Vec<Point2<f64>>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < EPS {
        bail!("Points are coincident");
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Ok((t, normalized))
}

/// Advance `subset` to the next k-combination of `0..n` in lexicographic order
fn next_combination(subset: &mut [usize], n: usize) -> bool {
    let k = subset.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if subset[i] < n - k + i {
            subset[i] += 1;
            for j in i + 1..k {
                subset[j] = subset[j - 1] + 1;
            }
            return true;
        }
    }
    false
}
