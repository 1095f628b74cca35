use nalgebra::{Matrix3, SMatrix};

/// Storage for second-degree frame-order matrices and Kronecker products of rotations.
pub type Matrix9 = SMatrix<f64, 9, 9>;

/// `K[3i + k, 3j + l] = a[i, j] * b[k, l]`.
pub fn kron_prod(a: &Matrix3<f64>, b: &Matrix3<f64>) -> Matrix9 {
    let mut k = Matrix9::zeros();
    for i in 0..3 {
        for j in 0..3 {
            let aij = a[(i, j)];
            for p in 0..3 {
                for q in 0..3 {
                    k[(3 * i + p, 3 * j + q)] = aij * b[(p, q)];
                }
            }
        }
    }
    k
}

/// Rotates a second-degree frame-order matrix: `M <- R2 M R2^T` with `R2 = R (x) R`.
pub fn rotate_daeg(daeg: &Matrix9, r_kron: &Matrix9) -> Matrix9 {
    r_kron * daeg * r_kron.transpose()
}

/// Contracts a rank-2 tensor with a second-degree frame-order matrix.
///
/// With `M[3i + k, 3j + l] = <R_ij R_kl>` the result is `<R A R^T>`.
pub fn reduce_tensor(daeg: &Matrix9, tensor: &Matrix3<f64>) -> Matrix3<f64> {
    let mut reduced = Matrix3::zeros();
    for i in 0..3 {
        for k in 0..3 {
            let row = 3 * i + k;
            let mut sum = 0.0;
            for j in 0..3 {
                for l in 0..3 {
                    sum += daeg[(row, 3 * j + l)] * tensor[(j, l)];
                }
            }
            reduced[(i, k)] = sum;
        }
    }
    reduced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::rotation::{rotation_x, rotation_z};

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn kron_prod_of_identities_is_identity() {
        let k = kron_prod(&Matrix3::identity(), &Matrix3::identity());
        assert!((k - Matrix9::identity()).abs().max() < TOLERANCE);
    }

    #[test]
    fn kron_prod_places_products_in_block_layout() {
        let a = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let b = Matrix3::new(0.5, 0.0, 0.0, 0.0, 2.0, 0.0, 1.0, 0.0, 3.0);
        let k = kron_prod(&a, &b);
        assert_eq!(k[(3 * 1 + 2, 3 * 2)], a[(1, 2)] * b[(2, 0)]);
        assert_eq!(k[(3 * 2 + 1, 3 * 0 + 1)], a[(2, 0)] * b[(1, 1)]);
    }

    #[test]
    fn reduce_tensor_of_single_rotation_matches_similarity_transform() {
        let r = rotation_z(0.4) * rotation_x(1.1);
        let tensor = Matrix3::new(1.0, 0.2, -0.3, 0.2, -0.4, 0.5, -0.3, 0.5, -0.6);
        let reduced = reduce_tensor(&kron_prod(&r, &r), &tensor);
        let expected = r * tensor * r.transpose();
        assert!((reduced - expected).abs().max() < TOLERANCE);
    }

    #[test]
    fn rotate_daeg_composes_rotations() {
        let r1 = rotation_x(0.3);
        let r2 = rotation_z(-0.8);
        let inner = kron_prod(&r1, &r1);
        let rotated = rotate_daeg(&inner, &kron_prod(&r2, &r2));
        let composite = r2 * r1 * r2.transpose();
        assert!((rotated - kron_prod(&composite, &composite)).abs().max() < TOLERANCE);
    }
}
