use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, UnitSphere};

/// Draws a rotation uniformly distributed over SO(3).
///
/// A point is picked uniformly on the unit 4-sphere (four independent normal deviates,
/// normalised) and interpreted as a unit quaternion.
pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> Matrix3<f64> {
    loop {
        let w: f64 = StandardNormal.sample(rng);
        let i: f64 = StandardNormal.sample(rng);
        let j: f64 = StandardNormal.sample(rng);
        let k: f64 = StandardNormal.sample(rng);
        let q = Quaternion::new(w, i, j, k);
        if q.norm() > 1e-8 {
            return UnitQuaternion::from_quaternion(q)
                .to_rotation_matrix()
                .into_inner();
        }
    }
}

pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
    Vector3::new(x, y, z)
}
