//! Local Getis-Ord Gi* on a kNN graph.
//!
//! The point itself joins its neighbourhood, and the k + 1 members are
//! row-standardized (weight 1/(k+1) each). Standardized form (Ord & Getis 1995):
//!
//!   Gi* = (Σ_j w_ij x_j − x̄ W_i) / (S · √((n S1_i − W_i²) / (n − 1)))
//!
//! with W_i = Σ_j w_ij = 1, S1_i = Σ_j w_ij² = 1/(k+1), x̄ and S the global
//! mean and (population) standard deviation.

use super::normal_two_sided_p;
use super::weights::KnnWeights;

#[derive(Debug, Clone)]
pub struct GiStar {
    pub z_scores: Vec<f64>,
    /// Two-sided normal p-values.
    pub p_values: Vec<f64>,
}

pub fn local_gi_star(values: &[f64], weights: &KnnWeights) -> GiStar {
    let n = values.len();
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let s = (values.iter().map(|v| v * v).sum::<f64>() / nf - mean * mean).max(0.0).sqrt();

    let mut z_scores = vec![0.0; n];
    if s < f64::EPSILON || n < 2 {
        return GiStar { p_values: vec![1.0; n], z_scores };
    }

    for (i, z) in z_scores.iter_mut().enumerate() {
        let nb = weights.neighbors(i);
        let members = (nb.len() + 1) as f64;
        let w = 1.0 / members;
        let local = (values[i] + nb.iter().map(|&j| values[j]).sum::<f64>()) * w;
        let w_sum = 1.0;
        let s1 = members * w * w;
        let denom = s * ((nf * s1 - w_sum * w_sum) / (nf - 1.0)).sqrt();
        *z = if denom > f64::EPSILON { (local - mean * w_sum) / denom } else { 0.0 };
    }

    let p_values = z_scores.iter().map(|&z| normal_two_sided_p(z)).collect();
    GiStar { z_scores, p_values }
}
