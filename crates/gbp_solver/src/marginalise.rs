use gbp_linalg::{prelude::*, Axis};

use crate::message::{InformationVec, Message, PrecisionMatrix};

/// Marginalise the joint gaussian `(information_vector, precision_matrix)`
/// over every block in `layout` except `target`, with the Schur complement
///
/// ```text
/// η = η_a - Λ_ab Λ_bb⁻¹ η_b
/// Λ = Λ_aa - Λ_ab Λ_bb⁻¹ Λ_ba
/// ```
///
/// Returns `None` if `Λ_bb` is singular or too ill-conditioned to invert.
#[allow(clippy::similar_names)]
pub fn marginalise(
    information_vector: &Vector<Float>,
    precision_matrix: &Matrix<Float>,
    layout: &BlockLayout,
    target: usize,
) -> Option<Message> {
    debug_assert_eq!(information_vector.len(), layout.total());
    debug_assert_eq!(precision_matrix.nrows(), layout.total());
    debug_assert_eq!(precision_matrix.ncols(), layout.total());

    if layout.len() == 1 {
        return Message::new(
            InformationVec(information_vector.clone()),
            PrecisionMatrix(precision_matrix.clone()),
        )
        .ok();
    }

    let a: Vec<usize> = layout.range(target).collect();
    let b = layout.indices_except(target);

    let eta_a = information_vector.select(Axis(0), &a);
    let eta_b = information_vector.select(Axis(0), &b);

    let lam_a_rows = precision_matrix.select(Axis(0), &a);
    let lam_b_rows = precision_matrix.select(Axis(0), &b);
    let lam_aa = lam_a_rows.select(Axis(1), &a);
    let lam_ab = lam_a_rows.select(Axis(1), &b);
    let lam_ba = lam_b_rows.select(Axis(1), &a);
    let lam_bb = lam_b_rows.select(Axis(1), &b);

    let lam_bb_inv = lam_bb.try_inverse()?;
    let lam_ab_lam_bb_inv = lam_ab.dot(&lam_bb_inv);

    let eta = eta_a - lam_ab_lam_bb_inv.dot(&eta_b);
    let mut lam = lam_aa - lam_ab_lam_bb_inv.dot(&lam_ba);
    lam.symmetrise();

    Message::new(InformationVec(eta), PrecisionMatrix(lam)).ok()
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use gbp_linalg::array;
    use gbp_multivariate_normal::MultivariateNormal;

    use super::*;

    #[test]
    fn single_block_is_returned_unchanged() {
        let eta = array![1.0, 2.0];
        let lam = array![[2.0, 0.5], [0.5, 1.0]];
        let message = marginalise(&eta, &lam, &BlockLayout::new(&[2]), 0).unwrap();
        assert_eq!(message.information_vector(), &eta);
        assert_eq!(message.precision_matrix(), &lam);
    }

    #[test]
    fn marginal_matches_moment_form() {
        // In moment form, marginalising is selecting the block of the mean and
        // covariance
        let mean = array![1.0, -1.0, 2.0, 0.5];
        let covariance = array![
            [2.0, 0.3, 0.1, 0.0],
            [0.3, 1.5, 0.2, 0.1],
            [0.1, 0.2, 1.0, 0.4],
            [0.0, 0.1, 0.4, 3.0]
        ];
        let joint = MultivariateNormal::from_mean_and_covariance(mean.clone(), covariance.clone())
            .unwrap();
        let layout = BlockLayout::new(&[1, 2, 1]);

        let message = marginalise(
            joint.information_vector(),
            joint.precision_matrix(),
            &layout,
            1,
        )
        .unwrap();
        let (marginal_mean, marginal_covariance) = message.mean_and_covariance().unwrap();

        assert_abs_diff_eq!(marginal_mean, array![-1.0, 2.0], epsilon = 1e-9);
        assert_abs_diff_eq!(
            marginal_covariance,
            array![[1.5, 0.2], [0.2, 1.0]],
            epsilon = 1e-9
        );
    }

    #[test]
    fn singular_block_cannot_be_marginalised() {
        let eta = array![1.0, 0.0];
        let lam = array![[1.0, 0.0], [0.0, 0.0]];
        assert!(marginalise(&eta, &lam, &BlockLayout::new(&[1, 1]), 0).is_none());
    }
}
